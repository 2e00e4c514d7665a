//! Natural-loop nesting depth, computed from a dominator tree built with
//! Cooper's "Simple, Fast Dominator Algorithm".
//!
//! The conversion pass reads this only to weight its statistics; nothing
//! here mutates the module.

use std::collections::HashMap;

use crate::ir::{BlockId, FuncId, Module};

pub struct LoopInfo {
    depth: HashMap<BlockId, u32>,
}

impl LoopInfo {
    pub fn compute(module: &Module, func: FuncId) -> Self {
        let blocks = module.func(func).blocks.clone();
        if blocks.is_empty() {
            return Self { depth: HashMap::new() };
        }
        let entry = blocks[0];

        // Successor and predecessor maps from block terminators.
        let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in &blocks {
            let terminator_succs = module
                .block(b)
                .insts
                .last()
                .map(|&t| module.inst_kind(t).successors())
                .unwrap_or_default();
            for s in &terminator_succs {
                preds.entry(*s).or_default().push(b);
            }
            succs.insert(b, terminator_succs);
        }

        // Reverse post-order; unreachable blocks get rpo number 0.
        let rpo = reverse_post_order(entry, &succs);
        let mut rpo_number: HashMap<BlockId, u32> = HashMap::new();
        for (i, &b) in rpo.iter().enumerate() {
            rpo_number.insert(b, (i + 1) as u32);
        }

        // Immediate dominators, iterated to a fixed point.
        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(entry, entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in preds.get(&b).map(|v| v.as_slice()).unwrap_or(&[]) {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(cur, p, &idom, &rpo_number),
                    });
                }
                if let Some(ni) = new_idom {
                    if idom.get(&b) != Some(&ni) {
                        idom.insert(b, ni);
                        changed = true;
                    }
                }
            }
        }

        let dominates = |a: BlockId, b: BlockId| -> bool {
            let mut cur = b;
            loop {
                if cur == a {
                    return true;
                }
                match idom.get(&cur) {
                    Some(&up) if up != cur => cur = up,
                    _ => return false,
                }
            }
        };

        // Back edges t -> h where h dominates t; each one delimits a
        // natural loop found by flooding predecessors back from t.
        let mut depth: HashMap<BlockId, u32> = blocks.iter().map(|&b| (b, 0)).collect();
        for &t in &blocks {
            for &h in succs.get(&t).map(|v| v.as_slice()).unwrap_or(&[]) {
                if !rpo_number.contains_key(&t) || !dominates(h, t) {
                    continue;
                }
                let mut body = vec![h];
                let mut stack = vec![t];
                while let Some(b) = stack.pop() {
                    if body.contains(&b) {
                        continue;
                    }
                    body.push(b);
                    for &p in preds.get(&b).map(|v| v.as_slice()).unwrap_or(&[]) {
                        stack.push(p);
                    }
                }
                for b in body {
                    *depth.entry(b).or_default() += 1;
                }
            }
        }

        Self { depth }
    }

    pub fn loop_depth(&self, block: BlockId) -> u32 {
        self.depth.get(&block).copied().unwrap_or(0)
    }
}

fn reverse_post_order(entry: BlockId, succs: &HashMap<BlockId, Vec<BlockId>>) -> Vec<BlockId> {
    let mut post = Vec::new();
    let mut visited = Vec::new();
    // Iterative DFS with an explicit phase marker.
    let mut stack = vec![(entry, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            post.push(b);
            continue;
        }
        if visited.contains(&b) {
            continue;
        }
        visited.push(b);
        stack.push((b, true));
        for &s in succs.get(&b).map(|v| v.as_slice()).unwrap_or(&[]) {
            if !visited.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    post.reverse();
    post
}

fn intersect(
    a: BlockId,
    b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    rpo_number: &HashMap<BlockId, u32>,
) -> BlockId {
    let num = |x: BlockId| rpo_number.get(&x).copied().unwrap_or(0);
    let mut fa = a;
    let mut fb = b;
    while fa != fb {
        while num(fa) > num(fb) {
            fa = idom[&fa];
        }
        while num(fb) > num(fa) {
            fb = idom[&fb];
        }
    }
    fa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstKind, Module, Ty};

    #[test]
    fn straight_line_has_depth_zero() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        m.push_inst(bb, InstKind::Ret(None), Ty::Void);
        let li = LoopInfo::compute(&m, f);
        assert_eq!(li.loop_depth(bb), 0);
    }

    #[test]
    fn single_loop_depth() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![], Ty::Void);
        let entry = m.add_block(f, Some("entry"));
        let header = m.add_block(f, Some("header"));
        let exit = m.add_block(f, Some("exit"));
        let cond = m.const_int(Ty::Int(1), 1);
        m.push_inst(entry, InstKind::Br(header), Ty::Void);
        m.push_inst(
            header,
            InstKind::CondBr { cond, if_true: header, if_false: exit },
            Ty::Void,
        );
        m.push_inst(exit, InstKind::Ret(None), Ty::Void);

        let li = LoopInfo::compute(&m, f);
        assert_eq!(li.loop_depth(entry), 0);
        assert_eq!(li.loop_depth(header), 1);
        assert_eq!(li.loop_depth(exit), 0);
    }

    #[test]
    fn nested_loops_accumulate() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![], Ty::Void);
        let entry = m.add_block(f, Some("entry"));
        let outer = m.add_block(f, Some("outer"));
        let inner = m.add_block(f, Some("inner"));
        let latch = m.add_block(f, Some("latch"));
        let exit = m.add_block(f, Some("exit"));
        let cond = m.const_int(Ty::Int(1), 1);
        m.push_inst(entry, InstKind::Br(outer), Ty::Void);
        m.push_inst(outer, InstKind::Br(inner), Ty::Void);
        m.push_inst(
            inner,
            InstKind::CondBr { cond, if_true: inner, if_false: latch },
            Ty::Void,
        );
        m.push_inst(
            latch,
            InstKind::CondBr { cond, if_true: outer, if_false: exit },
            Ty::Void,
        );
        m.push_inst(exit, InstKind::Ret(None), Ty::Void);

        let li = LoopInfo::compute(&m, f);
        assert_eq!(li.loop_depth(inner), 2);
        assert_eq!(li.loop_depth(outer), 1);
        assert_eq!(li.loop_depth(latch), 1);
        assert_eq!(li.loop_depth(exit), 0);
    }
}
