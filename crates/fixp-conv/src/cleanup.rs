//! Dead-original removal. Erasure is restricted to the side-effectful
//! opcode classes and ordered so that consumers go before their operands;
//! a conversion failure anywhere under a root keeps that root's originals
//! alive.

use std::collections::HashMap;

use fixp_core::ir::{Constant, InstKind, ValueId};

use crate::info::Converted;
use crate::pass::FloatToFixed;

impl FloatToFixed<'_> {
    /// Whether a failed conversion of `v` can leak into memory-visible
    /// state, which is what taints its roots.
    fn potentially_uses_memory(&self, v: ValueId) -> bool {
        let Some(data) = self.module.try_value(v) else { return false };
        let Some(inst) = data.as_inst() else { return false };
        match &inst.kind {
            InstKind::Bitcast(_) => false,
            InstKind::Call { callee, .. } => {
                let f = self.module.func(*callee);
                match f.intrinsic {
                    Some(
                        fixp_core::ir::IntrinsicKind::LifetimeStart
                        | fixp_core::ir::IntrinsicKind::LifetimeEnd,
                    ) => false,
                    _ => !f.readnone,
                }
            }
            _ => true,
        }
    }

    pub(crate) fn cleanup(&mut self, queue: &[ValueId]) {
        let roots: Vec<ValueId> = queue
            .iter()
            .copied()
            .filter(|&v| self.vinfo.get(v).map(|i| i.is_root).unwrap_or(false))
            .collect();

        let mut root_ok: HashMap<ValueId, bool> = roots.iter().map(|&r| (r, true)).collect();

        for &qi in queue {
            let converted = self
                .operand_pool
                .get(qi)
                .expect("every queued value should have been processed by cleanup");
            if converted != Converted::Error {
                continue;
            }
            if !self.potentially_uses_memory(qi) {
                continue;
            }
            tracing::debug!("{} not converted; invalidates its roots", qi);
            if let Some(info) = self.vinfo.get(qi) {
                for &root in &info.roots {
                    root_ok.insert(root, false);
                }
            }
        }

        let mut to_erase: Vec<ValueId> = Vec::new();
        let classes: [fn(&InstKind) -> bool; 5] = [
            InstKind::is_store,
            InstKind::is_call,
            InstKind::is_invoke,
            InstKind::is_branch,
            InstKind::is_phi,
        ];
        for class in classes {
            for &qi in queue {
                let Some(data) = self.module.try_value(qi) else { continue };
                let Some(inst) = data.as_inst() else { continue };
                if !class(&inst.kind) {
                    continue;
                }
                let Some(converted) = self.operand_pool.converted(qi) else { continue };
                if converted == qi {
                    tracing::debug!("{} not deleted, as it was converted by self-mutation", qi);
                    continue;
                }
                let roots_ok = self
                    .vinfo
                    .get(qi)
                    .map(|info| info.roots.iter().all(|r| *root_ok.get(r).unwrap_or(&true)))
                    .unwrap_or(true);
                if !roots_ok {
                    tracing::debug!("{} not deleted: involves a tainted root", qi);
                    continue;
                }
                if !self.module.use_empty(qi) {
                    let ty = self.module.ty_of(qi);
                    let undef = self.module.constant(Constant::Undef(ty));
                    self.module.replace_all_uses_with(qi, undef);
                }
                to_erase.push(qi);
            }
        }

        for v in to_erase {
            self.module.erase_inst(v);
        }
    }
}
