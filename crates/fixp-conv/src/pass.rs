//! Pass driver: owns the conversion state and sequences the phases over a
//! module.

use std::collections::HashMap;

use fixp_core::analysis::LoopInfo;
use fixp_core::ir::{FuncId, InstKind, Module, ValueId};

use crate::info::{FunctionPool, OperandPool, PhiReplacement, ValueInfoStore};
use crate::stats::ConversionStats;

/// Registration data for the pass, consumed by the driver binary.
#[derive(Debug, Clone, Copy)]
pub struct PassInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Looks at more than the CFG.
    pub cfg_only: bool,
    /// Leaves every other analysis intact.
    pub preserves_all: bool,
    pub required_analyses: &'static [&'static str],
}

pub const PASS_INFO: PassInfo = PassInfo {
    name: "flttofix",
    description: "Floating Point to Fixed Point conversion pass",
    cfg_only: false,
    preserves_all: true,
    required_analyses: &["loop-info"],
};

/// One diagnostic side-file entry per successfully converted instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRecord {
    pub line: u32,
    pub col: u32,
    pub opcode: &'static str,
    /// For call sites: whether the callee is a builtin (runtime or
    /// intrinsic). `None` everywhere else.
    pub builtin: Option<bool>,
}

impl ConversionRecord {
    pub fn to_line(&self) -> String {
        let marker = match self.builtin {
            Some(true) => " BUILT-IN",
            Some(false) => " NOT-BUILT-IN",
            None => "",
        };
        format!("{} {} {}{}", self.line, self.col, self.opcode, marker)
    }
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub stats: ConversionStats,
    pub records: Vec<ConversionRecord>,
}

/// The float-to-fixed conversion pass. State lives for one `run` over one
/// module; nothing here is process-global.
pub struct FloatToFixed<'m> {
    pub(crate) module: &'m mut Module,
    pub(crate) vinfo: ValueInfoStore,
    pub(crate) operand_pool: OperandPool,
    pub(crate) function_pool: FunctionPool,
    pub(crate) phi_replacements: Vec<PhiReplacement>,
    pub(crate) stats: ConversionStats,
    pub(crate) records: Vec<ConversionRecord>,
    loop_info: HashMap<FuncId, LoopInfo>,
}

impl<'m> FloatToFixed<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            vinfo: ValueInfoStore::default(),
            operand_pool: OperandPool::default(),
            function_pool: FunctionPool::default(),
            phi_replacements: Vec::new(),
            stats: ConversionStats::default(),
            records: Vec::new(),
            loop_info: HashMap::new(),
        }
    }

    pub fn run(mut self) -> ConversionOutcome {
        let mut vals = self.read_metadata();
        self.stats.metadata_count = vals.len();

        self.propagate_call(&mut vals);
        self.sort_queue(&mut vals);
        self.dump_queue(&vals);
        self.stats.conversion_count = vals.len();

        self.perform_conversion(&mut vals);
        self.close_phi_loops();
        self.cleanup(&vals);
        self.erase_obsolete_functions();

        ConversionOutcome { stats: self.stats, records: self.records }
    }

    /// Loop nesting depth of the block holding `v`; non-instructions sit at
    /// depth zero.
    pub(crate) fn loop_depth_of(&mut self, v: ValueId) -> u32 {
        let Some(data) = self.module.try_value(v) else { return 0 };
        let Some(inst) = data.as_inst() else { return 0 };
        let block = inst.block;
        let func = self.module.block(block).func;
        let module = &*self.module;
        self.loop_info
            .entry(func)
            .or_insert_with(|| LoopInfo::compute(module, func))
            .loop_depth(block)
    }

    pub(crate) fn dump_queue(&self, vals: &[ValueId]) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        if vals.len() > 1000 {
            tracing::debug!("not printing the conversion queue because it exceeds 1000 items");
            return;
        }
        tracing::debug!("conversion queue:");
        for &v in vals {
            let info = self.vinfo.get(v);
            let (bt, noconv, fixp, roots) = match info {
                Some(i) => (
                    i.is_backtracking_node,
                    i.no_type_conversion,
                    i.fixp_type.to_string(),
                    format!("{:?}", i.roots),
                ),
                None => (false, false, "?".into(), "[]".into()),
            };
            let fun = self
                .module
                .func_of_value(v)
                .map(|f| self.module.func(f).name.clone())
                .unwrap_or_default();
            tracing::debug!(
                "bt={} noconv={} type={} fun='{}' roots={} {}",
                bt,
                noconv,
                fixp,
                fun,
                roots,
                v
            );
        }
    }

    /// Record a successful instruction conversion for the diagnostic side
    /// file. Instructions without a source location are skipped with a
    /// warning.
    pub(crate) fn record_conversion(&mut self, orig: ValueId) {
        let Some(data) = self.module.try_value(orig) else { return };
        let Some(inst) = data.as_inst() else { return };
        let opcode = inst.kind.opcode_name();
        let builtin = match &inst.kind {
            InstKind::Call { callee, .. } | InstKind::Invoke { callee, .. } => {
                let f = self.module.func(*callee);
                Some(f.special || f.intrinsic.is_some())
            }
            _ => None,
        };
        match data.dbg {
            Some(dbg) => self.records.push(ConversionRecord {
                line: dbg.line,
                col: dbg.col,
                opcode,
                builtin,
            }),
            None => {
                tracing::warn!("converted instruction {} has no source location; skipping", orig)
            }
        }
    }

    /// Phase sequence without the final teardown, for tests that inspect
    /// pass state.
    #[cfg(test)]
    pub(crate) fn run_phases(&mut self) -> Vec<ValueId> {
        let mut vals = self.read_metadata();
        self.stats.metadata_count = vals.len();
        self.propagate_call(&mut vals);
        self.sort_queue(&mut vals);
        self.stats.conversion_count = vals.len();
        self.perform_conversion(&mut vals);
        self.close_phi_loops();
        self.cleanup(&vals);
        vals
    }

    /// Original functions that were cloned and have no remaining callers
    /// are dropped from the module.
    pub(crate) fn erase_obsolete_functions(&mut self) {
        let originals: Vec<FuncId> = self.function_pool.iter().map(|(old, _)| old).collect();
        for old in originals {
            let still_called = self.module.function_ids().any(|f| {
                self.module.func(f).blocks.iter().any(|&b| {
                    self.module.block(b).insts.iter().any(|&i| {
                        matches!(
                            self.module.inst_kind(i),
                            InstKind::Call { callee, .. } | InstKind::Invoke { callee, .. }
                                if *callee == old
                        )
                    })
                })
            });
            if !still_called {
                tracing::debug!("erasing obsolete original function {}", self.module.func(old).name);
                self.module.erase_function(old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fixp_core::fixed_point::FixedPointType;
    use fixp_core::ir::{FixpAnnotation, FloatKind, InstKind, Module, Ty};

    use super::FloatToFixed;
    use crate::info::Converted;

    fn f32t() -> Ty {
        Ty::Float(FloatKind::F32)
    }

    #[test]
    fn every_queued_value_lands_in_the_operand_pool() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        let x = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
        let xv = m.push_inst(bb, InstKind::Load { ptr: x }, f32t());
        let bad = m.push_inst(bb, InstKind::FRem(xv, xv), f32t());
        m.push_inst(bb, InstKind::Store { value: bad, ptr: x }, Ty::Void);
        m.push_inst(bb, InstKind::Ret(None), Ty::Void);
        for v in [x, xv, bad] {
            m.value_mut(v).anno =
                Some(FixpAnnotation::new(FixedPointType::new(true, 8, 16)));
        }

        let mut pass = FloatToFixed::new(&mut m);
        let queue = pass.run_phases();

        for &v in &queue {
            let entry = pass.operand_pool.get(v);
            assert!(entry.is_some(), "queued value {} has no pool entry", v);
        }
        assert_eq!(pass.operand_pool.get(bad), Some(Converted::Error));
        // The failing chain keeps its root tainted, never the other way
        // around: the root itself still converted.
        assert!(matches!(pass.operand_pool.get(x), Some(Converted::Value(_))));
    }
}
