//! Conversion queue: seed collection from analysis annotations, expansion
//! over def-use edges, and the stable move-to-back ordering.

use std::collections::BTreeSet;

use itertools::Itertools;

use fixp_core::ir::{InstKind, ValueId};

use crate::pass::FloatToFixed;

impl FloatToFixed<'_> {
    /// Collect annotated seeds: globals first, then every function's
    /// arguments and instructions, in program order. Populates the
    /// value-info store as a side effect.
    pub(crate) fn read_metadata(&mut self) -> Vec<ValueId> {
        let mut seeds: Vec<ValueId> = Vec::new();

        let globals: Vec<ValueId> = self.module.globals().collect();
        for g in globals {
            self.read_annotation(g, &mut seeds);
        }

        let funcs: Vec<_> = self.module.function_ids().collect();
        for f in funcs {
            let params = self.module.func(f).params.clone();
            for p in params {
                self.read_annotation(p, &mut seeds);
            }
            let blocks = self.module.func(f).blocks.clone();
            for b in blocks {
                let insts = self.module.block(b).insts.clone();
                for i in insts {
                    self.read_annotation(i, &mut seeds);
                }
            }
        }

        seeds.into_iter().unique().collect()
    }

    fn read_annotation(&mut self, v: ValueId, seeds: &mut Vec<ValueId>) {
        let Some(anno) = self.module.value(v).anno.clone() else { return };

        // Only values whose type still holds floats are convertible work;
        // comparisons qualify through their float operands. This also makes
        // a second run of the pass find nothing to do.
        let ty = self.module.ty_of(v);
        let is_fcmp = matches!(
            self.module.value(v).as_inst().map(|i| &i.kind),
            Some(InstKind::FCmp(..))
        );
        if !ty.contains_float() && !is_fcmp {
            return;
        }

        let mut info = crate::info::ValueInfo::default();
        info.fixp_type = anno.fixp.clone();
        info.orig_type = Some(ty);
        info.fixp_type_root_distance = 0;
        if anno.no_conversion {
            info.no_type_conversion = true;
        }
        if anno.fixp.is_invalid() && !anno.no_conversion {
            tracing::warn!("value {} has incomplete conversion metadata", v);
        }
        self.vinfo.overwrite(v, info);
        seeds.push(v);
    }

    /// Expand the seed set over def-use edges into a topologically ordered
    /// queue: discovering a user moves it to the back, so every value ends
    /// up after the values it consumes (phi cycles excepted; those are
    /// broken by placeholders opened here).
    pub(crate) fn sort_queue(&mut self, vals: &mut Vec<ValueId>) {
        let mut next = 0;
        while next < vals.len() {
            let v = vals[next];
            tracing::debug!("[V] {}", v);

            // Restrict inherited roots to true roots (those with no
            // further upstream roots of their own).
            let current_roots: Vec<ValueId> =
                self.vinfo.demand(v).roots.iter().copied().collect();
            let inherited: BTreeSet<ValueId> = current_roots
                .into_iter()
                .filter(|r| self.vinfo.get(*r).map(|i| i.roots.is_empty()).unwrap_or(true))
                .collect();
            self.vinfo.demand(v).roots = inherited.clone();
            let propagated: BTreeSet<ValueId> = if inherited.is_empty() {
                std::iter::once(v).collect()
            } else {
                inherited
            };

            if self.is_phi(v) {
                self.open_phi_loop(v);
            }

            for u in self.module.users(v) {
                if let Some(f) = self.module.func_of_value(u) {
                    if self.function_pool.contains_original(f) {
                        tracing::debug!("skipped user {} in obsolete original function", u);
                        continue;
                    }
                }

                // Move an already-queued user to the back, keeping the
                // processing cursor stable.
                let mut i = 0;
                while i < vals.len() {
                    if vals[i] == u {
                        vals.remove(i);
                        if i < next {
                            next -= 1;
                        }
                    } else {
                        i += 1;
                    }
                }

                if !self.vinfo.has(u) {
                    tracing::warn!("value {} will not be converted because it has no metadata", u);
                    let ty = self.module.ty_of(u);
                    let info = self.vinfo.demand(u);
                    info.no_type_conversion = true;
                    info.orig_type = Some(ty);
                }

                tracing::debug!("[U] {}", u);
                vals.push(u);
                if self.is_phi(u) {
                    self.open_phi_loop(u);
                }
                self.vinfo.demand(u).roots.extend(propagated.iter().copied());
            }
            next += 1;
        }

        for &v in vals.iter() {
            debug_assert!(self.vinfo.has(v), "queued value without conversion info");
            let ty = self.module.ty_of(v);
            let is_ret = matches!(
                self.module.value(v).as_inst().map(|i| &i.kind),
                Some(InstKind::Ret(..))
            );
            let fixp_invalid = self.vinfo.fixp_type(v).is_invalid();
            if fixp_invalid && !(ty.is_void() && !is_ret) {
                tracing::warn!(
                    "value {} will not be converted because its metadata is incomplete",
                    v
                );
                self.vinfo.demand(v).no_type_conversion = true;
            }

            if self.vinfo.demand(v).roots.is_empty() {
                let is_alloca = matches!(
                    self.module.value(v).as_inst().map(|i| &i.kind),
                    Some(InstKind::Alloca { .. })
                );
                let is_inst = self.module.value(v).is_inst();
                let info = self.vinfo.demand(v);
                info.is_root = true;
                if is_inst && !is_alloca {
                    // Non-alloca roots were generated by backtracking.
                    info.is_backtracking_node = true;
                }
                info.roots.insert(v);
            }
        }
    }

    pub(crate) fn is_phi(&self, v: ValueId) -> bool {
        matches!(
            self.module.try_value(v).and_then(|d| d.as_inst()).map(|i| &i.kind),
            Some(InstKind::Phi { .. })
        )
    }
}
