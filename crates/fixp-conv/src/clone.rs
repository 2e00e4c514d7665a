//! Retyped function clones. A call whose arguments or return value change
//! representation gets a clone of its callee with the mapped signature;
//! conversion then propagates into the clone's body through placeholder
//! values registered in the operand pool.

use std::collections::{HashMap, HashSet};

use fixp_core::ir::{BlockId, FuncId, InstKind, ValueId};

use crate::info::Converted;
use crate::pass::FloatToFixed;

impl FloatToFixed<'_> {
    /// Walk the seed queue for call sites, clone their callees, and pull
    /// the clones' annotated values into the queue. Queue entries living in
    /// obsolete originals are filtered out at the end.
    pub(crate) fn propagate_call(&mut self, vals: &mut Vec<ValueId>) {
        let mut old_funcs: HashSet<FuncId> = HashSet::new();

        let mut i = 0;
        while i < vals.len() {
            let v = vals[i];
            i += 1;

            let Some(InstKind::Call { callee, .. }) =
                self.module.try_value(v).and_then(|d| d.as_inst()).map(|inst| inst.kind.clone())
            else {
                continue;
            };

            let Some((new_func, already_handled)) = self.create_fix_fun(v, callee) else {
                tracing::debug!(
                    "attempted to clone function {} but failed",
                    self.module.func(callee).name
                );
                continue;
            };
            if already_handled {
                old_funcs.insert(callee);
                continue;
            }

            tracing::info!(
                "converting function {} into {}",
                self.module.func(callee).name,
                self.module.func(new_func).name
            );

            self.clone_function_body(callee, new_func);

            // Parameters whose type changed get a placeholder of the
            // original type wired into the body, so the rewriter sees "an
            // original value" that conveniently already has a converted
            // counterpart (the new parameter itself).
            let old_params = self.module.func(callee).params.clone();
            let new_params = self.module.func(new_func).params.clone();
            let entry = self.module.entry_block(new_func);
            for (&old_p, &new_p) in old_params.iter().zip(new_params.iter()) {
                if self.module.ty_of(old_p) == self.module.ty_of(new_p) {
                    continue;
                }
                let fixp = self.vinfo.fixp_type(old_p);
                let base_name = self
                    .module
                    .name_of(new_p)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}", new_p));
                self.module.value_mut(new_p).name = Some(format!("{}.{}", base_name, fixp));

                let placeholder_name = format!("{}.placeholder", base_name);
                let orig_ty = self.module.ty_of(old_p);
                let placeholder =
                    self.module.create_placeholder(orig_ty, entry, placeholder_name);
                // The clone's body was built against the retyped parameter;
                // rewiring it to the placeholder defeats the same-type check
                // on purpose.
                self.module.replace_all_uses_unchecked(new_p, placeholder);

                let mut info = self.vinfo.get(old_p).cloned().unwrap_or_default();
                info.is_argument_placeholder = true;
                self.vinfo.overwrite(placeholder, info.clone());
                info.is_argument_placeholder = false;
                self.vinfo.overwrite(new_p, info);
                self.operand_pool.set(placeholder, Converted::Value(new_p));
            }

            // The cloned body carried its annotations along; read them as
            // fresh seeds.
            let mut new_vals: Vec<ValueId> = Vec::new();
            let blocks = self.module.func(new_func).blocks.clone();
            for b in blocks {
                let insts = self.module.block(b).insts.clone();
                for inst in insts {
                    if self.module.value(inst).anno.is_some() {
                        self.read_cloned_annotation(inst, &mut new_vals);
                    }
                }
            }

            // Propagate the call's return format to every return in the
            // clone so they convert consistently.
            if self.vinfo.has(v) {
                let call_fixp = self.vinfo.fixp_type(v);
                let blocks = self.module.func(new_func).blocks.clone();
                for b in blocks {
                    let insts = self.module.block(b).insts.clone();
                    for inst in insts {
                        if matches!(self.module.inst_kind(inst), InstKind::Ret(Some(_))) {
                            let info = self.vinfo.demand(inst);
                            info.fixp_type = call_fixp.clone();
                            info.orig_type = None;
                            info.fixp_type_root_distance = 0;
                            new_vals.push(inst);
                        }
                    }
                }
            }

            old_funcs.insert(callee);

            for nv in new_vals {
                if !vals.contains(&nv) {
                    vals.push(nv);
                }
            }
        }

        vals.retain(|&val| {
            self.module
                .func_of_value(val)
                .map(|f| !old_funcs.contains(&f))
                .unwrap_or(true)
        });
    }

    fn read_cloned_annotation(&mut self, v: ValueId, seeds: &mut Vec<ValueId>) {
        if self.vinfo.has(v) {
            return;
        }
        let Some(anno) = self.module.value(v).anno.clone() else { return };
        let ty = self.module.ty_of(v);
        let is_fcmp = matches!(self.module.inst_kind(v), InstKind::FCmp(..));
        if !ty.contains_float() && !is_fcmp {
            return;
        }
        let info = self.vinfo.demand(v);
        info.fixp_type = anno.fixp.clone();
        info.orig_type = Some(ty);
        info.fixp_type_root_distance = 0;
        if anno.no_conversion {
            info.no_type_conversion = true;
        }
        seeds.push(v);
    }

    /// Create (or fetch from the pool) the retyped clone shell for the
    /// callee of `call`. Returns `(clone, already_handled)`, or `None` when
    /// the callee must not be cloned.
    pub(crate) fn create_fix_fun(
        &mut self,
        call: ValueId,
        old_func: FuncId,
    ) -> Option<(FuncId, bool)> {
        {
            let f = self.module.func(old_func);
            if f.special || f.intrinsic.is_some() {
                return None;
            }
            if !f.clone_source {
                tracing::debug!("function {} not a clone source; ignoring", f.name);
                return None;
            }
        }

        if let Some(existing) = self.function_pool.get(old_func) {
            tracing::debug!(
                "call {} uses already converted function {}",
                call,
                self.module.func(existing).name
            );
            return Some((existing, true));
        }

        let ret_is_float = self.module.func(old_func).ret_ty.contains_float();
        let suffix = if ret_is_float {
            self.vinfo.fixp_type(call).to_string()
        } else {
            "fixp".to_string()
        };

        let old_params = self.module.func(old_func).params.clone();
        let mut param_tys = Vec::with_capacity(old_params.len());
        for &p in &old_params {
            let mapped = if self.vinfo.get(p).map(|i| !i.fixp_type.is_invalid()).unwrap_or(false) {
                self.mapped_type_for_value(p)
            } else {
                None
            };
            param_tys.push(mapped.unwrap_or_else(|| self.module.ty_of(p)));
        }

        let ret_ty = if ret_is_float {
            let fixp = self.vinfo.fixp_type(call);
            let mut has_floats = false;
            crate::type_mapper::map_fixed_type(
                &self.module.func(old_func).ret_ty,
                &fixp,
                &mut has_floats,
            )?
        } else {
            self.module.func(old_func).ret_ty.clone()
        };

        let name = format!("{}_{}", self.module.func(old_func).name, suffix);
        tracing::debug!("creating function {}", name);
        let new_func = self.module.add_function(name, param_tys, ret_ty);
        self.function_pool.insert(old_func, new_func);
        self.stats.functions_created += 1;
        Some((new_func, false))
    }

    /// Copy the body of `src` into the (empty) function `dst`, remapping
    /// arguments, blocks, and instruction operands. Names, debug locations,
    /// and annotations travel with their values.
    pub(crate) fn clone_function_body(&mut self, src: FuncId, dst: FuncId) {
        let mut value_map: HashMap<ValueId, ValueId> = HashMap::new();
        let mut block_map: HashMap<BlockId, BlockId> = HashMap::new();

        let src_params = self.module.func(src).params.clone();
        let dst_params = self.module.func(dst).params.clone();
        for (&sp, &dp) in src_params.iter().zip(dst_params.iter()) {
            let name = self.module.name_of(sp).map(str::to_string);
            self.module.value_mut(dp).name = name;
            self.module.copy_meta(dp, sp);
            value_map.insert(sp, dp);
        }

        let src_blocks = self.module.func(src).blocks.clone();
        for &sb in &src_blocks {
            let name = self.module.block(sb).name.clone();
            let db = self.module.add_block(dst, name.as_deref());
            block_map.insert(sb, db);
        }

        // First pass: create the instructions with original operands.
        for &sb in &src_blocks {
            let db = block_map[&sb];
            let insts = self.module.block(sb).insts.clone();
            for si in insts {
                let kind = self.module.inst_kind(si).clone();
                let ty = self.module.ty_of(si);
                let di = self.module.push_inst(db, kind, ty);
                let name = self.module.name_of(si).map(str::to_string);
                self.module.value_mut(di).name = name;
                self.module.copy_meta(di, si);
                value_map.insert(si, di);
            }
        }

        // Second pass: remap operands and block references.
        let cloned: Vec<ValueId> = value_map.values().copied().collect();
        for &di in &cloned {
            if let Some(inst) = self.module.value_mut(di).as_inst_mut() {
                inst.kind.for_each_operand_mut(|op| {
                    if let Some(mapped) = value_map.get(op) {
                        *op = *mapped;
                    }
                });
                inst.kind.for_each_block_mut(|b| {
                    if let Some(mapped) = block_map.get(b) {
                        *b = *mapped;
                    }
                });
            }
        }
    }
}
