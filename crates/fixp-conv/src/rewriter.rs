//! Per-opcode value rewriting: for each queued value, produce a
//! replacement in the target fixed-point representation.

use itertools::Itertools;

use fixp_core::fixed_point::{FixedPointType, FixpScalar};
use fixp_core::ir::{
    Builder, Constant, FloatPred, FuncId, InsertPoint, InstKind, IntPred, IntrinsicKind,
    PhiIncoming, Ty, ValueId,
};

use crate::fold::FoldPolicy;
use crate::info::Converted;
use crate::pass::FloatToFixed;

/// Outcome of one rewrite attempt. `Unsupported` means no rule exists for
/// the opcode; both failure variants become the error sentinel in the
/// operand pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rewrite {
    Converted(ValueId),
    Unsupported,
    Failed,
}

impl FloatToFixed<'_> {
    /// Conversion sweep over the sorted queue. Variable-annotation
    /// intrinsics are dropped from the queue and the module before any
    /// processing.
    pub(crate) fn perform_conversion(&mut self, vals: &mut Vec<ValueId>) {
        let mut i = 0;
        while i < vals.len() {
            let v = vals[i];

            if let Some(InstKind::Call { callee, .. }) =
                self.module.try_value(v).and_then(|d| d.as_inst()).map(|inst| inst.kind.clone())
            {
                if self.module.func(callee).intrinsic == Some(IntrinsicKind::VarAnnotation) {
                    self.module.erase_inst(v);
                    vals.remove(i);
                    continue;
                }
            }

            tracing::debug!("converting {}", v);
            let mut fixpt = self.vinfo.fixp_type(v);
            match self.convert_single_value(v, &mut fixpt) {
                Rewrite::Converted(newv) => {
                    self.vinfo.demand(v).fixp_type = fixpt;
                    self.operand_pool.insert_if_absent(v, Converted::Value(newv));
                    if newv != v {
                        self.module.copy_meta(newv, v);
                        let info = self.vinfo.get(v).cloned().unwrap_or_default();
                        self.vinfo.overwrite(newv, info);
                    }
                    self.record_conversion(v);
                    // The replacement carries the annotation now; dropping
                    // it from the original keeps a re-run of the pass from
                    // finding stale work.
                    self.module.value_mut(v).anno = None;
                }
                _ => {
                    self.operand_pool.insert_if_absent(v, Converted::Error);
                    tracing::debug!("value {} not converted", v);
                }
            }
            i += 1;
        }
    }

    pub(crate) fn convert_single_value(
        &mut self,
        v: ValueId,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let data = self.module.value(v);
        if data.is_constant() {
            return match self.fold_constant_value(v, fixpt, FoldPolicy::RangeOverHintMaxFrac) {
                Some(c) => Rewrite::Converted(c),
                None => Rewrite::Unsupported,
            };
        }
        if data.as_global().is_some() {
            return self.convert_global(v, fixpt);
        }
        if data.is_inst() {
            return self.convert_instruction(v, fixpt);
        }
        Rewrite::Unsupported
    }

    fn convert_instruction(&mut self, v: ValueId, fixpt: &mut FixedPointType) -> Rewrite {
        // Pass-through values self-mutate. Void instructions still dispatch
        // by opcode: a store has no representation of its own but its
        // operands must be rewired structurally.
        let noconv = self.vinfo.get(v).map(|i| i.no_type_conversion).unwrap_or(false);
        if noconv && !self.module.ty_of(v).is_void() {
            return self.fallback(v);
        }
        let kind = self.module.inst_kind(v).clone();
        match kind {
            InstKind::SIToFP(x) => self.convert_int_to_float_cast(v, x, true, fixpt),
            InstKind::UIToFP(x) => self.convert_int_to_float_cast(v, x, false, fixpt),
            InstKind::FPExt(x) | InstKind::FPTrunc(x) => self.convert_float_cast(v, x, fixpt),
            InstKind::FAdd(a, b) => self.convert_add_sub(v, a, b, false, fixpt),
            InstKind::FSub(a, b) => self.convert_add_sub(v, a, b, true, fixpt),
            InstKind::FMul(a, b) => self.convert_mul(v, a, b, fixpt),
            InstKind::FDiv(a, b) => self.convert_div(v, a, b, fixpt),
            InstKind::FCmp(pred, a, b) => self.convert_cmp(v, pred, a, b, fixpt),
            InstKind::Load { ptr } => self.convert_load(v, ptr, fixpt),
            InstKind::Store { value, ptr } => self.convert_store(v, value, ptr),
            InstKind::Alloca { allocated } => self.convert_alloca(v, &allocated, fixpt),
            InstKind::Gep { ptr, indices } => self.convert_gep(v, ptr, &indices, fixpt),
            InstKind::Phi { incoming } => self.convert_phi(v, &incoming, fixpt),
            InstKind::Select { cond, if_true, if_false } => {
                self.convert_select(v, cond, if_true, if_false, fixpt)
            }
            InstKind::Call { callee, args } => self.convert_call(v, callee, &args, fixpt),
            InstKind::Ret(op) => self.convert_ret(v, op, fixpt),
            _ => {
                // Void consumers (branches, void returns reached here
                // through odd metadata) keep their representation and only
                // need operand patching; anything else has no rule.
                if self.module.ty_of(v).is_void() {
                    self.fallback(v)
                } else {
                    tracing::debug!(
                        "no conversion rule for opcode {} of {}",
                        self.module.inst_kind(v).opcode_name(),
                        v
                    );
                    Rewrite::Unsupported
                }
            }
        }
    }

    /// Unified entry for obtaining an operand at a requested representation.
    /// Reports the actually-delivered format back through `hint`.
    pub(crate) fn translate_or_match_operand(
        &mut self,
        v: ValueId,
        hint: &mut FixedPointType,
        ip: Option<InsertPoint>,
        policy: FoldPolicy,
    ) -> Option<ValueId> {
        if policy == FoldPolicy::ForceHint {
            let exact = hint.clone();
            let mut lenient = hint.clone();
            let res =
                self.translate_or_match_operand(v, &mut lenient, ip, FoldPolicy::RangeOverHintMaxFrac)?;
            if lenient == exact {
                return Some(res);
            }
            let ls = *lenient.as_scalar()?;
            let es = *exact.as_scalar()?;
            return self.fix_to_fix(res, &ls, &es, ip);
        }

        match self.operand_pool.get(v) {
            Some(Converted::Error) => return None,
            Some(Converted::Value(c)) => {
                let cfix = self.vinfo.fixp_type(c);
                if !cfix.is_invalid() {
                    *hint = cfix;
                    return Some(c);
                }
                // Self-converted pass-through value: report its integer
                // shape if it has one, keep the hint otherwise.
                let ty = self.module.ty_of(c);
                if let Some(bits) = ty.int_bits() {
                    let signed = hint.as_scalar().map(|s| s.signed).unwrap_or(true);
                    *hint = FixedPointType::new(signed, 0, bits);
                }
                return Some(c);
            }
            None => {}
        }

        if self.module.value(v).is_constant() {
            return self.fold_constant_value(v, hint, FoldPolicy::RangeOverHintMaxFrac);
        }

        // An integer-to-float cast carries its integer payload directly.
        if let Some(inst) = self.module.value(v).as_inst() {
            match inst.kind {
                InstKind::SIToFP(x) => {
                    if let Some(bits) = self.module.ty_of(x).int_bits() {
                        *hint = FixedPointType::new(true, 0, bits);
                        return Some(x);
                    }
                }
                InstKind::UIToFP(x) => {
                    if let Some(bits) = self.module.ty_of(x).int_bits() {
                        *hint = FixedPointType::new(false, 0, bits);
                        return Some(x);
                    }
                }
                _ => {}
            }
        }

        // Refine the hint from the analysis range before falling through.
        if let Some(range) = self.module.value(v).anno.as_ref().and_then(|a| a.range) {
            if let FixedPointType::Scalar(s) = hint {
                if !s.is_invalid() {
                    crate::fold::relax_scalar_for_range(s, range.abs_max());
                }
            }
        }

        self.float_to_fix(v, hint, ip)
    }

    // ----- opcode rules -----

    /// `sitofp`/`uitofp` whose result is annotated: the integer payload is
    /// already a fixed-point value at fraction zero.
    fn convert_int_to_float_cast(
        &mut self,
        v: ValueId,
        x: ValueId,
        signed: bool,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let Some(out) = fixpt.as_scalar().copied() else { return Rewrite::Unsupported };
        let Some(bits) = self.module.ty_of(x).int_bits() else { return Rewrite::Unsupported };
        let src = FixpScalar::new(signed, 0, bits);
        match self.fix_to_fix(x, &src, &out, Some(InsertPoint::After(v))) {
            Some(res) => Rewrite::Converted(res),
            None => Rewrite::Failed,
        }
    }

    /// Float-to-float width casts vanish into a re-scale.
    fn convert_float_cast(&mut self, v: ValueId, x: ValueId, fixpt: &mut FixedPointType) -> Rewrite {
        let Some(out) = fixpt.as_scalar().copied() else { return Rewrite::Unsupported };
        let mut src_hint = fixpt.clone();
        let Some(cx) = self.translate_or_match_operand(
            x,
            &mut src_hint,
            Some(InsertPoint::Before(v)),
            FoldPolicy::RangeOverHintMaxFrac,
        ) else {
            return Rewrite::Failed;
        };
        let Some(src) = src_hint.as_scalar().copied() else { return Rewrite::Failed };
        match self.fix_to_fix(cx, &src, &out, Some(InsertPoint::Before(v))) {
            Some(res) => Rewrite::Converted(res),
            None => Rewrite::Failed,
        }
    }

    /// Addition and subtraction need both operands at the output scale.
    fn convert_add_sub(
        &mut self,
        v: ValueId,
        a: ValueId,
        b: ValueId,
        is_sub: bool,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let Some(out) = fixpt.as_scalar().copied() else { return Rewrite::Unsupported };
        let ip = Some(InsertPoint::Before(v));
        let mut ha = fixpt.clone();
        let Some(ca) = self.translate_or_match_operand(a, &mut ha, ip, FoldPolicy::ForceHint)
        else {
            return Rewrite::Failed;
        };
        let mut hb = fixpt.clone();
        let Some(cb) = self.translate_or_match_operand(b, &mut hb, ip, FoldPolicy::ForceHint)
        else {
            return Rewrite::Failed;
        };
        let mut bld = Builder::after(self.module, v);
        let kind = if is_sub { InstKind::Sub(ca, cb) } else { InstKind::Add(ca, cb) };
        Rewrite::Converted(bld.emit_with_meta(kind, Ty::Int(out.total_bits), v))
    }

    /// Multiplication widens to the sum of the operand widths, multiplies,
    /// then re-scales into the output format.
    fn convert_mul(
        &mut self,
        v: ValueId,
        a: ValueId,
        b: ValueId,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let Some(out) = fixpt.as_scalar().copied() else { return Rewrite::Unsupported };
        let ip = Some(InsertPoint::Before(v));
        let mut ha = fixpt.clone();
        let Some(ca) =
            self.translate_or_match_operand(a, &mut ha, ip, FoldPolicy::RangeOverHintMaxFrac)
        else {
            return Rewrite::Failed;
        };
        let mut hb = fixpt.clone();
        let Some(cb) =
            self.translate_or_match_operand(b, &mut hb, ip, FoldPolicy::RangeOverHintMaxFrac)
        else {
            return Rewrite::Failed;
        };
        let (Some(sa), Some(sb)) = (ha.as_scalar().copied(), hb.as_scalar().copied()) else {
            return Rewrite::Failed;
        };

        let intermediate = FixpScalar::new(
            sa.signed || sb.signed,
            sa.frac_bits + sb.frac_bits,
            sa.total_bits + sb.total_bits,
        );
        let mut bld = Builder::after(self.module, v);
        let ea = bld.int_cast(ca, intermediate.total_bits, sa.signed, v);
        let eb = bld.int_cast(cb, intermediate.total_bits, sb.signed, v);
        let product =
            bld.emit_with_meta(InstKind::Mul(ea, eb), Ty::Int(intermediate.total_bits), v);
        match self.fix_to_fix(product, &intermediate, &out, None) {
            Some(res) => Rewrite::Converted(res),
            None => Rewrite::Failed,
        }
    }

    /// Division scales the numerator up by the output plus denominator
    /// fractional bits before the integer divide.
    fn convert_div(
        &mut self,
        v: ValueId,
        a: ValueId,
        b: ValueId,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let Some(out) = fixpt.as_scalar().copied() else { return Rewrite::Unsupported };
        let ip = Some(InsertPoint::Before(v));
        let mut ha = fixpt.clone();
        let Some(ca) =
            self.translate_or_match_operand(a, &mut ha, ip, FoldPolicy::RangeOverHintMaxFrac)
        else {
            return Rewrite::Failed;
        };
        let mut hb = fixpt.clone();
        let Some(cb) =
            self.translate_or_match_operand(b, &mut hb, ip, FoldPolicy::RangeOverHintMaxFrac)
        else {
            return Rewrite::Failed;
        };
        let (Some(sa), Some(sb)) = (ha.as_scalar().copied(), hb.as_scalar().copied()) else {
            return Rewrite::Failed;
        };

        let signed = sa.signed || sb.signed;
        let num_frac = out.frac_bits + sb.frac_bits;
        let widen = num_frac.saturating_sub(sa.frac_bits);
        let numerator_fmt = FixpScalar::new(signed, num_frac, sa.total_bits + widen);
        let Some(numerator) = self.fix_to_fix(ca, &sa, &numerator_fmt, ip) else {
            return Rewrite::Failed;
        };

        let mut bld = Builder::after(self.module, v);
        let denominator = bld.int_cast(cb, numerator_fmt.total_bits, sb.signed, v);
        let div_kind = if signed {
            InstKind::SDiv(numerator, denominator)
        } else {
            InstKind::UDiv(numerator, denominator)
        };
        let quotient =
            bld.emit_with_meta(div_kind, Ty::Int(numerator_fmt.total_bits), v);
        let quotient_fmt =
            FixpScalar::new(signed, num_frac - sb.frac_bits, numerator_fmt.total_bits);
        match self.fix_to_fix(quotient, &quotient_fmt, &out, None) {
            Some(res) => Rewrite::Converted(res),
            None => Rewrite::Failed,
        }
    }

    /// Comparisons bring both operands to a common format and compare as
    /// integers of matching signedness. Fixed-point values cannot be NaN,
    /// so the ordered/unordered distinction degenerates.
    fn convert_cmp(
        &mut self,
        v: ValueId,
        pred: FloatPred,
        a: ValueId,
        b: ValueId,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        match pred {
            FloatPred::Ord => {
                return Rewrite::Converted(self.module.const_int(Ty::Int(1), 1));
            }
            FloatPred::Uno => {
                return Rewrite::Converted(self.module.const_int(Ty::Int(1), 0));
            }
            _ => {}
        }

        let ip = Some(InsertPoint::Before(v));
        let mut ha = fixpt.clone();
        let Some(ca) =
            self.translate_or_match_operand(a, &mut ha, ip, FoldPolicy::RangeOverHintMaxFrac)
        else {
            return Rewrite::Failed;
        };
        let mut hb = fixpt.clone();
        let Some(cb) =
            self.translate_or_match_operand(b, &mut hb, ip, FoldPolicy::RangeOverHintMaxFrac)
        else {
            return Rewrite::Failed;
        };
        let (Some(sa), Some(sb)) = (ha.as_scalar().copied(), hb.as_scalar().copied()) else {
            return Rewrite::Failed;
        };

        let signed = sa.signed || sb.signed;
        let int_a = sa.int_bits() + u32::from(signed && !sa.signed);
        let int_b = sb.int_bits() + u32::from(signed && !sb.signed);
        let frac = sa.frac_bits.max(sb.frac_bits);
        let common = FixpScalar::new(signed, frac, int_a.max(int_b) + frac);

        let (Some(cca), Some(ccb)) =
            (self.fix_to_fix(ca, &sa, &common, ip), self.fix_to_fix(cb, &sb, &common, ip))
        else {
            return Rewrite::Failed;
        };

        let ipred = match pred {
            FloatPred::Oeq | FloatPred::Ueq => IntPred::Eq,
            FloatPred::One | FloatPred::Une => IntPred::Ne,
            FloatPred::Olt | FloatPred::Ult => {
                if signed { IntPred::Slt } else { IntPred::Ult }
            }
            FloatPred::Ole | FloatPred::Ule => {
                if signed { IntPred::Sle } else { IntPred::Ule }
            }
            FloatPred::Ogt | FloatPred::Ugt => {
                if signed { IntPred::Sgt } else { IntPred::Ugt }
            }
            FloatPred::Oge | FloatPred::Uge => {
                if signed { IntPred::Sge } else { IntPred::Uge }
            }
            FloatPred::Ord | FloatPred::Uno => unreachable!(),
        };
        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(InstKind::ICmp(ipred, cca, ccb), Ty::Int(1), v))
    }

    fn convert_load(&mut self, v: ValueId, ptr: ValueId, fixpt: &mut FixedPointType) -> Rewrite {
        let Some(newptr) = self.operand_pool.converted(ptr) else { return Rewrite::Failed };
        let Some(pointee) = self.module.ty_of(newptr).pointee().cloned() else {
            return Rewrite::Failed;
        };
        let mut bld = Builder::after(self.module, v);
        let newload = bld.emit_with_meta(InstKind::Load { ptr: newptr }, pointee, v);
        *fixpt = self.vinfo.fixp_type(newptr);
        Rewrite::Converted(newload)
    }

    fn convert_store(&mut self, v: ValueId, value: ValueId, ptr: ValueId) -> Rewrite {
        let Some(newptr) = self.operand_pool.converted(ptr) else {
            // Pointer kept its representation: only the data operand may
            // need patching back to float.
            return self.fallback(v);
        };
        if newptr == ptr {
            return self.fallback(v);
        }
        let Some(pointee) = self.module.ty_of(newptr).pointee().cloned() else {
            return Rewrite::Failed;
        };

        let value_ty = self.module.ty_of(value);
        let newval = if value_ty.is_float() && pointee.is_int() {
            let mut h = self.vinfo.fixp_type(newptr);
            match self.translate_or_match_operand(
                value,
                &mut h,
                Some(InsertPoint::Before(v)),
                FoldPolicy::ForceHint,
            ) {
                Some(nv) => nv,
                None => return Rewrite::Failed,
            }
        } else {
            match self.operand_pool.converted(value) {
                Some(cv) if self.module.ty_of(cv) == pointee => cv,
                _ if value_ty == pointee => value,
                _ => return Rewrite::Failed,
            }
        };

        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(
            InstKind::Store { value: newval, ptr: newptr },
            Ty::Void,
            v,
        ))
    }

    fn convert_alloca(&mut self, v: ValueId, allocated: &Ty, fixpt: &mut FixedPointType) -> Rewrite {
        let mut has_floats = false;
        let Some(mapped) = crate::type_mapper::map_fixed_type(allocated, fixpt, &mut has_floats)
        else {
            return Rewrite::Unsupported;
        };
        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(
            InstKind::Alloca { allocated: mapped.clone() },
            mapped.ptr_to(),
            v,
        ))
    }

    fn convert_gep(
        &mut self,
        v: ValueId,
        ptr: ValueId,
        indices: &[ValueId],
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let Some(newptr) = self.operand_pool.converted(ptr) else { return Rewrite::Failed };
        let base_ty = self.module.ty_of(newptr);
        let Some(res_ty) = self.module.gep_result_ty(&base_ty, indices) else {
            return Rewrite::Failed;
        };

        // Navigate the pointer's format down to the addressed element.
        let mut elem_fix = self.vinfo.fixp_type(newptr);
        let mut cur = base_ty.pointee().cloned().unwrap_or(Ty::Void);
        for idx in &indices[1..] {
            match cur {
                Ty::Array(elem, _) => cur = *elem,
                Ty::Struct(s) => {
                    let Some(field) =
                        self.module.value(*idx).as_constant().and_then(Constant::as_int)
                    else {
                        return Rewrite::Failed;
                    };
                    elem_fix = elem_fix.struct_item(field as usize);
                    cur = match s.fields.get(field as usize) {
                        Some(f) => f.clone(),
                        None => return Rewrite::Failed,
                    };
                }
                _ => return Rewrite::Failed,
            }
        }
        *fixpt = elem_fix;

        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(
            InstKind::Gep { ptr: newptr, indices: indices.to_vec() },
            res_ty,
            v,
        ))
    }

    /// Converted phis go through the placeholders opened before the sweep;
    /// incoming values are translated at the tail of their edge's block.
    fn convert_phi(
        &mut self,
        v: ValueId,
        incoming: &[PhiIncoming],
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let mut has_floats = false;
        let Some(mapped) =
            crate::type_mapper::map_fixed_type(&self.module.ty_of(v), fixpt, &mut has_floats)
        else {
            return Rewrite::Unsupported;
        };
        let mut new_incoming = Vec::with_capacity(incoming.len());
        for inc in incoming {
            let edge_ip = self
                .module
                .block(inc.block)
                .insts
                .last()
                .map(|&t| InsertPoint::Before(t));
            let mut h = fixpt.clone();
            let Some(cv) =
                self.translate_or_match_operand(inc.value, &mut h, edge_ip, FoldPolicy::ForceHint)
            else {
                return Rewrite::Failed;
            };
            new_incoming.push(PhiIncoming { value: cv, block: inc.block });
        }
        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(
            InstKind::Phi { incoming: new_incoming },
            mapped,
            v,
        ))
    }

    fn convert_select(
        &mut self,
        v: ValueId,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let mut has_floats = false;
        let Some(mapped) =
            crate::type_mapper::map_fixed_type(&self.module.ty_of(v), fixpt, &mut has_floats)
        else {
            return Rewrite::Unsupported;
        };
        let ip = Some(InsertPoint::Before(v));
        let newcond = self.operand_pool.converted(cond).unwrap_or(cond);
        let mut ht = fixpt.clone();
        let Some(ct) = self.translate_or_match_operand(if_true, &mut ht, ip, FoldPolicy::ForceHint)
        else {
            return Rewrite::Failed;
        };
        let mut hf = fixpt.clone();
        let Some(cf) = self.translate_or_match_operand(if_false, &mut hf, ip, FoldPolicy::ForceHint)
        else {
            return Rewrite::Failed;
        };
        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(
            InstKind::Select { cond: newcond, if_true: ct, if_false: cf },
            mapped,
            v,
        ))
    }

    /// Calls to cloned functions are re-pointed at the clone with arguments
    /// translated to the clone's parameter formats. Intrinsics follow a
    /// small preserve/erase table; calls without a clone keep the original
    /// callee and get their operands patched.
    fn convert_call(
        &mut self,
        v: ValueId,
        callee: FuncId,
        args: &[ValueId],
        _fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let (intrinsic, special) = {
            let f = self.module.func(callee);
            (f.intrinsic, f.special)
        };
        if let Some(kind) = intrinsic {
            return match kind {
                IntrinsicKind::LifetimeStart
                | IntrinsicKind::LifetimeEnd
                | IntrinsicKind::DebugDeclare
                | IntrinsicKind::DebugValue => Rewrite::Converted(v),
                IntrinsicKind::VarAnnotation => Rewrite::Converted(v),
            };
        }
        if special {
            return self.fallback(v);
        }
        let Some(clone) = self.function_pool.get(callee) else {
            return self.fallback(v);
        };

        let clone_params = self.module.func(clone).params.clone();
        let mut new_args = Vec::with_capacity(args.len());
        for (&arg, &param) in args.iter().zip(clone_params.iter()) {
            let param_ty = self.module.ty_of(param);
            if self.module.ty_of(arg) == param_ty {
                let same_ty_conv = self
                    .operand_pool
                    .converted(arg)
                    .filter(|&c| self.module.ty_of(c) == param_ty);
                new_args.push(same_ty_conv.unwrap_or(arg));
                continue;
            }
            let mut h = self.vinfo.fixp_type(param);
            let Some(ca) = self.translate_or_match_operand(
                arg,
                &mut h,
                Some(InsertPoint::Before(v)),
                FoldPolicy::ForceHint,
            ) else {
                return Rewrite::Failed;
            };
            if self.module.ty_of(ca) != param_ty {
                return Rewrite::Failed;
            }
            new_args.push(ca);
        }

        let ret_ty = self.module.func(clone).ret_ty.clone();
        let mut bld = Builder::after(self.module, v);
        Rewrite::Converted(bld.emit_with_meta(
            InstKind::Call { callee: clone, args: new_args },
            ret_ty,
            v,
        ))
    }

    /// Returns mutate in place: the operand is brought to the format the
    /// clone's signature was given, and the instruction converts to itself.
    fn convert_ret(
        &mut self,
        v: ValueId,
        op: Option<ValueId>,
        fixpt: &mut FixedPointType,
    ) -> Rewrite {
        let Some(x) = op else { return Rewrite::Converted(v) };
        if fixpt.as_scalar().is_none() {
            // No propagated return format: the function keeps its
            // signature, so only operand patching may be needed.
            return self.fallback(v);
        }
        let mut h = fixpt.clone();
        let Some(cx) = self.translate_or_match_operand(
            x,
            &mut h,
            Some(InsertPoint::Before(v)),
            FoldPolicy::ForceHint,
        ) else {
            return Rewrite::Failed;
        };
        if let Some(inst) = self.module.value_mut(v).as_inst_mut() {
            inst.kind = InstKind::Ret(Some(cx));
        }
        Rewrite::Converted(v)
    }

    fn convert_global(&mut self, v: ValueId, fixpt: &mut FixedPointType) -> Rewrite {
        let Some(content) = self.module.ty_of(v).pointee().cloned() else {
            return Rewrite::Unsupported;
        };
        let mut has_floats = false;
        let Some(mapped) = crate::type_mapper::map_fixed_type(&content, fixpt, &mut has_floats)
        else {
            return Rewrite::Unsupported;
        };
        let init = self.module.value(v).as_global().and_then(|g| g.init.clone());
        let new_init = match init {
            Some(c) => {
                let mut h = fixpt.clone();
                match crate::fold::fold_constant(&c, &mut h, FoldPolicy::ForceHint, None) {
                    Some(folded) => Some(folded),
                    None => return Rewrite::Failed,
                }
            }
            None => None,
        };
        let name = format!(
            "{}.fixp",
            self.module.name_of(v).unwrap_or("global")
        );
        let newg = self.module.add_global(name, mapped, new_init);
        self.module.copy_meta(newg, v);
        Rewrite::Converted(newg)
    }

    /// Self-mutation for values that keep their representation: operands
    /// with a representation-changing conversion are patched back through
    /// `fix_to_float`; same-type conversions substitute directly.
    pub(crate) fn fallback(&mut self, v: ValueId) -> Rewrite {
        let Some(inst) = self.module.value(v).as_inst() else { return Rewrite::Unsupported };
        let operands: Vec<ValueId> = inst.kind.operands().into_iter().unique().collect();

        let mut substitutions: Vec<(ValueId, ValueId)> = Vec::new();
        for o in operands {
            let Some(Converted::Value(c)) = self.operand_pool.get(o) else { continue };
            if c == o {
                continue;
            }
            let o_ty = self.module.ty_of(o);
            let c_ty = self.module.ty_of(c);
            if c_ty == o_ty {
                substitutions.push((o, c));
            } else if o_ty.is_float() && c_ty.is_int() {
                let cfix = self.vinfo.fixp_type(c);
                let Some(s) = cfix.as_scalar().copied() else { continue };
                match self.fix_to_float(c, &s, &o_ty) {
                    Some(f) => substitutions.push((o, f)),
                    None => return Rewrite::Failed,
                }
            }
            // Retyped pointers and other shape changes keep the original
            // operand; the original def is protected from cleanup by its
            // own pool state.
        }

        if let Some(inst) = self.module.value_mut(v).as_inst_mut() {
            inst.kind.for_each_operand_mut(|op| {
                if let Some((_, n)) = substitutions.iter().find(|(o, _)| o == op) {
                    *op = *n;
                }
            });
        }
        Rewrite::Converted(v)
    }
}
