//! Scalar codec: the IR sequences that move values between floating-point
//! and fixed-point representations, and between fixed-point formats.

use fixp_core::fixed_point::{FixedPointType, FixpScalar};
use fixp_core::ir::{Builder, InsertPoint, InstKind, Ty, ValueId, ValueKind};

use crate::fold::FoldPolicy;
use crate::pass::FloatToFixed;
use crate::stats::loop_weight;

impl FloatToFixed<'_> {
    /// Natural insertion point for IR converting `v`: right after a
    /// defining instruction, at the entry block for an argument, at the
    /// placeholder's block start for placeholders.
    pub(crate) fn insertion_point_for(&self, v: ValueId) -> Option<InsertPoint> {
        match &self.module.try_value(v)?.kind {
            ValueKind::Inst(_) => Some(InsertPoint::After(v)),
            ValueKind::Argument { func, .. } => {
                Some(InsertPoint::BlockStart(self.module.entry_block(*func)))
            }
            ValueKind::Placeholder { block } => Some(InsertPoint::BlockStart(*block)),
            _ => None,
        }
    }

    /// Emit the float-to-fixed conversion of `flt` under `fixpt`.
    ///
    /// Constants fold; a prior integer-to-float cast is unwrapped into an
    /// integer cast plus shift; everything else goes through scale-multiply
    /// and a float-to-int cast.
    pub(crate) fn float_to_fix(
        &mut self,
        flt: ValueId,
        fixpt: &FixedPointType,
        ip: Option<InsertPoint>,
    ) -> Option<ValueId> {
        if self.module.value(flt).is_constant() {
            let mut copy = fixpt.clone();
            let res = self.fold_constant_value(flt, &mut copy, FoldPolicy::ForceHint);
            debug_assert_eq!(&copy, fixpt, "constant folding changed a forced hint");
            return res;
        }

        let ip = self
            .insertion_point_for(flt)
            .or(ip)
            .expect("insertion point is mandatory for non-instruction values");

        if !self.module.ty_of(flt).is_float() {
            tracing::debug!("can't wrap-convert to fixp non float value {}", flt);
            return None;
        }
        let scalar = *fixpt.as_scalar()?;

        self.stats.float_to_fix_count += 1;
        let depth = self.loop_depth_of(flt);
        self.stats.float_to_fix_weight += loop_weight(depth);

        let dest_ty = scalar.to_ir_type();
        let src_kind = self.module.value(flt).as_inst().map(|i| i.kind.clone());

        // A previous integer-to-float cast means the integer payload is
        // already at hand: cast it to the destination width and shift the
        // point into place, skipping the float multiply entirely.
        match src_kind {
            Some(InstKind::SIToFP(intparam)) => {
                let mut b = Builder::at(self.module, ip);
                let cast = b.int_cast(intparam, scalar.total_bits, true, flt);
                return Some(shl_frac(&mut b, cast, scalar.frac_bits, flt));
            }
            Some(InstKind::UIToFP(intparam)) => {
                let mut b = Builder::at(self.module, ip);
                let cast = b.int_cast(intparam, scalar.total_bits, false, flt);
                return Some(shl_frac(&mut b, cast, scalar.frac_bits, flt));
            }
            _ => {}
        }

        let flt_ty = self.module.ty_of(flt);
        let twoebits = (2f64).powi(scalar.frac_bits as i32);
        let mut b = Builder::at(self.module, ip);
        let scale = b.module.const_float(flt_ty.clone(), twoebits);
        let interm = b.emit_with_meta(InstKind::FMul(scale, flt), flt_ty, flt);
        let cast = if scalar.signed {
            InstKind::FPToSI(interm)
        } else {
            InstKind::FPToUI(interm)
        };
        Some(b.emit_with_meta(cast, dest_ty, flt))
    }

    /// Re-scale `fix` from format `src` to format `dst`.
    ///
    /// The change decomposes into a size change and a point movement,
    /// ordered so that no bits are lost to a premature truncation: widen
    /// first when the destination is wider, shift first otherwise.
    pub(crate) fn fix_to_fix(
        &mut self,
        fix: ValueId,
        src: &FixpScalar,
        dst: &FixpScalar,
        ip: Option<InsertPoint>,
    ) -> Option<ValueId> {
        if src == dst {
            return Some(fix);
        }
        assert!(
            self.module.ty_of(fix).is_int(),
            "cannot change the fixed point format of a non-integer value"
        );
        let ip = self
            .insertion_point_for(fix)
            .or(ip)
            .expect("insertion point is mandatory for non-instruction values");

        let mut b = Builder::at(self.module, ip);
        let size_change = |b: &mut Builder<'_>, x: ValueId| -> ValueId {
            b.int_cast(x, dst.total_bits, src.signed, fix)
        };
        let point_movement = |b: &mut Builder<'_>, x: ValueId| -> ValueId {
            let delta = dst.frac_bits as i64 - src.frac_bits as i64;
            if delta > 0 {
                b.shl_const(x, delta as u32, fix)
            } else if delta < 0 {
                if src.signed {
                    b.ashr_const(x, (-delta) as u32, fix)
                } else {
                    b.lshr_const(x, (-delta) as u32, fix)
                }
            } else {
                x
            }
        };

        let res = if dst.total_bits > src.total_bits {
            let widened = size_change(&mut b, fix);
            point_movement(&mut b, widened)
        } else {
            let moved = point_movement(&mut b, fix);
            size_change(&mut b, moved)
        };
        Some(res)
    }

    /// Emit the fixed-to-float conversion of `fix` back to `dest_ty`;
    /// used where an unconverted consumer still needs the float form.
    pub(crate) fn fix_to_float(
        &mut self,
        fix: ValueId,
        src: &FixpScalar,
        dest_ty: &Ty,
    ) -> Option<ValueId> {
        tracing::debug!("fix_to_float {} -> {}", fix, dest_ty);

        if self.module.value(fix).is_constant() {
            let stored = self.module.value(fix).as_constant().and_then(|k| k.as_int())?;
            let value = stored as f64 / (2f64).powi(src.frac_bits as i32);
            return Some(self.module.const_float(dest_ty.clone(), value));
        }
        if !self.module.value(fix).is_inst() {
            return None;
        }
        if !self.module.ty_of(fix).is_int() {
            tracing::debug!("can't wrap-convert to flt non integer value {}", fix);
            return None;
        }

        self.stats.fix_to_float_count += 1;
        let depth = self.loop_depth_of(fix);
        self.stats.fix_to_float_weight += loop_weight(depth);

        let mut b = Builder::after(self.module, fix);
        let cast = if src.signed {
            InstKind::SIToFP(fix)
        } else {
            InstKind::UIToFP(fix)
        };
        let floattmp = b.emit_with_meta(cast, dest_ty.clone(), fix);
        let twoebits = (2f64).powi(src.frac_bits as i32);
        let scale = b.module.const_float(dest_ty.clone(), twoebits);
        Some(b.emit_with_meta(InstKind::FDiv(floattmp, scale), dest_ty.clone(), fix))
    }
}

fn shl_frac(b: &mut Builder<'_>, v: ValueId, frac_bits: u32, meta_src: ValueId) -> ValueId {
    if frac_bits == 0 {
        v
    } else {
        b.shl_const(v, frac_bits, meta_src)
    }
}

#[cfg(test)]
mod tests {
    use fixp_core::fixed_point::{FixedPointType, FixpScalar};
    use fixp_core::ir::{FloatKind, InstKind, Module, Ty};

    use crate::pass::FloatToFixed;

    fn scalar(signed: bool, frac: u32, total: u32) -> FixpScalar {
        FixpScalar::new(signed, frac, total)
    }

    /// Widening conversions extend before moving the point; narrowing ones
    /// move the point before truncating, so no bits are lost early.
    #[test]
    fn fix_to_fix_composition_order() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![Ty::Int(16)], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        m.push_inst(bb, InstKind::Ret(None), Ty::Void);
        let arg = m.func(f).params[0];

        let mut pass = FloatToFixed::new(&mut m);
        let widened = pass
            .fix_to_fix(arg, &scalar(true, 8, 16), &scalar(true, 16, 32), None)
            .unwrap();
        drop(pass);

        let ops: Vec<_> = m.block(bb).insts.iter().map(|&i| m.inst_kind(i).opcode_name()).collect();
        assert_eq!(&ops[..2], &["sext", "shl"], "widen first, then shift");
        assert_eq!(m.ty_of(widened), Ty::Int(32));

        let mut pass = FloatToFixed::new(&mut m);
        let narrowed = pass
            .fix_to_fix(widened, &scalar(true, 16, 32), &scalar(true, 8, 16), None)
            .unwrap();
        drop(pass);
        assert_eq!(m.ty_of(narrowed), Ty::Int(16));
        let (_, pos) = m.position_of(narrowed);
        let block = m.block(bb);
        assert_eq!(m.inst_kind(narrowed).opcode_name(), "trunc");
        assert_eq!(
            m.inst_kind(block.insts[pos - 1]).opcode_name(),
            "ashr",
            "shift first, then truncate"
        );
    }

    #[test]
    fn fix_to_fix_is_identity_on_equal_formats() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![Ty::Int(16)], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        m.push_inst(bb, InstKind::Ret(None), Ty::Void);
        let arg = m.func(f).params[0];
        let mut pass = FloatToFixed::new(&mut m);
        let s = scalar(false, 4, 16);
        assert_eq!(pass.fix_to_fix(arg, &s, &s, None), Some(arg));
    }

    /// A representable constant survives the float -> fix -> float round
    /// trip exactly.
    #[test]
    fn constant_round_trip() {
        let mut m = Module::new("t");
        let c = m.const_float(Ty::Float(FloatKind::F32), 3.25);
        let mut pass = FloatToFixed::new(&mut m);
        let s = scalar(true, 8, 16);
        let fixed = pass.float_to_fix(c, &FixedPointType::Scalar(s), None).unwrap();
        let back = pass
            .fix_to_float(fixed, &s, &Ty::Float(FloatKind::F32))
            .unwrap();
        drop(pass);

        assert_eq!(m.value(fixed).as_constant().and_then(|k| k.as_int()), Some(832));
        assert_eq!(m.value(back).as_constant().and_then(|k| k.as_float()), Some(3.25));
    }

    /// Unsigned narrowing uses logical shifts and zero extension.
    #[test]
    fn unsigned_formats_use_logical_shifts() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![Ty::Int(16)], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        m.push_inst(bb, InstKind::Ret(None), Ty::Void);
        let arg = m.func(f).params[0];
        let mut pass = FloatToFixed::new(&mut m);
        pass.fix_to_fix(arg, &scalar(false, 8, 16), &scalar(false, 4, 16), None).unwrap();
        drop(pass);
        let ops: Vec<_> = m.block(bb).insts.iter().map(|&i| m.inst_kind(i).opcode_name()).collect();
        assert!(ops.contains(&"lshr"));
        assert!(!ops.contains(&"ashr"));
    }
}
