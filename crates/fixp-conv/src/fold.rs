//! Fixed-point constants from floating-point constants.

use fixp_core::fixed_point::{FixedPointType, FixpScalar};
use fixp_core::ir::{Constant, StructTy, Ty, ValueId, ValueRange};

use crate::pass::FloatToFixed;

/// How strictly a constant must land on the requested format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldPolicy {
    /// Produce a constant of exactly the hint, wrapping on overflow.
    ForceHint,
    /// Relax the hint outward (more integer bits, fewer fractional bits)
    /// when the constant's range demands it; the actually-used format is
    /// reported back through the hint.
    RangeOverHintMaxFrac,
}

impl FloatToFixed<'_> {
    /// Fold a constant value under `hint`. The hint is updated in place to
    /// the format actually used.
    pub(crate) fn fold_constant_value(
        &mut self,
        c: ValueId,
        hint: &mut FixedPointType,
        policy: FoldPolicy,
    ) -> Option<ValueId> {
        let data = self.module.value(c);
        let konst = data.as_constant()?.clone();
        let range = data.anno.as_ref().and_then(|a| a.range);
        let folded = fold_constant(&konst, hint, policy, range)?;
        let new = self.module.constant(folded);
        self.module.copy_meta(new, c);
        Some(new)
    }
}

pub fn fold_constant(
    c: &Constant,
    hint: &mut FixedPointType,
    policy: FoldPolicy,
    range: Option<ValueRange>,
) -> Option<Constant> {
    match c {
        Constant::Float { value, .. } => {
            let scalar = match hint {
                FixedPointType::Scalar(s) if !s.is_invalid() => s,
                _ => return None,
            };
            if policy == FoldPolicy::RangeOverHintMaxFrac {
                let abs_max = range.map(|r| r.abs_max()).unwrap_or_else(|| value.abs());
                relax_scalar_for_range(scalar, abs_max);
            }
            Some(Constant::Int {
                value: quantize(*value, scalar),
                ty: scalar.to_ir_type(),
            })
        }
        Constant::Array { elems, .. } => {
            // Elements must share one format: relax once over the widest
            // element, then force every element onto the result.
            if policy == FoldPolicy::RangeOverHintMaxFrac {
                if let FixedPointType::Scalar(s) = hint {
                    let abs_max = range.map(|r| r.abs_max()).unwrap_or_else(|| float_abs_max(c));
                    relax_scalar_for_range(s, abs_max);
                }
            }
            let folded: Option<Vec<Constant>> = elems
                .iter()
                .map(|e| fold_constant(e, hint, FoldPolicy::ForceHint, None))
                .collect();
            let folded = folded?;
            let elem_ty = folded.first().map(|e| e.ty().clone())?;
            let len = folded.len() as u64;
            Some(Constant::Array { elems: folded, ty: elem_ty.array_of(len) })
        }
        Constant::Struct { fields, .. } => {
            let mut out = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                let mut sub = hint.struct_item(i);
                if sub.is_invalid() {
                    out.push(field.clone());
                } else {
                    out.push(fold_constant(field, &mut sub, policy, None)?);
                }
            }
            let ty = Ty::Struct(StructTy {
                name: None,
                fields: out.iter().map(|f| f.ty().clone()).collect(),
                packed: false,
            });
            Some(Constant::Struct { fields: out, ty })
        }
        Constant::Undef(ty) => {
            let mut has_floats = false;
            let mapped = crate::type_mapper::map_fixed_type(ty, hint, &mut has_floats)?;
            Some(Constant::Undef(mapped))
        }
        Constant::Null(ty) => {
            let mut has_floats = false;
            let mapped = crate::type_mapper::map_fixed_type(ty, hint, &mut has_floats)?;
            Some(Constant::Null(mapped))
        }
        Constant::Int { .. } => None,
    }
}

fn float_abs_max(c: &Constant) -> f64 {
    match c {
        Constant::Float { value, .. } => value.abs(),
        Constant::Array { elems, .. } => {
            elems.iter().map(float_abs_max).fold(0.0, f64::max)
        }
        Constant::Struct { fields, .. } => {
            fields.iter().map(float_abs_max).fold(0.0, f64::max)
        }
        _ => 0.0,
    }
}

fn int_bits_needed(abs_max: f64) -> u32 {
    if abs_max < 1.0 {
        0
    } else {
        abs_max.log2().floor() as u32 + 1
    }
}

/// Widen the integer part of `s` until `abs_max` fits, first by giving up
/// fractional bits, then by growing the total width.
pub(crate) fn relax_scalar_for_range(s: &mut FixpScalar, abs_max: f64) {
    let needed = int_bits_needed(abs_max);
    let sign = s.signed as u32;
    let capacity = s.total_bits.saturating_sub(s.frac_bits + sign);
    if needed <= capacity {
        return;
    }
    if needed + sign <= s.total_bits {
        s.frac_bits = s.total_bits - needed - sign;
    } else {
        s.total_bits = needed + sign;
        s.frac_bits = 0;
    }
}

/// Round-to-nearest quantization, wrapped into the format's width.
fn quantize(value: f64, s: &FixpScalar) -> i128 {
    let scaled = (value * (2f64).powi(s.frac_bits as i32)).round();
    let mut n = scaled as i128;
    if s.total_bits < 128 {
        let modulus = 1i128 << s.total_bits;
        n &= modulus - 1;
        if s.signed && (n & (1i128 << (s.total_bits - 1))) != 0 {
            n -= modulus;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixp_core::ir::FloatKind;
    use pretty_assertions::assert_eq;

    fn s16_8() -> FixedPointType {
        FixedPointType::new(true, 8, 16)
    }

    #[test]
    fn force_hint_quantizes_exactly() {
        let c = Constant::Float { value: 0.5, ty: Ty::Float(FloatKind::F32) };
        let mut hint = s16_8();
        let folded = fold_constant(&c, &mut hint, FoldPolicy::ForceHint, None).unwrap();
        assert_eq!(folded, Constant::Int { value: 128, ty: Ty::Int(16) });
        assert_eq!(hint, s16_8());
    }

    #[test]
    fn range_policy_relaxes_fraction_for_wide_values() {
        // 1000.0 needs 10 integer bits; s16_8 only offers 7, so fractional
        // bits are given up.
        let c = Constant::Float { value: 1000.0, ty: Ty::Float(FloatKind::F32) };
        let mut hint = s16_8();
        let folded =
            fold_constant(&c, &mut hint, FoldPolicy::RangeOverHintMaxFrac, None).unwrap();
        let scalar = hint.as_scalar().unwrap();
        assert_eq!(scalar.total_bits, 16);
        assert_eq!(scalar.frac_bits, 16 - 10 - 1);
        assert_eq!(
            folded,
            Constant::Int { value: 1000 << scalar.frac_bits, ty: Ty::Int(16) }
        );
    }

    #[test]
    fn range_policy_widens_when_fraction_is_not_enough() {
        let c = Constant::Float { value: 100000.0, ty: Ty::Float(FloatKind::F32) };
        let mut hint = s16_8();
        fold_constant(&c, &mut hint, FoldPolicy::RangeOverHintMaxFrac, None).unwrap();
        let scalar = hint.as_scalar().unwrap();
        assert_eq!(scalar.frac_bits, 0);
        assert!(scalar.total_bits >= 18);
    }

    #[test]
    fn negative_values_round_trip() {
        let c = Constant::Float { value: -1.25, ty: Ty::Float(FloatKind::F32) };
        let mut hint = s16_8();
        let folded = fold_constant(&c, &mut hint, FoldPolicy::ForceHint, None).unwrap();
        assert_eq!(folded.as_int(), Some(-320));
    }

    #[test]
    fn struct_folds_elementwise_and_keeps_invalid_elements() {
        let c = Constant::Struct {
            fields: vec![
                Constant::Float { value: 2.0, ty: Ty::Float(FloatKind::F32) },
                Constant::Int { value: 7, ty: Ty::Int(8) },
            ],
            ty: Ty::Struct(StructTy {
                name: None,
                fields: vec![Ty::Float(FloatKind::F32), Ty::Int(8)],
                packed: false,
            }),
        };
        let mut hint =
            FixedPointType::Struct(vec![s16_8(), FixedPointType::invalid()]);
        let folded = fold_constant(&c, &mut hint, FoldPolicy::ForceHint, None).unwrap();
        match folded {
            Constant::Struct { fields, .. } => {
                assert_eq!(fields[0].as_int(), Some(512));
                assert_eq!(fields[1].as_int(), Some(7));
            }
            other => panic!("expected struct constant, got {:?}", other),
        }
    }
}
