//! Derives the retyped IR type for a source type under a fixed-point hint.

use fixp_core::fixed_point::FixedPointType;
use fixp_core::ir::{StructTy, Ty, ValueId};

use crate::pass::FloatToFixed;

/// Map `src` under `hint`, recursively: pointers and arrays map their
/// element, struct elements map under their sub-hint (invalid sub-hints
/// keep the original element), floating-point scalars become the hint's
/// integer type, and any other scalar passes through unchanged.
///
/// `has_floats` is set when a floating-point scalar was actually replaced.
pub fn map_fixed_type(src: &Ty, hint: &FixedPointType, has_floats: &mut bool) -> Option<Ty> {
    match src {
        Ty::Ptr(inner) => {
            let mapped = map_fixed_type(inner, hint, has_floats)?;
            Some(mapped.ptr_to())
        }
        Ty::Array(elem, len) => {
            let mapped = map_fixed_type(elem, hint, has_floats)?;
            Some(mapped.array_of(*len))
        }
        Ty::Struct(s) => {
            let mut any_mapped = false;
            let mut fields = Vec::with_capacity(s.fields.len());
            for (i, field) in s.fields.iter().enumerate() {
                let sub = hint.struct_item(i);
                if sub.is_invalid() {
                    fields.push(field.clone());
                } else {
                    fields.push(map_fixed_type(field, &sub, has_floats)?);
                    any_mapped = true;
                }
            }
            if !any_mapped {
                return Some(src.clone());
            }
            Some(Ty::Struct(StructTy { name: None, fields, packed: s.packed }))
        }
        Ty::Float(_) => {
            let scalar = hint.as_scalar()?;
            *has_floats = true;
            Some(scalar.to_ir_type())
        }
        other => Some(other.clone()),
    }
}

impl FloatToFixed<'_> {
    /// The mapped type for a value under its own recorded hint.
    pub(crate) fn mapped_type_for_value(&self, v: ValueId) -> Option<Ty> {
        let fixpt = self.vinfo.fixp_type(v);
        let mut has_floats = false;
        map_fixed_type(&self.module.ty_of(v), &fixpt, &mut has_floats)
    }

    /// Whether a value is scheduled for an actual representation change.
    pub(crate) fn is_float_to_convert(&self, v: ValueId) -> bool {
        match self.vinfo.get(v) {
            Some(info) => {
                !info.no_type_conversion
                    && !info.fixp_type.is_invalid()
                    && self.module.ty_of(v).contains_float()
            }
            None => false,
        }
    }
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
    fn float_scalar_maps_to_int() {
        let mut hf = false;
        let mapped = map_fixed_type(&Ty::Float(FloatKind::F32), &s16_8(), &mut hf);
        assert_eq!(mapped, Some(Ty::Int(16)));
        assert!(hf);
    }

    #[test]
    fn pointer_and_array_recurse() {
        let mut hf = false;
        let src = Ty::Float(FloatKind::F32).array_of(4).ptr_to();
        let mapped = map_fixed_type(&src, &s16_8(), &mut hf);
        assert_eq!(mapped, Some(Ty::Int(16).array_of(4).ptr_to()));
    }

    #[test]
    fn non_float_scalars_pass_through() {
        let mut hf = false;
        assert_eq!(map_fixed_type(&Ty::Int(32), &s16_8(), &mut hf), Some(Ty::Int(32)));
        assert!(!hf);
    }

    #[test]
    fn struct_with_all_invalid_hints_is_identity() {
        let src = Ty::Struct(StructTy {
            name: None,
            fields: vec![Ty::Float(FloatKind::F32), Ty::Int(8)],
            packed: false,
        });
        let hint = FixedPointType::Struct(vec![
            FixedPointType::invalid(),
            FixedPointType::invalid(),
        ]);
        let mut hf = false;
        assert_eq!(map_fixed_type(&src, &hint, &mut hf), Some(src.clone()));
        assert!(!hf);
    }

    #[test]
    fn struct_maps_elementwise() {
        let src = Ty::Struct(StructTy {
            name: None,
            fields: vec![Ty::Float(FloatKind::F32), Ty::Int(8)],
            packed: true,
        });
        let hint = FixedPointType::Struct(vec![s16_8(), FixedPointType::invalid()]);
        let mut hf = false;
        let mapped = map_fixed_type(&src, &hint, &mut hf).unwrap();
        match mapped {
            Ty::Struct(s) => {
                assert_eq!(s.fields, vec![Ty::Int(16), Ty::Int(8)]);
                assert!(s.packed);
            }
            other => panic!("expected struct, got {}", other),
        }
    }
}
