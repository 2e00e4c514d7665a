//! Fixed-point format descriptors.
//!
//! The range analysis annotates IR values with these formats; the conversion
//! pass consumes them. A stored integer `n` at `frac_bits` denotes the
//! rational `n / 2^frac_bits`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ir::{FloatKind, Ty};

/// Scalar fixed-point format: a two's-complement integer of `total_bits`
/// width with `frac_bits` fractional bits.
///
/// The invalid format is `(unsigned, 0, 0)`; it carries no representation
/// and forbids conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixpScalar {
    pub signed: bool,
    pub frac_bits: u32,
    pub total_bits: u32,
}

impl FixpScalar {
    pub fn new(signed: bool, frac_bits: u32, total_bits: u32) -> Self {
        debug_assert!(frac_bits <= total_bits, "frac_bits must not exceed total_bits");
        Self { signed, frac_bits, total_bits }
    }

    pub fn invalid() -> Self {
        Self { signed: false, frac_bits: 0, total_bits: 0 }
    }

    pub fn is_invalid(&self) -> bool {
        self.total_bits == 0
    }

    /// Bits to the left of the binary point, sign bit included.
    pub fn int_bits(&self) -> u32 {
        self.total_bits - self.frac_bits
    }

    /// The integer IR type a value of this format is stored in.
    pub fn to_ir_type(&self) -> Ty {
        debug_assert!(!self.is_invalid(), "invalid format has no representation");
        Ty::Int(self.total_bits)
    }
}

impl fmt::Display for FixpScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = if self.signed { 's' } else { 'u' };
        write!(f, "{}{}_{}fixp", s, self.total_bits - self.frac_bits, self.frac_bits)
    }
}

/// Fixed-point format of a value: a scalar, or one format per struct element.
///
/// Invalid struct elements mean "leave this element unchanged".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedPointType {
    Scalar(FixpScalar),
    Struct(Vec<FixedPointType>),
}

impl FixedPointType {
    pub fn new(signed: bool, frac_bits: u32, total_bits: u32) -> Self {
        FixedPointType::Scalar(FixpScalar::new(signed, frac_bits, total_bits))
    }

    pub fn invalid() -> Self {
        FixedPointType::Scalar(FixpScalar::invalid())
    }

    /// Derive a degenerate format from an existing IR type: integers become
    /// `frac_bits == 0` formats of their own width, everything else is
    /// invalid.
    pub fn from_ir_type(ty: &Ty, signed: bool) -> Self {
        match ty {
            Ty::Int(bits) => FixedPointType::Scalar(FixpScalar::new(signed, 0, *bits)),
            Ty::Float(FloatKind::F32) | Ty::Float(FloatKind::F64) => FixedPointType::invalid(),
            _ => FixedPointType::invalid(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        match self {
            FixedPointType::Scalar(s) => s.is_invalid(),
            FixedPointType::Struct(_) => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&FixpScalar> {
        match self {
            FixedPointType::Scalar(s) if !s.is_invalid() => Some(s),
            _ => None,
        }
    }

    /// Element format for struct element `i`. Lenient: out-of-range indices
    /// and scalar formats yield the invalid format.
    pub fn struct_item(&self, i: usize) -> FixedPointType {
        match self {
            FixedPointType::Struct(items) => {
                items.get(i).cloned().unwrap_or_else(FixedPointType::invalid)
            }
            FixedPointType::Scalar(_) => FixedPointType::invalid(),
        }
    }
}

impl Default for FixedPointType {
    fn default() -> Self {
        FixedPointType::invalid()
    }
}

impl fmt::Display for FixedPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixedPointType::Scalar(s) => write!(f, "{}", s),
            FixedPointType::Struct(items) => {
                write!(f, "<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_display() {
        assert_eq!(FixedPointType::new(true, 8, 16).to_string(), "s8_8fixp");
        assert_eq!(FixedPointType::new(false, 4, 16).to_string(), "u12_4fixp");
        assert_eq!(FixedPointType::new(true, 0, 32).to_string(), "s32_0fixp");
    }

    #[test]
    fn struct_display() {
        let t = FixedPointType::Struct(vec![
            FixedPointType::new(true, 8, 16),
            FixedPointType::invalid(),
        ]);
        assert_eq!(t.to_string(), "<s8_8fixp,u0_0fixp>");
    }

    #[test]
    fn invalid_detection() {
        assert!(FixedPointType::invalid().is_invalid());
        assert!(!FixedPointType::new(false, 0, 8).is_invalid());
        assert!(!FixedPointType::Struct(vec![]).is_invalid());
    }

    #[test]
    fn struct_item_is_lenient() {
        let t = FixedPointType::Struct(vec![FixedPointType::new(true, 2, 8)]);
        assert_eq!(t.struct_item(0), FixedPointType::new(true, 2, 8));
        assert!(t.struct_item(5).is_invalid());
        assert!(FixedPointType::new(true, 2, 8).struct_item(0).is_invalid());
    }
}
