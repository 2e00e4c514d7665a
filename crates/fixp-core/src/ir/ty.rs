use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    pub fn bits(&self) -> u32 {
        match self {
            FloatKind::F32 => 32,
            FloatKind::F64 => 64,
        }
    }
}

/// IR value types. Integer widths are arbitrary so that widened
/// intermediates (e.g. the product of two fixed-point operands) can be
/// expressed directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Void,
    Int(u32),
    Float(FloatKind),
    Ptr(Box<Ty>),
    Array(Box<Ty>, u64),
    Struct(StructTy),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructTy {
    pub name: Option<String>,
    pub fields: Vec<Ty>,
    pub packed: bool,
}

impl Ty {
    pub fn ptr_to(self) -> Ty {
        Ty::Ptr(Box::new(self))
    }

    pub fn array_of(self, len: u64) -> Ty {
        Ty::Array(Box::new(self), len)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Ty::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::Float(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Ty::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Ty::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether a floating-point scalar occurs anywhere in this type,
    /// looking through pointers and aggregates.
    pub fn contains_float(&self) -> bool {
        match self {
            Ty::Void | Ty::Int(_) => false,
            Ty::Float(_) => true,
            Ty::Ptr(inner) => inner.contains_float(),
            Ty::Array(elem, _) => elem.contains_float(),
            Ty::Struct(s) => s.fields.iter().any(Ty::contains_float),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::Int(bits) => write!(f, "i{}", bits),
            Ty::Float(FloatKind::F32) => write!(f, "f32"),
            Ty::Float(FloatKind::F64) => write!(f, "f64"),
            Ty::Ptr(inner) => write!(f, "{}*", inner),
            Ty::Array(elem, len) => write!(f, "[{} x {}]", len, elem),
            Ty::Struct(s) => {
                if let Some(name) = &s.name {
                    write!(f, "%{}", name)
                } else {
                    write!(f, "{{")?;
                    for (i, field) in s.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", field)?;
                    }
                    write!(f, "}}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_containment() {
        assert!(Ty::Float(FloatKind::F32).contains_float());
        assert!(Ty::Float(FloatKind::F64).ptr_to().contains_float());
        assert!(Ty::Float(FloatKind::F32).array_of(4).contains_float());
        assert!(!Ty::Int(16).contains_float());
        assert!(!Ty::Int(32).ptr_to().contains_float());
    }

    #[test]
    fn display() {
        assert_eq!(Ty::Int(16).to_string(), "i16");
        assert_eq!(Ty::Float(FloatKind::F32).ptr_to().to_string(), "f32*");
        assert_eq!(Ty::Int(8).array_of(3).to_string(), "[3 x i8]");
    }
}
