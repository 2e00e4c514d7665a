use serde::{Deserialize, Serialize};

use super::ty::Ty;

/// Typed constants. Aggregate constants own their elements; none of the
/// variants reference other IR values, so constants need no placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int { value: i128, ty: Ty },
    Float { value: f64, ty: Ty },
    Array { elems: Vec<Constant>, ty: Ty },
    Struct { fields: Vec<Constant>, ty: Ty },
    Undef(Ty),
    Null(Ty),
}

impl Constant {
    pub fn ty(&self) -> &Ty {
        match self {
            Constant::Int { ty, .. }
            | Constant::Float { ty, .. }
            | Constant::Array { ty, .. }
            | Constant::Struct { ty, .. }
            | Constant::Undef(ty)
            | Constant::Null(ty) => ty,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Constant::Float { value, .. } => Some(*value),
            _ => None,
        }
    }
}
