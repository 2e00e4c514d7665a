//! Shared builders for conversion tests: small annotated modules shaped
//! like the IR the upstream analysis hands to the pass.

use fixp_core::fixed_point::FixedPointType;
use fixp_core::ir::{
    Constant, FixpAnnotation, FloatKind, FuncId, InstKind, Module, Ty, ValueId,
};

pub fn f32t() -> Ty {
    Ty::Float(FloatKind::F32)
}

pub fn fmt(signed: bool, frac: u32, total: u32) -> FixedPointType {
    FixedPointType::new(signed, frac, total)
}

pub fn annotate(m: &mut Module, v: ValueId, fixp: FixedPointType) {
    m.value_mut(v).anno = Some(FixpAnnotation::new(fixp));
}

pub fn fconst(m: &mut Module, value: f64) -> ValueId {
    m.const_float(f32t(), value)
}

/// All non-erased instructions of a function, in program order.
pub fn insts_of(m: &Module, f: FuncId) -> Vec<ValueId> {
    m.func(f)
        .blocks
        .iter()
        .flat_map(|&b| m.block(b).insts.clone())
        .filter(|&v| !m.is_erased(v))
        .collect()
}

pub fn find_insts(
    m: &Module,
    f: FuncId,
    pred: impl Fn(&InstKind) -> bool,
) -> Vec<ValueId> {
    insts_of(m, f).into_iter().filter(|&v| pred(m.inst_kind(v))).collect()
}

/// The integer value of a constant operand, when it is one.
pub fn const_int_of(m: &Module, v: ValueId) -> Option<i128> {
    m.try_value(v)?.as_constant()?.as_int()
}

/// Whether `v` is a shift by the literal amount `n`.
pub fn is_shift_by(m: &Module, v: ValueId, n: i128) -> bool {
    match m.inst_kind(v) {
        InstKind::Shl(_, amt) | InstKind::AShr(_, amt) | InstKind::LShr(_, amt) => {
            const_int_of(m, *amt) == Some(n)
        }
        _ => false,
    }
}

/// Scan the whole module for a live integer constant with this value/type.
pub fn module_has_int_const(m: &Module, value: i128, ty: &Ty) -> bool {
    m.function_ids().any(|f| {
        insts_of(m, f).iter().any(|&i| {
            m.inst_kind(i).operands().iter().any(|&op| {
                m.try_value(op)
                    .and_then(|d| d.as_constant())
                    .map(|c| c == &Constant::Int { value, ty: ty.clone() })
                    .unwrap_or(false)
            })
        })
    })
}

/// Count live placeholder values referenced anywhere in the module.
pub fn live_placeholder_operands(m: &Module) -> usize {
    m.function_ids()
        .flat_map(|f| insts_of(m, f))
        .flat_map(|i| m.inst_kind(i).operands())
        .filter(|&op| m.try_value(op).map(|d| d.is_placeholder()).unwrap_or(false))
        .count()
}
