//! End-to-end conversion scenarios: small annotated modules go through the
//! pass and the rewritten IR is checked structurally.

mod support;

use fixp_core::ir::{InstKind, IntPred, Module, Ty};
use fixp_conv::FloatToFixed;

use support::*;

/// `float r = 0.5f * x;` with everything at s16_8: the constant becomes
/// 128 in i16, the multiply widens to i32, and an arithmetic shift right
/// by 8 restores the output format.
#[test]
fn constant_multiply_by_variable() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![], Ty::Void);
    let bb = m.add_block(f, Some("entry"));
    let x = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let half = fconst(&mut m, 0.5);
    let xv = m.push_inst(bb, InstKind::Load { ptr: x }, f32t());
    let r = m.push_inst(bb, InstKind::FMul(half, xv), f32t());
    m.push_inst(bb, InstKind::Store { value: r, ptr: x }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    annotate(&mut m, x, fmt(true, 8, 16));
    annotate(&mut m, xv, fmt(true, 8, 16));
    annotate(&mut m, r, fmt(true, 8, 16));

    let outcome = FloatToFixed::new(&mut m).run();
    assert!(outcome.stats.conversion_count >= 4);

    assert!(module_has_int_const(&m, 128, &Ty::Int(16)), "0.5 should fold to 128 in i16");

    let muls = find_insts(&m, f, |k| matches!(k, InstKind::Mul(..)));
    assert_eq!(muls.len(), 1, "one signed integer multiply expected");
    assert_eq!(m.ty_of(muls[0]), Ty::Int(32), "multiply widens to the sum of widths");

    let shifts = find_insts(&m, f, |k| matches!(k, InstKind::AShr(..)));
    assert!(
        shifts.iter().any(|&s| is_shift_by(&m, s, 8)),
        "result is rescaled by an arithmetic shift right of 8"
    );

    // The converted store targets the retyped stack slot.
    let stores = find_insts(&m, f, |k| matches!(k, InstKind::Store { .. }));
    assert_eq!(stores.len(), 1, "original store is erased, converted one remains");
    let InstKind::Store { value, ptr } = m.inst_kind(stores[0]) else { unreachable!() };
    assert_eq!(m.ty_of(*value), Ty::Int(16));
    assert_eq!(m.ty_of(*ptr), Ty::Int(16).ptr_to());
}

/// `float y = (float)i;` at s(16,32): no `sitofp` on the stored path; the
/// integer feeds a shift left by 16 directly.
#[test]
fn signed_int_to_float_cast() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![Ty::Int(32)], Ty::Void);
    let i = m.func(f).params[0];
    let bb = m.add_block(f, Some("entry"));
    let a = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let y = m.push_inst(bb, InstKind::SIToFP(i), f32t());
    m.push_inst(bb, InstKind::Store { value: y, ptr: a }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    annotate(&mut m, a, fmt(true, 16, 32));
    annotate(&mut m, y, fmt(true, 16, 32));

    FloatToFixed::new(&mut m).run();

    let stores = find_insts(&m, f, |k| matches!(k, InstKind::Store { .. }));
    assert_eq!(stores.len(), 1);
    let InstKind::Store { value, .. } = m.inst_kind(stores[0]) else { unreachable!() };
    let stored = *value;
    assert!(is_shift_by(&m, stored, 16), "stored value is the integer shifted left by 16");
    let InstKind::Shl(base, _) = m.inst_kind(stored) else { panic!("expected shl") };
    assert_eq!(*base, i, "the shift consumes the integer argument directly");

    // The original cast is dead: nothing reachable consumes it.
    assert!(m.users(y).is_empty(), "sitofp no longer feeds anything");
}

/// A two-armed phi at s16_4 converts to one i16 phi with both incoming
/// edges converted and every placeholder removed.
#[test]
fn branching_phi() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![Ty::Int(1)], Ty::Void);
    let cond = m.func(f).params[0];
    let entry = m.add_block(f, Some("entry"));
    let bb1 = m.add_block(f, Some("then"));
    let bb2 = m.add_block(f, Some("else"));
    let join = m.add_block(f, Some("join"));

    let x = m.push_inst(entry, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    m.push_inst(entry, InstKind::CondBr { cond, if_true: bb1, if_false: bb2 }, Ty::Void);

    let c1 = fconst(&mut m, 1.0);
    let c2 = fconst(&mut m, 2.0);
    let a = m.push_inst(bb1, InstKind::FAdd(c1, c2), f32t());
    m.push_inst(bb1, InstKind::Br(join), Ty::Void);

    let c3 = fconst(&mut m, 3.0);
    let c4 = fconst(&mut m, 4.0);
    let b = m.push_inst(bb2, InstKind::FAdd(c3, c4), f32t());
    m.push_inst(bb2, InstKind::Br(join), Ty::Void);

    let p = m.push_inst(
        join,
        InstKind::Phi {
            incoming: vec![
                fixp_core::ir::PhiIncoming { value: a, block: bb1 },
                fixp_core::ir::PhiIncoming { value: b, block: bb2 },
            ],
        },
        f32t(),
    );
    m.push_inst(join, InstKind::Store { value: p, ptr: x }, Ty::Void);
    m.push_inst(join, InstKind::Ret(None), Ty::Void);

    annotate(&mut m, x, fmt(true, 4, 16));
    annotate(&mut m, a, fmt(true, 4, 16));
    annotate(&mut m, b, fmt(true, 4, 16));
    annotate(&mut m, p, fmt(true, 4, 16));

    FloatToFixed::new(&mut m).run();

    let phis = find_insts(&m, f, |k| matches!(k, InstKind::Phi { .. }));
    assert_eq!(phis.len(), 1, "one converted phi remains");
    assert_eq!(m.ty_of(phis[0]), Ty::Int(16));
    let InstKind::Phi { incoming } = m.inst_kind(phis[0]) else { unreachable!() };
    for inc in incoming {
        assert_eq!(m.ty_of(inc.value), Ty::Int(16), "incoming edges are converted");
    }
    assert_eq!(live_placeholder_operands(&m), 0, "placeholders are gone");
}

/// A call whose argument and return change representation redirects to a
/// retyped clone; the original callee disappears.
#[test]
fn cross_function_call() {
    let mut m = Module::new("t");

    let callee = m.add_function("half_scale", vec![f32t()], f32t());
    m.func_mut(callee).clone_source = true;
    let xp = m.func(callee).params[0];
    let cbb = m.add_block(callee, Some("entry"));
    m.push_inst(cbb, InstKind::Ret(Some(xp)), Ty::Void);
    annotate(&mut m, xp, fmt(true, 4, 16));

    let caller = m.add_function("caller", vec![], Ty::Void);
    let bb = m.add_block(caller, Some("entry"));
    let a = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let av = m.push_inst(bb, InstKind::Load { ptr: a }, f32t());
    let c = m.push_inst(bb, InstKind::Call { callee, args: vec![av] }, f32t());
    m.push_inst(bb, InstKind::Store { value: c, ptr: a }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    annotate(&mut m, a, fmt(true, 4, 16));
    annotate(&mut m, av, fmt(true, 4, 16));
    annotate(&mut m, c, fmt(true, 4, 16));

    let outcome = FloatToFixed::new(&mut m).run();
    assert_eq!(outcome.stats.functions_created, 1);

    assert!(m.find_function("half_scale").is_none(), "original function is erased");
    let clone = m
        .find_function("half_scale_s12_4fixp")
        .expect("clone suffixed with the return format exists");
    assert_eq!(m.func(clone).ret_ty, Ty::Int(16));
    assert_eq!(m.ty_of(m.func(clone).params[0]), Ty::Int(16));

    let calls = find_insts(&m, caller, |k| matches!(k, InstKind::Call { .. }));
    assert_eq!(calls.len(), 1, "original call is erased, converted one remains");
    let InstKind::Call { callee: target, args } = m.inst_kind(calls[0]) else { unreachable!() };
    assert_eq!(*target, clone, "caller references the clone");
    assert_eq!(m.ty_of(args[0]), Ty::Int(16));
}

/// `z = a / b` at u16_8: the numerator is scaled up by 8 fractional bits
/// and the divide is unsigned; no float operation feeds the stored result.
#[test]
fn unsigned_division() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![], Ty::Void);
    let bb = m.add_block(f, Some("entry"));
    let xa = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let ya = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let za = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let xv = m.push_inst(bb, InstKind::Load { ptr: xa }, f32t());
    let yv = m.push_inst(bb, InstKind::Load { ptr: ya }, f32t());
    let q = m.push_inst(bb, InstKind::FDiv(xv, yv), f32t());
    m.push_inst(bb, InstKind::Store { value: q, ptr: za }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    for v in [xa, ya, za, xv, yv, q] {
        annotate(&mut m, v, fmt(false, 8, 16));
    }

    FloatToFixed::new(&mut m).run();

    let udivs = find_insts(&m, f, |k| matches!(k, InstKind::UDiv(..)));
    assert_eq!(udivs.len(), 1, "unsigned integer divide expected");
    assert!(find_insts(&m, f, |k| matches!(k, InstKind::SDiv(..))).is_empty());

    let InstKind::UDiv(num, _) = m.inst_kind(udivs[0]) else { unreachable!() };
    assert!(is_shift_by(&m, *num, 8), "numerator is scaled up by 8 fractional bits");

    // The stored result is a pure-integer chain.
    let stores = find_insts(&m, f, |k| matches!(k, InstKind::Store { .. }));
    assert_eq!(stores.len(), 1);
    let InstKind::Store { value, .. } = m.inst_kind(stores[0]) else { unreachable!() };
    let mut frontier = vec![*value];
    while let Some(v) = frontier.pop() {
        let data = m.value(v);
        assert!(!data.ty.is_float(), "no float on the stored path");
        if let Some(inst) = data.as_inst() {
            assert!(
                !matches!(
                    inst.kind,
                    InstKind::FAdd(..)
                        | InstKind::FSub(..)
                        | InstKind::FMul(..)
                        | InstKind::FDiv(..)
                        | InstKind::SIToFP(..)
                        | InstKind::UIToFP(..)
                ),
                "no floating point operation on the stored path"
            );
            frontier.extend(inst.kind.operands());
        }
    }
}

/// An annotated value that dies in an unsupported opcode taints its root:
/// sibling stores under that root are preserved even though their own
/// conversion succeeded, and no assertion fires.
#[test]
fn failed_conversion_taints_root_and_preserves_stores() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![], Ty::Void);
    let bb = m.add_block(f, Some("entry"));
    let x = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let xv = m.push_inst(bb, InstKind::Load { ptr: x }, f32t());
    let bad = m.push_inst(bb, InstKind::FRem(xv, xv), f32t());
    let keep = m.push_inst(bb, InstKind::Store { value: xv, ptr: x }, Ty::Void);
    let sink = m.push_inst(bb, InstKind::Store { value: bad, ptr: x }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    annotate(&mut m, x, fmt(true, 8, 16));
    annotate(&mut m, xv, fmt(true, 8, 16));
    annotate(&mut m, bad, fmt(true, 8, 16));

    FloatToFixed::new(&mut m).run();

    assert!(!m.is_erased(keep), "store under a tainted root survives");
    assert!(!m.is_erased(sink), "the failed chain's store survives");
    assert!(!m.is_erased(bad), "the unsupported instruction is untouched");
    // Conversion of the healthy part of the chain still happened.
    assert!(
        !find_insts(&m, f, |k| matches!(k, InstKind::Store { .. }))
            .iter()
            .all(|&s| s == keep || s == sink),
        "a converted store was emitted alongside the preserved originals"
    );
}

/// Running the pass a second time over a fully converted module finds no
/// work at all.
#[test]
fn second_run_is_a_no_op() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![], Ty::Void);
    let bb = m.add_block(f, Some("entry"));
    let x = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let half = fconst(&mut m, 0.5);
    let xv = m.push_inst(bb, InstKind::Load { ptr: x }, f32t());
    let r = m.push_inst(bb, InstKind::FMul(half, xv), f32t());
    m.push_inst(bb, InstKind::Store { value: r, ptr: x }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    annotate(&mut m, x, fmt(true, 8, 16));
    annotate(&mut m, xv, fmt(true, 8, 16));
    annotate(&mut m, r, fmt(true, 8, 16));

    let first = FloatToFixed::new(&mut m).run();
    assert!(first.stats.conversion_count > 0);

    let snapshot = m.clone();
    let second = FloatToFixed::new(&mut m).run();
    assert_eq!(second.stats.metadata_count, 0, "no new work queue");
    assert_eq!(second.stats.conversion_count, 0);
    assert_eq!(second.stats.float_to_fix_count, 0);
    assert_eq!(m, snapshot, "module is untouched by the second run");
}

/// Comparisons of converted operands become integer comparisons of the
/// matching signedness.
#[test]
fn comparison_rescales_and_matches_signedness() {
    let mut m = Module::new("t");
    let f = m.add_function("f", vec![Ty::Int(1).ptr_to()], Ty::Void);
    let out = m.func(f).params[0];
    let bb = m.add_block(f, Some("entry"));
    let xa = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let ya = m.push_inst(bb, InstKind::Alloca { allocated: f32t() }, f32t().ptr_to());
    let xv = m.push_inst(bb, InstKind::Load { ptr: xa }, f32t());
    let yv = m.push_inst(bb, InstKind::Load { ptr: ya }, f32t());
    let cmp = m.push_inst(
        bb,
        InstKind::FCmp(fixp_core::ir::FloatPred::Olt, xv, yv),
        Ty::Int(1),
    );
    m.push_inst(bb, InstKind::Store { value: cmp, ptr: out }, Ty::Void);
    m.push_inst(bb, InstKind::Ret(None), Ty::Void);
    for v in [xa, ya, xv, yv] {
        annotate(&mut m, v, fmt(true, 8, 16));
    }
    annotate(&mut m, cmp, fmt(true, 8, 16));

    FloatToFixed::new(&mut m).run();

    let icmps = find_insts(&m, f, |k| matches!(k, InstKind::ICmp(..)));
    assert_eq!(icmps.len(), 1);
    let InstKind::ICmp(pred, a, b) = m.inst_kind(icmps[0]) else { unreachable!() };
    assert_eq!(*pred, IntPred::Slt, "signed operands compare signed");
    assert_eq!(m.ty_of(*a), m.ty_of(*b), "operands are brought to a common format");
}
