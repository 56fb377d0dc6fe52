//! Numeric groups: logical, arithmetic, and bitwise operations over
//! `{i32, i64, f32, f64}`.
//!
//! Integer semantics are two's-complement with wrap-around, per the Wasm
//! numeric spec. Every produced expression is simplified once and folded
//! back to a concrete value when it reduces to a numeral, so fully
//! concrete programs never accumulate symbolic terms.
//!
//! Division and remainder fork into a trap branch and a continuation
//! branch whenever the divisor (or the signed-overflow condition) is
//! symbolic and both outcomes are feasible.

use tracing::warn;
use z3::ast::{Ast, BV, Bool, Float};

use crate::error::EngineError;
use crate::exec::{ExecEnv, Flow, Next, Successor, trap};
use crate::smt::value::require_same_width;
use crate::smt::{SmtContext, SymValue};
use crate::state::{Terminal, TrapReason, VmState};
use crate::wasm::instr::{NumOp, Numeric, ValTy};

pub fn exec_numeric<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    n: &Numeric,
) -> Result<Flow<'ctx>, EngineError> {
    if n.ty.is_float() {
        float_op(env, state, n.ty, n.op)
    } else {
        int_op(env, state, n.ty, n.op)
    }
}

fn push_bool<'ctx>(state: &mut VmState<'ctx>, smt: &SmtContext<'ctx>, cond: Bool<'ctx>) {
    let one = smt.bv_const(1, 32);
    let zero = smt.bv_const(0, 32);
    state.push(SymValue::lower_bv(cond.ite(&one, &zero)));
}

fn int_op<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    ty: ValTy,
    op: NumOp,
) -> Result<Flow<'ctx>, EngineError> {
    let smt = env.smt;
    let width = ty.width();

    // Unary operations first.
    match op {
        NumOp::Eqz => {
            let a = state.pop()?;
            let bv = a.to_bv(smt)?;
            push_bool(state, smt, bv._eq(&smt.bv_const(0, width)));
            return Ok(Flow::Continue);
        }
        NumOp::Clz | NumOp::Ctz | NumOp::Popcnt => {
            let a = state.pop()?;
            if let Some(bits) = a.as_const_bits() {
                let value = match (op, ty) {
                    (NumOp::Clz, ValTy::I32) => (bits as u32).leading_zeros() as u64,
                    (NumOp::Clz, _) => bits.leading_zeros() as u64,
                    (NumOp::Ctz, ValTy::I32) => (bits as u32).trailing_zeros() as u64,
                    (NumOp::Ctz, _) => bits.trailing_zeros() as u64,
                    _ => bits.count_ones() as u64,
                };
                state.push(SymValue::Int { bits: value, width });
            } else {
                let bv = a.to_bv(smt)?;
                let expr = match op {
                    NumOp::Clz => clz_chain(smt, &bv, width),
                    NumOp::Ctz => ctz_chain(smt, &bv, width),
                    _ => popcnt_chain(smt, &bv, width),
                };
                state.push(SymValue::lower_bv(expr));
            }
            return Ok(Flow::Continue);
        }
        _ => {}
    }

    let rhs = state.pop()?;
    let lhs = state.pop()?;
    require_same_width(&lhs, &rhs)?;
    let l = lhs.to_bv(smt)?;
    let r = rhs.to_bv(smt)?;

    // Comparisons produce an i32 regardless of operand width.
    let comparison = match op {
        NumOp::Eq => Some(l._eq(&r)),
        NumOp::Ne => Some(l._eq(&r).not()),
        NumOp::LtS => Some(l.bvslt(&r)),
        NumOp::LtU => Some(l.bvult(&r)),
        NumOp::GtS => Some(l.bvsgt(&r)),
        NumOp::GtU => Some(l.bvugt(&r)),
        NumOp::LeS => Some(l.bvsle(&r)),
        NumOp::LeU => Some(l.bvule(&r)),
        NumOp::GeS => Some(l.bvsge(&r)),
        NumOp::GeU => Some(l.bvuge(&r)),
        _ => None,
    };
    if let Some(cond) = comparison {
        push_bool(state, smt, cond);
        return Ok(Flow::Continue);
    }

    if matches!(op, NumOp::DivS | NumOp::DivU | NumOp::RemS | NumOp::RemU) {
        return div_rem(env, state, op, width, l, r);
    }

    let mask = smt.bv_const((width - 1) as u64, width);
    let expr = match op {
        NumOp::Add => l.bvadd(&r),
        NumOp::Sub => l.bvsub(&r),
        NumOp::Mul => l.bvmul(&r),
        NumOp::And => l.bvand(&r),
        NumOp::Or => l.bvor(&r),
        NumOp::Xor => l.bvxor(&r),
        NumOp::Shl => l.bvshl(&r.bvand(&mask)),
        NumOp::ShrS => l.bvashr(&r.bvand(&mask)),
        NumOp::ShrU => l.bvlshr(&r.bvand(&mask)),
        NumOp::Rotl => l.bvrotl(&r.bvand(&mask)),
        NumOp::Rotr => l.bvrotr(&r.bvand(&mask)),
        other => {
            return Err(EngineError::TypeMismatch(format!(
                "float-only operation {other:?} on {}",
                ty.name()
            )));
        }
    };
    state.push(SymValue::lower_bv(expr));
    Ok(Flow::Continue)
}

/// Division and remainder: trap when the divisor can be zero (or, for
/// signed division, on `MIN / -1`), forking when both outcomes remain
/// feasible under the current constraints.
fn div_rem<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    op: NumOp,
    width: u32,
    l: BV<'ctx>,
    r: BV<'ctx>,
) -> Result<Flow<'ctx>, EngineError> {
    let smt = env.smt;
    let zero = smt.bv_const(0, width);
    let div_by_zero = r._eq(&zero);

    let trap_cond = if op == NumOp::DivS {
        let min = smt.bv_const(1u64 << (width - 1), width);
        let neg_one = smt.bv_const(if width == 32 { u32::MAX as u64 } else { u64::MAX }, width);
        let overflow = Bool::and(smt.z3(), &[&l._eq(&min), &r._eq(&neg_one)]);
        Bool::or(smt.z3(), &[&div_by_zero, &overflow])
    } else {
        div_by_zero.clone()
    };

    let result = match op {
        NumOp::DivS => l.bvsdiv(&r),
        NumOp::DivU => l.bvudiv(&r),
        NumOp::RemS => l.bvsrem(&r),
        _ => l.bvurem(&r),
    };

    let reason = |model_zero: bool| {
        if model_zero {
            TrapReason::DivideByZero
        } else {
            TrapReason::IntegerOverflow
        }
    };

    match trap_cond.simplify().as_bool() {
        Some(true) => {
            let zero_hit = div_by_zero.simplify().as_bool().unwrap_or(true);
            Ok(trap(state, reason(zero_hit)))
        }
        Some(false) => {
            state.push(SymValue::lower_bv(result));
            Ok(Flow::Continue)
        }
        None => {
            let can_trap = smt.is_feasible(&state.constraints, Some(&trap_cond));
            let can_continue =
                smt.is_feasible(&state.constraints, Some(&trap_cond.clone().not()));
            match (can_trap, can_continue) {
                (true, true) => {
                    let mut trapped = state.fork();
                    trapped.constrain(trap_cond.clone());
                    trapped.terminal = Some(Terminal::Trap(TrapReason::DivideByZero));

                    let mut cont = state.fork();
                    cont.constrain(trap_cond.not());
                    cont.push(SymValue::lower_bv(result));

                    Ok(Flow::Fork(vec![
                        Successor {
                            state: trapped,
                            next: Next::Step,
                        },
                        Successor {
                            state: cont,
                            next: Next::Step,
                        },
                    ]))
                }
                (true, false) => Ok(trap(state, TrapReason::DivideByZero)),
                (false, true) => {
                    state.push(SymValue::lower_bv(result));
                    Ok(Flow::Continue)
                }
                (false, false) => Ok(Flow::Fork(Vec::new())),
            }
        }
    }
}

/// Leading-zero count as an `ite` chain: scanning upward from the least
/// significant bit, the last match is the highest set bit.
fn clz_chain<'ctx>(smt: &SmtContext<'ctx>, bv: &BV<'ctx>, width: u32) -> BV<'ctx> {
    let one = smt.bv_const(1, 1);
    let mut acc = smt.bv_const(width as u64, width);
    for i in 0..width {
        let bit_set = bv.extract(i, i)._eq(&one);
        acc = bit_set.ite(&smt.bv_const((width - 1 - i) as u64, width), &acc);
    }
    acc
}

/// Trailing-zero count: scanning downward, the last match is the lowest
/// set bit.
fn ctz_chain<'ctx>(smt: &SmtContext<'ctx>, bv: &BV<'ctx>, width: u32) -> BV<'ctx> {
    let one = smt.bv_const(1, 1);
    let mut acc = smt.bv_const(width as u64, width);
    for i in (0..width).rev() {
        let bit_set = bv.extract(i, i)._eq(&one);
        acc = bit_set.ite(&smt.bv_const(i as u64, width), &acc);
    }
    acc
}

fn popcnt_chain<'ctx>(smt: &SmtContext<'ctx>, bv: &BV<'ctx>, width: u32) -> BV<'ctx> {
    let mut acc = smt.bv_const(0, width);
    for i in 0..width {
        acc = acc.bvadd(&bv.extract(i, i).zero_ext(width - 1));
    }
    acc
}

fn float_op<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    ty: ValTy,
    op: NumOp,
) -> Result<Flow<'ctx>, EngineError> {
    let unary = matches!(
        op,
        NumOp::Abs
            | NumOp::Neg
            | NumOp::Sqrt
            | NumOp::Ceil
            | NumOp::Floor
            | NumOp::Truncate
            | NumOp::Nearest
    );

    if unary {
        let a = state.pop()?;
        let value = float_unary_concrete(ty, op, &a)
            .unwrap_or_else(|| float_unary_symbolic(env, ty, op, &a));
        state.push(value);
        return Ok(Flow::Continue);
    }

    let b = state.pop()?;
    let a = state.pop()?;

    if let (Some(x), Some(y)) = (concrete_float(ty, &a), concrete_float(ty, &b)) {
        match op {
            NumOp::Eq => push_concrete_bool(state, x == y),
            NumOp::Ne => push_concrete_bool(state, x != y),
            NumOp::LtS => push_concrete_bool(state, x < y),
            NumOp::GtS => push_concrete_bool(state, x > y),
            NumOp::LeS => push_concrete_bool(state, x <= y),
            NumOp::GeS => push_concrete_bool(state, x >= y),
            _ => {
                let r = match op {
                    NumOp::Add => x + y,
                    NumOp::Sub => x - y,
                    NumOp::Mul => x * y,
                    NumOp::DivS => x / y,
                    NumOp::Min => wasm_min(x, y),
                    NumOp::Max => wasm_max(x, y),
                    NumOp::Copysign => x.copysign(y),
                    other => {
                        return Err(EngineError::TypeMismatch(format!(
                            "integer-only operation {other:?} on {}",
                            ty.name()
                        )));
                    }
                };
                state.push(float_value(ty, r));
            }
        }
        return Ok(Flow::Continue);
    }

    // At least one operand is symbolic.
    let smt = env.smt;
    let fa = lift_float(env, ty, &a);
    let fb = lift_float(env, ty, &b);
    match op {
        NumOp::Eq => push_bool(state, smt, fa._eq(&fb)),
        NumOp::Ne => push_bool(state, smt, fa._eq(&fb).not()),
        NumOp::LtS => push_bool(state, smt, fa.lt(&fb)),
        NumOp::GtS => push_bool(state, smt, fa.gt(&fb)),
        NumOp::LeS => push_bool(state, smt, fa.le(&fb)),
        NumOp::GeS => push_bool(state, smt, fa.ge(&fb)),
        NumOp::Add => state.push(SymValue::lower_float(fa.add_towards_zero(&fb), ty.width())),
        NumOp::Sub => state.push(SymValue::lower_float(fa.sub_towards_zero(&fb), ty.width())),
        NumOp::Mul => state.push(SymValue::lower_float(fa.mul_towards_zero(&fb), ty.width())),
        NumOp::DivS => state.push(SymValue::lower_float(fa.div_towards_zero(&fb), ty.width())),
        NumOp::Min => {
            let expr = fa.lt(&fb).ite(&fa, &fb);
            state.push(SymValue::lower_float(expr, ty.width()));
        }
        NumOp::Max => {
            let expr = fa.gt(&fb).ite(&fa, &fb);
            state.push(SymValue::lower_float(expr, ty.width()));
        }
        NumOp::Copysign => {
            warn!("symbolic copysign modeled as a fresh float");
            let name = smt.unique_name("fp_copysign");
            state.push(SymValue::Float(smt.fresh_fp(&name, ty.width()), ty.width()));
        }
        other => {
            return Err(EngineError::TypeMismatch(format!(
                "integer-only operation {other:?} on {}",
                ty.name()
            )));
        }
    }
    Ok(Flow::Continue)
}

fn push_concrete_bool(state: &mut VmState<'_>, b: bool) {
    state.push(SymValue::Int {
        bits: b as u64,
        width: 32,
    });
}

fn concrete_float(ty: ValTy, v: &SymValue<'_>) -> Option<f64> {
    match ty {
        ValTy::F32 => v.as_f32().map(|f| f as f64),
        _ => v.as_f64(),
    }
}

fn float_value<'ctx>(ty: ValTy, v: f64) -> SymValue<'ctx> {
    match ty {
        ValTy::F32 => SymValue::Fp {
            bits: (v as f32).to_bits() as u64,
            width: 32,
        },
        _ => SymValue::Fp {
            bits: v.to_bits(),
            width: 64,
        },
    }
}

fn float_unary_concrete<'ctx>(ty: ValTy, op: NumOp, v: &SymValue<'ctx>) -> Option<SymValue<'ctx>> {
    let x = concrete_float(ty, v)?;
    let r = match op {
        NumOp::Abs => x.abs(),
        NumOp::Neg => -x,
        NumOp::Sqrt => x.sqrt(),
        NumOp::Ceil => x.ceil(),
        NumOp::Floor => x.floor(),
        NumOp::Truncate => x.trunc(),
        NumOp::Nearest => x.round_ties_even(),
        _ => return None,
    };
    // Keep f32 precision by computing in f32 where it matters.
    if ty == ValTy::F32 {
        let x = v.as_f32()?;
        let r32 = match op {
            NumOp::Abs => x.abs(),
            NumOp::Neg => -x,
            NumOp::Sqrt => x.sqrt(),
            NumOp::Ceil => x.ceil(),
            NumOp::Floor => x.floor(),
            NumOp::Truncate => x.trunc(),
            NumOp::Nearest => x.round_ties_even(),
            _ => return None,
        };
        return Some(SymValue::Fp {
            bits: r32.to_bits() as u64,
            width: 32,
        });
    }
    Some(float_value(ty, r))
}

fn float_unary_symbolic<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    ty: ValTy,
    op: NumOp,
    v: &SymValue<'ctx>,
) -> SymValue<'ctx> {
    let smt = env.smt;
    let f = lift_float(env, ty, v);
    match op {
        NumOp::Abs => SymValue::lower_float(f.unary_abs(), ty.width()),
        NumOp::Neg => SymValue::lower_float(f.unary_neg(), ty.width()),
        _ => {
            warn!(op = ?op, "symbolic float rounding modeled as a fresh float");
            let name = smt.unique_name("fp_round");
            SymValue::Float(smt.fresh_fp(&name, ty.width()), ty.width())
        }
    }
}

/// Float view of an operand; a raw bitvector (e.g. a symbolic value loaded
/// from memory) has no reconstructible float structure and becomes a fresh
/// symbol.
fn lift_float<'ctx>(env: &ExecEnv<'_, 'ctx>, ty: ValTy, v: &SymValue<'ctx>) -> Float<'ctx> {
    match v.to_float(env.smt) {
        Ok((f, _)) => f,
        Err(_) => {
            warn!("bitvector used as a float operand; modeling as a fresh float");
            let name = env.smt.unique_name("fp_bits");
            env.smt.fresh_fp(&name, ty.width())
        }
    }
}

/// Wasm `min`: NaN propagates, and -0 beats +0.
fn wasm_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() || b.is_sign_negative() {
            -0.0
        } else {
            a
        }
    } else if a < b {
        a
    } else {
        b
    }
}

/// Wasm `max`: NaN propagates, and +0 beats -0.
fn wasm_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() || b.is_sign_positive() {
            0.0
        } else {
            a
        }
    } else if a > b {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{Harness, state_for_tests};

    fn with_env(f: impl for<'a, 'ctx> FnOnce(&'a ExecEnv<'a, 'ctx>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);
        f(&env);
    }

    fn run_i32(env: &ExecEnv<'_, '_>, op: NumOp, lhs: i32, rhs: i32) -> u64 {
        let mut state = state_for_tests();
        state.push(SymValue::from_i32(lhs));
        state.push(SymValue::from_i32(rhs));
        let flow = exec_numeric(
            env,
            &mut state,
            &Numeric {
                ty: ValTy::I32,
                op,
            },
        )
        .unwrap();
        assert!(matches!(flow, Flow::Continue));
        state.pop().unwrap().as_const_bits().expect("concrete result")
    }

    #[test]
    fn add_wraps_around() {
        with_env(|env| {
            assert_eq!(run_i32(env, NumOp::Add, i32::MAX, 1), 0x8000_0000);
            assert_eq!(run_i32(env, NumOp::Sub, 0, 1), 0xffff_ffff);
            assert_eq!(run_i32(env, NumOp::Mul, -1, -1), 1);
        });
    }

    #[test]
    fn signed_and_unsigned_comparisons_differ() {
        with_env(|env| {
            assert_eq!(run_i32(env, NumOp::LtS, -1, 0), 1);
            assert_eq!(run_i32(env, NumOp::LtU, -1, 0), 0);
            assert_eq!(run_i32(env, NumOp::GeU, -1, 0), 1);
        });
    }

    #[test]
    fn shifts_mask_their_amount() {
        with_env(|env| {
            assert_eq!(run_i32(env, NumOp::Shl, 1, 33), 2);
            assert_eq!(run_i32(env, NumOp::ShrU, -2, 1), 0x7fff_ffff);
            assert_eq!(run_i32(env, NumOp::ShrS, -2, 1), 0xffff_ffff);
        });
    }

    #[test]
    fn rotates_wrap_bits() {
        with_env(|env| {
            assert_eq!(run_i32(env, NumOp::Rotl, 0x8000_0001u32 as i32, 1), 3);
            assert_eq!(run_i32(env, NumOp::Rotr, 3, 1), 0x8000_0001);
        });
    }

    #[test]
    fn bit_counting_on_concrete_values() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(16));
            exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::Clz,
                },
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(27));

            state.push(SymValue::from_i32(16));
            exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::Ctz,
                },
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(4));

            state.push(SymValue::from_i32(0b1011));
            exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::Popcnt,
                },
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(3));
        });
    }

    #[test]
    fn bit_counting_chains_agree_with_hardware() {
        with_env(|env| {
            let smt = env.smt;
            for v in [0u64, 1, 16, 0x8000_0000, 0xffff_ffff] {
                let bv = smt.bv_const(v, 32);
                let clz = SymValue::lower_bv(clz_chain(smt, &bv, 32));
                assert_eq!(clz.as_const_bits(), Some((v as u32).leading_zeros() as u64));
                let ctz = SymValue::lower_bv(ctz_chain(smt, &bv, 32));
                assert_eq!(
                    ctz.as_const_bits(),
                    Some((v as u32).trailing_zeros().min(32) as u64)
                );
                let pop = SymValue::lower_bv(popcnt_chain(smt, &bv, 32));
                assert_eq!(pop.as_const_bits(), Some((v as u32).count_ones() as u64));
            }
        });
    }

    #[test]
    fn concrete_divide_by_zero_traps() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(10));
            state.push(SymValue::from_i32(0));
            let flow = exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::DivU,
                },
            )
            .unwrap();
            assert!(matches!(flow, Flow::Terminal));
            assert!(matches!(
                state.terminal,
                Some(Terminal::Trap(TrapReason::DivideByZero))
            ));
        });
    }

    #[test]
    fn signed_division_overflow_traps() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(i32::MIN));
            state.push(SymValue::from_i32(-1));
            let flow = exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::DivS,
                },
            )
            .unwrap();
            assert!(matches!(flow, Flow::Terminal));
            assert!(matches!(
                state.terminal,
                Some(Terminal::Trap(TrapReason::IntegerOverflow))
            ));
        });
    }

    #[test]
    fn symbolic_divisor_forks_trap_and_continuation() {
        with_env(|env| {
            let mut state = state_for_tests();
            let d = env.smt.fresh_bv("d", 32);
            state.push(SymValue::from_i32(10));
            state.push(SymValue::Bv(d.clone()));
            let flow = exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::DivU,
                },
            )
            .unwrap();
            let Flow::Fork(succs) = flow else {
                panic!("expected fork");
            };
            assert_eq!(succs.len(), 2);
            let trapped = succs
                .iter()
                .find(|s| s.state.terminal.is_some())
                .expect("trap branch");
            // The trap branch pins the divisor to zero.
            let nonzero = d._eq(&env.smt.bv_const(0, 32)).not();
            assert!(!env.smt.is_feasible(&trapped.state.constraints, Some(&nonzero)));
            let cont = succs
                .iter()
                .find(|s| s.state.terminal.is_none())
                .expect("continuation branch");
            assert_eq!(cont.state.stack.len(), 1);
        });
    }

    #[test]
    fn known_nonzero_divisor_does_not_fork() {
        with_env(|env| {
            let mut state = state_for_tests();
            let d = env.smt.fresh_bv("d", 32);
            state.constrain(d._eq(&env.smt.bv_const(2, 32)));
            state.push(SymValue::from_i32(10));
            state.push(SymValue::Bv(d));
            let flow = exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::DivU,
                },
            )
            .unwrap();
            assert!(matches!(flow, Flow::Continue));
        });
    }

    #[test]
    fn mixed_width_operands_are_rejected() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(1));
            state.push(SymValue::from_i64(1));
            let err = exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::I32,
                    op: NumOp::Add,
                },
            );
            assert!(matches!(err, Err(EngineError::WidthMismatch(32, 64))));
        });
    }

    #[test]
    fn concrete_float_arithmetic() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::Fp {
                bits: 2.5f64.to_bits(),
                width: 64,
            });
            state.push(SymValue::Fp {
                bits: 0.5f64.to_bits(),
                width: 64,
            });
            exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::F64,
                    op: NumOp::Add,
                },
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_f64(), Some(3.0));
        });
    }

    #[test]
    fn float_min_prefers_negative_zero() {
        assert!(wasm_min(0.0, -0.0).is_sign_negative());
        assert!(wasm_max(-0.0, 0.0).is_sign_positive());
        assert!(wasm_min(f64::NAN, 1.0).is_nan());
    }

    #[test]
    fn concrete_float_comparison_yields_i32() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::Fp {
                bits: 1.0f32.to_bits() as u64,
                width: 32,
            });
            state.push(SymValue::Fp {
                bits: 2.0f32.to_bits() as u64,
                width: 32,
            });
            exec_numeric(
                env,
                &mut state,
                &Numeric {
                    ty: ValTy::F32,
                    op: NumOp::LtS,
                },
            )
            .unwrap();
            let v = state.pop().unwrap();
            assert_eq!(v.width(), 32);
            assert_eq!(v.as_const_bits(), Some(1));
        });
    }
}
