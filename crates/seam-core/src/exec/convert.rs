//! Conversion group: truncation, extension, reinterpretation, and
//! integer/float conversions.
//!
//! Trapping truncation honors the Wasm conditions (NaN and out-of-range
//! inputs trap; the `_sat` variants saturate instead). Conversions whose
//! operand is a symbolic float have no faithful bitvector image in the
//! backend, so they produce a fresh symbol and a warning.

use tracing::warn;

use crate::error::EngineError;
use crate::exec::{ExecEnv, Flow, trap};
use crate::smt::SymValue;
use crate::state::{TrapReason, VmState};
use crate::wasm::instr::{Conversion, ValTy};

pub fn exec_conversion<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    c: &Conversion,
    ip: usize,
) -> Result<Flow<'ctx>, EngineError> {
    let smt = env.smt;
    match c {
        Conversion::I32WrapI64 => {
            let v = state.pop()?;
            let bv = v.to_bv(smt)?;
            state.push(SymValue::lower_bv(bv.extract(31, 0)));
        }
        Conversion::I64ExtendI32 { signed } => {
            let v = state.pop()?;
            let bv = v.to_bv(smt)?;
            let wide = if *signed {
                bv.sign_ext(32)
            } else {
                bv.zero_ext(32)
            };
            state.push(SymValue::lower_bv(wide));
        }
        Conversion::ExtendS { ty, from_bits } => {
            let v = state.pop()?;
            let bv = v.to_bv(smt)?;
            let narrow = bv.extract(from_bits - 1, 0);
            state.push(SymValue::lower_bv(narrow.sign_ext(ty.width() - from_bits)));
        }
        Conversion::TruncF {
            from,
            to,
            signed,
            sat,
        } => {
            let v = state.pop()?;
            let source = match from {
                ValTy::F32 => v.as_f32().map(|f| f as f64),
                _ => v.as_f64(),
            };
            match source {
                Some(f) => match trunc_float(f, *to, *signed, *sat) {
                    Some(bits) => state.push(SymValue::Int {
                        bits,
                        width: to.width(),
                    }),
                    None => {
                        return Ok(trap(
                            state,
                            TrapReason::InvalidConversion(format!(
                                "cannot truncate {f} to {}",
                                to.name()
                            )),
                        ));
                    }
                },
                None => {
                    warn!("symbolic float truncation modeled as a fresh integer");
                    let name = smt.unique_name(&format!("trunc_{}_{ip}", to.name()));
                    state.push(SymValue::Bv(smt.fresh_bv(&name, to.width())));
                }
            }
        }
        Conversion::ConvertI { from, to, signed } => {
            let v = state.pop()?;
            match v.as_const_bits() {
                Some(bits) => {
                    let f = if *signed {
                        match from {
                            ValTy::I32 => bits as u32 as i32 as f64,
                            _ => bits as i64 as f64,
                        }
                    } else {
                        bits as f64
                    };
                    state.push(float_of(*to, f));
                }
                None => {
                    warn!("symbolic integer-to-float conversion modeled as a fresh float");
                    let name = smt.unique_name(&format!("convert_{}_{ip}", to.name()));
                    state.push(SymValue::Float(
                        smt.fresh_fp(&name, to.width()),
                        to.width(),
                    ));
                }
            }
        }
        Conversion::F32DemoteF64 => {
            let v = state.pop()?;
            match v.as_f64() {
                Some(f) => state.push(SymValue::Fp {
                    bits: (f as f32).to_bits() as u64,
                    width: 32,
                }),
                None => {
                    warn!("symbolic float demotion modeled as a fresh float");
                    let name = smt.unique_name(&format!("demote_{ip}"));
                    state.push(SymValue::Float(smt.fresh_fp(&name, 32), 32));
                }
            }
        }
        Conversion::F64PromoteF32 => {
            let v = state.pop()?;
            match v.as_f32() {
                Some(f) => state.push(SymValue::Fp {
                    bits: (f as f64).to_bits(),
                    width: 64,
                }),
                None => {
                    warn!("symbolic float promotion modeled as a fresh float");
                    let name = smt.unique_name(&format!("promote_{ip}"));
                    state.push(SymValue::Float(smt.fresh_fp(&name, 64), 64));
                }
            }
        }
        Conversion::Reinterpret { from, to } => {
            let v = state.pop()?;
            match (v.as_const_bits(), to.is_float()) {
                (Some(bits), true) => state.push(SymValue::Fp {
                    bits,
                    width: to.width(),
                }),
                (Some(bits), false) => state.push(SymValue::Int {
                    bits,
                    width: to.width(),
                }),
                (None, _) => match &v {
                    // A symbolic bitvector already *is* the bit pattern.
                    SymValue::Bv(bv) => state.push(SymValue::Bv(bv.clone())),
                    _ => {
                        warn!(
                            from = from.name(),
                            to = to.name(),
                            "symbolic float reinterpretation modeled as a fresh symbol"
                        );
                        let name = smt.unique_name(&format!("reinterpret_{ip}"));
                        state.push(SymValue::Bv(smt.fresh_bv(&name, to.width())));
                    }
                },
            }
        }
    }
    Ok(Flow::Continue)
}

fn float_of<'ctx>(ty: ValTy, f: f64) -> SymValue<'ctx> {
    match ty {
        ValTy::F32 => SymValue::Fp {
            bits: (f as f32).to_bits() as u64,
            width: 32,
        },
        _ => SymValue::Fp {
            bits: f.to_bits(),
            width: 64,
        },
    }
}

/// Truncate toward zero, returning the integer bits, or `None` when the
/// non-saturating form must trap.
fn trunc_float(f: f64, to: ValTy, signed: bool, sat: bool) -> Option<u64> {
    if f.is_nan() {
        return if sat { Some(0) } else { None };
    }
    let t = f.trunc();
    match (to, signed) {
        (ValTy::I32, true) => {
            if t >= -(2f64.powi(31)) && t < 2f64.powi(31) {
                Some(t as i32 as u32 as u64)
            } else if sat {
                Some(if t < 0.0 { i32::MIN } else { i32::MAX } as u32 as u64)
            } else {
                None
            }
        }
        (ValTy::I32, false) => {
            if t >= 0.0 && t < 2f64.powi(32) {
                Some(t as u32 as u64)
            } else if sat {
                Some(if t < 0.0 { 0 } else { u32::MAX as u64 })
            } else {
                None
            }
        }
        (ValTy::I64, true) => {
            if t >= -(2f64.powi(63)) && t < 2f64.powi(63) {
                Some(t as i64 as u64)
            } else if sat {
                Some(if t < 0.0 { i64::MIN as u64 } else { i64::MAX as u64 })
            } else {
                None
            }
        }
        (ValTy::I64, false) => {
            if t >= 0.0 && t < 2f64.powi(64) {
                Some(t as u64)
            } else if sat {
                Some(if t < 0.0 { 0 } else { u64::MAX })
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{Harness, state_for_tests};
    use crate::smt::SmtContext;
    use crate::state::Terminal;

    fn with_env(f: impl for<'a, 'ctx> FnOnce(&'a ExecEnv<'a, 'ctx>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);
        f(&env);
    }

    #[test]
    fn wrap_truncates_to_low_bits() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i64(0x1_0000_0002));
            exec_conversion(env, &mut state, &Conversion::I32WrapI64, 0).unwrap();
            let v = state.pop().unwrap();
            assert_eq!(v.width(), 32);
            assert_eq!(v.as_const_bits(), Some(2));
        });
    }

    #[test]
    fn extend_respects_signedness() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(-1));
            exec_conversion(
                env,
                &mut state,
                &Conversion::I64ExtendI32 { signed: true },
                0,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(u64::MAX));

            state.push(SymValue::from_i32(-1));
            exec_conversion(
                env,
                &mut state,
                &Conversion::I64ExtendI32 { signed: false },
                0,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0xffff_ffff));
        });
    }

    #[test]
    fn extend8_s_sign_extends_the_low_byte() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(0x80));
            exec_conversion(
                env,
                &mut state,
                &Conversion::ExtendS {
                    ty: ValTy::I32,
                    from_bits: 8,
                },
                0,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0xffff_ff80));
        });
    }

    #[test]
    fn trunc_of_nan_traps_and_sat_saturates() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::Fp {
                bits: f32::NAN.to_bits() as u64,
                width: 32,
            });
            let flow = exec_conversion(
                env,
                &mut state,
                &Conversion::TruncF {
                    from: ValTy::F32,
                    to: ValTy::I32,
                    signed: true,
                    sat: false,
                },
                0,
            )
            .unwrap();
            assert!(matches!(flow, Flow::Terminal));
            assert!(matches!(state.terminal, Some(Terminal::Trap(_))));

            let mut state = state_for_tests();
            state.push(SymValue::Fp {
                bits: f32::NAN.to_bits() as u64,
                width: 32,
            });
            exec_conversion(
                env,
                &mut state,
                &Conversion::TruncF {
                    from: ValTy::F32,
                    to: ValTy::I32,
                    signed: true,
                    sat: true,
                },
                0,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0));
        });
    }

    #[test]
    fn trunc_saturates_at_range_limits() {
        assert_eq!(trunc_float(3.7, ValTy::I32, true, false), Some(3));
        assert_eq!(trunc_float(-3.7, ValTy::I32, true, false), Some(-3i32 as u32 as u64));
        assert_eq!(trunc_float(1e10, ValTy::I32, true, false), None);
        assert_eq!(
            trunc_float(1e10, ValTy::I32, true, true),
            Some(i32::MAX as u32 as u64)
        );
        assert_eq!(trunc_float(-1.0, ValTy::I32, false, true), Some(0));
        assert_eq!(trunc_float(-1.0, ValTy::I32, false, false), None);
    }

    #[test]
    fn convert_and_reinterpret_concrete_values() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(-2));
            exec_conversion(
                env,
                &mut state,
                &Conversion::ConvertI {
                    from: ValTy::I32,
                    to: ValTy::F64,
                    signed: true,
                },
                0,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_f64(), Some(-2.0));

            state.push(SymValue::Fp {
                bits: 1.0f32.to_bits() as u64,
                width: 32,
            });
            exec_conversion(
                env,
                &mut state,
                &Conversion::Reinterpret {
                    from: ValTy::F32,
                    to: ValTy::I32,
                },
                0,
            )
            .unwrap();
            assert_eq!(
                state.pop().unwrap().as_const_bits(),
                Some(1.0f32.to_bits() as u64)
            );
        });
    }
}
