//! Memory group: loads, stores, `memory.size`, `memory.grow`.
//!
//! The effective address is the static offset immediate plus the
//! top-of-stack base; both the address and the stored data may be
//! symbolic, in which case the symbolic-memory policy (concretize, else
//! guard) applies.

use tracing::warn;
use z3::ast::Ast;

use crate::error::EngineError;
use crate::exec::{ExecEnv, Flow, trap};
use crate::smt::SymValue;
use crate::state::VmState;
use crate::state::memory::MemRead;
use crate::wasm::instr::{Memory, ValTy};

pub fn exec_memory<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    m: &Memory,
    ip: usize,
) -> Result<Flow<'ctx>, EngineError> {
    let smt = env.smt;
    match m {
        Memory::Load {
            ty,
            bytes,
            signed,
            offset,
        } => {
            let base = state.pop()?;
            let addr = effective_address(env, &base, *offset)?;
            let read = state.mem_load(smt, env.data, &addr, *bytes as u32, env.fanout())?;
            let value = match read {
                MemRead::Trap(reason) => return Ok(trap(state, reason)),
                MemRead::Value(v) => v,
            };

            if ty.is_float() {
                // Concrete bits become a float constant; symbolic bits stay
                // a bitvector and are re-lifted lazily by float handlers.
                match value.as_const_bits() {
                    Some(bits) => state.push(SymValue::Fp {
                        bits,
                        width: ty.width(),
                    }),
                    None => state.push(value),
                }
            } else {
                let have = (*bytes as u32) * 8;
                if have == ty.width() {
                    state.push(value);
                } else {
                    let bv = value.to_bv(smt)?;
                    let wide = if *signed {
                        bv.sign_ext(ty.width() - have)
                    } else {
                        bv.zero_ext(ty.width() - have)
                    };
                    state.push(SymValue::lower_bv(wide));
                }
            }
            Ok(Flow::Continue)
        }
        Memory::Store { ty, bytes, offset } => {
            let value = state.pop()?;
            let base = state.pop()?;
            let addr = effective_address(env, &base, *offset)?;

            let storable = match (&value, ty.is_float()) {
                (SymValue::Float(..), true) => {
                    warn!("symbolic float store modeled as fresh bytes");
                    let name = smt.unique_name(&format!("fp_store_{ip}"));
                    SymValue::Bv(smt.fresh_bv(&name, (*bytes as u32) * 8))
                }
                _ => value,
            };

            match state.mem_store(smt, &addr, &storable, *bytes as u32, env.fanout())? {
                Some(reason) => Ok(trap(state, reason)),
                None => Ok(Flow::Continue),
            }
        }
        Memory::Size => {
            state.push(SymValue::Int {
                bits: state.memory.pages,
                width: 32,
            });
            Ok(Flow::Continue)
        }
        Memory::Grow => {
            let delta = state.pop()?;
            let delta = match delta.as_const_bits() {
                Some(d) => Some(d),
                None => {
                    let bv = delta.to_bv(smt)?;
                    let e = smt.enumerate(&bv, &state.constraints, env.fanout());
                    match e.values.first() {
                        Some(d) => {
                            if !(e.exhausted && e.values.len() == 1) {
                                warn!(delta = *d, "symbolic grow delta concretized");
                                state.constrain(bv._eq(&smt.bv_const(*d, bv.get_size())));
                            }
                            Some(*d)
                        }
                        None => None,
                    }
                }
            };
            let result = match delta {
                Some(d) => state.memory.grow(d),
                None => {
                    warn!("memory.grow delta had no feasible value; reporting failure");
                    -1
                }
            };
            state.push(SymValue::Int {
                bits: result as u32 as u64,
                width: 32,
            });
            Ok(Flow::Continue)
        }
    }
}

/// Base + offset. Concrete addresses use full 64-bit arithmetic so the
/// bounds check sees overflows; symbolic addresses stay 32-bit.
fn effective_address<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    base: &SymValue<'ctx>,
    offset: u64,
) -> Result<SymValue<'ctx>, EngineError> {
    match base.as_const_bits() {
        Some(b) => Ok(SymValue::Int {
            bits: b + offset,
            width: 64,
        }),
        None => {
            let bv = base.to_bv(env.smt)?;
            let sum = bv.bvadd(&env.smt.bv_const(offset, bv.get_size()));
            Ok(SymValue::lower_bv(sum))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{Harness, state_for_tests};
    use crate::smt::SmtContext;
    use crate::state::{Terminal, TrapReason};

    fn with_env(f: impl for<'a, 'ctx> FnOnce(&'a ExecEnv<'a, 'ctx>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);
        f(&env);
    }

    #[test]
    fn store_then_load_with_offset_immediates() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(100)); // base
            state.push(SymValue::from_i32(0x6162)); // value
            exec_memory(
                env,
                &mut state,
                &Memory::Store {
                    ty: ValTy::I32,
                    bytes: 2,
                    offset: 4,
                },
                0,
            )
            .unwrap();

            state.push(SymValue::from_i32(104));
            exec_memory(
                env,
                &mut state,
                &Memory::Load {
                    ty: ValTy::I32,
                    bytes: 2,
                    signed: false,
                    offset: 0,
                },
                1,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0x6162));
        });
    }

    #[test]
    fn narrow_signed_load_sign_extends() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(0));
            state.push(SymValue::from_i32(0x80));
            exec_memory(
                env,
                &mut state,
                &Memory::Store {
                    ty: ValTy::I32,
                    bytes: 1,
                    offset: 0,
                },
                0,
            )
            .unwrap();

            state.push(SymValue::from_i32(0));
            exec_memory(
                env,
                &mut state,
                &Memory::Load {
                    ty: ValTy::I32,
                    bytes: 1,
                    signed: true,
                    offset: 0,
                },
                1,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0xffff_ff80));
        });
    }

    #[test]
    fn concrete_out_of_bounds_load_traps() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(-4)); // 0xffff_fffc, far past one page
            let flow = exec_memory(
                env,
                &mut state,
                &Memory::Load {
                    ty: ValTy::I32,
                    bytes: 4,
                    signed: false,
                    offset: 0,
                },
                0,
            )
            .unwrap();
            assert!(matches!(flow, Flow::Terminal));
            assert!(matches!(
                state.terminal,
                Some(Terminal::Trap(TrapReason::OutOfBoundsMemory { .. }))
            ));
        });
    }

    #[test]
    fn size_and_grow_track_pages() {
        with_env(|env| {
            let mut state = state_for_tests();
            exec_memory(env, &mut state, &Memory::Size, 0).unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(1));

            state.push(SymValue::from_i32(2));
            exec_memory(env, &mut state, &Memory::Grow, 1).unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(1)); // old size

            exec_memory(env, &mut state, &Memory::Size, 2).unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(3));
        });
    }

    #[test]
    fn grow_past_maximum_reports_failure() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.memory.max_pages = Some(1);
            state.push(SymValue::from_i32(1));
            exec_memory(env, &mut state, &Memory::Grow, 0).unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0xffff_ffff));
        });
    }

    #[test]
    fn float_load_of_concrete_bits_is_a_float() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.push(SymValue::from_i32(16));
            state.push(SymValue::Fp {
                bits: 2.5f32.to_bits() as u64,
                width: 32,
            });
            exec_memory(
                env,
                &mut state,
                &Memory::Store {
                    ty: ValTy::F32,
                    bytes: 4,
                    offset: 0,
                },
                0,
            )
            .unwrap();
            state.push(SymValue::from_i32(16));
            exec_memory(
                env,
                &mut state,
                &Memory::Load {
                    ty: ValTy::F32,
                    bytes: 4,
                    signed: false,
                    offset: 0,
                },
                1,
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_f32(), Some(2.5));
        });
    }
}
