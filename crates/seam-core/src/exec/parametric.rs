//! Parametric group: `drop` and `select`.
//!
//! A `select` with a symbolic condition forks: each successor keeps the
//! chosen value and the equality constraint that selects it.

use tracing::debug;

use crate::error::EngineError;
use crate::exec::{ExecEnv, Flow, Next, Successor};
use crate::smt::value::{Cond, require_same_width};
use crate::state::VmState;
use crate::wasm::instr::Parametric;

pub fn exec_parametric<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    p: &Parametric,
) -> Result<Flow<'ctx>, EngineError> {
    match p {
        Parametric::Drop => {
            state.pop()?;
            Ok(Flow::Continue)
        }
        Parametric::Select => {
            let cond = state.pop()?;
            let val2 = state.pop()?;
            let val1 = state.pop()?;
            require_same_width(&val1, &val2)?;

            match cond.nonzero(env.smt)? {
                Cond::Concrete(true) => {
                    state.push(val1);
                    Ok(Flow::Continue)
                }
                Cond::Concrete(false) => {
                    state.push(val2);
                    Ok(Flow::Continue)
                }
                Cond::Sym(c) => {
                    let take1 = env.smt.is_feasible(&state.constraints, Some(&c));
                    let take2 = env.smt.is_feasible(&state.constraints, Some(&c.clone().not()));
                    match (take1, take2) {
                        (true, true) => {
                            let mut s1 = state.fork();
                            s1.constrain(c.clone());
                            s1.push(val1);
                            let mut s2 = state.fork();
                            s2.constrain(c.not());
                            s2.push(val2);
                            Ok(Flow::Fork(vec![
                                Successor {
                                    state: s1,
                                    next: Next::Step,
                                },
                                Successor {
                                    state: s2,
                                    next: Next::Step,
                                },
                            ]))
                        }
                        (true, false) => {
                            state.push(val1);
                            Ok(Flow::Continue)
                        }
                        (false, true) => {
                            state.push(val2);
                            Ok(Flow::Continue)
                        }
                        (false, false) => {
                            debug!("select condition infeasible both ways; dropping state");
                            Ok(Flow::Fork(Vec::new()))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{Harness, state_for_tests};
    use crate::smt::{SmtContext, SymValue};
    use z3::ast::Ast;

    #[test]
    fn drop_removes_the_top_value() {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);

        let mut state = state_for_tests();
        state.push(SymValue::from_i32(1));
        exec_parametric(&env, &mut state, &Parametric::Drop).unwrap();
        assert!(state.stack.is_empty());
    }

    #[test]
    fn concrete_condition_selects_without_forking() {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);

        let mut state = state_for_tests();
        state.push(SymValue::from_i32(11));
        state.push(SymValue::from_i32(22));
        state.push(SymValue::from_i32(1));
        let flow = exec_parametric(&env, &mut state, &Parametric::Select).unwrap();
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(state.pop().unwrap().as_const_bits(), Some(11));
    }

    #[test]
    fn symbolic_condition_forks_with_matching_constraints() {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);

        let mut state = state_for_tests();
        let c = smt.fresh_bv("c", 32);
        state.push(SymValue::from_i32(11));
        state.push(SymValue::from_i32(22));
        state.push(SymValue::Bv(c.clone()));
        let flow = exec_parametric(&env, &mut state, &Parametric::Select).unwrap();
        let Flow::Fork(succs) = flow else {
            panic!("expected a fork");
        };
        assert_eq!(succs.len(), 2);
        for s in &succs {
            assert_eq!(s.state.constraints.len(), 1);
            assert_eq!(s.next, Next::Step);
        }
        // The c != 0 side holds val1.
        let taken = &succs[0].state;
        assert_eq!(taken.stack.last().unwrap().as_const_bits(), Some(11));
        // Its constraint must force c nonzero.
        let zero = c._eq(&smt.bv_const(0, 32));
        assert!(!smt.is_feasible(&taken.constraints, Some(&zero)));
    }

    #[test]
    fn pinned_condition_takes_the_only_feasible_side() {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);

        let mut state = state_for_tests();
        let c = smt.fresh_bv("c", 32);
        state.constrain(c._eq(&smt.bv_const(0, 32)));
        state.push(SymValue::from_i32(11));
        state.push(SymValue::from_i32(22));
        state.push(SymValue::Bv(c));
        let flow = exec_parametric(&env, &mut state, &Parametric::Select).unwrap();
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(state.pop().unwrap().as_const_bits(), Some(22));
    }
}
