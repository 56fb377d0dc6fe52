//! Control group: structured control, branches, calls, returns.
//!
//! Structured control keeps an explicit frame stack in the VM state; there
//! is no recursive descent. Branch targets were resolved at decode time,
//! so a transfer only trims the frame and value stacks and names the block
//! to resume at. Calls push an explicit call frame and resume the caller
//! at the fall-through block recorded for the call site (calls are always
//! block-terminal after CFG refinement).

use tracing::warn;
use z3::ast::Ast;

use crate::error::EngineError;
use crate::exec::{ExecEnv, Flow, Next, Successor, trap};
use crate::host::{self, HostOutcome};
use crate::smt::SymValue;
use crate::smt::value::Cond;
use crate::state::{BlockFrame, CallFrame, Terminal, TrapReason, VmState};
use crate::wasm::instr::Control;

pub fn exec_control<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    c: &Control,
    ip: usize,
) -> Result<Flow<'ctx>, EngineError> {
    match c {
        Control::Nop => Ok(Flow::Continue),
        Control::Unreachable => Ok(trap(state, TrapReason::Unreachable)),

        Control::Block { arity, end } => {
            if let Some(flow) = check_block_depth(env, state) {
                return Ok(flow);
            }
            state.blocks.push(BlockFrame {
                arity: *arity,
                target_instr: end + 1,
                entry_depth: state.stack.len(),
                is_loop: false,
            });
            Ok(Flow::Continue)
        }
        Control::Loop { arity, .. } => {
            if let Some(flow) = check_block_depth(env, state) {
                return Ok(flow);
            }
            state.blocks.push(BlockFrame {
                arity: *arity,
                target_instr: ip,
                entry_depth: state.stack.len(),
                is_loop: true,
            });
            Ok(Flow::Continue)
        }

        Control::If {
            arity,
            else_at,
            end,
        } => {
            let cond = state.pop()?;
            if let Some(flow) = check_block_depth(env, state) {
                return Ok(flow);
            }
            let frame = BlockFrame {
                arity: *arity,
                target_instr: end + 1,
                entry_depth: state.stack.len(),
                is_loop: false,
            };
            let false_target = else_at.map(|e| e + 1).unwrap_or(end + 1);
            let false_keeps_frame = else_at.is_some();

            match cond.nonzero(env.smt)? {
                Cond::Concrete(true) => {
                    state.blocks.push(frame);
                    Ok(Flow::Continue)
                }
                Cond::Concrete(false) => {
                    if false_keeps_frame {
                        state.blocks.push(frame);
                    }
                    flow_to(env, state, false_target)
                }
                Cond::Sym(c) => {
                    let t_ok = env.smt.is_feasible(&state.constraints, Some(&c));
                    let f_ok = env.smt.is_feasible(&state.constraints, Some(&c.not()));
                    match (t_ok, f_ok) {
                        (true, true) => {
                            let mut then = state.fork();
                            then.constrain(c.clone());
                            then.blocks.push(frame.clone());

                            let mut other = state.fork();
                            other.constrain(c.not());
                            if false_keeps_frame {
                                other.blocks.push(frame);
                            }
                            let other_next = next_at(env, &mut other, false_target)?;

                            let mut succs = vec![Successor {
                                state: then,
                                next: Next::Step,
                            }];
                            succs.push(Successor {
                                state: other,
                                next: other_next.unwrap_or(Next::Step),
                            });
                            Ok(Flow::Fork(succs))
                        }
                        (true, false) => {
                            state.blocks.push(frame);
                            Ok(Flow::Continue)
                        }
                        (false, true) => {
                            if false_keeps_frame {
                                state.blocks.push(frame);
                            }
                            flow_to(env, state, false_target)
                        }
                        (false, false) => Ok(Flow::Fork(Vec::new())),
                    }
                }
            }
        }

        Control::Else { end } => {
            // Falling into `else` means the then-arm finished: close the
            // frame and continue past the matching end.
            let frame = state
                .blocks
                .pop()
                .ok_or_else(|| EngineError::Malformed("else outside of an if frame".into()))?;
            unwind_to(state, &frame, frame.arity)?;
            flow_to(env, state, end + 1)
        }

        Control::End => match state.blocks.pop() {
            Some(frame) => {
                unwind_to(state, &frame, frame.arity)?;
                Ok(Flow::Continue)
            }
            None => match function_return(env, state)? {
                Some(next) => Ok(Flow::Goto(next)),
                None => Ok(Flow::Terminal),
            },
        },

        Control::Br { depth } => match do_branch(env, state, *depth)? {
            Some(next) => Ok(Flow::Goto(next)),
            None => Ok(Flow::Terminal),
        },

        Control::BrIf { depth } => {
            let cond = state.pop()?;
            match cond.nonzero(env.smt)? {
                Cond::Concrete(true) => match do_branch(env, state, *depth)? {
                    Some(next) => Ok(Flow::Goto(next)),
                    None => Ok(Flow::Terminal),
                },
                Cond::Concrete(false) => Ok(Flow::Continue),
                Cond::Sym(c) => {
                    let t_ok = env.smt.is_feasible(&state.constraints, Some(&c));
                    let f_ok = env.smt.is_feasible(&state.constraints, Some(&c.not()));
                    match (t_ok, f_ok) {
                        (true, true) => {
                            let mut taken = state.fork();
                            taken.constrain(c.clone());
                            let taken_next = do_branch(env, &mut taken, *depth)?;

                            let mut fallthrough = state.fork();
                            fallthrough.constrain(c.not());

                            Ok(Flow::Fork(vec![
                                Successor {
                                    state: taken,
                                    next: taken_next.unwrap_or(Next::Step),
                                },
                                Successor {
                                    state: fallthrough,
                                    next: Next::Step,
                                },
                            ]))
                        }
                        (true, false) => match do_branch(env, state, *depth)? {
                            Some(next) => Ok(Flow::Goto(next)),
                            None => Ok(Flow::Terminal),
                        },
                        (false, true) => Ok(Flow::Continue),
                        (false, false) => Ok(Flow::Fork(Vec::new())),
                    }
                }
            }
        }

        Control::BrTable { targets, default } => {
            let index = state.pop()?;
            let depth_of = |v: u64| -> u32 {
                targets
                    .get(v as usize)
                    .copied()
                    .unwrap_or(*default)
            };

            if let Some(v) = index.as_const_bits() {
                return match do_branch(env, state, depth_of(v))? {
                    Some(next) => Ok(Flow::Goto(next)),
                    None => Ok(Flow::Terminal),
                };
            }

            let bv = index.to_bv(env.smt)?;
            let e = env.smt.enumerate(&bv, &state.constraints, env.fanout());
            if !e.exhausted {
                warn!(
                    candidates = e.values.len(),
                    "br_table index exceeded the enumeration bound; \
                     remaining targets are not explored"
                );
            }
            let mut succs = Vec::new();
            for v in e.values {
                let mut s = state.fork();
                s.constrain(bv._eq(&env.smt.bv_const(v, bv.get_size())));
                let next = do_branch(env, &mut s, depth_of(v))?;
                succs.push(Successor {
                    state: s,
                    next: next.unwrap_or(Next::Step),
                });
            }
            Ok(Flow::Fork(succs))
        }

        Control::Return => match function_return(env, state)? {
            Some(next) => Ok(Flow::Goto(next)),
            None => Ok(Flow::Terminal),
        },

        Control::Call { func } => match perform_call(env, state, *func, ip)? {
            Some(next) => Ok(Flow::Goto(next)),
            None => Ok(Flow::Terminal),
        },

        Control::CallIndirect { type_index, .. } => {
            exec_call_indirect(env, state, *type_index, ip)
        }
    }
}

fn check_block_depth<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
) -> Option<Flow<'ctx>> {
    if state.blocks.len() >= env.config.budgets.max_block_depth {
        state.terminal = Some(Terminal::Budget("block-depth"));
        Some(Flow::Terminal)
    } else {
        None
    }
}

/// Drop everything the frame owned, keeping `arity` results on top.
fn unwind_to<'ctx>(
    state: &mut VmState<'ctx>,
    frame: &BlockFrame,
    arity: usize,
) -> Result<(), EngineError> {
    let results = state.popn(arity)?;
    state.stack.truncate(frame.entry_depth);
    state.stack.extend(results);
    Ok(())
}

/// Transfer to `target_instr`, or return out of the function when the
/// target lies past its end.
fn next_at<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    target_instr: usize,
) -> Result<Option<Next>, EngineError> {
    let body = env
        .analyzer
        .body(state.func)
        .ok_or_else(|| EngineError::Malformed("transfer within an imported function".into()))?;
    if target_instr >= body.insts.len() {
        return function_return(env, state);
    }
    let fc = env.cfg.func(state.func)?;
    let block = fc.block_starting_at(target_instr).ok_or_else(|| {
        EngineError::Malformed(format!(
            "branch target {target_instr} does not start a block in {}",
            fc.name
        ))
    })?;
    Ok(Some(Next::Jump {
        func: state.func,
        block,
    }))
}

fn flow_to<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    target_instr: usize,
) -> Result<Flow<'ctx>, EngineError> {
    match next_at(env, state, target_instr)? {
        Some(next) => Ok(Flow::Goto(next)),
        None => Ok(Flow::Terminal),
    }
}

/// Branch to the label `depth` frames up. Returns the continuation, or
/// `None` when the state became terminal (branching out of the function).
fn do_branch<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    depth: u32,
) -> Result<Option<Next>, EngineError> {
    if depth as usize >= state.blocks.len() {
        return function_return(env, state);
    }
    let idx = state.blocks.len() - 1 - depth as usize;
    let frame = state.blocks[idx].clone();
    unwind_to(state, &frame, frame.branch_arity())?;
    state.blocks.truncate(idx);
    next_at(env, state, frame.target_instr)
}

/// Unwind to the caller, pushing the callee's results. `None` means the
/// entry function returned and the state is terminal.
fn function_return<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
) -> Result<Option<Next>, EngineError> {
    let result_count = env.analyzer.proto(state.func)?.results.len();
    let results = state.popn(result_count)?;

    match state.frames.pop() {
        None => {
            state.terminal = Some(Terminal::Returned(results));
            Ok(None)
        }
        Some(frame) => {
            state.func = frame.caller_func;
            state.locals = frame.saved_locals;
            state.blocks = frame.saved_blocks;
            state.stack.truncate(frame.entry_depth);
            state.stack.extend(results);
            Ok(Some(Next::Jump {
                func: state.func,
                block: frame.resume_block,
            }))
        }
    }
}

/// Call `callee`. Imports and recognized C-library routines are modeled;
/// everything else pushes a call frame and descends.
fn perform_call<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    callee: u32,
    ip: usize,
) -> Result<Option<Next>, EngineError> {
    let proto = env.analyzer.proto(callee)?;

    if proto.import.is_some() {
        return match host::call_import(env, state, callee)? {
            HostOutcome::Done => next_at(env, state, ip + 1),
            HostOutcome::Terminal => Ok(None),
        };
    }

    let name = env.analyzer.func_name(callee).to_string();
    if host::models_internal(env, &name) {
        return match host::call_internal_model(env, state, callee, &name)? {
            HostOutcome::Done => next_at(env, state, ip + 1),
            HostOutcome::Terminal => Ok(None),
        };
    }

    if state.frames.len() >= env.config.budgets.max_call_depth {
        state.terminal = Some(Terminal::Budget("call-depth"));
        return Ok(None);
    }

    let body = env
        .analyzer
        .body(callee)
        .ok_or_else(|| EngineError::Malformed(format!("function {name} has no body")))?;
    let args = state.popn(proto.params.len())?;
    let entry_depth = state.stack.len();

    let fc = env.cfg.func(state.func)?;
    let resume_block = fc.block_starting_at(ip + 1).ok_or_else(|| {
        EngineError::Malformed(format!(
            "call at {ip} in {} is not block-terminal; was the CFG refined?",
            fc.name
        ))
    })?;

    state.frames.push(CallFrame {
        caller_func: state.func,
        saved_locals: std::mem::take(&mut state.locals),
        saved_blocks: std::mem::take(&mut state.blocks),
        resume_block,
        entry_depth,
    });

    let mut locals = args;
    locals.extend(body.locals.iter().map(|ty| SymValue::zero(*ty)));
    state.locals = locals;
    state.func = callee;

    Ok(Some(Next::Jump {
        func: callee,
        block: 0,
    }))
}

fn exec_call_indirect<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    type_index: u32,
    ip: usize,
) -> Result<Flow<'ctx>, EngineError> {
    let expected = env
        .analyzer
        .types
        .get(type_index as usize)
        .cloned()
        .ok_or_else(|| EngineError::Malformed(format!("type index {type_index} out of range")))?;

    let resolve = |v: u64| -> Result<u32, TrapReason> {
        let slot = env
            .analyzer
            .elements
            .get(v as usize)
            .copied()
            .flatten()
            .ok_or_else(|| TrapReason::IndirectCall(format!("table slot {v} is not callable")))?;
        let sig = env
            .analyzer
            .protos
            .get(slot as usize)
            .and_then(|p| env.analyzer.types.get(p.type_index as usize));
        if sig == Some(&expected) {
            Ok(slot)
        } else {
            Err(TrapReason::IndirectCall(format!(
                "table slot {v} has a mismatched signature"
            )))
        }
    };

    let index = state.pop()?;
    if let Some(v) = index.as_const_bits() {
        return match resolve(v) {
            Err(reason) => Ok(trap(state, reason)),
            Ok(callee) => match perform_call(env, state, callee, ip)? {
                Some(next) => Ok(Flow::Goto(next)),
                None => Ok(Flow::Terminal),
            },
        };
    }

    let bv = index.to_bv(env.smt)?;
    let e = env.smt.enumerate(&bv, &state.constraints, env.fanout());
    if !e.exhausted {
        warn!(
            candidates = e.values.len(),
            "indirect call index exceeded the enumeration bound"
        );
    }
    let mut succs = Vec::new();
    for v in e.values {
        let mut s = state.fork();
        s.constrain(bv._eq(&env.smt.bv_const(v, bv.get_size())));
        match resolve(v) {
            Err(reason) => {
                s.terminal = Some(Terminal::Trap(reason));
                succs.push(Successor {
                    state: s,
                    next: Next::Step,
                });
            }
            Ok(callee) => {
                let next = perform_call(env, &mut s, callee, ip)?;
                succs.push(Successor {
                    state: s,
                    next: next.unwrap_or(Next::Step),
                });
            }
        }
    }
    Ok(Flow::Fork(succs))
}
