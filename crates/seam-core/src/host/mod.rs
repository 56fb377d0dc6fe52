//! Host function models.
//!
//! When a `call` targets an import, its module and field name select a
//! handler here. WASI imports get faithful-enough models against the VM
//! state; C library routines compiled *into* the binary are recognized by
//! name (for C-flavored modules) and modeled instead of descended into.
//! Unknown imports push a fresh symbol of the declared return type and log
//! a warning; execution continues.

pub mod clib;
pub mod wasi;

use tracing::warn;

use crate::config::SourceHint;
use crate::error::EngineError;
use crate::exec::ExecEnv;
use crate::smt::SymValue;
use crate::state::{Terminal, TrapReason, VmState};
use crate::state::memory::MemRead;
use crate::wasm::analyzer::FuncProto;
use crate::wasm::instr::ValTy;

/// How a host call left the state.
pub enum HostOutcome {
    /// Effect applied; the caller resumes after the call.
    Done,
    /// The state became terminal (`state.terminal` is set).
    Terminal,
}

/// Dispatch an imported function by module and field name.
pub fn call_import<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    func: u32,
) -> Result<HostOutcome, EngineError> {
    let proto = env.analyzer.proto(func)?.clone();
    let Some((module, field)) = proto.import.clone() else {
        return Err(EngineError::Malformed(format!(
            "function index {func} dispatched as an import but is defined"
        )));
    };

    if module.starts_with("wasi") {
        if let Some(outcome) = wasi::try_call(env, state, &proto, &field)? {
            return Ok(outcome);
        }
    } else if clib::is_modeled(&field) {
        let args = state.popn(proto.params.len())?;
        return clib::call_named(env, state, &proto, &field, args);
    }

    unknown_import(env, state, &proto, &module, &field)
}

/// Whether calls to the named internal function are modeled rather than
/// descended into.
pub fn models_internal(env: &ExecEnv<'_, '_>, name: &str) -> bool {
    matches!(env.config.source, SourceHint::C) && clib::is_modeled(name)
}

/// Model a call to an internal C library routine. The modeled function and
/// its callees count as covered, since the model subsumes them.
pub fn call_internal_model<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    func: u32,
    name: &str,
) -> Result<HostOutcome, EngineError> {
    let proto = env.analyzer.proto(func)?.clone();
    let args = state.popn(proto.params.len())?;
    for f in env.callgraph.closure(func) {
        env.coverage.borrow_mut().mark_function(f);
    }
    clib::call_named(env, state, &proto, name, args)
}

fn unknown_import<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    proto: &FuncProto,
    module: &str,
    field: &str,
) -> Result<HostOutcome, EngineError> {
    warn!(
        import = format!("{module}.{field}"),
        "unknown import; pushing a fresh symbol of the declared return type"
    );
    state.popn(proto.params.len())?;
    if let Some(ret) = proto.results.first() {
        let name = env
            .smt
            .unique_name(&format!("{field}_ret_{}", ret.name()));
        let value = match ret {
            ValTy::F32 | ValTy::F64 => {
                SymValue::Float(env.smt.fresh_fp(&name, ret.width()), ret.width())
            }
            _ => SymValue::Bv(env.smt.fresh_bv(&name, ret.width())),
        };
        state.push(value);
    }
    Ok(HostOutcome::Done)
}

// Shared memory-access helpers for host models. A trap inside a model
// terminalizes the state like any other trap.

pub(crate) fn store_or_trap<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    addr: u64,
    value: SymValue<'ctx>,
    nbytes: u32,
) -> Result<bool, EngineError> {
    let addr = SymValue::Int {
        bits: addr,
        width: 64,
    };
    match state.mem_store(env.smt, &addr, &value, nbytes, env.fanout())? {
        Some(reason) => {
            state.terminal = Some(Terminal::Trap(reason));
            Ok(false)
        }
        None => Ok(true),
    }
}

pub(crate) fn load_or_trap<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    addr: u64,
    nbytes: u32,
) -> Result<Option<SymValue<'ctx>>, EngineError> {
    let addr = SymValue::Int {
        bits: addr,
        width: 64,
    };
    match state.mem_load(env.smt, env.data, &addr, nbytes, env.fanout())? {
        MemRead::Value(v) => Ok(Some(v)),
        MemRead::Trap(reason) => {
            state.terminal = Some(Terminal::Trap(reason));
            Ok(None)
        }
    }
}

/// Concretize a host-call scalar (an address, fd, or count). Ambiguous
/// values pin the first model and record the choice as a constraint.
pub(crate) fn concretize<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    value: &SymValue<'ctx>,
    what: &str,
) -> Result<Option<u64>, EngineError> {
    if let Some(v) = value.as_const_bits() {
        return Ok(Some(v));
    }
    let bv = value.to_bv(env.smt)?;
    let e = env.smt.enumerate(&bv, &state.constraints, env.fanout());
    match e.values.first() {
        Some(v) => {
            if !(e.exhausted && e.values.len() == 1) {
                warn!(what, value = *v, "ambiguous host-call scalar concretized");
                use z3::ast::Ast;
                state.constrain(bv._eq(&env.smt.bv_const(*v, bv.get_size())));
            }
            Ok(Some(*v))
        }
        None => {
            warn!(what, "host-call scalar has no feasible value");
            Ok(None)
        }
    }
}

/// Terminalize with a trap from inside a host model.
pub(crate) fn host_trap<'ctx>(state: &mut VmState<'ctx>, reason: TrapReason) -> HostOutcome {
    state.terminal = Some(Terminal::Trap(reason));
    HostOutcome::Terminal
}
