//! Instruction dispatcher.
//!
//! One handler per opcode group. A handler either mutates the state in
//! place (`Continue`), replaces it with successor states (`Fork`), or marks
//! it terminal. Successors carry where execution resumes: the next
//! instruction of the current block, or the start of another block
//! (possibly in another function, for calls and returns).

pub mod constant;
pub mod control;
pub mod convert;
pub mod memory;
pub mod numeric;
pub mod parametric;
pub mod variable;

use std::cell::RefCell;

use crate::cfg::{Cfg, CallGraph};
use crate::config::Context;
use crate::engine::coverage::Coverage;
use crate::error::EngineError;
use crate::smt::SmtContext;
use crate::state::memory::DataSection;
use crate::state::{Terminal, TrapReason, VmState};
use crate::wasm::analyzer::ModuleAnalyzer;
use crate::wasm::instr::Inst;

/// Read-only execution context threaded into every handler.
pub struct ExecEnv<'a, 'ctx> {
    pub smt: &'a SmtContext<'ctx>,
    pub analyzer: &'a ModuleAnalyzer,
    pub cfg: &'a Cfg,
    pub data: &'a DataSection,
    pub config: &'a Context,
    pub callgraph: &'a CallGraph,
    pub coverage: &'a RefCell<Coverage>,
}

impl<'a, 'ctx> ExecEnv<'a, 'ctx> {
    pub fn fanout(&self) -> usize {
        self.config.budgets.enum_fanout
    }
}

/// Where a successor state resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Next instruction within the current block.
    Step,
    /// Start of the given block of the given function.
    Jump { func: u32, block: usize },
}

#[derive(Debug)]
pub struct Successor<'ctx> {
    pub state: VmState<'ctx>,
    pub next: Next,
}

/// Outcome of executing one instruction against one state.
#[derive(Debug)]
pub enum Flow<'ctx> {
    /// State mutated in place; execution continues at the next instruction.
    Continue,
    /// State mutated in place; execution transfers to `Next`.
    Goto(Next),
    /// State replaced by zero or more successors.
    Fork(Vec<Successor<'ctx>>),
    /// State became terminal (`state.terminal` is set).
    Terminal,
}

/// Mark `state` trapped and report a terminal flow.
pub(crate) fn trap<'ctx>(state: &mut VmState<'ctx>, reason: TrapReason) -> Flow<'ctx> {
    state.terminal = Some(Terminal::Trap(reason));
    Flow::Terminal
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::state::Pc;
    use crate::state::files::FileTable;
    use crate::state::memory::SymMemory;

    /// A state with one memory page and nothing else, for handler tests.
    pub fn state_for_tests() -> VmState<'static> {
        VmState {
            stack: Vec::new(),
            locals: Vec::new(),
            globals: Vec::new(),
            memory: SymMemory::new(1, None),
            files: FileTable::default(),
            argv: Vec::new(),
            constraints: Vec::new(),
            frames: Vec::new(),
            blocks: Vec::new(),
            func: 0,
            pc: Pc::default(),
            output: Vec::new(),
            steps: 0,
            heap_ptr: 0,
            terminal: None,
        }
    }

    /// Owns the read-only collaborators an `ExecEnv` borrows.
    pub struct Harness {
        pub analyzer: ModuleAnalyzer,
        pub cfg: Cfg,
        pub data: DataSection,
        pub config: Context,
        pub callgraph: CallGraph,
        pub coverage: RefCell<Coverage>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                analyzer: ModuleAnalyzer::default(),
                cfg: Cfg::default(),
                data: DataSection::default(),
                config: Context::default(),
                callgraph: CallGraph::default(),
                coverage: RefCell::new(Coverage::disabled()),
            }
        }

        pub fn env<'a, 'ctx>(&'a self, smt: &'a SmtContext<'ctx>) -> ExecEnv<'a, 'ctx> {
            ExecEnv {
                smt,
                analyzer: &self.analyzer,
                cfg: &self.cfg,
                data: &self.data,
                config: &self.config,
                callgraph: &self.callgraph,
                coverage: &self.coverage,
            }
        }
    }
}

/// Route one instruction to its group handler.
///
/// `ip` is the instruction's index within the current function.
pub fn dispatch<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    inst: &Inst,
    ip: usize,
) -> Result<Flow<'ctx>, EngineError> {
    state.pc.instr = ip;
    match inst {
        Inst::Const(c) => constant::exec_const(state, c),
        Inst::Variable(v) => variable::exec_variable(state, v),
        Inst::Parametric(p) => parametric::exec_parametric(env, state, p),
        Inst::Numeric(n) => numeric::exec_numeric(env, state, n),
        Inst::Conversion(c) => convert::exec_conversion(env, state, c, ip),
        Inst::Memory(m) => memory::exec_memory(env, state, m, ip),
        Inst::Control(c) => control::exec_control(env, state, c, ip),
    }
}
