//! Abstract machine state.
//!
//! A `VmState` owns everything mutable along one path: the value stack,
//! locals, globals, symbolic memory, file table, argv, the path constraint
//! list, and the explicit call/block frame stacks. Forking clones the
//! state; the clones share immutable expression handles but no mutable
//! substructure, so mutating one side never observes in the other.
//!
//! The current instruction is tracked as indices into the read-only CFG,
//! never as an owning reference.

pub mod files;
pub mod memory;

use std::fmt;

use z3::ast::{BV, Bool};

use crate::error::EngineError;
use crate::smt::{SmtContext, SymValue};
use crate::state::files::FileTable;
use crate::state::memory::{DataSection, MemRead, SymMemory};

/// Wasm-defined abrupt termination of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapReason {
    Unreachable,
    DivideByZero,
    IntegerOverflow,
    OutOfBoundsMemory { addr: u64, len: u32 },
    IndirectCall(String),
    InvalidConversion(String),
}

impl fmt::Display for TrapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapReason::Unreachable => write!(f, "unreachable executed"),
            TrapReason::DivideByZero => write!(f, "integer divide by zero"),
            TrapReason::IntegerOverflow => write!(f, "integer overflow"),
            TrapReason::OutOfBoundsMemory { addr, len } => {
                write!(f, "out-of-bounds memory access of {len} bytes at {addr}")
            }
            TrapReason::IndirectCall(why) => write!(f, "indirect call: {why}"),
            TrapReason::InvalidConversion(why) => write!(f, "invalid conversion: {why}"),
        }
    }
}

/// Why a state will not be extended further.
#[derive(Debug, Clone)]
pub enum Terminal<'ctx> {
    /// The entry function returned these values.
    Returned(Vec<SymValue<'ctx>>),
    Trap(TrapReason),
    /// `proc_exit`/`exit` with the given status value.
    Exit(SymValue<'ctx>),
    /// A configured budget ran out; the label names which.
    Budget(&'static str),
}

/// One command-line argument.
#[derive(Debug, Clone)]
pub enum ArgvEntry<'ctx> {
    Concrete(Vec<u8>),
    Sym { bv: BV<'ctx>, len: u32 },
}

impl ArgvEntry<'_> {
    /// Length in bytes, excluding the NUL terminator.
    pub fn byte_len(&self) -> u32 {
        match self {
            ArgvEntry::Concrete(bytes) => bytes.len() as u32,
            ArgvEntry::Sym { len, .. } => *len,
        }
    }
}

/// Structured-control frame within the current function.
#[derive(Debug, Clone)]
pub struct BlockFrame {
    /// Result arity of the block.
    pub arity: usize,
    /// Instruction index a branch to this label lands on.
    pub target_instr: usize,
    /// Stack depth when the block was entered.
    pub entry_depth: usize,
    /// Loops branch back with no results; blocks branch out with `arity`.
    pub is_loop: bool,
}

impl BlockFrame {
    /// Values a branch to this label transfers.
    pub fn branch_arity(&self) -> usize {
        if self.is_loop { 0 } else { self.arity }
    }
}

/// Suspended caller context while a callee runs.
#[derive(Debug, Clone)]
pub struct CallFrame<'ctx> {
    pub caller_func: u32,
    pub saved_locals: Vec<SymValue<'ctx>>,
    pub saved_blocks: Vec<BlockFrame>,
    /// Caller block to resume at once the callee returns.
    pub resume_block: usize,
    /// Value-stack depth at callee entry (after arguments were popped).
    pub entry_depth: usize,
}

/// Position within the read-only CFG.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pc {
    pub block: usize,
    /// Instruction index within the function (not the block).
    pub instr: usize,
}

#[derive(Debug, Clone)]
pub struct VmState<'ctx> {
    pub stack: Vec<SymValue<'ctx>>,
    pub locals: Vec<SymValue<'ctx>>,
    pub globals: Vec<SymValue<'ctx>>,
    pub memory: SymMemory<'ctx>,
    pub files: FileTable<'ctx>,
    pub argv: Vec<ArgvEntry<'ctx>>,
    /// Append-only path constraints; forks extend, never rewrite.
    pub constraints: Vec<Bool<'ctx>>,
    pub frames: Vec<CallFrame<'ctx>>,
    pub blocks: Vec<BlockFrame>,
    /// Current function index.
    pub func: u32,
    pub pc: Pc,
    /// Captured bytes written to fds 1 and 2, in write order.
    pub output: Vec<(u32, SymValue<'ctx>)>,
    /// Instructions executed along this path.
    pub steps: u64,
    /// Bump pointer for the `malloc` model.
    pub heap_ptr: u64,
    pub terminal: Option<Terminal<'ctx>>,
}

impl<'ctx> VmState<'ctx> {
    pub fn push(&mut self, v: SymValue<'ctx>) {
        self.stack.push(v);
    }

    pub fn pop(&mut self) -> Result<SymValue<'ctx>, EngineError> {
        self.stack
            .pop()
            .ok_or_else(|| EngineError::StackUnderflow(format!("function {}", self.func)))
    }

    /// Pop `n` values, returned in push order.
    pub fn popn(&mut self, n: usize) -> Result<Vec<SymValue<'ctx>>, EngineError> {
        let mut vs = Vec::with_capacity(n);
        for _ in 0..n {
            vs.push(self.pop()?);
        }
        vs.reverse();
        Ok(vs)
    }

    pub fn constrain(&mut self, c: Bool<'ctx>) {
        self.constraints.push(c);
    }

    /// Fork this state. The clone shares no mutable substructure.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Store through this state's memory under its constraints.
    pub fn mem_store(
        &mut self,
        smt: &SmtContext<'ctx>,
        addr: &SymValue<'ctx>,
        value: &SymValue<'ctx>,
        nbytes: u32,
        fanout: usize,
    ) -> Result<Option<TrapReason>, EngineError> {
        let Self {
            memory,
            constraints,
            ..
        } = self;
        memory.store(smt, constraints, addr, value, nbytes, fanout)
    }

    /// Load through this state's memory under its constraints.
    pub fn mem_load(
        &mut self,
        smt: &SmtContext<'ctx>,
        data: &DataSection,
        addr: &SymValue<'ctx>,
        nbytes: u32,
        fanout: usize,
    ) -> Result<MemRead<'ctx>, EngineError> {
        let Self {
            memory,
            constraints,
            ..
        } = self;
        memory.load(smt, constraints, data, addr, nbytes, fanout)
    }

    /// Append a written byte to the captured output of fd 1 or 2.
    pub fn capture_output(&mut self, fd: u32, byte: SymValue<'ctx>) {
        if fd == 1 || fd == 2 {
            self.output.push((fd, byte));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Context;
    use z3::ast::Ast;

    fn with_smt(f: impl FnOnce(&SmtContext<'_>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        f(&smt);
    }

    fn blank_state<'ctx>(smt: &SmtContext<'ctx>) -> VmState<'ctx> {
        VmState {
            stack: Vec::new(),
            locals: Vec::new(),
            globals: Vec::new(),
            memory: SymMemory::new(1, None),
            files: FileTable::from_context(smt, &Context::default()),
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

    #[test]
    fn pop_on_empty_stack_is_a_programming_error() {
        with_smt(|smt| {
            let mut st = blank_state(smt);
            assert!(st.pop().is_err());
        });
    }

    #[test]
    fn popn_preserves_push_order() {
        with_smt(|smt| {
            let mut st = blank_state(smt);
            st.push(SymValue::from_i32(1));
            st.push(SymValue::from_i32(2));
            st.push(SymValue::from_i32(3));
            let vs = st.popn(2).unwrap();
            assert_eq!(vs[0].as_const_bits(), Some(2));
            assert_eq!(vs[1].as_const_bits(), Some(3));
            assert_eq!(st.stack.len(), 1);
        });
    }

    #[test]
    fn forked_states_are_isolated() {
        with_smt(|smt| {
            let mut a = blank_state(smt);
            a.push(SymValue::from_i32(10));
            a.constrain(smt.bool_const(true));

            let mut b = a.fork();
            b.push(SymValue::from_i32(20));
            b.constrain(smt.bool_const(false));
            b.locals.push(SymValue::from_i32(5));
            b.mem_store(smt, &SymValue::from_i32(0), &SymValue::from_i32(9), 4, 4)
                .unwrap();

            assert_eq!(a.stack.len(), 1);
            assert_eq!(a.constraints.len(), 1);
            assert!(a.locals.is_empty());
            let data = DataSection::default();
            let read = a
                .mem_load(smt, &data, &SymValue::from_i32(0), 4, 4)
                .unwrap();
            match read {
                MemRead::Value(v) => assert_eq!(v.as_const_bits(), Some(0)),
                MemRead::Trap(_) => panic!("unexpected trap"),
            }
        });
    }

    #[test]
    fn forks_share_the_constraint_prefix() {
        with_smt(|smt| {
            let mut a = blank_state(smt);
            let x = smt.fresh_bv("x", 32);
            a.constrain(x._eq(&smt.bv_const(1, 32)));
            let b = a.fork();
            assert_eq!(a.constraints, b.constraints);
        });
    }

    #[test]
    fn branch_arity_is_zero_for_loops() {
        let frame = BlockFrame {
            arity: 1,
            target_instr: 0,
            entry_depth: 0,
            is_loop: true,
        };
        assert_eq!(frame.branch_arity(), 0);
        let frame = BlockFrame {
            is_loop: false,
            ..frame
        };
        assert_eq!(frame.branch_arity(), 1);
    }
}
