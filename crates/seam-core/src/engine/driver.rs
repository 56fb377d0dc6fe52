//! Path exploration driver.
//!
//! A worklist of `(state, function, block)` entries drives execution.
//! Each step dequeues one entry, threads the state through the block's
//! instructions via the dispatcher, then routes every produced successor:
//! explicit jumps go where they say, fall-throughs follow the block's
//! edge, and terminal states drain into the result set.
//!
//! Depth-first order (the default) pops the newest entry to reach terminal
//! states early; breadth-first pops the oldest. A wall-clock budget drains
//! every remaining entry as budget-exhausted once exceeded.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info};

use crate::cfg::{CallGraph, Cfg};
use crate::config::{Context, SearchOrder};
use crate::engine::coverage::Coverage;
use crate::error::EngineError;
use crate::exec::{self, ExecEnv, Flow, Next};
use crate::smt::{SmtContext, SymValue};
use crate::state::files::FileTable;
use crate::state::memory::{DataSection, SymMemory};
use crate::state::{ArgvEntry, Pc, Terminal, VmState};
use crate::wasm::analyzer::{GlobalInit, ModuleAnalyzer};
use crate::wasm::instr::ValTy;

pub struct Engine<'a, 'ctx> {
    smt: &'a SmtContext<'ctx>,
    analyzer: &'a ModuleAnalyzer,
    cfg: &'a Cfg,
    data: &'a DataSection,
    config: &'a Context,
    callgraph: &'a CallGraph,
    coverage: RefCell<Coverage>,
    entry: u32,
    program_name: String,
}

impl<'a, 'ctx> Engine<'a, 'ctx> {
    pub fn new(
        smt: &'a SmtContext<'ctx>,
        analyzer: &'a ModuleAnalyzer,
        cfg: &'a Cfg,
        data: &'a DataSection,
        config: &'a Context,
        callgraph: &'a CallGraph,
        program_name: String,
    ) -> Result<Self, EngineError> {
        let entry = analyzer
            .find_func(&config.entry)
            .ok_or_else(|| EngineError::EntryNotFound(config.entry.clone()))?;
        if analyzer.body(entry).is_none() {
            return Err(EngineError::Malformed(format!(
                "entry function `{}` is an import",
                config.entry
            )));
        }
        let coverage = RefCell::new(Coverage::plan(analyzer, callgraph, entry, config));
        Ok(Self {
            smt,
            analyzer,
            cfg,
            data,
            config,
            callgraph,
            coverage,
            entry,
            program_name,
        })
    }

    pub fn entry_func(&self) -> u32 {
        self.entry
    }

    /// Explore until the worklist drains or the wall clock runs out.
    /// Returns every terminal state.
    pub fn run(&self) -> Result<Vec<VmState<'ctx>>, EngineError> {
        let env = ExecEnv {
            smt: self.smt,
            analyzer: self.analyzer,
            cfg: self.cfg,
            data: self.data,
            config: self.config,
            callgraph: self.callgraph,
            coverage: &self.coverage,
        };

        let mut worklist: VecDeque<(VmState<'ctx>, u32, usize)> = VecDeque::new();
        worklist.push_back((self.initial_state()?, self.entry, 0));

        let started = Instant::now();
        let deadline = std::time::Duration::from_secs(self.config.budgets.timeout_secs);
        let mut terminals = Vec::new();

        while let Some((mut state, func, block)) = match self.config.order {
            SearchOrder::Dfs => worklist.pop_back(),
            SearchOrder::Bfs => worklist.pop_front(),
        } {
            if started.elapsed() >= deadline {
                state.terminal = Some(Terminal::Budget("wall-clock"));
                terminals.push(state);
                continue;
            }

            debug!(func = self.analyzer.func_name(func), block, "emulating block");
            for (s, next) in self.emulate_block(&env, state, func, block)? {
                if s.terminal.is_some() {
                    terminals.push(s);
                    continue;
                }
                match next {
                    Some(Next::Jump { func, block }) => worklist.push_back((s, func, block)),
                    Some(Next::Step) | None => {
                        let target = self.fallthrough_target(func, block)?;
                        worklist.push_back((s, func, target));
                    }
                }
            }
            self.coverage.borrow_mut().maybe_flush();
        }

        self.coverage.borrow_mut().flush();
        let (visited, total) = self.coverage.borrow().totals();
        info!(
            paths = terminals.len(),
            visited,
            total,
            secs = started.elapsed().as_secs_f64(),
            "exploration finished"
        );
        Ok(terminals)
    }

    /// Coverage totals after a run.
    pub fn coverage_totals(&self) -> (u64, u64) {
        self.coverage.borrow().totals()
    }

    /// Successor block when execution falls off the end of `block`.
    fn fallthrough_target(&self, func: u32, block: usize) -> Result<usize, EngineError> {
        let fc = self.cfg.func(func)?;
        if let Some(to) = fc.fallthrough_of(block) {
            return Ok(to);
        }
        // Conditional terminators have no fall-through edge; the next
        // block in instruction order is the structural continuation.
        let end = fc.blocks[block].end_instr;
        fc.block_starting_at(end + 1).ok_or_else(|| {
            EngineError::Malformed(format!(
                "block {block} of {} has no structural successor",
                fc.name
            ))
        })
    }

    /// Thread one state through the instructions of one block.
    ///
    /// Returns `(state, continuation)` pairs: `None` continuation means the
    /// state fell off the end of the block (or is terminal).
    fn emulate_block(
        &self,
        env: &ExecEnv<'_, 'ctx>,
        state: VmState<'ctx>,
        func: u32,
        block: usize,
    ) -> Result<Vec<(VmState<'ctx>, Option<Next>)>, EngineError> {
        let fc = self.cfg.func(func)?;
        let bb = fc
            .blocks
            .get(block)
            .ok_or_else(|| EngineError::Malformed(format!("block {block} out of range")))?;
        let body = self
            .analyzer
            .body(func)
            .ok_or_else(|| EngineError::Malformed("emulating an imported function".into()))?;

        let mut pending: Vec<(VmState<'ctx>, usize)> = vec![(state, 0)];
        let mut out = Vec::new();

        while let Some((mut st, i)) = pending.pop() {
            let ip = bb.start_instr + i;
            if ip > bb.end_instr {
                out.push((st, None));
                continue;
            }

            if st.steps >= self.config.budgets.max_steps {
                st.terminal = Some(Terminal::Budget("step-count"));
                out.push((st, None));
                continue;
            }
            st.steps += 1;
            st.pc = Pc { block, instr: ip };
            self.coverage.borrow_mut().mark(func, ip);

            match exec::dispatch(env, &mut st, &body.insts[ip], ip)? {
                Flow::Continue => pending.push((st, i + 1)),
                Flow::Goto(next) => out.push((st, Some(next))),
                Flow::Terminal => out.push((st, None)),
                Flow::Fork(succs) => {
                    for succ in succs {
                        if succ.state.terminal.is_some() {
                            out.push((succ.state, None));
                        } else {
                            match succ.next {
                                Next::Step => pending.push((succ.state, i + 1)),
                                jump @ Next::Jump { .. } => out.push((succ.state, Some(jump))),
                            }
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Build the state exploration starts from: initialized globals,
    /// data-backed memory, configured files, argv, and fresh parameter
    /// symbols for the entry function.
    fn initial_state(&self) -> Result<VmState<'ctx>, EngineError> {
        let smt = self.smt;
        let entry_name = self.analyzer.func_name(self.entry).to_string();

        // Globals: concrete from the module when no external caller could
        // have touched them (exported entry), fresh symbols otherwise.
        let concrete_globals =
            self.config.concrete_globals || self.analyzer.is_exported_func(self.entry);
        let mut globals = Vec::with_capacity(self.analyzer.globals.len());
        for (i, g) in self.analyzer.globals.iter().enumerate() {
            let value = match (concrete_globals, g.init) {
                (true, GlobalInit::Const(bits)) => SymValue::from_bits(g.ty, bits),
                _ => fresh_of(smt, &format!("global_{i}"), g.ty),
            };
            globals.push(value);
        }

        let memory = SymMemory::new(
            self.analyzer.mem_initial_pages.max(1),
            self.analyzer.mem_max_pages,
        );

        // Heap for the malloc model starts past the static data.
        let data_end = self
            .analyzer
            .datas
            .iter()
            .map(|d| d.offset + d.data.len() as u64)
            .max()
            .unwrap_or(0);
        let heap_ptr = (data_end.max(4096) + 15) & !15;

        let mut argv = vec![ArgvEntry::Concrete(
            self.program_name.clone().into_bytes(),
        )];
        for i in 1..=self.config.sym_args {
            let name = format!("sym_arg_{i}");
            let bv = smt.fresh_input_bv(&name, self.config.sym_arg_len * 8);
            argv.push(ArgvEntry::Sym {
                bv,
                len: self.config.sym_arg_len,
            });
        }

        let proto = self.analyzer.proto(self.entry)?;
        let mut locals = Vec::new();
        for (i, ty) in proto.params.iter().enumerate() {
            locals.push(fresh_input_of(
                smt,
                &format!("{entry_name}_param_{i}"),
                *ty,
            ));
        }
        let body = self.analyzer.body(self.entry).ok_or_else(|| {
            EngineError::Malformed(format!("entry function `{entry_name}` has no body"))
        })?;
        locals.extend(body.locals.iter().map(|ty| SymValue::zero(*ty)));

        Ok(VmState {
            stack: Vec::new(),
            locals,
            globals,
            memory,
            files: FileTable::from_context(smt, self.config),
            argv,
            constraints: Vec::new(),
            frames: Vec::new(),
            blocks: Vec::new(),
            func: self.entry,
            pc: Pc::default(),
            output: Vec::new(),
            steps: 0,
            heap_ptr,
            terminal: None,
        })
    }
}

fn fresh_of<'ctx>(smt: &SmtContext<'ctx>, name: &str, ty: ValTy) -> SymValue<'ctx> {
    if ty.is_float() {
        SymValue::Float(smt.fresh_fp(name, ty.width()), ty.width())
    } else {
        SymValue::Bv(smt.fresh_bv(name, ty.width()))
    }
}

fn fresh_input_of<'ctx>(smt: &SmtContext<'ctx>, name: &str, ty: ValTy) -> SymValue<'ctx> {
    if ty.is_float() {
        SymValue::Float(smt.fresh_fp(name, ty.width()), ty.width())
    } else {
        SymValue::Bv(smt.fresh_input_bv(name, ty.width()))
    }
}
