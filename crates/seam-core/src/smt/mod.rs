//! Solver façade.
//!
//! `SmtContext` is the only module that talks to the backend solver. Every
//! other component manipulates opaque expression handles (`SymValue`,
//! `z3::ast::*`) and funnels satisfiability questions through here.
//!
//! Queries are stateless: each one builds a fresh `z3::Solver`, asserts the
//! given constraints, and checks. `unknown` results are treated as unsat
//! for feasibility decisions, with a warning, per the engine's error
//! policy; the caller keeps its constraints for reporting either way.

pub mod value;

use std::cell::{Cell, RefCell};

use tracing::warn;
use z3::ast::{Ast, BV, Bool, Float};
use z3::{Model, SatResult, Solver};

pub use value::SymValue;

/// Result of a satisfiability query.
pub enum SatOutcome<'ctx> {
    Sat(Model<'ctx>),
    Unsat,
}

/// Result of bounded value enumeration.
pub struct Enumeration {
    pub values: Vec<u64>,
    /// True when every satisfying value was found within the bound.
    pub exhausted: bool,
}

pub struct SmtContext<'ctx> {
    ctx: &'ctx z3::Context,
    counter: Cell<u64>,
    /// Symbols that represent program inputs (argv, file contents, entry
    /// parameters). The reporter solves these into the `Solution` map.
    inputs: RefCell<Vec<(String, BV<'ctx>)>>,
}

impl<'ctx> SmtContext<'ctx> {
    pub fn new(ctx: &'ctx z3::Context) -> Self {
        Self {
            ctx,
            counter: Cell::new(0),
            inputs: RefCell::new(Vec::new()),
        }
    }

    pub fn z3(&self) -> &'ctx z3::Context {
        self.ctx
    }

    /// A name guaranteed unique within this run.
    pub fn unique_name(&self, hint: &str) -> String {
        let n = self.counter.get();
        self.counter.set(n + 1);
        format!("{hint}_{n}")
    }

    /// Fresh bitvector symbol with the given exact name.
    pub fn fresh_bv(&self, name: &str, width: u32) -> BV<'ctx> {
        BV::new_const(self.ctx, name, width)
    }

    /// Fresh float symbol with the given exact name. Width is 32 or 64.
    pub fn fresh_fp(&self, name: &str, width: u32) -> Float<'ctx> {
        match width {
            32 => Float::new_const_float32(self.ctx, name),
            _ => Float::new_const_double(self.ctx, name),
        }
    }

    /// Fresh bitvector that is also recorded as a program input.
    pub fn fresh_input_bv(&self, name: &str, width: u32) -> BV<'ctx> {
        let bv = self.fresh_bv(name, width);
        self.inputs
            .borrow_mut()
            .push((name.to_string(), bv.clone()));
        bv
    }

    pub fn bv_const(&self, bits: u64, width: u32) -> BV<'ctx> {
        BV::from_u64(self.ctx, bits, width)
    }

    pub fn bool_const(&self, value: bool) -> Bool<'ctx> {
        Bool::from_bool(self.ctx, value)
    }

    /// Whether an untyped expression handle carries the boolean sort.
    pub fn is_bool(&self, expr: &z3::ast::Dynamic<'ctx>) -> bool {
        expr.as_bool().is_some()
    }

    /// Registered input symbols, in creation order.
    pub fn inputs(&self) -> Vec<(String, BV<'ctx>)> {
        self.inputs.borrow().clone()
    }

    /// Check the conjunction of `assumptions`.
    pub fn sat(&self, assumptions: &[Bool<'ctx>]) -> SatOutcome<'ctx> {
        let solver = Solver::new(self.ctx);
        for a in assumptions {
            solver.assert(a);
        }
        match solver.check() {
            SatResult::Sat => match solver.get_model() {
                Some(model) => SatOutcome::Sat(model),
                None => {
                    warn!("solver reported sat but produced no model; treating as unsat");
                    SatOutcome::Unsat
                }
            },
            SatResult::Unsat => SatOutcome::Unsat,
            SatResult::Unknown => {
                warn!("solver returned unknown; treating as unsat for feasibility");
                SatOutcome::Unsat
            }
        }
    }

    /// Whether `constraints` (plus an optional extra condition) admit a
    /// model.
    pub fn is_feasible(&self, constraints: &[Bool<'ctx>], extra: Option<&Bool<'ctx>>) -> bool {
        let solver = Solver::new(self.ctx);
        for c in constraints {
            solver.assert(c);
        }
        if let Some(e) = extra {
            solver.assert(e);
        }
        match solver.check() {
            SatResult::Sat => true,
            SatResult::Unsat => false,
            SatResult::Unknown => {
                warn!("solver returned unknown; treating branch as infeasible");
                false
            }
        }
    }

    /// Enumerate up to `limit` satisfying values of `expr` under
    /// `constraints`.
    ///
    /// `exhausted` is true when the solver proved no further value exists,
    /// i.e. the returned set is complete. A single exhausted value is the
    /// concretization fast path for symbolic addresses and indices.
    pub fn enumerate(
        &self,
        expr: &BV<'ctx>,
        constraints: &[Bool<'ctx>],
        limit: usize,
    ) -> Enumeration {
        let solver = Solver::new(self.ctx);
        for c in constraints {
            solver.assert(c);
        }

        let mut values = Vec::new();
        let mut exhausted = false;
        while values.len() < limit {
            match solver.check() {
                SatResult::Sat => {
                    let Some(model) = solver.get_model() else {
                        warn!("solver produced no model during enumeration");
                        break;
                    };
                    let Some(value) = model.eval(expr, true).and_then(|v| v.as_u64()) else {
                        warn!("enumerated expression did not evaluate to a numeral");
                        break;
                    };
                    values.push(value);
                    solver.assert(&expr._eq(&self.bv_const(value, expr.get_size())).not());
                }
                SatResult::Unsat => {
                    exhausted = true;
                    break;
                }
                SatResult::Unknown => {
                    warn!("solver returned unknown during enumeration");
                    break;
                }
            }
        }
        Enumeration { values, exhausted }
    }
}
