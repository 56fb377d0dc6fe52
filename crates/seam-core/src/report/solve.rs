//! Witness reconstruction.
//!
//! For each terminal state, solve its path constraints and decode the
//! model: input symbols become the `Solution` map, the entry result (if
//! any) becomes `Return`, the terminal label becomes `Status`, and the
//! captured fd 1/2 bytes become `Output`.
//!
//! A solver failure is not fatal: the record is emitted with an empty
//! solution and a status note, and the constraints stay with the state.

use std::collections::BTreeMap;

use tracing::warn;
use z3::Model;
use z3::ast::Ast;

use crate::smt::{SatOutcome, SmtContext, SymValue};
use crate::report::model::{FdOutput, PathRecord};
use crate::state::{Terminal, VmState};

pub fn solve_states<'ctx>(
    smt: &SmtContext<'ctx>,
    states: &[VmState<'ctx>],
) -> Vec<PathRecord> {
    states.iter().map(|s| solve_state(smt, s)).collect()
}

pub fn solve_state<'ctx>(smt: &SmtContext<'ctx>, state: &VmState<'ctx>) -> PathRecord {
    let model = match smt.sat(&state.constraints) {
        SatOutcome::Sat(model) => Some(model),
        SatOutcome::Unsat => {
            warn!("terminal state constraints did not solve; reporting without a witness");
            None
        }
    };

    let mut solution = BTreeMap::new();
    if let Some(model) = &model {
        for (name, bv) in smt.inputs() {
            if let Some(value) = model.eval(&bv, true).and_then(|v| v.as_u64()) {
                solution.insert(name, decode_bits(value, bv.get_size()));
            }
        }
    }

    let mut ret = None;
    let mut status = None;
    match &state.terminal {
        Some(Terminal::Returned(values)) => {
            ret = values
                .first()
                .and_then(|v| eval_value(model.as_ref(), smt, v))
                .map(|(bits, width)| render_signed(bits, width));
        }
        Some(Terminal::Exit(code)) => {
            let k = eval_value(model.as_ref(), smt, code)
                .map(|(bits, width)| render_signed(bits, width))
                .unwrap_or_else(|| "?".to_string());
            status = Some(format!("Exit with status code {k}"));
        }
        Some(Terminal::Trap(reason)) => {
            status = Some(format!("Trap: {reason}"));
        }
        Some(Terminal::Budget(which)) => {
            status = Some(format!("Budget exhausted ({which})"));
        }
        None => {
            warn!("non-terminal state reached the reporter");
            status = Some("incomplete".to_string());
        }
    }
    if model.is_none() {
        status = Some(
            status
                .map(|s| format!("{s}; unsolved constraints"))
                .unwrap_or_else(|| "unsolved constraints".to_string()),
        );
    }

    let output = [1u32, 2]
        .into_iter()
        .map(|fd| FdOutput {
            fd,
            output: decode_fd(model.as_ref(), smt, state, fd),
        })
        .collect();

    PathRecord {
        solution,
        ret,
        status,
        output,
    }
}

/// Evaluate a possibly symbolic value to its bits under the model.
fn eval_value<'ctx>(
    model: Option<&Model<'ctx>>,
    smt: &SmtContext<'ctx>,
    v: &SymValue<'ctx>,
) -> Option<(u64, u32)> {
    if let Some(bits) = v.as_const_bits() {
        return Some((bits, v.width()));
    }
    let bv = v.to_bv(smt).ok()?;
    let bits = model?.eval(&bv, true)?.as_u64()?;
    Some((bits, bv.get_size()))
}

fn decode_fd<'ctx>(
    model: Option<&Model<'ctx>>,
    smt: &SmtContext<'ctx>,
    state: &VmState<'ctx>,
    fd: u32,
) -> String {
    let bytes: Vec<u8> = state
        .output
        .iter()
        .filter(|(f, _)| *f == fd)
        .filter_map(|(_, b)| eval_value(model, smt, b).map(|(bits, _)| bits as u8))
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Render an integer witness: UTF-8 when every byte is printable text,
/// decimal otherwise. Trailing NUL bytes (unconstrained symbolic tails)
/// are stripped first.
fn decode_bits(bits: u64, width: u32) -> String {
    if width % 8 == 0 && width <= 64 {
        let mut bytes = bits.to_le_bytes()[..(width / 8) as usize].to_vec();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        if !bytes.is_empty()
            && bytes
                .iter()
                .all(|b| (0x20..0x7f).contains(b) || matches!(b, b'\n' | b'\t'))
        {
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    bits.to_string()
}

fn render_signed(bits: u64, width: u32) -> String {
    match width {
        32 => (bits as u32 as i32).to_string(),
        64 => (bits as i64).to_string(),
        _ => bits.to_string(),
    }
}
