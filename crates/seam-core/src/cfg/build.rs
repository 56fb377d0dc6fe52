//! Raw CFG construction.
//!
//! Blocks split at every control transfer: `block`, `loop`, `if`, `else`,
//! `end`, `br`, `br_if`, `br_table`, `return`, `unreachable`. A `loop`
//! additionally *starts* a block so backward branches always land on a
//! block boundary. Calls do not split blocks here; `refine` handles call
//! boundaries.
//!
//! Structured branch targets are static in Wasm, so edges are fully
//! resolved during construction: a `br` to a `block` label lands just past
//! the matching `end`, a `br` to a `loop` label lands on the `loop` itself.

use std::collections::{BTreeSet, HashMap};

use crate::cfg::block::{BasicBlock, Edge, EdgeKind, FuncCfg};
use crate::error::EngineError;
use crate::wasm::instr::{Control, DecodedFunc, Inst};

/// Whether an instruction terminates a raw basic block.
fn ends_block(inst: &Inst) -> bool {
    matches!(
        inst,
        Inst::Control(
            Control::Unreachable
                | Control::Block { .. }
                | Control::Loop { .. }
                | Control::If { .. }
                | Control::Else { .. }
                | Control::End
                | Control::Br { .. }
                | Control::BrIf { .. }
                | Control::BrTable { .. }
                | Control::Return
        )
    )
}

pub fn build_func_cfg(func: u32, name: String, body: &DecodedFunc) -> Result<FuncCfg, EngineError> {
    let insts = &body.insts;
    if insts.is_empty() {
        return Err(EngineError::Malformed(format!(
            "function {name} has an empty body"
        )));
    }

    // Block boundaries: starts of blocks.
    let mut bounds: BTreeSet<usize> = BTreeSet::new();
    bounds.insert(0);
    for (i, inst) in insts.iter().enumerate() {
        if ends_block(inst) && i + 1 < insts.len() {
            bounds.insert(i + 1);
        }
        if matches!(inst, Inst::Control(Control::Loop { .. })) {
            bounds.insert(i);
        }
    }
    bounds.insert(insts.len());

    let starts: Vec<usize> = bounds.iter().copied().collect();
    let mut blocks = Vec::new();
    for w in starts.windows(2) {
        let (start, next) = (w[0], w[1]);
        blocks.push(BasicBlock {
            name: format!("block_{func}_{start}"),
            start_instr: start,
            end_instr: next - 1,
            start_offset: body.offsets[start],
            end_offset: body.offsets[next - 1],
        });
    }

    let block_at: HashMap<usize, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.start_instr, i))
        .collect();

    // Static branch-target resolution: walk the stream once, tracking the
    // stack of open block/loop/if instructions; at each branch site record
    // the landing instruction per relative depth.
    let mut open: Vec<usize> = Vec::new();
    let mut branch_targets: HashMap<usize, Vec<Option<usize>>> = HashMap::new();

    let resolve = |open: &[usize], insts: &[Inst], depth: u32| -> Option<usize> {
        let depth = depth as usize;
        if depth >= open.len() {
            return None; // branches out of the function act as a return
        }
        let opener = open[open.len() - 1 - depth];
        match &insts[opener] {
            Inst::Control(Control::Loop { .. }) => Some(opener),
            Inst::Control(Control::Block { end, .. }) | Inst::Control(Control::If { end, .. }) => {
                Some(*end + 1)
            }
            _ => None,
        }
    };

    for (i, inst) in insts.iter().enumerate() {
        match inst {
            Inst::Control(Control::Block { .. })
            | Inst::Control(Control::Loop { .. })
            | Inst::Control(Control::If { .. }) => open.push(i),
            Inst::Control(Control::End) => {
                open.pop();
            }
            Inst::Control(Control::Br { depth }) | Inst::Control(Control::BrIf { depth }) => {
                branch_targets.insert(i, vec![resolve(&open, insts, *depth)]);
            }
            Inst::Control(Control::BrTable { targets, default }) => {
                let mut resolved: Vec<Option<usize>> = targets
                    .iter()
                    .map(|d| resolve(&open, insts, *d))
                    .collect();
                resolved.push(resolve(&open, insts, *default));
                branch_targets.insert(i, resolved);
            }
            _ => {}
        }
    }

    // Edges.
    let mut edges = Vec::new();
    let target_block = |instr: usize| -> Option<usize> {
        if instr >= insts.len() {
            None
        } else {
            block_at.get(&instr).copied()
        }
    };
    for (bi, block) in blocks.iter().enumerate() {
        let last = block.end_instr;
        match &insts[last] {
            Inst::Control(Control::Br { .. }) => {
                if let Some(Some(t)) = branch_targets.get(&last).map(|v| v[0])
                    && let Some(to) = target_block(t)
                {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::Unconditional,
                    });
                }
            }
            Inst::Control(Control::BrIf { .. }) => {
                if let Some(Some(t)) = branch_targets.get(&last).map(|v| v[0])
                    && let Some(to) = target_block(t)
                {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::ConditionalTrue,
                    });
                }
                if let Some(to) = target_block(last + 1) {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::ConditionalFalse,
                    });
                }
            }
            Inst::Control(Control::BrTable { .. }) => {
                let mut seen = BTreeSet::new();
                for t in branch_targets.get(&last).into_iter().flatten().flatten() {
                    if let Some(to) = target_block(*t)
                        && seen.insert(to)
                    {
                        edges.push(Edge {
                            from: bi,
                            to,
                            kind: EdgeKind::Unconditional,
                        });
                    }
                }
            }
            Inst::Control(Control::If { else_at, end, .. }) => {
                if let Some(to) = target_block(last + 1) {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::ConditionalTrue,
                    });
                }
                let false_target = else_at.map(|e| e + 1).unwrap_or(end + 1);
                if let Some(to) = target_block(false_target) {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::ConditionalFalse,
                    });
                }
            }
            Inst::Control(Control::Else { end }) => {
                if let Some(to) = target_block(end + 1) {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::Unconditional,
                    });
                }
            }
            Inst::Control(Control::Return) | Inst::Control(Control::Unreachable) => {}
            // block/loop/end and plain instruction endings fall through.
            _ => {
                if let Some(to) = target_block(last + 1) {
                    edges.push(Edge {
                        from: bi,
                        to,
                        kind: EdgeKind::FallThrough,
                    });
                }
            }
        }
    }

    Ok(FuncCfg::new(func, name, blocks, edges))
}
