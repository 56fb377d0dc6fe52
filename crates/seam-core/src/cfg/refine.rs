//! Call-boundary refinement.
//!
//! The exploration driver suspends a path at every call so the callee can
//! run in its own blocks and the caller can resume at a well-defined point.
//! Refinement re-splits every block containing an interior `call` or
//! `call_indirect` so those instructions only ever appear in terminal
//! position, inserting fall-through edges between the pieces.
//!
//! Invariants after refinement:
//! - no block contains a call at a non-terminal position;
//! - every original out-edge of a split block originates from its final
//!   piece, and incoming edges target its first piece.

use crate::cfg::Cfg;
use crate::cfg::block::{BasicBlock, Edge, EdgeKind, FuncCfg};
use crate::wasm::analyzer::ModuleAnalyzer;
use crate::wasm::instr::DecodedFunc;

pub fn refine(cfg: Cfg, analyzer: &ModuleAnalyzer) -> Cfg {
    let mut out = Cfg::default();
    for (func, fc) in cfg.functions {
        match analyzer.body(func) {
            Some(body) => {
                out.functions.insert(func, refine_func(fc, body));
            }
            None => {
                out.functions.insert(func, fc);
            }
        }
    }
    out
}

fn refine_func(fc: FuncCfg, body: &DecodedFunc) -> FuncCfg {
    let mut blocks: Vec<BasicBlock> = Vec::new();
    // Old block index -> (first piece, last piece) in the new block list.
    let mut piece_span: Vec<(usize, usize)> = Vec::new();
    let mut fallthroughs: Vec<(usize, usize)> = Vec::new();

    for old in &fc.blocks {
        let mut cut_points: Vec<usize> = vec![old.start_instr];
        for i in old.start_instr..old.end_instr {
            if body.insts[i].is_call() {
                cut_points.push(i + 1);
            }
        }
        cut_points.push(old.end_instr + 1);

        let first = blocks.len();
        for w in cut_points.windows(2) {
            let (start, next) = (w[0], w[1]);
            let idx = blocks.len();
            if idx > first {
                fallthroughs.push((idx - 1, idx));
            }
            blocks.push(BasicBlock {
                name: format!("block_{}_{}", fc.func, start),
                start_instr: start,
                end_instr: next - 1,
                start_offset: body.offsets[start],
                end_offset: body.offsets[next - 1],
            });
        }
        piece_span.push((first, blocks.len() - 1));
    }

    let mut edges: Vec<Edge> = fc
        .edges
        .iter()
        .map(|e| Edge {
            from: piece_span[e.from].1,
            to: piece_span[e.to].0,
            kind: e.kind,
        })
        .collect();
    edges.extend(fallthroughs.into_iter().map(|(from, to)| Edge {
        from,
        to,
        kind: EdgeKind::FallThrough,
    }));

    FuncCfg::new(fc.func, fc.name, blocks, edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build::build_func_cfg;
    use std::collections::HashMap;

    fn refined(wat: &str, func: usize) -> (FuncCfg, DecodedFunc) {
        let wasm = wat::parse_str(wat).unwrap();
        let a = ModuleAnalyzer::parse(&wasm, &HashMap::new()).unwrap();
        let body = a.bodies[func].clone();
        let raw = build_func_cfg(func as u32, format!("f{func}"), &body).unwrap();
        (refine_func(raw, &body), body)
    }

    const CALLER: &str = r#"
        (module
          (func $callee (result i32) i32.const 3)
          (func (result i32)
            call $callee
            call $callee
            i32.add))
    "#;

    #[test]
    fn calls_become_block_terminal() {
        let (fc, body) = refined(CALLER, 1);
        for block in &fc.blocks {
            for i in block.start_instr..block.end_instr {
                assert!(
                    !body.insts[i].is_call(),
                    "interior call at {i} in {}",
                    block.name
                );
            }
        }
    }

    #[test]
    fn split_pieces_are_chained_by_fallthrough() {
        let (fc, _) = refined(CALLER, 1);
        // call | call | add+end -> three pieces, two fall-through links.
        assert_eq!(fc.blocks.len(), 3);
        let ft: Vec<&Edge> = fc
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::FallThrough)
            .collect();
        assert_eq!(ft.len(), 2);
        assert_eq!(fc.fallthrough_of(0), Some(1));
        assert_eq!(fc.fallthrough_of(1), Some(2));
    }

    #[test]
    fn original_edges_reattach_to_final_piece() {
        let (fc, body) = refined(
            r#"
            (module
              (func $callee)
              (func (param i32)
                (block
                  call $callee
                  (br_if 0 (local.get 0))
                  (nop))))
            "#,
            1,
        );
        // The br_if block starts after the call split; its conditional
        // edges must originate from the piece holding the br_if.
        let br_block = fc
            .blocks
            .iter()
            .position(|b| {
                matches!(
                    body.insts[b.end_instr],
                    crate::wasm::instr::Inst::Control(crate::wasm::instr::Control::BrIf { .. })
                )
            })
            .unwrap();
        assert!(
            fc.edges_from(br_block)
                .any(|e| e.kind == EdgeKind::ConditionalTrue)
        );
        assert!(
            fc.edges_from(br_block)
                .any(|e| e.kind == EdgeKind::ConditionalFalse)
        );
    }

    #[test]
    fn functions_without_calls_are_unchanged() {
        let (fc, _) = refined("(module (func (result i32) i32.const 1))", 0);
        assert_eq!(fc.blocks.len(), 1);
        assert!(fc.edges.is_empty());
    }
}
