//! Basic blocks and edges.

use std::collections::HashMap;

/// Maximal straight-line instruction range within one function.
///
/// Instruction bounds are indices into the function's decoded instruction
/// stream; byte offsets locate the range within the module binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub name: String,
    /// Index of the first instruction (inclusive).
    pub start_instr: usize,
    /// Index of the last instruction (inclusive).
    pub end_instr: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl BasicBlock {
    /// Number of instructions in the block; always at least one.
    pub fn instr_count(&self) -> usize {
        self.end_instr - self.start_instr + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    FallThrough,
    ConditionalTrue,
    ConditionalFalse,
    Unconditional,
}

/// Transfer between two blocks of the same function, by block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
}

/// CFG of one function.
#[derive(Debug, Clone, Default)]
pub struct FuncCfg {
    pub func: u32,
    pub name: String,
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<Edge>,
    /// Block index by starting instruction index.
    starts: HashMap<usize, usize>,
}

impl FuncCfg {
    pub fn new(func: u32, name: String, blocks: Vec<BasicBlock>, edges: Vec<Edge>) -> Self {
        let starts = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.start_instr, i))
            .collect();
        Self {
            func,
            name,
            blocks,
            edges,
            starts,
        }
    }

    /// Block beginning exactly at instruction `instr`.
    ///
    /// Every branch target resolved at decode time starts a block, so a
    /// miss means the target lies past the end of the function.
    pub fn block_starting_at(&self, instr: usize) -> Option<usize> {
        self.starts.get(&instr).copied()
    }

    /// Single fall-through (or unconditional) successor of `block`.
    pub fn fallthrough_of(&self, block: usize) -> Option<usize> {
        self.edges
            .iter()
            .find(|e| {
                e.from == block
                    && matches!(e.kind, EdgeKind::FallThrough | EdgeKind::Unconditional)
            })
            .map(|e| e.to)
    }

    pub fn edges_from(&self, block: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == block)
    }
}
