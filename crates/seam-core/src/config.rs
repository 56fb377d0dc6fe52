//! Run configuration.
//!
//! A single `Context` value is built by the front-end and threaded by
//! reference into the engine at construction. Handlers receive it through
//! the execution context; there are no process-wide singletons.

use std::collections::HashMap;
use std::path::PathBuf;

/// Exploration order for the driver worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOrder {
    /// Depth-first: reach terminal states early.
    #[default]
    Dfs,
    /// Breadth-first: explore shallow paths level by level.
    Bfs,
}

/// Source-language hint for the analyzed binary.
///
/// Only affects name-based recognition of compiled-in C library routines;
/// the instruction semantics are language independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceHint {
    #[default]
    C,
    Rust,
    Go,
    Unknown,
}

/// Resource budgets bounding a single exploration run.
#[derive(Debug, Clone)]
pub struct Budgets {
    /// Instructions a single path may execute before it is drained.
    pub max_steps: u64,
    /// Call-frame depth a single path may reach.
    pub max_call_depth: usize,
    /// Structured-control nesting depth a single path may reach.
    pub max_block_depth: usize,
    /// Wall-clock bound for the whole run, in seconds.
    pub timeout_secs: u64,
    /// Upper bound on values enumerated when concretizing a symbolic
    /// address, `br_table` index, or indirect-call target.
    pub enum_fanout: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_call_depth: 128,
            max_block_depth: 256,
            timeout_secs: 300,
            enum_fanout: 16,
        }
    }
}

/// A file descriptor preloaded before exploration begins (fd >= 3).
#[derive(Debug, Clone)]
pub struct FilePreset {
    pub name: String,
    pub content: Vec<u8>,
}

/// Everything the engine needs to know about one run.
#[derive(Debug, Clone)]
pub struct Context {
    /// Name of the entry function to explore.
    pub entry: String,
    /// Number of symbolic command-line arguments to materialize.
    pub sym_args: u32,
    /// Byte length of each symbolic argument.
    pub sym_arg_len: u32,
    /// Byte length of symbolic stdin; zero leaves stdin empty.
    pub sym_stdin: u32,
    /// Files preloaded at fds 3, 4, ... in order.
    pub files: Vec<FilePreset>,
    /// Optional function-index-to-name overrides, taking precedence over
    /// the module's name section.
    pub name_map: HashMap<u32, String>,
    pub source: SourceHint,
    /// Force concrete global initialization even for non-exported entries.
    pub concrete_globals: bool,
    /// Track and periodically write per-function coverage.
    pub coverage: bool,
    /// Solver backend name. Only `z3` is currently wired up.
    pub solver: String,
    pub order: SearchOrder,
    pub budgets: Budgets,
    /// Directory receiving coverage snapshots and timelines.
    pub output_dir: PathBuf,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            entry: "_start".to_string(),
            sym_args: 0,
            sym_arg_len: 10,
            sym_stdin: 0,
            files: Vec::new(),
            name_map: HashMap::new(),
            source: SourceHint::default(),
            concrete_globals: false,
            coverage: false,
            solver: "z3".to_string(),
            order: SearchOrder::default(),
            budgets: Budgets::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let ctx = Context::default();
        assert_eq!(ctx.entry, "_start");
        assert_eq!(ctx.order, SearchOrder::Dfs);
        assert!(ctx.budgets.max_steps > 0);
        assert!(ctx.budgets.enum_fanout > 1);
    }
}
