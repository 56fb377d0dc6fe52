//! Control-flow graphs over decoded functions.

pub mod block;
pub mod build;
pub mod callgraph;
pub mod refine;

pub use block::{BasicBlock, Edge, EdgeKind, FuncCfg};
pub use callgraph::CallGraph;

use std::collections::HashMap;

use crate::error::EngineError;
use crate::wasm::analyzer::ModuleAnalyzer;

/// Per-function CFGs for every defined function, keyed by function index.
#[derive(Debug, Default)]
pub struct Cfg {
    pub functions: HashMap<u32, FuncCfg>,
}

impl Cfg {
    /// Build raw per-function CFGs for every defined function.
    pub fn build(analyzer: &ModuleAnalyzer) -> Result<Self, EngineError> {
        let mut functions = HashMap::new();
        for (i, body) in analyzer.bodies.iter().enumerate() {
            let func = (analyzer.num_imported_funcs + i) as u32;
            let name = analyzer.func_name(func).to_string();
            functions.insert(func, build::build_func_cfg(func, name, body)?);
        }
        Ok(Self { functions })
    }

    pub fn func(&self, func: u32) -> Result<&FuncCfg, EngineError> {
        self.functions
            .get(&func)
            .ok_or_else(|| EngineError::Malformed(format!("no CFG for function index {func}")))
    }
}
