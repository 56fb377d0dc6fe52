//! SEAM (Symbolic Execution Abstract Machine)
//!
//! Symbolic execution engine for WebAssembly binaries: explores feasible
//! paths of an entry function over symbolic inputs (argv, file contents,
//! globals) and solves each path's constraints into concrete witnesses.

pub mod cfg;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod host;
pub mod report;
pub mod smt;
pub mod state;
pub mod wasm;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use crate::cfg::Cfg;
use crate::config::Context;
use crate::engine::Engine;
use crate::report::model::{CoverageSummary, RunReport, RunSummary, ToolInfo};
use crate::smt::SmtContext;
use crate::state::Terminal;
use crate::state::memory::DataSection;
use crate::wasm::analyzer::ModuleAnalyzer;
use crate::wasm::read::Artifact;

/// Primary tool identity.
pub const TOOL_NAME: &str = "SEAM";

/// Schema version for generated JSON records.
/// Must be bumped when `report::model` changes semantically.
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Explore a `.wasm` artifact on disk.
///
/// The pipeline is strictly linear:
/// 1. **Load**: read bytes and compute the artifact identity.
/// 2. **Analyze**: one parser pass into the module analyzer.
/// 3. **Shape**: build the CFG, refine call boundaries, derive the call
///    graph and the read-only data section.
/// 4. **Explore**: drive the abstract machine over the worklist until
///    every path is terminal or a budget runs out.
/// 5. **Solve**: reconstruct a witness and output per terminal state.
pub fn explore(path: &Path, config: Context, tool: ToolInfo) -> Result<RunReport> {
    let artifact = wasm::read::read_artifact(path)?;
    explore_artifact(&artifact, config, tool)
}

/// Explore already-loaded module bytes (used by tests and embedders).
pub fn explore_bytes(bytes: &[u8], config: Context, tool: ToolInfo) -> Result<RunReport> {
    let artifact = Artifact::from_bytes(bytes.to_vec());
    explore_artifact(&artifact, config, tool)
}

pub fn explore_artifact(
    artifact: &Artifact,
    config: Context,
    tool: ToolInfo,
) -> Result<RunReport> {
    let started = Instant::now();

    let analyzer = ModuleAnalyzer::parse(&artifact.bytes, &config.name_map)?;
    let raw_cfg = Cfg::build(&analyzer)?;
    let refined = cfg::refine::refine(raw_cfg, &analyzer);
    let callgraph = cfg::callgraph::build_call_graph(&analyzer);
    let data = DataSection::from_analyzer(&analyzer);

    let z3_config = z3::Config::new();
    let z3_ctx = z3::Context::new(&z3_config);
    let smt = SmtContext::new(&z3_ctx);

    let engine = Engine::new(
        &smt,
        &analyzer,
        &refined,
        &data,
        &config,
        &callgraph,
        artifact.program_name(),
    )?;
    let terminals = engine.run()?;

    let mut path_counts: BTreeMap<String, usize> = BTreeMap::new();
    for state in &terminals {
        let kind = match state.terminal {
            Some(Terminal::Returned(_)) => "returned",
            Some(Terminal::Exit(_)) => "exit",
            Some(Terminal::Trap(_)) => "trap",
            Some(Terminal::Budget(_)) => "budget",
            None => "incomplete",
        };
        *path_counts.entry(kind.to_string()).or_default() += 1;
    }

    let records = report::solve::solve_states(&smt, &terminals);
    let coverage = config.coverage.then(|| {
        let (visited, total) = engine.coverage_totals();
        CoverageSummary { visited, total }
    });

    Ok(RunReport {
        summary: RunSummary {
            tool,
            artifact: artifact.info(),
            entry: config.entry.clone(),
            path_counts,
            seconds: started.elapsed().as_secs_f64(),
            coverage,
        },
        records,
    })
}
