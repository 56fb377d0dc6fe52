//! Per-function instruction coverage.
//!
//! Before exploration, the reachable-function set (entry plus all
//! table-element functions, transitively) seeds one bitmap per function,
//! sized by instruction count. The driver sets a bit per executed
//! instruction; C-library models mark their whole closure at once, since
//! the model subsumes the body.
//!
//! Bits only ever flip from false to true, so the visited counter is
//! non-decreasing. Once a second, a per-function snapshot is rewritten and
//! a global line is appended to the timeline log.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::warn;

use crate::cfg::CallGraph;
use crate::config::Context;
use crate::wasm::analyzer::ModuleAnalyzer;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct Coverage {
    enabled: bool,
    names: BTreeMap<u32, String>,
    bitmaps: BTreeMap<u32, Vec<bool>>,
    visited: u64,
    total: u64,
    started: Instant,
    last_flush: Instant,
    snapshot_path: Option<PathBuf>,
    timeline_path: Option<PathBuf>,
}

impl Coverage {
    /// A tracker that records nothing and writes nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            names: BTreeMap::new(),
            bitmaps: BTreeMap::new(),
            visited: 0,
            total: 0,
            started: Instant::now(),
            last_flush: Instant::now(),
            snapshot_path: None,
            timeline_path: None,
        }
    }

    /// Plan bitmaps for every function reachable from `entry` and the
    /// table elements.
    pub fn plan(
        analyzer: &ModuleAnalyzer,
        callgraph: &CallGraph,
        entry: u32,
        config: &Context,
    ) -> Self {
        if !config.coverage {
            return Self::disabled();
        }

        let roots = std::iter::once(entry).chain(analyzer.elements.iter().flatten().copied());
        let reachable = callgraph.reachable(roots);

        let mut names = BTreeMap::new();
        let mut bitmaps = BTreeMap::new();
        let mut total = 0u64;
        for func in reachable {
            let Some(body) = analyzer.body(func) else {
                continue; // imports have no instructions to cover
            };
            names.insert(func, analyzer.func_name(func).to_string());
            total += body.insts.len() as u64;
            bitmaps.insert(func, vec![false; body.insts.len()]);
        }

        Self {
            enabled: true,
            names,
            bitmaps,
            visited: 0,
            total,
            started: Instant::now(),
            last_flush: Instant::now(),
            snapshot_path: Some(config.output_dir.join("coverage.json")),
            timeline_path: Some(config.output_dir.join("coverage_timeline.log")),
        }
    }

    /// Mark one executed instruction.
    pub fn mark(&mut self, func: u32, instr: usize) {
        if !self.enabled {
            return;
        }
        if let Some(bitmap) = self.bitmaps.get_mut(&func)
            && let Some(bit) = bitmap.get_mut(instr)
            && !*bit
        {
            *bit = true;
            self.visited += 1;
        }
    }

    /// Mark every instruction of `func` covered (a model subsumed it).
    pub fn mark_function(&mut self, func: u32) {
        if !self.enabled {
            return;
        }
        if let Some(bitmap) = self.bitmaps.get_mut(&func) {
            for bit in bitmap.iter_mut() {
                if !*bit {
                    *bit = true;
                    self.visited += 1;
                }
            }
        }
    }

    /// `(visited, total)` instruction counts over all planned functions.
    pub fn totals(&self) -> (u64, u64) {
        (self.visited, self.total)
    }

    /// Time-gated write: at most once per second.
    pub fn maybe_flush(&mut self) {
        if self.enabled && self.last_flush.elapsed() >= FLUSH_INTERVAL {
            self.flush();
        }
    }

    /// Write the snapshot and timeline unconditionally.
    pub fn flush(&mut self) {
        if !self.enabled {
            return;
        }
        self.last_flush = Instant::now();

        let per_function: BTreeMap<&str, serde_json::Value> = self
            .bitmaps
            .iter()
            .map(|(func, bitmap)| {
                let name = self.names.get(func).map(String::as_str).unwrap_or("?");
                let covered = bitmap.iter().filter(|b| **b).count();
                (
                    name,
                    json!({ "covered": covered, "total": bitmap.len() }),
                )
            })
            .collect();

        if let Some(path) = &self.snapshot_path {
            let payload = serde_json::to_string_pretty(&per_function).unwrap_or_default();
            if let Err(e) = fs::write(path, payload) {
                warn!(path = %path.display(), "failed to write coverage snapshot: {e}");
            }
        }
        if let Some(path) = &self.timeline_path {
            let line = format!(
                "{:.1}s {}/{}\n",
                self.started.elapsed().as_secs_f64(),
                self.visited,
                self.total
            );
            let appended = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut f| f.write_all(line.as_bytes()));
            if let Err(e) = appended {
                warn!(path = %path.display(), "failed to append coverage timeline: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::callgraph::build_call_graph;
    use std::collections::HashMap;

    fn planned(wat: &str, entry: u32, dir: &std::path::Path) -> (Coverage, ModuleAnalyzer) {
        let wasm = wat::parse_str(wat).unwrap();
        let analyzer = ModuleAnalyzer::parse(&wasm, &HashMap::new()).unwrap();
        let callgraph = build_call_graph(&analyzer);
        let mut config = Context::default();
        config.coverage = true;
        config.output_dir = dir.to_path_buf();
        let cov = Coverage::plan(&analyzer, &callgraph, entry, &config);
        (cov, analyzer)
    }

    const TWO_FUNCS: &str = r#"
        (module
          (func $main (call $helper))
          (func $helper)
          (func $orphan))
    "#;

    #[test]
    fn plans_only_reachable_functions() {
        let dir = tempfile::tempdir().unwrap();
        let (cov, _) = planned(TWO_FUNCS, 0, dir.path());
        assert!(cov.bitmaps.contains_key(&0));
        assert!(cov.bitmaps.contains_key(&1));
        assert!(!cov.bitmaps.contains_key(&2));
    }

    #[test]
    fn visited_count_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let (mut cov, _) = planned(TWO_FUNCS, 0, dir.path());
        cov.mark(0, 0);
        let (v1, _) = cov.totals();
        cov.mark(0, 0); // marking twice does not double count
        let (v2, _) = cov.totals();
        assert_eq!(v1, 1);
        assert_eq!(v2, 1);
        cov.mark_function(1);
        let (v3, total) = cov.totals();
        assert!(v3 > v2);
        assert!(v3 <= total);
    }

    #[test]
    fn flush_writes_snapshot_and_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let (mut cov, _) = planned(TWO_FUNCS, 0, dir.path());
        cov.mark(0, 0);
        cov.flush();
        cov.flush();

        let snapshot = std::fs::read_to_string(dir.path().join("coverage.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed["main"]["covered"], 1);

        let timeline = std::fs::read_to_string(dir.path().join("coverage_timeline.log")).unwrap();
        assert_eq!(timeline.lines().count(), 2);
    }

    #[test]
    fn disabled_tracker_is_inert() {
        let mut cov = Coverage::disabled();
        cov.mark(0, 0);
        cov.mark_function(0);
        cov.flush();
        assert_eq!(cov.totals(), (0, 0));
    }
}
