//! Call graph.
//!
//! Built once from decoded bodies and consumed by coverage planning: the
//! reachable-function set seeds the coverage bitmaps, and C-library models
//! mark their callee closure covered when they subsume a call.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::wasm::analyzer::ModuleAnalyzer;
use crate::wasm::instr::{Control, Inst};

#[derive(Debug, Default)]
pub struct CallGraph {
    /// Caller function index to the set of its callees.
    pub callees: BTreeMap<u32, BTreeSet<u32>>,
}

impl CallGraph {
    /// Functions reachable from `roots` (inclusive).
    pub fn reachable(&self, roots: impl IntoIterator<Item = u32>) -> BTreeSet<u32> {
        let mut seen: BTreeSet<u32> = BTreeSet::new();
        let mut queue: VecDeque<u32> = roots.into_iter().collect();
        while let Some(f) = queue.pop_front() {
            if !seen.insert(f) {
                continue;
            }
            if let Some(cs) = self.callees.get(&f) {
                queue.extend(cs.iter().copied());
            }
        }
        seen
    }

    /// `func` plus its transitive callees.
    pub fn closure(&self, func: u32) -> BTreeSet<u32> {
        self.reachable([func])
    }
}

/// Scan every defined function for direct and (possible) indirect callees.
///
/// An indirect call may reach any table-element function whose signature
/// matches the expected type.
pub fn build_call_graph(analyzer: &ModuleAnalyzer) -> CallGraph {
    let mut graph = CallGraph::default();
    for (i, body) in analyzer.bodies.iter().enumerate() {
        let caller = (analyzer.num_imported_funcs + i) as u32;
        let entry = graph.callees.entry(caller).or_default();
        for inst in &body.insts {
            match inst {
                Inst::Control(Control::Call { func }) => {
                    entry.insert(*func);
                }
                Inst::Control(Control::CallIndirect { type_index, .. }) => {
                    let Some(expected) = analyzer.types.get(*type_index as usize) else {
                        continue;
                    };
                    for func in analyzer.elements.iter().flatten() {
                        let matches = analyzer
                            .protos
                            .get(*func as usize)
                            .and_then(|p| analyzer.types.get(p.type_index as usize))
                            .is_some_and(|sig| sig == expected);
                        if matches {
                            entry.insert(*func);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn graph_of(wat: &str) -> (CallGraph, ModuleAnalyzer) {
        let wasm = wat::parse_str(wat).unwrap();
        let a = ModuleAnalyzer::parse(&wasm, &HashMap::new()).unwrap();
        (build_call_graph(&a), a)
    }

    #[test]
    fn direct_calls_are_recorded() {
        let (g, _) = graph_of(
            r#"
            (module
              (func $a (call $b))
              (func $b (call $c))
              (func $c))
            "#,
        );
        assert_eq!(g.callees[&0], BTreeSet::from([1]));
        assert_eq!(g.callees[&1], BTreeSet::from([2]));
        assert!(g.callees[&2].is_empty());
    }

    #[test]
    fn reachability_is_transitive() {
        let (g, _) = graph_of(
            r#"
            (module
              (func $a (call $b))
              (func $b (call $c))
              (func $c)
              (func $orphan))
            "#,
        );
        let reach = g.reachable([0]);
        assert_eq!(reach, BTreeSet::from([0, 1, 2]));
        assert!(!reach.contains(&3));
    }

    #[test]
    fn indirect_calls_fan_out_to_matching_table_entries() {
        let (g, _) = graph_of(
            r#"
            (module
              (type $sig (func (result i32)))
              (table 2 funcref)
              (func $f0 (result i32) i32.const 0)
              (func $f1 (result i32) i32.const 1)
              (func $other (param i32))
              (func $caller (result i32)
                (call_indirect (type $sig) (i32.const 0)))
              (elem (i32.const 0) $f0 $f1))
            "#,
        );
        let callees = &g.callees[&3];
        assert!(callees.contains(&0));
        assert!(callees.contains(&1));
        assert!(!callees.contains(&2));
    }
}
