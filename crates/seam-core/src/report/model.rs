//! Report schema.
//!
//! One `PathRecord` is emitted per terminal state; field names are part of
//! the external schema and must not change without a schema version bump.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: Option<String>,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Captured contents of one standard descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdOutput {
    pub fd: u32,
    pub output: String,
}

/// One solved terminal state.
///
/// `Solution` maps each input symbol to its witness, decoded as UTF-8 when
/// plausible and as an integer otherwise. `Return` is present only for
/// paths that returned from the entry function; `Status` labels every
/// other terminal kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    #[serde(rename = "Solution")]
    pub solution: BTreeMap<String, String>,

    #[serde(rename = "Return", default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<String>,

    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(rename = "Output")]
    pub output: Vec<FdOutput>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub visited: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub tool: ToolInfo,
    pub artifact: ArtifactInfo,
    pub entry: String,
    /// Terminal-state counts keyed by kind: returned, exit, trap, budget.
    pub path_counts: BTreeMap<String, usize>,
    pub seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub records: Vec<PathRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_schema_field_names() {
        let record = PathRecord {
            solution: BTreeMap::from([("sym_arg_1".to_string(), "hello".to_string())]),
            ret: Some("0".to_string()),
            status: None,
            output: vec![
                FdOutput {
                    fd: 1,
                    output: "Password found!\n".to_string(),
                },
                FdOutput {
                    fd: 2,
                    output: String::new(),
                },
            ],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Solution"]["sym_arg_1"], "hello");
        assert_eq!(json["Return"], "0");
        assert!(json.get("Status").is_none());
        assert_eq!(json["Output"][0]["fd"], 1);
        assert_eq!(json["Output"][0]["output"], "Password found!\n");
    }

    #[test]
    fn status_only_records_omit_return() {
        let record = PathRecord {
            solution: BTreeMap::new(),
            ret: None,
            status: Some("Exit with status code 1".to_string()),
            output: vec![],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("Return"));
        assert!(json.contains("Exit with status code 1"));

        let back: PathRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status.as_deref(), Some("Exit with status code 1"));
        assert!(back.ret.is_none());
    }
}
