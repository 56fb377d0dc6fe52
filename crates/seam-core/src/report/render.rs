use crate::report::model::RunReport;

/// Human-readable summary for terminal output.
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let s = &report.summary;
    out.push_str(&format!("{} {}\n", s.tool.name, s.tool.version));
    out.push_str(&format!(
        "Artifact: {} ({} bytes)\n",
        s.artifact.path.as_deref().unwrap_or("<bytes>"),
        s.artifact.size_bytes
    ));
    out.push_str(&format!("Entry: {}\n", s.entry));
    out.push_str(&format!(
        "Explored {} terminal state(s) in {:.2}s\n",
        report.records.len(),
        s.seconds
    ));
    for (kind, count) in &s.path_counts {
        out.push_str(&format!("  {kind}: {count}\n"));
    }
    if let Some(c) = &s.coverage {
        out.push_str(&format!(
            "Coverage: {}/{} instructions\n",
            c.visited, c.total
        ));
    }
    for (i, r) in report.records.iter().enumerate() {
        out.push_str(&format!("state_{i}:\n"));
        if let Some(ret) = &r.ret {
            out.push_str(&format!("  Return: {ret}\n"));
        }
        if let Some(status) = &r.status {
            out.push_str(&format!("  Status: {status}\n"));
        }
        for (name, value) in &r.solution {
            out.push_str(&format!("  {name} = {value:?}\n"));
        }
        for fd in &r.output {
            if !fd.output.is_empty() {
                out.push_str(&format!("  fd{}: {:?}\n", fd.fd, fd.output));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::*;
    use std::collections::BTreeMap;

    #[test]
    fn renders_summary_and_records() {
        let report = RunReport {
            summary: RunSummary {
                tool: ToolInfo {
                    name: "seam".into(),
                    version: "0.1.0".into(),
                    commit: None,
                },
                artifact: ArtifactInfo {
                    path: Some("test.wasm".into()),
                    size_bytes: 8,
                    sha256: "ab".into(),
                },
                entry: "_start".into(),
                path_counts: BTreeMap::from([("returned".into(), 1)]),
                seconds: 0.5,
                coverage: None,
            },
            records: vec![PathRecord {
                solution: BTreeMap::from([("sym_arg_1".into(), "0".into())]),
                ret: Some("0".into()),
                status: None,
                output: vec![FdOutput {
                    fd: 1,
                    output: "a".into(),
                }],
            }],
        };
        let text = render_text(&report);
        assert!(text.contains("Entry: _start"));
        assert!(text.contains("returned: 1"));
        assert!(text.contains("Return: 0"));
        assert!(text.contains("sym_arg_1"));
    }
}
