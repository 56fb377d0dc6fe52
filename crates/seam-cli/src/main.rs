use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use seam_core::report::render;
use seam_core::report::model::ToolInfo;

mod args;

fn main() -> Result<()> {
    let args = args::Args::parse();

    // CLI verbosity wins unless RUST_LOG is set explicitly.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.verbose.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let tool = ToolInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: args.commit.clone(),
    };

    let config = args.to_context()?;
    let out_dir = config.output_dir.clone();
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;

    let report = seam_core::explore(&args.wasm_path, config, tool)?;

    // One record file per terminal state, plus the run summary.
    for (i, record) in report.records.iter().enumerate() {
        let path = out_dir.join(format!("state_{i}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(record)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    std::fs::write(
        out_dir.join("summary.json"),
        serde_json::to_string_pretty(&report.summary)?,
    )?;

    let output = match args.format {
        args::OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        args::OutputFormat::Text => render::render_text(&report),
    };
    println!("{output}");

    Ok(())
}
