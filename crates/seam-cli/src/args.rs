use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, ValueEnum};

use seam_core::config::{Budgets, Context, FilePreset, SearchOrder, SourceHint};

#[derive(Debug, Parser)]
#[command(
    name = "seam",
    version,
    about = "Symbolic execution for WebAssembly binaries"
)]
pub struct Args {
    /// Path to the .wasm artifact
    pub wasm_path: PathBuf,

    /// Entry function to explore
    #[arg(long, default_value = "_start")]
    pub entry: String,

    /// Number of symbolic command-line arguments
    #[arg(long, default_value_t = 0)]
    pub sym_args: u32,

    /// Byte length of each symbolic argument
    #[arg(long, default_value_t = 10)]
    pub sym_arg_len: u32,

    /// Byte length of symbolic stdin (0 leaves stdin empty)
    #[arg(long, default_value_t = 0)]
    pub sym_stdin: u32,

    /// Preload a file at the next free descriptor (fd 3, 4, ...)
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    /// Source-language hint for C library recognition
    #[arg(long, default_value = "c")]
    pub source: Source,

    /// Function-index-to-name map file; lines of `<index> <name>`
    #[arg(long)]
    pub name_map: Option<PathBuf>,

    /// Force concrete global initialization
    #[arg(long)]
    pub concrete_globals: bool,

    /// Track and write per-function coverage
    #[arg(long)]
    pub coverage: bool,

    /// Solver backend
    #[arg(long, default_value = "z3")]
    pub solver: String,

    /// Explore breadth-first instead of depth-first
    #[arg(long)]
    pub bfs: bool,

    /// Per-path instruction budget
    #[arg(long, default_value_t = 100_000)]
    pub max_steps: u64,

    /// Call-depth budget
    #[arg(long, default_value_t = 128)]
    pub max_call_depth: usize,

    /// Structured-control nesting budget
    #[arg(long, default_value_t = 256)]
    pub max_block_depth: usize,

    /// Wall-clock budget in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Concretization enumeration bound
    #[arg(long, default_value_t = 16)]
    pub fanout: usize,

    /// Directory receiving state records and coverage logs
    #[arg(long, default_value = "output")]
    pub out_dir: PathBuf,

    /// Output format for the run summary
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Verbosity: error, warn, info, debug, trace
    #[arg(short, long, default_value = "warn")]
    pub verbose: String,

    /// Optional git commit hash for tool metadata
    #[arg(long)]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Source {
    C,
    Rust,
    Go,
    Unknown,
}

impl From<Source> for SourceHint {
    fn from(s: Source) -> Self {
        match s {
            Source::C => SourceHint::C,
            Source::Rust => SourceHint::Rust,
            Source::Go => SourceHint::Go,
            Source::Unknown => SourceHint::Unknown,
        }
    }
}

impl Args {
    /// Build the engine context, reading file presets and the name map.
    pub fn to_context(&self) -> Result<Context> {
        let mut files = Vec::new();
        for path in &self.files {
            let content = std::fs::read(path)
                .with_context(|| format!("failed to read preset file: {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file")
                .to_string();
            files.push(FilePreset { name, content });
        }

        let name_map = match &self.name_map {
            Some(path) => parse_name_map(path)?,
            None => HashMap::new(),
        };

        Ok(Context {
            entry: self.entry.clone(),
            sym_args: self.sym_args,
            sym_arg_len: self.sym_arg_len,
            sym_stdin: self.sym_stdin,
            files,
            name_map,
            source: self.source.into(),
            concrete_globals: self.concrete_globals,
            coverage: self.coverage,
            solver: self.solver.clone(),
            order: if self.bfs {
                SearchOrder::Bfs
            } else {
                SearchOrder::Dfs
            },
            budgets: Budgets {
                max_steps: self.max_steps,
                max_call_depth: self.max_call_depth,
                max_block_depth: self.max_block_depth,
                timeout_secs: self.timeout,
                enum_fanout: self.fanout,
            },
            output_dir: self.out_dir.clone(),
        })
    }
}

fn parse_name_map(path: &PathBuf) -> Result<HashMap<u32, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read name map: {}", path.display()))?;
    let mut map = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((index, name)) = line.split_once(char::is_whitespace) else {
            bail!("name map line {} is not `<index> <name>`", lineno + 1);
        };
        let index: u32 = index
            .parse()
            .with_context(|| format!("bad function index on name map line {}", lineno + 1))?;
        map.insert(index, name.trim().to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let args = Args::parse_from(["seam", "m.wasm"]);
        let ctx = args.to_context().unwrap();
        assert_eq!(ctx.entry, "_start");
        assert_eq!(ctx.order, SearchOrder::Dfs);
        assert_eq!(ctx.budgets.enum_fanout, 16);
        assert!(!ctx.coverage);
    }

    #[test]
    fn bfs_flag_switches_order() {
        let args = Args::parse_from(["seam", "m.wasm", "--bfs"]);
        assert_eq!(args.to_context().unwrap().order, SearchOrder::Bfs);
    }

    #[test]
    fn name_map_parses_index_name_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "# comment\n0 main\n3 check_password\n").unwrap();
        let map = parse_name_map(&path).unwrap();
        assert_eq!(map[&0], "main");
        assert_eq!(map[&3], "check_password");
    }

    #[test]
    fn malformed_name_map_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "not-a-line\n").unwrap();
        assert!(parse_name_map(&path).is_err());
    }
}
