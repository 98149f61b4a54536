//! `dupsubtree` CLI: wraps the core hashing pipeline, duplicate engine, and
//! report reader behind three subcommands (`hash`, `dupes`, `inspect`).

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use std::collections::HashSet;

use dupsubtree::{
    find_duplicates,
    logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput},
    pipeline::{run_pipeline, PipelineConfig},
    report::{ReportHead, ReportReader},
    walk::{ExclusionRules, WalkOrder},
    HashMode,
};

#[derive(Debug, Parser)]
#[command(name = "dupsubtree", about = "Duplicate file and subtree detector")]
struct Cli {
    /// Use verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk a directory tree, hash every node, and write a report.
    Hash {
        /// Root directory to hash.
        root: Utf8PathBuf,

        /// Hash algorithm (spec §4.1), e.g. sha-256, sha-1, crc32, fnv-1a-64.
        #[arg(long, default_value = "sha-256")]
        algo: String,

        /// Whether to fold each node's basename into its digest.
        #[arg(long, value_enum, default_value = "empty")]
        mode: ModeArg,

        /// Child traversal order within a directory.
        #[arg(long, value_enum, default_value = "dfs")]
        order: OrderArg,

        /// Number of concurrent file-hashing workers.
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Exact basenames to exclude from traversal.
        #[arg(long = "exclude-name")]
        exclude_name: Vec<String>,

        /// Regex patterns matched against basenames to exclude.
        #[arg(long = "exclude-regex")]
        exclude_regex: Vec<String>,

        /// Root-relative subtree paths to exclude entirely.
        #[arg(long = "exclude-tree")]
        exclude_tree: Vec<Utf8PathBuf>,

        /// Treat unreadable directories as empty instead of aborting.
        #[arg(long)]
        ignore_permission_errors: bool,

        /// Name recorded in the report head for this root.
        #[arg(long, default_value = "root")]
        node_name: String,

        /// Report output path.
        #[arg(long, short)]
        out: Utf8PathBuf,
    },

    /// Find duplicate subtrees and files across 2-16 reports.
    Dupes {
        /// Report files produced by `hash`.
        #[arg(required = true, num_args = 2..=16)]
        reports: Vec<Utf8PathBuf>,
    },

    /// Print a report's head line, or the tail line for one path.
    Inspect {
        /// Report file to inspect.
        report: Utf8PathBuf,

        /// Root-relative path to look up.
        #[arg(long)]
        path: Option<Utf8PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Basename,
    Empty,
}

impl From<ModeArg> for HashMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Basename => HashMode::Basename,
            ModeArg::Empty => HashMode::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OrderArg {
    Dfs,
    Bfs,
}

impl From<OrderArg> for WalkOrder {
    fn from(o: OrderArg) -> Self {
        match o {
            OrderArg::Dfs => WalkOrder::Dfs,
            OrderArg::Bfs => WalkOrder::Bfs,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig {
        level: if cli.verbose { LogLevel::Debug } else { LogLevel::Info },
        format: LogFormat::Compact,
        output: LogOutput::Stdout,
    })?;

    match cli.command {
        Command::Hash {
            root,
            algo,
            mode,
            order,
            workers,
            exclude_name,
            exclude_regex,
            exclude_tree,
            ignore_permission_errors,
            node_name,
            out,
        } => run_hash(
            root,
            algo,
            mode.into(),
            order.into(),
            workers,
            exclude_name,
            exclude_regex,
            exclude_tree,
            ignore_permission_errors,
            node_name,
            out,
        ),
        Command::Dupes { reports } => run_dupes(reports),
        Command::Inspect { report, path } => run_inspect(report, path),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_hash(
    root: Utf8PathBuf,
    algo: String,
    mode: HashMode,
    order: WalkOrder,
    workers: usize,
    exclude_name: Vec<String>,
    exclude_regex: Vec<String>,
    exclude_tree: Vec<Utf8PathBuf>,
    ignore_permission_errors: bool,
    node_name: String,
    out: Utf8PathBuf,
) -> Result<()> {
    let mut regexes = Vec::with_capacity(exclude_regex.len());
    for pattern in &exclude_regex {
        regexes.push(regex::Regex::new(pattern).with_context(|| format!("invalid --exclude-regex pattern '{pattern}'"))?);
    }

    let exclusions = ExclusionRules {
        basenames: exclude_name.into_iter().collect::<HashSet<_>>(),
        regexes,
        subtrees: exclude_tree.into_iter().collect::<HashSet<_>>(),
    };

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();

    let config = PipelineConfig {
        root,
        hash_algo: algo,
        mode,
        order,
        workers,
        ignore_permission_errors,
        exclusions,
        node_name,
        timestamp,
    };

    run_pipeline(&config, &out).context("hashing pipeline failed")?;
    tracing::info!(out = %out, "wrote report");
    Ok(())
}

fn run_dupes(reports: Vec<Utf8PathBuf>) -> Result<()> {
    let sets = find_duplicates(&reports).context("duplicate detection failed")?;
    tracing::info!(sets = sets.len(), "found duplicate sets");

    for set in &sets {
        for member in &set.members {
            println!("{} {}", reports[member.report_index], member.path);
        }
        println!();
    }
    Ok(())
}

fn run_inspect(report: Utf8PathBuf, path: Option<Utf8PathBuf>) -> Result<()> {
    let mut reader = ReportReader::open(&report).context("failed to open report")?;
    print_head(&report)?;

    let Some(target) = path else {
        return Ok(());
    };

    while let Some((_, tail)) = reader.next_tail()? {
        if tail.path == target {
            println!("{} {} {} {}", tail.digest_hex, tail.node_type.as_byte() as char, tail.size, tail.path);
            return Ok(());
        }
    }

    bail!("path '{target}' not found in report");
}

fn print_head(report: &Utf8Path) -> Result<()> {
    let text = std::fs::read_to_string(report.as_std_path()).with_context(|| format!("failed to read {report}"))?;
    let first_line = text.lines().next().context("empty report file")?;
    let head = ReportHead::parse_line(first_line).map_err(|e| anyhow::anyhow!(e))?;
    println!(
        "version={}.{}.{} timestamp={} algo={} mode={} name={} base={}",
        head.version.0, head.version.1, head.version.2, head.timestamp, head.hash_algo, head.mode, head.node_name, head.base_path,
    );
    Ok(())
}
