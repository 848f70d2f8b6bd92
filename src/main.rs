//! # semdedup CLI
//!
//! ## Usage
//!
//! ```bash
//! semdedup --config ./config/semdedup.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `semdedup build` | Index a record file (rebuild, append, or refine) |
//! | `semdedup dedupe` | Index records, then print duplicate groups |
//! | `semdedup scan <dir>` | Scan a directory into a JSON record file |
//! | `semdedup search "<query>"` | Print the closest stored names |
//!
//! ## Examples
//!
//! ```bash
//! # Fresh index from a name list
//! semdedup build --input games.txt
//!
//! # Add only names not already indexed
//! semdedup build --mode append --input new_games.txt
//!
//! # Re-embed every stored name with the current model
//! semdedup build --mode refine
//!
//! # Group near-duplicate files, weighting size and modification time
//! semdedup dedupe --fs ./downloads --check-size --check-mtime --threshold 0.8
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use semdedup::build_cmd::{self, BuildOptions};
use semdedup::config;
use semdedup::connector_fs;
use semdedup::dedupe_cmd::{self, DedupeOptions};
use semdedup::ingest;
use semdedup::progress::EventMode;
use semdedup::search;
use semdedup_core::lifecycle::IndexMode;

/// semdedup: near-duplicate grouping over a vector-search index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "semdedup",
    about = "Near-duplicate grouping for short text records over a vector-search index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/semdedup.toml")]
    config: PathBuf,

    /// Verbose logging (same as RUST_LOG=debug).
    #[arg(long, global = true)]
    debug: bool,

    /// Event output format.
    #[arg(long, global = true, value_enum, default_value = "human")]
    events: EventMode,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Embed records and write them to the index.
    ///
    /// `rebuild` drops and recreates the index. `append` keeps it and adds
    /// only names not already stored, numbering them after the current
    /// maximum id. `refine` re-embeds every stored name and takes no input.
    Build {
        /// Index mode: rebuild, append, or refine. Defaults to `indexing.mode`.
        #[arg(long)]
        mode: Option<IndexMode>,

        /// Name list (.txt) or JSON record file. Defaults to `indexing.input`.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Documents per index write.
        #[arg(long)]
        write_batch: Option<usize>,

        /// Texts per embedding call.
        #[arg(long)]
        embed_batch: Option<usize>,
    },

    /// Index records and print groups of near-duplicates.
    Dedupe {
        /// Name list (.txt) or JSON record file.
        #[arg(short, long, conflicts_with = "fs")]
        input: Option<PathBuf>,

        /// Scan this directory instead of reading an input file.
        #[arg(long)]
        fs: Option<PathBuf>,

        /// Where a filesystem scan is saved.
        #[arg(long, default_value = "fs_scan.json")]
        output_json: PathBuf,

        /// Index mode: rebuild or append.
        #[arg(long)]
        mode: Option<IndexMode>,

        /// Minimum composite score for a pair to count as duplicates.
        #[arg(long)]
        threshold: Option<f64>,

        /// Neighbors requested per item.
        #[arg(long)]
        top_k: Option<usize>,

        /// Seconds over which time similarity decays to zero.
        #[arg(long)]
        time_window: Option<f64>,

        /// Score both ctime and mtime.
        #[arg(long)]
        check_time: bool,

        /// Score ctime.
        #[arg(long)]
        check_ctime: bool,

        /// Score mtime.
        #[arg(long)]
        check_mtime: bool,

        /// Score file size.
        #[arg(long)]
        check_size: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Scan a directory into a JSON record file without indexing.
    Scan {
        /// Directory to walk.
        dir: PathBuf,

        /// Output path.
        #[arg(short, long, default_value = "fs_scan.json")]
        output: PathBuf,

        /// Extra exclude globs, matched against paths relative to `dir`.
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Print the stored names closest to a query.
    Search {
        /// Query text.
        query: String,

        /// Number of results. Defaults to `dedupe.top_k`.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let cfg = config::load_config_or_default(&cli.config)?;
    let events = cli.events.sink(cli.debug);

    match cli.command {
        Commands::Build {
            mode,
            input,
            write_batch,
            embed_batch,
        } => {
            let opts = BuildOptions {
                mode,
                input,
                write_batch,
                embed_batch,
            };
            build_cmd::run_build(&cfg, opts, events.as_ref()).await?;
        }
        Commands::Dedupe {
            input,
            fs,
            output_json,
            mode,
            threshold,
            top_k,
            time_window,
            check_time,
            check_ctime,
            check_mtime,
            check_size,
            json,
        } => {
            let opts = DedupeOptions {
                input,
                fs,
                output_json: Some(output_json),
                mode,
                threshold,
                top_k,
                time_window,
                check_time,
                check_ctime,
                check_mtime,
                check_size,
                json,
            };
            dedupe_cmd::run_dedupe(&cfg, opts, events.as_ref()).await?;
        }
        Commands::Scan {
            dir,
            output,
            exclude,
        } => {
            let mut excludes = cfg.dedupe.exclude_globs.clone();
            excludes.extend(exclude);
            let records = connector_fs::scan_filesystem(&dir, &excludes)?;
            ingest::dump_records_json(&records, &output)?;
            println!(
                "Wrote scan output to {} ({} records)",
                output.display(),
                records.len()
            );
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
    }

    Ok(())
}
