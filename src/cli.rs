//! CLI module - Command-line interface definitions and handlers

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::Settings;
use crate::core::error::ReelError;
use crate::core::logging::LogFormat;
use crate::core::model::{Record, RecordSet};
use crate::core::output::{OutputConfig, OutputFormat, Renderer};
use crate::core::paths::absolutize;

/// reel - a media source cache and incremental render driver.
#[derive(Parser, Debug)]
#[command(name = "reel")]
#[command(
    author,
    version,
    about,
    long_about = r#"reel turns source references (URLs or local files) into cached, probed media
exactly once, and re-renders planned outputs only when their inputs change.

Every command prints records in the selected format (default: jsonl).
Diagnostics go to stderr.

Output formats:
- jsonl: one JSON object per line
- json: a single JSON array
- md: human-friendly Markdown

Examples:
    reel resolve https://example.com/watch?v=abc123 clips/intro.mov
    reel resolve --rows rows.txt --reprobe
    reel cache list
    reel plan plan.json --prune
    reel render plan.json --workers 4
    reel migrate --library ~/media-library --dry-run
"#
)]
pub struct Cli {
    /// Project root directory.
    #[arg(
        long,
        global = true,
        default_value = ".",
        value_name = "ROOT",
        long_help = "Project root directory (defaults to the current directory).\n\n\
Relative local references, plan output paths and --cache-dir are resolved against it."
    )]
    pub root: PathBuf,

    /// Project cache directory (default: ROOT/.reel).
    #[arg(long, global = true, env = "REEL_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Shared library directory used by migrate.
    #[arg(long, global = true, env = "REEL_LIBRARY", value_name = "DIR")]
    pub library: Option<PathBuf>,

    /// Downloader executable.
    #[arg(
        long,
        global = true,
        env = "REEL_DOWNLOADER",
        default_value = "yt-dlp",
        value_name = "CMD"
    )]
    pub downloader: String,

    /// Prober executable.
    #[arg(
        long,
        global = true,
        env = "REEL_PROBER",
        default_value = "ffprobe",
        value_name = "CMD"
    )]
    pub prober: String,

    /// Kill a download/probe that runs longer than SECS (0 = no limit).
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        long_help = "Impose a deadline on each external download or probe.\n\n\
There is no timeout unless this is given; a stuck tool otherwise waits forever."
    )]
    pub fetch_timeout: Option<u64>,

    /// Output format (jsonl/json/md).
    #[arg(long, global = true, default_value = "jsonl", value_name = "FORMAT")]
    pub format: String,

    /// Pretty-print JSON/JSONL output with indentation.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Quiet mode (warnings and errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug diagnostics).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Enable debug diagnostics on stderr. RUST_LOG overrides this when set."
    )]
    pub verbose: bool,

    /// Diagnostic log format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve references into the project cache.
    #[command(
        long_about = "Resolve each reference to a cached, probed file. URLs are downloaded with the\n\
configured downloader; local paths are copied into the cache. A cached, live entry is\n\
reused without touching the network or the prober.\n\n\
Rows are processed in order. A failing row is reported and the batch continues; the\n\
index is saved once at the end. Exits non-zero if any row failed.\n\n\
Examples:\n\
  reel resolve https://example.com/v/1\n\
  reel resolve --rows rows.txt --force\n"
    )]
    Resolve {
        /// References (URL or local path).
        #[arg(value_name = "REF")]
        references: Vec<String>,

        /// File with one reference per line (# comments allowed).
        #[arg(long, value_name = "FILE")]
        rows: Option<PathBuf>,

        /// Re-fetch even when a cached copy exists.
        #[arg(long)]
        force: bool,

        /// Re-run the prober even when metadata is stored.
        #[arg(long)]
        reprobe: bool,
    },

    /// Inspect or prune the cache index.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Show which plan segments would render, and why.
    #[command(
        long_about = "Classify every segment of a render plan as skip or render.\n\n\
Reasons, in order of precedence: forced, new, config_changed, input_changed,\n\
output_missing.\n"
    )]
    Plan {
        /// Render plan JSON file.
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Treat every segment as stale.
        #[arg(long)]
        force: bool,

        /// Drop stored state for outputs no longer in the plan.
        #[arg(long)]
        prune: bool,
    },

    /// Render stale segments of a plan.
    Render {
        /// Render plan JSON file.
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Re-render every segment.
        #[arg(long)]
        force: bool,

        /// Worker count (default: plan setting, 0 = logical CPUs).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Move the project cache into the shared library.
    #[command(
        long_about = "Reconcile the project cache with the shared library (--library / REEL_LIBRARY).\n\n\
Files are moved, duplicates detected by size, name clashes suffixed, and live library\n\
entries are never overwritten. Unreferenced files are moved as orphans and links are\n\
merged. --dry-run prints the identical decisions without touching anything.\n"
    )]
    Migrate {
        /// Report decisions without moving files or writing indexes.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check external tool dependencies.
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List all cache entries.
    List,

    /// Show one entry by identifier, URL or local path.
    Show {
        #[arg(value_name = "REF")]
        reference: String,
    },

    /// Remove entries whose cached file is gone.
    Prune {
        /// Report what would be removed without writing the index.
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    pub fn settings(&self) -> Settings {
        let cwd = std::env::current_dir().unwrap_or_default();
        let root = absolutize(&cwd, &self.root);
        Settings::new(&root)
            .with_cache_dir(self.cache_dir.as_deref())
            .with_library(self.library.as_deref())
            .with_tools(&self.downloader, &self.prober)
            .with_fetch_timeout(self.fetch_timeout)
    }

    pub fn output_config(&self) -> Result<OutputConfig> {
        let format: OutputFormat = self.format.parse().map_err(anyhow::Error::msg)?;
        Ok(OutputConfig::with_pretty(format, self.pretty))
    }
}

/// Run the CLI
///
/// Typed failures that abort a command are also printed as an `error` record,
/// so stdout consumers see them in the selected format.
pub fn run(cli: Cli) -> Result<()> {
    let output = cli.output_config()?;
    let settings = cli.settings();

    let result = dispatch(cli.command, &settings, output);
    if let Err(e) = &result {
        if let Some(reel) = e.downcast_ref::<ReelError>() {
            let records: RecordSet = std::iter::once(Record::error(reel.to_issue())).collect();
            Renderer::with_config(output).print(&records);
        }
    }
    result
}

fn dispatch(command: Commands, settings: &Settings, output: OutputConfig) -> Result<()> {
    match command {
        Commands::Resolve {
            references,
            rows,
            force,
            reprobe,
        } => crate::flows::resolve::run_resolve(
            settings,
            &references,
            rows.as_deref(),
            force,
            reprobe,
            output,
        ),

        Commands::Cache { action } => match action {
            CacheCommands::List => crate::flows::cache::run_list(settings, output),
            CacheCommands::Show { reference } => {
                crate::flows::cache::run_show(settings, &reference, output)
            }
            CacheCommands::Prune { dry_run } => {
                crate::flows::cache::run_prune(settings, dry_run, output)
            }
        },

        Commands::Plan { plan, force, prune } => {
            crate::flows::render::run_plan(settings, &plan, force, prune, output)
        }

        Commands::Render {
            plan,
            force,
            workers,
        } => crate::flows::render::run_render(settings, &plan, force, workers, output),

        Commands::Migrate { dry_run } => {
            crate::flows::migrate::run_migrate(settings, dry_run, output)
        }

        Commands::Doctor => crate::backends::doctor::run_doctor(settings, output),
    }
}
