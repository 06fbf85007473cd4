//! toolcache CLI: hook adapters and operator commands for the tool result cache.
//!
//! `toolcache pre` and `toolcache post` speak the host's JSON hook protocol on
//! stdin/stdout and never fail the call they wrap. `toolcache stats`,
//! `toolcache clear` and `toolcache sweep` inspect and maintain the shared
//! cache directory.

#![warn(missing_docs)]

mod context;
mod hook;
mod report;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Replay idempotent agent tool calls from a shared cache.
#[derive(Parser, Debug)]
#[command(name = "toolcache", version, about = "Result cache for agent tool calls")]
pub struct Cli {
    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log per-call cache decisions.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `toolcache.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding cache entries.
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pre-tool hook: answer from the cache or let the call run.
    Pre,
    /// Post-tool hook: record the result and invalidate stale entries.
    Post,
    /// Show what the cache holds.
    Stats {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Remove every cache entry.
    Clear,
    /// Remove expired cache entries.
    Sweep {
        /// Examine every entry instead of a bounded random sample.
        #[arg(long)]
        all: bool,
    },
}

/// Operator report format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to log errors only.
    pub quiet: bool,
    /// Whether to log debug information.
    pub verbose: bool,
    /// Optional path to a configuration file.
    pub config: Option<PathBuf>,
    /// Optional cache directory override.
    pub cache_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        cache_dir: cli.cache_dir,
    };

    let config = context::load_config(&global);
    context::init_logging(&global, config.as_ref().ok());

    let result = match cli.command {
        Command::Pre => hook::run(hook::HookKind::Pre, config, &global),
        Command::Post => hook::run(hook::HookKind::Post, config, &global),
        Command::Stats { format } => config
            .map_err(Into::into)
            .and_then(|config| report::stats(&config, &global, format)),
        Command::Clear => config
            .map_err(Into::into)
            .and_then(|config| report::clear(&config, &global)),
        Command::Sweep { all } => config
            .map_err(Into::into)
            .and_then(|config| report::sweep(&config, &global, all)),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
