// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::ConfigOverrides;
use crate::types::{ExecutionMode, ResourceContext};

/// Command-line arguments for `genedag`.
///
/// Every run setting can also be given in the config file's `[run]` section;
/// flags given here win.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "genedag",
    version,
    about = "Run the MAGMA gene-set analysis as a dependency-scheduled task graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "genedag.toml")]
    pub config: PathBuf,

    /// Summary statistics file (plain text or gzip).
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Study sample size passed to MAGMA as `N=`.
    #[arg(long, value_name = "N")]
    pub sample_size: Option<u64>,

    /// Directory receiving the merged results.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Execution mode: local or drmaa (qsub is parsed but rejected).
    #[arg(long, value_name = "MODE")]
    pub mode: Option<ExecutionMode>,

    /// Resource context: default, broad or lisa.
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<ResourceContext>,

    /// Parent directory for the run's artifact store.
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Maximum number of tasks running at once.
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GENEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config, print the task graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input: self.input.clone(),
            sample_size: self.sample_size,
            output_dir: self.output_dir.clone(),
            mode: self.mode,
            context: self.context,
            store_dir: self.store_dir.clone(),
            max_parallel: self.max_parallel,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
