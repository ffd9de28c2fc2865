use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Default number of events printed by `ottwatch events`.
pub const DEFAULT_EVENTS_LIMIT: usize = 100;

#[derive(Parser, Debug)]
#[command(
    name = "ottwatch",
    version,
    about = "Streaming service playability monitor with identity rotation"
)]
pub struct Cli {
    /// Config file (default: <data dir>/config.toml)
    #[arg(long, env = "OTTWATCH_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "OTTWATCH_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "OTTWATCH_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the monitor loop; NDJSON control commands on stdin, live events on stdout
    Run,
    /// Run a single tick and print the resulting status
    Once,
    /// Print recent events from the event log, newest first
    Events {
        /// Maximum number of events to print
        #[arg(long, default_value_t = DEFAULT_EVENTS_LIMIT)]
        limit: usize,
    },
    /// Print the good/bad identity sets
    Reputation,
    /// Write a starter config file if none exists
    Init,
    /// Show version information
    Version,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(ottwatch_common::paths::config_path)
    }

    /// Effective filter directive after `-v` flags.
    pub fn log_directive(&self) -> &str {
        match self.verbose {
            0 => self.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    }
}
