//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "erg", version, about = "Smart-trainer ERG controller")]
pub struct Cli {
    /// Path to config TOML (built-in defaults when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ride the simulated trainer through the real control loop
    Ride {
        /// Power target in watts (ERG mode)
        #[arg(long, value_name = "W", conflicts_with = "resistance")]
        target_watts: Option<i32>,
        /// Resistance level target (resistance mode)
        #[arg(long, value_name = "LEVEL")]
        resistance: Option<i32>,
        /// Simulated rider cadence
        #[arg(long, value_name = "RPM", default_value_t = 90)]
        cadence: i32,
        /// Control cycles to run before stopping
        #[arg(long, value_name = "N", default_value_t = 60)]
        cycles: u64,
    },
    /// Inspect or edit the persisted power table
    Table {
        #[command(subcommand)]
        cmd: TableCmd,
    },
    /// Validate configuration and storage access
    SelfCheck,
}

#[derive(Subcommand, Debug)]
pub enum TableCmd {
    /// Print the grid
    Show,
    /// Write observed cells as cadence,watts,position CSV
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Feed CSV rows through the insertion gate and save
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Empty the table and persist the empty grid
    Reset,
}
