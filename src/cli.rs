//! # Command Line
//!
//! ```bash
//! ark-restic server --log-level debug --default-backup-storage-location default
//! ```

use crate::constants::DEFAULT_BACKUP_STORAGE_LOCATION;
use clap::{Parser, Subcommand, ValueEnum};

/// restic node agent for pod volume backups and restores
#[derive(Debug, Parser)]
#[command(name = "ark-restic", about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the restic server on this node
    Server(ServerArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct ServerArgs {
    /// The level at which to log
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Name of the backup storage location used to provision repository credentials
    #[arg(long, default_value = DEFAULT_BACKUP_STORAGE_LOCATION)]
    pub default_backup_storage_location: String,
}

/// Accepted log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Panic,
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// `EnvFilter` directive for this crate and its dependencies
    ///
    /// `panic` and `fatal` have no tracing equivalent and map to `error`.
    pub fn directive(self) -> &'static str {
        match self {
            Self::Panic | Self::Fatal | Self::Error => "restic_node_agent=error,ark_restic=error,warn",
            Self::Warning => "restic_node_agent=warn,ark_restic=warn,warn",
            Self::Info => "restic_node_agent=info,ark_restic=info,warn",
            Self::Debug => "restic_node_agent=debug,ark_restic=debug,info",
        }
    }
}
