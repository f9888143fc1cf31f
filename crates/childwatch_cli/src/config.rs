//! Command-line and environment configuration.
//!
//! Every option can come from a flag or its environment variable; `.env` is
//! loaded by `main` before parsing.

use chrono::NaiveDate;
use childwatch_core::default_log_level;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::time::Duration;

/// childwatch - register and search reports of missing children
#[derive(Parser, Debug)]
#[command(name = "childwatch", version)]
pub struct Cli {
    /// SQLite database location: file path, `sqlite://path`, or `:memory:`
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error); defaults per build mode
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rotating log files; stderr when unset
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<String>,

    /// Per-command deadline in milliseconds
    #[arg(long, env = "TIMEOUT_MS", default_value_t = 5_000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured log level, or the build-mode default when unset.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a new case and print it as JSON
    Add(NewCaseArgs),
    /// Print one case by id
    Get {
        id: String,
    },
    /// List cases matching all given filters
    Find {
        /// Case-insensitive part of the full name
        #[arg(long, default_value = "")]
        name: String,
        /// Exact status
        #[arg(long, default_value = "")]
        status: String,
        /// Case-insensitive part of the location
        #[arg(long, default_value = "")]
        location: String,
    },
    /// Change status and/or photos of an existing case
    Update {
        id: String,
        #[arg(long)]
        status: Option<String>,
        /// Replacement photo list; repeat for several photos
        #[arg(long = "photo", conflicts_with = "clear_photos")]
        photos: Vec<String>,
        /// Remove every photo
        #[arg(long)]
        clear_photos: bool,
    },
    /// Delete a case by id
    Delete {
        id: String,
    },
}

#[derive(ClapArgs, Debug)]
pub struct NewCaseArgs {
    /// Case id; generated when omitted
    #[arg(long, default_value = "")]
    pub id: String,
    #[arg(long)]
    pub full_name: String,
    #[arg(long, allow_negative_numbers = true)]
    pub age: i32,
    /// Birth date as YYYY-MM-DD
    #[arg(long)]
    pub birth_date: NaiveDate,
    /// masculino, femenino or otro
    #[arg(long)]
    pub gender: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "")]
    pub location: String,
    /// Photo URI; repeat for several photos
    #[arg(long = "photo")]
    pub photos: Vec<String>,
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub email: String,
    /// Initial status; `activo` when omitted
    #[arg(long, default_value = "")]
    pub status: String,
}
