//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Desktop application usage tracker.
///
/// Watches the foreground window, separates active from idle time and keeps
/// per-application and per-day statistics in a local database.
#[derive(Debug, Parser)]
#[command(name = "ut", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track usage until interrupted.
    Run {
        /// Do not start the HTTP API.
        #[arg(long)]
        no_server: bool,
    },

    /// Show today's totals and the tracking session.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the usage report of a day.
    Report {
        /// Day to report (YYYY-MM-DD), today by default.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the category an application would be filed under.
    Categorize {
        /// Application display name.
        app: String,

        /// Executable name.
        exe: String,

        /// Window title.
        #[arg(default_value = "")]
        title: String,
    },
}
