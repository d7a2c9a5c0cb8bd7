//! Usage tracker CLI library.
//!
//! Wires the core engine to a platform observer, the SQLite store, the HTTP
//! API and the `ut` subcommands.

pub mod api;
mod cli;
pub mod commands;
mod config;
pub mod platform;
pub mod scheduler;
pub mod store;
pub mod summary;
pub mod tracker;

pub use cli::{Cli, Commands};
pub use config::{Config, ConfigError, DEFAULT_PORT};
pub use store::{SqliteStore, UsageStore};
pub use tracker::{Tracker, TrackerSettings, TrackerStatus};
