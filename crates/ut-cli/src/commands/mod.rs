//! CLI subcommand implementations.

pub mod categorize;
pub mod report;
pub mod run;
pub mod status;
