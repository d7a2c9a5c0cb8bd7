use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ut_cli::commands::{categorize, report, run, status};
use ut_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(ut_db::Database, Config)> {
    let config = load_config(config_path)?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = ut_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match &cli.command {
        Some(Commands::Run { no_server }) => {
            let config = load_config(cli.config.as_deref())?;
            run::run(&config, *no_server)?;
        }
        Some(Commands::Status { json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let today = Local::now().date_naive();
            status::run(&mut std::io::stdout(), &db, &config, today, *json)?;
        }
        Some(Commands::Report { date, json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let categories = config.category_table()?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            report::run(&db, &categories, date, *json)?;
        }
        Some(Commands::Categorize { app, exe, title }) => {
            let config = load_config(cli.config.as_deref())?;
            let categories = config.category_table()?;
            categorize::run(&mut std::io::stdout(), &categories, app, exe, title)?;
        }
        None => {
            println!("ut - desktop application usage tracker");
            println!("Run 'ut --help' for usage information.");
        }
    }

    Ok(())
}
