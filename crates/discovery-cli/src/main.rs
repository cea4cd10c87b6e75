//! Discovery CLI - Command line interface for the search backend

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, config as config_cmd, search, update_index};
use discovery_core::Settings;
use discovery_engine::HttpConnection;
use discovery_search::SearchBackend;

#[derive(Parser)]
#[command(name = "discovery")]
#[command(author, version, about = "Faceted search and index rebuilds for the course catalog")]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "DISCOVERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings file path
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(config::default_config_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the index
    Search(search::SearchArgs),
    /// Build a new index and point the alias at it
    UpdateIndex(update_index::UpdateIndexArgs),
    /// Manage the settings file
    Config(config_cmd::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with the engine connection and settings
pub struct AppContext {
    pub settings: Settings,
    pub connection: Arc<HttpConnection>,
}

impl AppContext {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let settings = config::load_settings(&cli.config_path())?;
        tracing::debug!("Using engine at {}", settings.engine.url);

        let connection = HttpConnection::from_settings(&settings.engine)?;

        Ok(Self {
            settings,
            connection: Arc::new(connection),
        })
    }

    pub fn backend(&self) -> SearchBackend {
        SearchBackend::new(self.connection.clone(), self.settings.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting discovery CLI");

    match &cli.command {
        Commands::Search(args) => {
            let ctx = AppContext::new(&cli)?;
            search::run(args, &cli, &ctx).await?
        }
        Commands::UpdateIndex(args) => update_index::run(args, &cli).await?,
        Commands::Config(args) => config_cmd::run(args, &cli)?,
        Commands::Completions(args) => completions::run(args)?,
    }

    Ok(())
}
