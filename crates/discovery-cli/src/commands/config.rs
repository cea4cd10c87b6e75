//! Config command for managing the settings file

use clap::{Args, Subcommand};

use crate::config::{load_settings, save_settings};
use crate::output::OutputFormat;
use crate::Cli;
use discovery_core::Settings;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show config file path
    Path,
    /// Show the effective settings
    Show,
    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, cli: &Cli) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommands::Path => run_path(cli),
        ConfigCommands::Show => run_show(cli),
        ConfigCommands::Init { force } => run_init(cli, *force),
    }
}

fn run_path(cli: &Cli) -> anyhow::Result<()> {
    println!("{}", cli.config_path().display());
    Ok(())
}

fn run_show(cli: &Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli.config_path())?;
    match OutputFormat::from(cli.format.as_str()) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        OutputFormat::Table => print!("{}", settings.to_toml()?),
    }
    Ok(())
}

fn run_init(cli: &Cli, force: bool) -> anyhow::Result<()> {
    let path = cli.config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    save_settings(&path, &Settings::default())?;
    println!("Created config file at {}", path.display());
    Ok(())
}
