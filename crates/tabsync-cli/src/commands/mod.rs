//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tabsync_core::TabSyncConfig;

pub mod config;
pub mod watch;

/// Live issue updates shared across browser tabs
#[derive(Parser)]
#[command(name = "tabsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "TABSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Event stream URL, overrides the configuration file
    #[arg(long, global = true, env = "TABSYNC_URL")]
    pub url: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open tabs against the event stream and print what they see
    Watch(watch::WatchArgs),

    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    /// Defaults, then the config file, then `--url`.
    pub fn load_config(&self) -> Result<TabSyncConfig> {
        let mut config = match &self.config {
            Some(path) => TabSyncConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => TabSyncConfig::default(),
        };
        if let Some(url) = &self.url {
            config.stream.url = url.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn execute(self) -> Result<()> {
        let config = self.load_config()?;

        match self.command {
            Commands::Watch(args) => watch::execute(args, config, self.verbose).await,
            Commands::Config => config::execute(&config),
        }
    }
}
