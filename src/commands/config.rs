//! Config command - inspect and initialize configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub command: ConfigSubCmd,
}

#[derive(Subcommand)]
pub enum ConfigSubCmd {
    /// Show current configuration
    Show,

    /// Print the config file path
    Path,

    /// Write the current configuration (defaults if none) to disk
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCmd {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            ConfigSubCmd::Show => {
                let config = Config::load()?;
                let path = Config::config_path()?;
                println!("# {}", path.display());
                if !path.exists() {
                    println!("# (file not found, showing defaults)");
                }
                println!();
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to serialize config")?
                );
            }
            ConfigSubCmd::Path => {
                println!("{}", Config::config_path()?.display());
            }
            ConfigSubCmd::Init { force } => {
                let path = Config::config_path()?;
                if path.exists() && !force {
                    println!("Config already exists at {} (use --force to overwrite).", path.display());
                    return Ok(());
                }
                Config::load()?.save()?;
                println!("Config written to {}", path.display());
            }
        }

        Ok(())
    }
}
