//! Configuration view and validation commands: `pagesmith config`.

use anyhow::{Context, Result};
use std::path::Path;

use pagesmith::config::{DEFAULT_CONFIG_FILE, PagesmithConfig};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = PagesmithConfig::load(cli.config.as_deref())?;
            match cli.config.as_deref() {
                Some(path) => println!("# Config file: {}", path.display()),
                None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                    println!("# Config file: {}", DEFAULT_CONFIG_FILE)
                }
                None => println!("# No config file; defaults plus environment"),
            }
            println!();
            print!("{}", config.to_display_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            let config = PagesmithConfig::load(cli.config.as_deref())?;
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                anyhow::bail!("{} configuration problem(s) found", problems.len());
            }
        }
        Some(ConfigCommands::Init { force }) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                );
            }
            let content = toml::to_string_pretty(&PagesmithConfig::default())
                .context("Failed to serialize default configuration")?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
