//! Configuration view and validation commands: `cockpit config`.

use std::path::Path;

use anyhow::Result;

use cockpit::config::{CliOverrides, CockpitConfig, project_config_path};

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &Path,
    overrides: &CliOverrides,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let (config, path) = CockpitConfig::resolve(project_dir, overrides)?;

            println!();
            println!("Cockpit Configuration");
            println!("=====================");
            println!();
            match &path {
                Some(p) => println!("Config file: {}", p.display()),
                None => println!("No cockpit.toml found, using defaults."),
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("[server]");
            println!("  base_url = \"{}\"", config.server.base_url);
            println!(
                "  request_timeout_secs = {}",
                config.server.request_timeout_secs
            );
            println!(
                "  research_session_limit = {}",
                config.server.research_session_limit
            );
            println!("[polling]");
            println!("  interval_ms = {}", config.polling.interval_ms);
            println!("[ghosts]");
            println!("  lifetime_ms = {}", config.ghosts.lifetime_ms);
            println!("  exit_ms = {}", config.ghosts.exit_ms);
            println!("  max_ghosts = {}", config.ghosts.max_ghosts);
            println!("[logging]");
            println!("  json = {}", config.logging.json);
            if let Some(dir) = &config.logging.file_dir {
                println!("  file_dir = \"{}\"", dir.display());
            }
            println!();

            if path.is_none() {
                println!("Run 'cockpit config init' to create a cockpit.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let (config, path) = CockpitConfig::resolve(project_dir, overrides)?;
            if path.is_none() {
                println!("No cockpit.toml found. Checking defaults with env/CLI overrides.");
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = overrides
                .config_path
                .clone()
                .unwrap_or_else(|| project_config_path(project_dir));
            if config_path.exists() {
                println!("cockpit.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            CockpitConfig::default().save(&config_path)?;

            println!("Created cockpit.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] base_url, request_timeout_secs");
            println!("  - [polling] interval_ms");
            println!("  - [ghosts] lifetime_ms, exit_ms, max_ghosts");
            println!("  - [logging] json, file_dir");
            println!();
        }
    }

    Ok(())
}
