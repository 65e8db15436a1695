//! Configuration loading, view and validation - `itemhub config`.

use std::path::Path;

use anyhow::Result;
use itemhub::config::ServiceConfig;

use super::super::ConfigCommands;

/// File values first, then `ITEMHUB_*` environment overrides.
pub fn resolve_config(path: &Path) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load_or_default(path)?;
    config.apply_env()?;
    Ok(config)
}

pub fn cmd_config(path: &Path, config: &ServiceConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if path.exists() {
                println!("# Config file: {}", path.display());
            } else {
                println!("# No config file at {}, showing defaults", path.display());
            }
            print!("{}", config.to_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
            } else {
                for problem in &problems {
                    println!("  - {}", problem);
                }
                anyhow::bail!("Configuration has {} problem(s)", problems.len());
            }
        }
    }
    Ok(())
}
