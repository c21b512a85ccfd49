//! Handler functions for config CLI commands.
//!
//! Implements `tandem config {path,show,get,init}`.

use crate::cli::ConfigAction;
use crate::config::TandemConfig;
use std::path::{Path, PathBuf};
use tandem_core::{Error, Result};

/// Handle a config subcommand.
///
/// Receives the raw `--config` path (not a loaded config) because some
/// commands (path, init) work before a config file exists.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => cmd_config_path(config_path),
        ConfigAction::Show => {
            let config = TandemConfig::load(config_path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Get { key } => {
            let config = TandemConfig::load(config_path)?;
            println!("{}", format_toml_value(&config.get(&key)?));
            Ok(())
        }
        ConfigAction::Init { file, force } => {
            let path = match file {
                Some(p) => PathBuf::from(p),
                None => TandemConfig::default_config_path()
                    .ok_or_else(|| Error::config("Could not determine config directory"))?,
            };
            write_default_config(&path, force)?;
            println!("Config file created at {}", path.display());
            Ok(())
        }
    }
}

/// Show the resolved config file path.
fn cmd_config_path(config_path: Option<&str>) -> Result<()> {
    match TandemConfig::resolve_config_path(config_path) {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist, run `tandem config init` to create it)");
            }
            Ok(())
        }
        None => Err(Error::config(
            "Could not determine config directory for this platform",
        )),
    }
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TandemConfig::default().to_toml_string()?)?;
    Ok(())
}

/// Format a TOML value for display on stdout.
fn format_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(_) | toml::Value::Array(_) => {
            toml::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}
