//! Config command implementation.
//!
//! Manages CLI configuration.

use std::collections::BTreeMap;

use anyhow::Result;
use tabula_ops::{Config, OpsError};

use crate::output::Output;

/// Show current configuration.
pub fn show(config: &Config, out: &Output) -> Result<()> {
    out.emit(Ok(config.clone()), |config| {
        println!("Tabula CLI Configuration");
        println!("{:-<40}", "");

        for key in Config::keys() {
            println!(
                "{:<20} {}",
                format!("{}:", key),
                config.get(key).unwrap_or_else(|| "(not set)".to_string())
            );
        }

        if let Some(config_path) = Config::config_file_path() {
            println!("\nConfig file: {}", config_path.display());
        }
    })
}

/// Set a configuration value.
pub fn set(config: &mut Config, key: &str, value: &str, out: &Output) -> Result<()> {
    let result = config.set(key, value).and_then(|_| config.save());
    out.emit(result, |_| println!("Set {} to: {}", key, value))
}

/// Get a configuration value.
pub fn get(config: &Config, key: &str, out: &Output) -> Result<()> {
    let result = if Config::keys().contains(&key) {
        Ok(config.get(key))
    } else {
        Err(OpsError::Config(format!(
            "Unknown config key: {}. Valid keys: {}",
            key,
            Config::keys().join(", ")
        )))
    };

    out.emit(result, |value| {
        println!("{}", value.as_deref().unwrap_or("(not set)"));
    })
}

/// Reset configuration to defaults.
pub fn reset(out: &Output) -> Result<()> {
    out.emit(Config::default().save(), |_| {
        println!("Configuration reset to defaults");
    })
}

/// Show path to config file.
pub fn path(out: &Output) -> Result<()> {
    let mut paths = BTreeMap::new();
    if let Some(path) = Config::config_file_path() {
        paths.insert("config_file", path.display().to_string());
    }

    out.emit(Ok(paths), |paths| match paths.get("config_file") {
        Some(path) => println!("{}", path),
        None => println!("(no config file path available)"),
    })
}
