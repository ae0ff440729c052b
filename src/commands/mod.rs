pub mod config;
pub mod init;
pub mod links;
pub mod sync;
pub mod unlink;

use anyhow::{Context, Result};
use asana2calendar_core::{AppConfig, Store};

pub fn load_config() -> Result<AppConfig> {
    let path = AppConfig::config_path()?;
    if !path.exists() {
        anyhow::bail!(
            "No config found at {}.\n\n\
            Create a template with:\n  \
            asana2calendar config",
            path.display()
        );
    }
    AppConfig::load_from(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Open the store for the currently enabled adapters.
pub fn open_store(config: &AppConfig) -> Result<Store> {
    let path = config.database_path();
    if !path.exists() {
        anyhow::bail!(
            "No link store at {}.\n\n\
            Create it with:\n  \
            asana2calendar init",
            path.display()
        );
    }
    Ok(Store::open(&path, &config.adapter_names())?)
}
