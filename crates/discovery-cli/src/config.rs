//! CLI configuration

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use discovery_core::{settings, Settings};

/// Default settings file: `<config dir>/discovery/discovery.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("discovery")
        .join("discovery.toml")
}

/// Load settings, falling back to defaults when the file does not exist
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        tracing::debug!("No settings file at {:?}, using defaults", path);
        return Ok(Settings::default());
    }
    Ok(settings::load(path)?)
}

/// Write settings as TOML, creating parent directories
pub fn save_settings(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, settings.to_toml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
