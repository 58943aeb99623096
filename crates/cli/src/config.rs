use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rethread_core::RuntimeConfig;
use tracing::debug;

/// Return the default config file path: ~/.config/rethread/config.toml
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("could not determine user config directory")?
        .join("rethread");
    Ok(config_dir.join("config.toml"))
}

/// Load runtime config.
///
/// An explicit path must exist. Without one the default path is used when
/// present, otherwise the config comes from the environment alone.
pub fn load(path: Option<&str>) -> Result<RuntimeConfig> {
    if let Some(p) = path {
        return from_path(Path::new(p));
    }

    match default_config_path().ok() {
        Some(config_path) if config_path.exists() => from_path(&config_path),
        _ => {
            debug!("No config file, using environment and defaults");
            let config = RuntimeConfig::from_env();
            config.validate().context("invalid runtime config from environment")?;
            Ok(config)
        }
    }
}

fn from_path(config_path: &Path) -> Result<RuntimeConfig> {
    debug!(?config_path, "Loading config");
    RuntimeConfig::from_file(config_path)
        .with_context(|| format!("failed to load config: {}", config_path.display()))
}
