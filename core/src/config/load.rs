use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AppConfig;

/// Per-user data directory: `~/.atelier`.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".atelier"))
}

fn read(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Load configuration, trying `~/.atelier/config.toml`, then
/// `./config.toml`, then built-in defaults. The storage root falls back to
/// the data directory, and `ATELIER_STORAGE_ROOT` overrides everything.
pub fn load_default() -> Result<AppConfig, ConfigError> {
    let data = data_dir()?;
    let user_config = data.join("config.toml");
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        read(&user_config)?
    } else if local_config.exists() {
        read(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg.storage.root.is_none() {
        cfg.storage.root = Some(data.to_string_lossy().to_string());
    }
    if let Ok(root) = std::env::var("ATELIER_STORAGE_ROOT") {
        if !root.trim().is_empty() {
            cfg.storage.root = Some(root);
        }
    }

    Ok(cfg)
}
