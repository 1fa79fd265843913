// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawSettings, Settings};
use crate::errors::{DagError, Result};

/// Settings file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".dagrc";

/// Settings file looked up in `$HOME`.
pub const USER_CONFIG_FILE: &str = ".jobdag.toml";

/// Load a settings file from a given path and return the raw `RawSettings`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the checked form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        DagError::Config(format!("could not read settings file {}: {e}", path.display()))
    })?;

    let raw: RawSettings = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a settings file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let raw = load_from_path(&path)?;
    Settings::try_from(raw)
}

/// Resolve and load settings.
///
/// - An explicit path must exist.
/// - Otherwise `./.dagrc`, then `$HOME/.jobdag.toml` are tried.
/// - With no file at all, built-in defaults are used.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_and_validate(path);
    }

    match discover_config_path() {
        Some(path) => {
            debug!(path = %path.display(), "loading settings");
            load_and_validate(path)
        }
        None => {
            debug!("no settings file found; using defaults");
            Ok(Settings::default())
        }
    }
}

fn discover_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    let home = std::env::var_os("HOME")?;
    let user = PathBuf::from(home).join(USER_CONFIG_FILE);
    user.is_file().then_some(user)
}
