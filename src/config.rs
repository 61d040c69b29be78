use crate::core::error::Result;
use crate::core::merge::Placement;
use crate::core::table::MalformedPolicy;
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User defaults; every field can be overridden from the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Allow-list used when none is given
    #[serde(default)]
    pub ip_list: Option<PathBuf>,
    #[serde(default)]
    pub placement: Placement,
    /// Keep existing rule ids instead of renumbering
    #[serde(default)]
    pub keep_ids: bool,
    /// Make `<export>.bak` before in-place updates
    #[serde(default = "default_true")]
    pub backup: bool,
    #[serde(default)]
    pub malformed: MalformedPolicy,
    /// Record written files in the audit log
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ip_list: None,
            placement: Placement::default(),
            keep_ids: false,
            backup: true,
            malformed: MalformedPolicy::default(),
            audit_log: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Location of `config.json`, if the platform has a config directory.
pub fn config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Loads the config from its default location, or returns defaults if it is
/// missing or unreadable.
pub fn load_config() -> AppConfig {
    config_path().map_or_else(AppConfig::default, |path| load_config_from(&path))
}

/// Loads the config from `path`, or returns defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    let Ok(json) = std::fs::read_to_string(path) else {
        return AppConfig::default();
    };
    match serde_json::from_str(&json) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Saves the config to its default location using an atomic write.
///
/// Returns the path written, or `None` if the platform has no config
/// directory.
///
/// # Errors
///
/// Returns `Err` if the directory cannot be created or the write fails.
pub fn save_config(config: &AppConfig) -> Result<Option<PathBuf>> {
    let Some(path) = config_path() else {
        return Ok(None);
    };
    save_config_to(config, &path)?;
    Ok(Some(path))
}

/// Saves the config to `path` using an atomic write.
///
/// # Errors
///
/// Returns `Err` if the directory cannot be created or the write fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        crate::utils::ensure_dir(dir)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::from)?;
    crate::core::output::write_atomic(path, json.as_bytes())
}
