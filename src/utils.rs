//! Utility functions for directory management
//!
//! This module provides helper functions following the XDG Base Directory specification
//! for portable configuration and state storage.
//!
//! # Directory Structure
//!
//! - Config: `~/.config/rulesplice/` - User defaults (`config.json`)
//! - State: `~/.local/state/rulesplice/` - Audit log
//!
//! Platforms without a state directory (macOS, Windows) use the local data
//! directory instead.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rulesplice", "rulesplice")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| {
        pd.state_dir()
            .unwrap_or_else(|| pd.data_local_dir())
            .to_path_buf()
    })
}

/// Creates `dir` (and parents) readable by the current user only.
pub fn ensure_dir(dir: &std::path::Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new().mode(0o700).recursive(true).create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Default allow-list location: `ip_allow_list.txt` beside the executable,
/// or in the working directory if the executable path is unknown.
pub fn default_ip_list_path() -> PathBuf {
    const FILE_NAME: &str = "ip_allow_list.txt";

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(FILE_NAME))
}
