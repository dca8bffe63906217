//! Platform-specific directory management
//!
//! Resolves where scatterflash keeps its settings. Follows the XDG Base
//! Directory Specification on Linux and standard locations on macOS.
//!
//! `SCATTERFLASH_CONFIG_DIR` overrides the config directory.

use std::env;
use std::path::PathBuf;

use crate::config::defaults::SETTINGS_FILE;

/// Environment variable for the config directory override
pub const ENV_CONFIG_DIR: &str = "SCATTERFLASH_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "scatterflash";

/// Platform-specific directory provider
#[derive(Debug, Clone)]
pub struct AppDirs {
    config_dir: PathBuf,
}

impl AppDirs {
    /// Create a new `AppDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: resolve_config_dir(),
        }
    }

    /// Get the config directory path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/scatterflash` or `~/.config/scatterflash`
    /// - macOS: `~/Library/Application Support/scatterflash`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Path of `config.toml` in the config directory
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }
}

impl Default for AppDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve config directory from environment or platform default
fn resolve_config_dir() -> PathBuf {
    if let Ok(path) = env::var(ENV_CONFIG_DIR) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| {
            // Fallback to home directory
            dirs::home_dir()
                .map(|h| h.join(".config").join(APP_NAME))
                .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = AppDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_settings_path_is_under_config_dir() {
        let dirs = AppDirs::new();
        assert!(dirs.settings_path().starts_with(dirs.config_dir()));
        assert!(dirs.settings_path().ends_with("config.toml"));
    }
}
