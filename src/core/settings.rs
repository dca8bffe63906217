//! Global settings
//!
//! Reads `config.toml` from the config directory. Every key is optional;
//! anything not set falls back to [`crate::config::defaults`].
//!
//! ```toml
//! [tools]
//! fastboot = "/opt/platform-tools/fastboot"
//!
//! [timeouts]
//! flash = 300
//!
//! [mode_switch]
//! settle_secs = 5
//! poll_attempts = 20
//!
//! [flash]
//! keep_root = true
//! ```

use crate::config::defaults;
use crate::core::mode::ModeSwitchTiming;
use crate::infra::dirs::AppDirs;
use crate::infra::fastboot::OperationTimeouts;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read settings file
    #[error("Failed to read settings file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse settings file
    #[error("Failed to parse settings file '{path}': {error}")]
    ParseError { path: String, error: String },

    /// A value parsed but is not usable
    #[error("Invalid setting '{key}' in '{path}': {reason}")]
    InvalidValue {
        path: String,
        key: String,
        reason: String,
    },
}

/// Global settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Platform-tools binaries
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Per-operation timeouts, in seconds
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Mode switch polling
    #[serde(default)]
    pub mode_switch: ModeSwitchConfig,

    /// Device watcher
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Default flash options
    #[serde(default)]
    pub flash: FlashConfig,
}

/// Tool paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    pub fastboot: Option<PathBuf>,
    pub adb: Option<PathBuf>,
}

/// Timeouts in seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    pub getvar: Option<u64>,
    pub reboot: Option<u64>,
    pub flash: Option<u64>,
    pub logical_partition: Option<u64>,
    pub set_active: Option<u64>,
    pub erase_userdata: Option<u64>,
    pub erase: Option<u64>,
    pub wipe: Option<u64>,
    pub probe: Option<u64>,
}

/// Mode switch timing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeSwitchConfig {
    pub settle_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub poll_attempts: Option<u32>,
    /// How long a `reboot-bootloader` inside a plan is observed
    pub bootloader_settle_secs: Option<u64>,
}

/// Watcher cadence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    pub interval_secs: Option<u64>,
}

/// Flash option defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashConfig {
    pub keep_root: Option<bool>,
    pub wipe_data: Option<bool>,
}

impl Settings {
    /// Load settings from the config directory
    ///
    /// If the file doesn't exist, returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load(dirs: &AppDirs) -> Result<Self, SettingsError> {
        Self::load_from_path(&dirs.settings_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        settings.validate(path)?;
        Ok(settings)
    }

    /// Reject values that would make every run fail
    fn validate(&self, path: &Path) -> Result<(), SettingsError> {
        let t = &self.timeouts;
        let durations = [
            ("timeouts.getvar", t.getvar),
            ("timeouts.reboot", t.reboot),
            ("timeouts.flash", t.flash),
            ("timeouts.logical_partition", t.logical_partition),
            ("timeouts.set_active", t.set_active),
            ("timeouts.erase_userdata", t.erase_userdata),
            ("timeouts.erase", t.erase),
            ("timeouts.wipe", t.wipe),
            ("timeouts.probe", t.probe),
            ("watcher.interval_secs", self.watcher.interval_secs),
            ("mode_switch.poll_attempts", self.mode_switch.poll_attempts.map(u64::from)),
        ];

        match durations.into_iter().find(|(_, v)| *v == Some(0)) {
            Some((key, _)) => Err(SettingsError::InvalidValue {
                path: path.display().to_string(),
                key: key.to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Effective per-operation timeouts
    #[must_use]
    pub fn timeouts(&self) -> OperationTimeouts {
        let t = &self.timeouts;
        let secs = |v: Option<u64>, default: u64| Duration::from_secs(v.unwrap_or(default));
        OperationTimeouts {
            getvar: secs(t.getvar, defaults::GETVAR_TIMEOUT),
            reboot: secs(t.reboot, defaults::REBOOT_TIMEOUT),
            flash: secs(t.flash, defaults::FLASH_TIMEOUT),
            logical_partition: secs(t.logical_partition, defaults::LOGICAL_PARTITION_TIMEOUT),
            set_active: secs(t.set_active, defaults::SET_ACTIVE_TIMEOUT),
            erase_userdata: secs(t.erase_userdata, defaults::ERASE_USERDATA_TIMEOUT),
            erase: secs(t.erase, defaults::ERASE_TIMEOUT),
            wipe: secs(t.wipe, defaults::WIPE_TIMEOUT),
            probe: secs(t.probe, defaults::PROBE_TIMEOUT),
        }
    }

    /// Effective mode switch timing
    #[must_use]
    pub fn mode_timing(&self) -> ModeSwitchTiming {
        let m = &self.mode_switch;
        ModeSwitchTiming {
            settle: Duration::from_secs(m.settle_secs.unwrap_or(defaults::MODE_SWITCH_SETTLE)),
            poll_interval: Duration::from_secs(
                m.poll_interval_secs.unwrap_or(defaults::MODE_POLL_INTERVAL),
            ),
            attempts: m.poll_attempts.unwrap_or(defaults::MODE_POLL_ATTEMPTS),
        }
    }

    #[must_use]
    pub fn bootloader_settle(&self) -> Duration {
        Duration::from_secs(
            self.mode_switch
                .bootloader_settle_secs
                .unwrap_or(defaults::BOOTLOADER_REBOOT_SETTLE),
        )
    }

    #[must_use]
    pub fn watcher_interval(&self) -> Duration {
        Duration::from_secs(
            self.watcher
                .interval_secs
                .unwrap_or(defaults::WATCHER_INTERVAL),
        )
    }

    #[must_use]
    pub fn keep_root(&self) -> bool {
        self.flash.keep_root.unwrap_or(false)
    }

    #[must_use]
    pub fn wipe_data(&self) -> bool {
        self.flash.wipe_data.unwrap_or(false)
    }
}
