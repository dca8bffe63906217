//! Device connectivity probing
//!
//! Answers "what is attached and in which mode" by asking `adb devices`
//! first and falling back to `fastboot devices` plus `getvar is-userspace`.
//! Probe failures never surface as errors; an unreachable tool simply
//! contributes no devices.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::defaults;
use crate::core::plan::Mode;
use crate::infra::fastboot::{parse_device_serials, parse_var};
use crate::infra::process;

/// Connectivity mode reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Booted Android with adb authorized
    System,
    /// Recovery in adb sideload
    Sideload,
    /// Userspace fastboot
    #[serde(rename = "fastbootd")]
    FastbootD,
    /// Bootloader fastboot
    Bootloader,
    /// Listed by adb but offline or unauthorized
    Offline,
    /// Nothing attached
    #[default]
    None,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Sideload => "sideload",
            Self::FastbootD => "fastbootd",
            Self::Bootloader => "bootloader",
            Self::Offline => "offline",
            Self::None => "none",
        }
    }

    /// Whether the device speaks the fastboot protocol in this mode
    pub fn is_fastboot(self) -> bool {
        matches!(self, Self::Bootloader | Self::FastbootD)
    }

    /// Whether the device speaks adb in this mode
    pub fn is_adb(self) -> bool {
        matches!(self, Self::System | Self::Sideload)
    }

    /// Whether this is the given plan mode
    pub fn is(self, mode: Mode) -> bool {
        matches!(
            (self, mode),
            (Self::Bootloader, Mode::Bootloader) | (Self::FastbootD, Mode::FastbootD)
        )
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probe result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    pub mode: ConnectionMode,
    /// Serial of the device, if any was listed
    pub serial: Option<String>,
}

impl ConnectivityState {
    pub fn new(mode: ConnectionMode, serial: impl Into<String>) -> Self {
        Self {
            mode,
            serial: Some(serial.into()),
        }
    }
}

/// Source of connectivity state
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn detect(&self) -> ConnectivityState;
}

/// [`ConnectivityProbe`] that shells out to `adb` and `fastboot`
#[derive(Debug, Clone)]
pub struct CommandProbe {
    fastboot: PathBuf,
    adb: Option<PathBuf>,
    timeout: Duration,
}

impl CommandProbe {
    /// Probe using `fastboot` and, when available, `adb`
    pub fn new(fastboot: PathBuf, adb: Option<PathBuf>) -> Self {
        Self {
            fastboot,
            adb,
            timeout: Duration::from_secs(defaults::PROBE_TIMEOUT),
        }
    }

    /// Override the per-command timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn is_userspace(&self, serial: &str) -> bool {
        match process::run(
            &self.fastboot,
            ["-s", serial, "getvar", "is-userspace"],
            self.timeout,
        )
        .await
        {
            Ok(out) => is_userspace_output(&out.output),
            Err(e) => {
                tracing::debug!("is-userspace query failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ConnectivityProbe for CommandProbe {
    async fn detect(&self) -> ConnectivityState {
        let mut adb_serial = None;

        if let Some(adb) = &self.adb {
            match process::run(adb, ["devices"], self.timeout).await {
                Ok(out) => match parse_adb_devices(&out.output) {
                    AdbListing::Found(state) => return state,
                    AdbListing::Unclassified(serial) => adb_serial = serial,
                },
                Err(e) => tracing::debug!("adb probe failed: {}", e),
            }
        }

        match process::run(&self.fastboot, ["devices"], self.timeout).await {
            Ok(out) => {
                if let Some(serial) = parse_device_serials(&out.output).into_iter().next() {
                    let mode = if self.is_userspace(&serial).await {
                        ConnectionMode::FastbootD
                    } else {
                        ConnectionMode::Bootloader
                    };
                    return ConnectivityState::new(mode, serial);
                }
            }
            Err(e) => tracing::debug!("fastboot probe failed: {}", e),
        }

        ConnectivityState {
            mode: ConnectionMode::None,
            serial: adb_serial,
        }
    }
}

/// Result of reading `adb devices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbListing {
    /// A device in a recognized state
    Found(ConnectivityState),
    /// No device in a recognized state; the last serial listed, if any
    Unclassified(Option<String>),
}

/// Classify `adb devices` output
///
/// The first device whose state is `device`, `sideload`, `offline` or
/// `unauthorized` wins. Daemon chatter (`* daemon started ...`) and the
/// header line are ignored.
pub fn parse_adb_devices(output: &str) -> AdbListing {
    let mut last_serial = None;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.to_ascii_lowercase().starts_with("list of devices") || line.starts_with('*') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(serial) = parts.next() else {
            continue;
        };
        let mode = match parts.next().unwrap_or_default() {
            "device" => Some(ConnectionMode::System),
            "sideload" => Some(ConnectionMode::Sideload),
            "offline" | "unauthorized" => Some(ConnectionMode::Offline),
            _ => None,
        };
        if let Some(mode) = mode {
            return AdbListing::Found(ConnectivityState::new(mode, serial));
        }
        last_serial = Some(serial.to_string());
    }

    AdbListing::Unclassified(last_serial)
}

/// Whether `getvar is-userspace` output says the device is in fastbootd
pub fn is_userspace_output(output: &str) -> bool {
    parse_var(output, "is-userspace")
        .is_some_and(|v| v.eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adb_device_is_system() {
        let out = "List of devices attached\n8a1b2c3d\tdevice\n";
        assert_eq!(
            parse_adb_devices(out),
            AdbListing::Found(ConnectivityState::new(ConnectionMode::System, "8a1b2c3d"))
        );
    }

    #[test]
    fn test_adb_sideload_and_offline() {
        assert_eq!(
            parse_adb_devices("List of devices attached\nabc\tsideload"),
            AdbListing::Found(ConnectivityState::new(ConnectionMode::Sideload, "abc"))
        );
        assert_eq!(
            parse_adb_devices("List of devices attached\nabc\tunauthorized"),
            AdbListing::Found(ConnectivityState::new(ConnectionMode::Offline, "abc"))
        );
    }

    #[test]
    fn test_adb_daemon_chatter_ignored() {
        let out = "* daemon not running; starting now at tcp:5037\n\
                   * daemon started successfully\n\
                   List of devices attached\n";
        assert_eq!(parse_adb_devices(out), AdbListing::Unclassified(None));
    }

    #[test]
    fn test_adb_unknown_state_keeps_serial() {
        let out = "List of devices attached\nabc\trecovery\n";
        assert_eq!(
            parse_adb_devices(out),
            AdbListing::Unclassified(Some("abc".to_string()))
        );
    }

    #[test]
    fn test_is_userspace_output() {
        assert!(is_userspace_output("is-userspace: yes\nFinished. Total time: 0.001s"));
        assert!(!is_userspace_output("is-userspace: no\nFinished."));
        assert!(!is_userspace_output("FAILED (remote: 'unknown variable')"));
    }

    #[test]
    fn test_mode_classification() {
        assert!(ConnectionMode::Bootloader.is_fastboot());
        assert!(ConnectionMode::FastbootD.is(Mode::FastbootD));
        assert!(!ConnectionMode::FastbootD.is(Mode::Bootloader));
        assert!(ConnectionMode::Sideload.is_adb());
        assert!(!ConnectionMode::Offline.is_adb());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let state = ConnectivityState::new(ConnectionMode::FastbootD, "abc");
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"mode":"fastbootd","serial":"abc"}"#);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nothing_attached_without_tools() {
        let probe = CommandProbe::new(PathBuf::from("/nonexistent/fastboot"), None);
        assert_eq!(probe.detect().await, ConnectivityState::default());
    }
}
