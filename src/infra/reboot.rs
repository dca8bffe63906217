//! Mode-aware reboot
//!
//! Picks adb or fastboot depending on the mode the device is currently in.
//! From adb modes every target is an `adb reboot <target>`; from fastboot
//! modes recovery and EDL fall back to OEM commands when the standard one
//! is refused.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::defaults;
use crate::infra::probe::{ConnectionMode, ConnectivityState};
use crate::infra::process::{self, CommandOutput};

/// Reboot destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebootDestination {
    System,
    Bootloader,
    #[value(name = "fastbootd")]
    #[serde(rename = "fastbootd")]
    FastbootD,
    Recovery,
    Edl,
}

impl fmt::Display for RebootDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::Bootloader => "bootloader",
            Self::FastbootD => "fastbootd",
            Self::Recovery => "recovery",
            Self::Edl => "edl",
        })
    }
}

/// Reboot errors
#[derive(Error, Debug)]
pub enum RebootError {
    /// Nothing usable attached
    #[error("No device connected")]
    NoDevice,

    /// Device is listed but cannot take commands
    #[error("Device {serial} is offline or unauthorized")]
    Offline { serial: String },

    /// adb is needed for the current mode but not configured
    #[error("Device is in {mode} mode but adb is not available")]
    AdbUnavailable { mode: ConnectionMode },

    /// Every command tried was rejected
    #[error("Reboot to {destination} failed: {output}")]
    Rejected {
        destination: RebootDestination,
        output: String,
    },
}

/// What a reboot did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebootOutcome {
    /// Command line that was accepted, or `None` when nothing had to be done
    pub command: Option<String>,
    pub message: String,
}

/// Issues reboots with the tool matching the current mode
#[derive(Debug, Clone)]
pub struct Rebooter {
    fastboot: PathBuf,
    adb: Option<PathBuf>,
    timeout: Duration,
}

impl Rebooter {
    pub fn new(fastboot: PathBuf, adb: Option<PathBuf>) -> Self {
        Self {
            fastboot,
            adb,
            timeout: Duration::from_secs(defaults::REBOOT_TIMEOUT),
        }
    }

    /// Reboot the device described by `state` to `destination`
    pub async fn reboot(
        &self,
        state: &ConnectivityState,
        destination: RebootDestination,
    ) -> Result<RebootOutcome, RebootError> {
        match state.mode {
            ConnectionMode::None => Err(RebootError::NoDevice),
            ConnectionMode::Offline => Err(RebootError::Offline {
                serial: state.serial.clone().unwrap_or_default(),
            }),
            ConnectionMode::Bootloader if destination == RebootDestination::Bootloader => {
                Ok(RebootOutcome {
                    command: None,
                    message: "Already in bootloader".to_string(),
                })
            }
            mode if mode.is_adb() => {
                let adb = self
                    .adb
                    .as_deref()
                    .ok_or(RebootError::AdbUnavailable { mode })?;
                self.try_commands(adb, destination, adb_commands(destination))
                    .await
            }
            _ => {
                self.try_commands(&self.fastboot, destination, fastboot_commands(destination))
                    .await
            }
        }
    }

    async fn try_commands(
        &self,
        program: &Path,
        destination: RebootDestination,
        candidates: &[&[&str]],
    ) -> Result<RebootOutcome, RebootError> {
        let mut last = CommandOutput::default();

        for args in candidates {
            let line = format!("{} {}", tool_name(program), args.join(" "));
            match process::run(program, args.iter(), self.timeout).await {
                Ok(out) if out.success => {
                    tracing::info!("'{}' accepted", line);
                    return Ok(RebootOutcome {
                        command: Some(line),
                        message: format!("Rebooting to {destination}"),
                    });
                }
                Ok(out) => {
                    tracing::debug!("'{}' rejected: {}", line, out.output);
                    last = out;
                }
                // The device dropping off the bus mid-command counts as accepted.
                Err(crate::error::ProtocolError::Timeout { .. }) => {
                    return Ok(RebootOutcome {
                        command: Some(line),
                        message: format!("Rebooting to {destination}"),
                    });
                }
                Err(e) => {
                    last = CommandOutput::failed(e.to_string());
                }
            }
        }

        Err(RebootError::Rejected {
            destination,
            output: last.output,
        })
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// `adb` argument lists for a destination, in order of preference
fn adb_commands(destination: RebootDestination) -> &'static [&'static [&'static str]] {
    match destination {
        RebootDestination::System => &[&["reboot"]],
        RebootDestination::Bootloader => &[&["reboot", "bootloader"]],
        RebootDestination::FastbootD => &[&["reboot", "fastboot"]],
        RebootDestination::Recovery => &[&["reboot", "recovery"]],
        RebootDestination::Edl => &[&["reboot", "edl"]],
    }
}

/// `fastboot` argument lists for a destination, in order of preference
fn fastboot_commands(destination: RebootDestination) -> &'static [&'static [&'static str]] {
    match destination {
        RebootDestination::System => &[&["reboot"]],
        RebootDestination::Bootloader => &[&["reboot-bootloader"]],
        RebootDestination::FastbootD => &[&["reboot", "fastboot"]],
        RebootDestination::Recovery => &[&["reboot", "recovery"], &["oem", "reboot-recovery"]],
        RebootDestination::Edl => &[&["oem", "edl"], &["edl"]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_from_fastboot_has_oem_fallback() {
        let cmds = fastboot_commands(RebootDestination::Recovery);
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1], &["oem", "reboot-recovery"]);
    }

    #[test]
    fn test_adb_targets() {
        assert_eq!(adb_commands(RebootDestination::FastbootD)[0], &["reboot", "fastboot"]);
        assert_eq!(adb_commands(RebootDestination::System)[0], &["reboot"]);
    }

    #[tokio::test]
    async fn test_no_device() {
        let rebooter = Rebooter::new(PathBuf::from("fastboot"), None);
        let result = rebooter
            .reboot(&ConnectivityState::default(), RebootDestination::System)
            .await;
        assert!(matches!(result, Err(RebootError::NoDevice)));
    }

    #[tokio::test]
    async fn test_adb_mode_without_adb() {
        let rebooter = Rebooter::new(PathBuf::from("fastboot"), None);
        let state = ConnectivityState::new(ConnectionMode::System, "abc");
        let result = rebooter.reboot(&state, RebootDestination::Bootloader).await;
        assert!(matches!(
            result,
            Err(RebootError::AdbUnavailable {
                mode: ConnectionMode::System
            })
        ));
    }

    #[tokio::test]
    async fn test_bootloader_to_bootloader_is_noop() {
        let rebooter = Rebooter::new(PathBuf::from("/nonexistent/fastboot"), None);
        let state = ConnectivityState::new(ConnectionMode::Bootloader, "abc");
        let outcome = rebooter
            .reboot(&state, RebootDestination::Bootloader)
            .await
            .unwrap();
        assert!(outcome.command.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_falls_back_to_next_command() {
        // `false` rejects everything, so the last failure is reported
        let rebooter = Rebooter::new(PathBuf::from("/bin/false"), None);
        let state = ConnectivityState::new(ConnectionMode::FastbootD, "abc");
        let result = rebooter.reboot(&state, RebootDestination::Recovery).await;
        assert!(matches!(result, Err(RebootError::Rejected { .. })));
    }
}
