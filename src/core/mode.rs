//! Device mode controller
//!
//! Detects whether the attached device is in bootloader or fastbootd and
//! drives it between the two, polling until the target mode is observed.

use std::time::Duration;

use crate::config::defaults;
use crate::core::plan::Mode;
use crate::core::sink::FlashSink;
use crate::error::{ModeSwitchError, ProtocolError};
use crate::infra::fastboot::{parse_device_serials, Fastboot};
use crate::infra::probe::is_userspace_output;

/// Mode as seen through the fastboot protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedMode {
    Bootloader,
    FastbootD,
    /// No device listed, or the query failed
    Unknown,
}

impl DetectedMode {
    pub fn is(self, mode: Mode) -> bool {
        matches!(
            (self, mode),
            (Self::Bootloader, Mode::Bootloader) | (Self::FastbootD, Mode::FastbootD)
        )
    }
}

/// Delays used while switching modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSwitchTiming {
    /// Wait after issuing the reboot before the first check
    pub settle: Duration,
    /// Wait between checks
    pub poll_interval: Duration,
    /// Number of checks before giving up
    pub attempts: u32,
}

impl Default for ModeSwitchTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(defaults::MODE_SWITCH_SETTLE),
            poll_interval: Duration::from_secs(defaults::MODE_POLL_INTERVAL),
            attempts: defaults::MODE_POLL_ATTEMPTS,
        }
    }
}

/// Result of [`ModeController::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// Target mode was already active; nothing was issued
    AlreadyActive,
    /// Device was rebooted and the target mode observed
    Switched,
}

/// Switches a device between bootloader and fastbootd
pub struct ModeController<'a> {
    fastboot: &'a dyn Fastboot,
    timing: ModeSwitchTiming,
}

impl<'a> ModeController<'a> {
    pub fn new(fastboot: &'a dyn Fastboot, timing: ModeSwitchTiming) -> Self {
        Self { fastboot, timing }
    }

    /// Current mode of the attached device
    pub async fn detect(&self) -> DetectedMode {
        match self.fastboot.devices().await {
            Ok(out) if !parse_device_serials(&out.output).is_empty() => {}
            Ok(_) => return DetectedMode::Unknown,
            Err(e) => {
                tracing::debug!("devices query failed: {}", e);
                return DetectedMode::Unknown;
            }
        }

        // Bootloaders that predate fastbootd reject the variable outright.
        match self.fastboot.get_var("is-userspace").await {
            Ok(out) if is_userspace_output(&out.output) => DetectedMode::FastbootD,
            Ok(_) => DetectedMode::Bootloader,
            Err(e) => {
                tracing::debug!("is-userspace query failed: {}", e);
                DetectedMode::Unknown
            }
        }
    }

    /// Bring the device into `target` mode
    ///
    /// A no-op when `target` is already active. Otherwise issues the reboot,
    /// waits the settle delay, and polls until `target` is seen or the
    /// attempt budget runs out.
    pub async fn ensure(
        &self,
        target: Mode,
        sink: &dyn FlashSink,
    ) -> Result<ModeChange, ModeSwitchError> {
        if self.detect().await.is(target) {
            sink.log(&format!("Already in {target}"));
            return Ok(ModeChange::AlreadyActive);
        }

        sink.log(&format!("Rebooting to {target}..."));
        let result = match target {
            Mode::Bootloader => self.fastboot.reboot_bootloader().await,
            Mode::FastbootD => self.fastboot.reboot_fastbootd().await,
        };

        match result {
            Ok(out) if !out.success => {
                return Err(ModeSwitchError::RebootFailed { reason: out.output });
            }
            Ok(_) => {}
            // The device drops off the bus while rebooting, so fastboot may
            // never see a reply.
            Err(ProtocolError::Timeout { .. }) => {
                tracing::debug!("reboot to {} timed out, continuing to poll", target);
            }
            Err(e @ ProtocolError::Spawn { .. }) => {
                return Err(ModeSwitchError::RebootFailed {
                    reason: e.to_string(),
                });
            }
        }

        self.wait_for(target, sink).await?;
        sink.log(&format!("Entered {target}"));
        Ok(ModeChange::Switched)
    }

    /// Settle, then poll until `target` is observed
    pub async fn wait_for(
        &self,
        target: Mode,
        sink: &dyn FlashSink,
    ) -> Result<(), ModeSwitchError> {
        tokio::time::sleep(self.timing.settle).await;

        for attempt in 1..=self.timing.attempts {
            if self.detect().await.is(target) {
                tracing::debug!("{} observed after {} checks", target, attempt);
                return Ok(());
            }
            sink.log(&format!(
                "Waiting for {target} ({attempt}/{})",
                self.timing.attempts
            ));
            tokio::time::sleep(self.timing.poll_interval).await;
        }

        Err(ModeSwitchError::Timeout {
            target,
            attempts: self.timing.attempts,
        })
    }
}
