//! Flash plan execution
//!
//! [`FlashExecutor`] walks a [`FlashPlan`] in order against one device:
//! identity first, then each step, reporting through a [`FlashSink`].
//!
//! Failures come in two kinds. Fatal ones (identity mismatch, a mode switch
//! that never lands, a failed slot of a strict dual-slot write) stop the run
//! and return [`FlashError`]. Everything else is recorded as the step's
//! [`StepOutcome`] and the run continues.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::defaults;
use crate::core::identity;
use crate::core::images::DeviceImageSet;
use crate::core::mode::{DetectedMode, ModeChange, ModeController, ModeSwitchTiming};
use crate::core::partition::{self, FailurePolicy};
use crate::core::plan::{FlashPlan, Mode, RebootTarget, Slot, Step};
use crate::core::sink::{self, FlashSink};
use crate::core::watcher::WatcherSuspension;
use crate::error::{FlashError, ModeSwitchError, ProtocolError};
use crate::infra::fastboot::{Fastboot, ProtocolResult};
use crate::infra::probe::ConnectionMode;

/// Options for one flash run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    /// Never write `boot` in any slot form
    pub keep_root: bool,
    /// Factory-reset before the final reboot to system
    pub wipe_data: bool,
    /// Mode switch settle and polling
    pub timing: ModeSwitchTiming,
    /// How long a `reboot-bootloader` step waits for the device
    pub bootloader_settle: Duration,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            keep_root: false,
            wipe_data: false,
            timing: ModeSwitchTiming::default(),
            bootloader_settle: Duration::from_secs(defaults::BOOTLOADER_REBOOT_SETTLE),
        }
    }
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    /// Nothing to do (mode already active)
    Unchanged,
    Skipped { reason: String },
    /// Failed without stopping the run
    Failed { reason: String },
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// 1-based position in the plan
    pub index: usize,
    pub step: Step,
    pub outcome: StepOutcome,
}

/// Result of a flash run that was not aborted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlashReport {
    /// Product reported by the device
    pub product: String,
    /// Number of steps in the plan
    pub total_steps: usize,
    /// Executed steps, in order
    pub steps: Vec<StepReport>,
    /// Run stopped early on request
    pub cancelled: bool,
}

impl FlashReport {
    /// Steps that completed or were already in the desired state
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Completed | StepOutcome::Unchanged))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Failed { .. }))
    }

    /// Outcome of the step at 1-based `index`, if it ran
    pub fn outcome(&self, index: usize) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.index == index)
            .map(|r| &r.outcome)
    }

    /// Every step ran and none failed
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Executes flash plans against one device
pub struct FlashExecutor<'a> {
    fastboot: &'a dyn Fastboot,
    images: &'a DeviceImageSet,
    options: FlashOptions,
    watcher: Option<WatcherSuspension>,
}

impl<'a> FlashExecutor<'a> {
    pub fn new(
        fastboot: &'a dyn Fastboot,
        images: &'a DeviceImageSet,
        options: FlashOptions,
    ) -> Self {
        Self {
            fastboot,
            images,
            options,
            watcher: None,
        }
    }

    /// Use a suspended watcher to observe reboots
    ///
    /// The watcher stays suspended for as long as the executor lives, apart
    /// from the windows in which a reboot is observed.
    #[must_use]
    pub fn with_watcher(mut self, suspension: WatcherSuspension) -> Self {
        self.watcher = Some(suspension);
        self
    }

    /// Run `plan` to completion, cancellation or the first fatal error
    ///
    /// `cancel` is checked before each step; a step already issued always
    /// finishes.
    pub async fn run(
        &self,
        plan: &FlashPlan,
        sink: &dyn FlashSink,
        cancel: &CancellationToken,
    ) -> Result<FlashReport, FlashError> {
        let suspension = self.watcher.as_ref();
        if let Some(suspension) = suspension {
            suspension.settled().await;
        }

        tracing::info!("flash run: {}", plan.summary());
        sink.log(&format!("Starting flash ({})", plan.summary()));

        let product = identity::verify(self.fastboot, plan.devices(), sink).await?;

        let total = plan.steps().len();
        let mut report = FlashReport {
            product,
            total_steps: total,
            ..FlashReport::default()
        };
        let controller = ModeController::new(self.fastboot, self.options.timing);

        for (i, step) in plan.steps().iter().enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                sink.log(&format!("Cancelled before step {index}/{total}"));
                tracing::warn!("flash cancelled before step {}", index);
                report.cancelled = true;
                break;
            }

            sink.progress(index, total, sink::percent(index, total));
            sink.log(&format!("[{index}/{total}] {step}"));

            let outcome = self
                .dispatch(index, step, &controller, suspension, sink)
                .await?;
            tracing::debug!("step {}: {:?}", index, outcome);
            report.steps.push(StepReport {
                index,
                step: step.clone(),
                outcome,
            });
        }

        if !report.cancelled {
            sink.log(&format!(
                "Flash finished: {} ok, {} skipped, {} failed",
                report.succeeded(),
                report.skipped(),
                report.failed()
            ));
        }
        Ok(report)
    }

    async fn dispatch(
        &self,
        index: usize,
        step: &Step,
        controller: &ModeController<'_>,
        suspension: Option<&WatcherSuspension>,
        sink: &dyn FlashSink,
    ) -> Result<StepOutcome, FlashError> {
        match step {
            Step::ModeSwitch { target } => self.switch_mode(index, *target, controller, sink).await,
            Step::FlashPartition {
                partition,
                disable_avb,
                ..
            } => self.flash_partition(index, partition, *disable_avb, sink).await,
            Step::DeleteLogicalPartition { partition, .. } => {
                Ok(self.delete_logical(partition, sink).await)
            }
            Step::CreateLogicalPartition {
                partition, size, ..
            } => Ok(self.create_logical(partition, size, sink).await),
            Step::SetActiveSlot { slot } => Ok(self.set_active(*slot, sink).await),
            Step::Reboot {
                target: RebootTarget::System,
            } => Ok(self.reboot_system(sink).await),
            Step::Reboot {
                target: RebootTarget::Bootloader,
            } => Ok(self.reboot_bootloader(controller, suspension, sink).await),
        }
    }

    async fn switch_mode(
        &self,
        index: usize,
        target: Mode,
        controller: &ModeController<'_>,
        sink: &dyn FlashSink,
    ) -> Result<StepOutcome, FlashError> {
        match controller.ensure(target, sink).await {
            Ok(ModeChange::AlreadyActive) => Ok(StepOutcome::Unchanged),
            Ok(ModeChange::Switched) => Ok(StepOutcome::Completed),
            Err(ModeSwitchError::RebootFailed { reason }) => {
                sink.log(&format!("Error: could not reboot to {target}: {reason}"));
                Err(FlashError::ModeSwitchFailed {
                    step: index,
                    target,
                    reason,
                })
            }
            Err(ModeSwitchError::Timeout { attempts, .. }) => {
                sink.log(&format!("Error: device did not enter {target}"));
                Err(FlashError::ModeTransitionTimeout {
                    step: index,
                    target,
                    attempts,
                })
            }
        }
    }

    async fn flash_partition(
        &self,
        index: usize,
        token: &str,
        disable_avb: bool,
        sink: &dyn FlashSink,
    ) -> Result<StepOutcome, FlashError> {
        let resolved = partition::resolve(token, disable_avb);

        if resolved.blocked_by_keep_root(self.options.keep_root) {
            sink.log(&format!("Keeping root: {token} not flashed"));
            return Ok(StepOutcome::Skipped {
                reason: "keep-root preserves boot".to_string(),
            });
        }

        let Some(image) = self.images.get(&resolved.image_key) else {
            sink.log(&format!(
                "Warning: {} not found, skipping {token}",
                resolved.image_key
            ));
            return Ok(StepOutcome::Skipped {
                reason: format!("{} not found", resolved.image_key),
            });
        };

        let mut failures = Vec::new();
        for target in &resolved.targets {
            if resolved.disable_avb {
                sink.log(&format!("Flashing {target} (verity and verification disabled)"));
            } else {
                sink.log(&format!("Flashing {target}"));
            }

            let reason = match self.fastboot.flash(target, image, resolved.disable_avb).await {
                Ok(out) if out.success => {
                    sink.log(&format!("{target} written"));
                    continue;
                }
                Ok(out) => out.output,
                Err(e) => e.to_string(),
            };

            match resolved.policy {
                FailurePolicy::AbortOnAnyFailure => {
                    sink.log(&format!("Error: flashing {target} failed, stopping: {reason}"));
                    return Err(FlashError::SlotWriteAborted {
                        step: index,
                        partition: token.to_string(),
                        slot_partition: target.clone(),
                        reason,
                    });
                }
                FailurePolicy::ContinueOnFailure => {
                    sink.log(&format!("Warning: flashing {target} failed, continuing: {reason}"));
                    failures.push(format!("{target}: {reason}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::Failed {
                reason: failures.join("; "),
            })
        }
    }

    async fn delete_logical(&self, partition: &str, sink: &dyn FlashSink) -> StepOutcome {
        sink.log(&format!("Deleting logical partition {partition}"));
        let result = self.fastboot.delete_logical_partition(partition).await;

        if let Ok(out) = &result {
            let lower = out.output.to_lowercase();
            if !out.success && (lower.contains("not find") || lower.contains("not exist")) {
                sink.log(&format!("{partition} does not exist, nothing to delete"));
                return StepOutcome::Skipped {
                    reason: "partition does not exist".to_string(),
                };
            }
        }

        soft_outcome(&format!("deleting {partition}"), result, sink)
    }

    async fn create_logical(
        &self,
        partition: &str,
        size: &str,
        sink: &dyn FlashSink,
    ) -> StepOutcome {
        sink.log(&format!("Creating logical partition {partition} ({size})"));
        let result = self.fastboot.create_logical_partition(partition, size).await;
        soft_outcome(&format!("creating {partition}"), result, sink)
    }

    async fn set_active(&self, slot: Slot, sink: &dyn FlashSink) -> StepOutcome {
        sink.log(&format!("Setting active slot to {slot}"));
        let result = self.fastboot.set_active(slot).await;
        soft_outcome(&format!("setting slot {slot} active"), result, sink)
    }

    async fn wipe_data(&self, sink: &dyn FlashSink) {
        sink.log("Wiping data (factory reset)");
        soft_outcome("erasing userdata", self.fastboot.erase("userdata").await, sink);
        soft_outcome("erasing metadata", self.fastboot.erase("metadata").await, sink);
        soft_outcome("fastboot -w", self.fastboot.wipe().await, sink);
    }

    async fn reboot_system(&self, sink: &dyn FlashSink) -> StepOutcome {
        if self.options.wipe_data {
            self.wipe_data(sink).await;
        }

        sink.log("Rebooting to system");
        match self.fastboot.reboot_system().await {
            Ok(out) if out.success => StepOutcome::Completed,
            Err(ProtocolError::Timeout { .. }) => {
                sink.log("Device is rebooting");
                StepOutcome::Completed
            }
            other => soft_outcome("rebooting to system", other, sink),
        }
    }

    async fn reboot_bootloader(
        &self,
        controller: &ModeController<'_>,
        suspension: Option<&WatcherSuspension>,
        sink: &dyn FlashSink,
    ) -> StepOutcome {
        // From bootloader the device must be seen gone before it counts as back
        let mut left = match suspension {
            Some(_) => controller.detect().await != DetectedMode::Bootloader,
            None => false,
        };

        sink.log("Rebooting to bootloader");
        match self.fastboot.reboot_bootloader().await {
            Ok(out) if out.success => {}
            Err(ProtocolError::Timeout { .. }) => sink.log("Device is rebooting"),
            other => return soft_outcome("rebooting to bootloader", other, sink),
        }

        let settle = self.options.bootloader_settle;
        match suspension {
            Some(suspension) => {
                let seen = suspension
                    .observe(settle, |s| {
                        if s.mode != ConnectionMode::Bootloader {
                            left = true;
                            return false;
                        }
                        left
                    })
                    .await;
                if seen.is_some() {
                    sink.log("Device is back in bootloader");
                } else {
                    sink.log(&format!(
                        "Warning: bootloader restart not seen within {}s, continuing",
                        settle.as_secs()
                    ));
                }
            }
            None => {
                sink.log(&format!("Waiting {}s for the device to restart", settle.as_secs()));
                tokio::time::sleep(settle).await;
            }
        }
        StepOutcome::Completed
    }
}

/// Outcome of an operation whose failure is only a warning
fn soft_outcome(what: &str, result: ProtocolResult, sink: &dyn FlashSink) -> StepOutcome {
    let reason = match result {
        Ok(out) if out.success => return StepOutcome::Completed,
        Ok(out) => out.output,
        Err(e) => e.to_string(),
    };
    sink.log(&format!("Warning: {what} failed, continuing: {reason}"));
    StepOutcome::Failed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<StepOutcome>) -> FlashReport {
        FlashReport {
            product: "umi".to_string(),
            total_steps: outcomes.len(),
            steps: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| StepReport {
                    index: i + 1,
                    step: Step::SetActiveSlot { slot: Slot::A },
                    outcome,
                })
                .collect(),
            cancelled: false,
        }
    }

    #[test]
    fn test_report_counts() {
        let r = report(vec![
            StepOutcome::Completed,
            StepOutcome::Unchanged,
            StepOutcome::Skipped {
                reason: "x".into(),
            },
            StepOutcome::Failed {
                reason: "y".into(),
            },
        ]);
        assert_eq!(r.succeeded(), 2);
        assert_eq!(r.skipped(), 1);
        assert_eq!(r.failed(), 1);
        assert!(!r.is_clean());
        assert_eq!(r.outcome(2), Some(&StepOutcome::Unchanged));
        assert_eq!(r.outcome(9), None);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&StepOutcome::Skipped {
            reason: "boot.img not found".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"skipped","reason":"boot.img not found"}"#);
    }

    #[test]
    fn test_default_options() {
        let options = FlashOptions::default();
        assert!(!options.keep_root);
        assert!(!options.wipe_data);
        assert_eq!(options.bootloader_settle, Duration::from_secs(8));
    }
}
