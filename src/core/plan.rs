//! Flash plan parsing
//!
//! A flash config is a line-oriented script:
//!
//! ```text
//! # comment
//! device:umi
//! bootloader
//! -boot_ab
//! -vbmeta disable
//! fastbootd
//! -system_a del
//! -system_a add 3G
//! set-a
//! system
//! ```
//!
//! Parsing fails closed: any unrecognized line, or a config without a
//! `device:` line, yields an error and no plan.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::PlanError;

/// Fastboot mode a plan step runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Bootloader (pre-OS) fastboot
    Bootloader,
    /// Userspace fastboot (fastbootd)
    #[serde(rename = "fastbootd")]
    FastbootD,
}

impl Mode {
    /// Name as written in configs and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootloader => "bootloader",
            Self::FastbootD => "fastbootd",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A/B slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// Both slots, in flashing order
    pub const BOTH: [Slot; 2] = [Slot::A, Slot::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `Reboot` step sends the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebootTarget {
    System,
    Bootloader,
}

impl fmt::Display for RebootTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Bootloader => f.write_str("bootloader"),
        }
    }
}

/// One device operation in a flash plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Make sure the device is in `target` mode
    ModeSwitch { target: Mode },

    /// Flash `<base>.img` into the partition (token may carry `_a`/`_b`/`_ab`)
    FlashPartition {
        partition: String,
        disable_avb: bool,
        mode: Option<Mode>,
    },

    /// Remove a logical partition from the super partition
    DeleteLogicalPartition {
        partition: String,
        mode: Option<Mode>,
    },

    /// Create a logical partition of `size` (e.g. `512M`)
    CreateLogicalPartition {
        partition: String,
        size: String,
        mode: Option<Mode>,
    },

    /// Mark a slot active
    SetActiveSlot { slot: Slot },

    /// Reboot out of the current mode
    Reboot { target: RebootTarget },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModeSwitch { target } => write!(f, "switch to {target}"),
            Self::FlashPartition {
                partition,
                disable_avb: true,
                ..
            } => write!(f, "flash {partition} (AVB disabled)"),
            Self::FlashPartition { partition, .. } => write!(f, "flash {partition}"),
            Self::DeleteLogicalPartition { partition, .. } => {
                write!(f, "delete logical partition {partition}")
            }
            Self::CreateLogicalPartition {
                partition, size, ..
            } => write!(f, "create logical partition {partition} ({size})"),
            Self::SetActiveSlot { slot } => write!(f, "set active slot {slot}"),
            Self::Reboot { target } => write!(f, "reboot to {target}"),
        }
    }
}

/// A parsed flash config
///
/// Immutable once parsed; consumed by one executor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashPlan {
    devices: Vec<String>,
    steps: Vec<Step>,
}

impl FlashPlan {
    /// Parse a flash config from text
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let mut devices = Vec::new();
        let mut steps = Vec::new();
        let mut current_mode: Option<Mode> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(id) = line.strip_prefix("device:") {
                let id = id.trim();
                if !id.is_empty() {
                    devices.push(id.to_string());
                }
                continue;
            }

            match line {
                "bootloader" => {
                    current_mode = Some(Mode::Bootloader);
                    steps.push(Step::ModeSwitch {
                        target: Mode::Bootloader,
                    });
                }
                "fastbootd" => {
                    current_mode = Some(Mode::FastbootD);
                    steps.push(Step::ModeSwitch {
                        target: Mode::FastbootD,
                    });
                }
                "system" => steps.push(Step::Reboot {
                    target: RebootTarget::System,
                }),
                "set-a" => steps.push(Step::SetActiveSlot { slot: Slot::A }),
                "set-b" => steps.push(Step::SetActiveSlot { slot: Slot::B }),
                // Data wipe is an executor option, not a script step.
                "wipe-data" => {}
                _ => match line.strip_prefix('-') {
                    Some(rest) => {
                        steps.push(parse_partition_line(line_no, line, rest, current_mode)?);
                    }
                    None => {
                        return Err(PlanError::UnknownDirective {
                            line: line_no,
                            text: line.to_string(),
                        })
                    }
                },
            }
        }

        if devices.is_empty() {
            return Err(PlanError::NoDevices);
        }

        Ok(Self { devices, steps })
    }

    /// Build a plan directly from steps
    pub fn new(devices: Vec<String>, steps: Vec<Step>) -> Result<Self, PlanError> {
        let devices: Vec<String> = devices
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        if devices.is_empty() {
            return Err(PlanError::NoDevices);
        }
        Ok(Self { devices, steps })
    }

    /// Read and parse a flash config file
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|e| PlanError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Declared product identifiers, in config order
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Steps, in execution order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        format!(
            "devices={}, steps={}",
            self.devices.join(","),
            self.steps.len()
        )
    }
}

impl std::str::FromStr for FlashPlan {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse the part after `-` in a partition line
fn parse_partition_line(
    line_no: usize,
    line: &str,
    rest: &str,
    mode: Option<Mode>,
) -> Result<Step, PlanError> {
    let mut words = rest.split_whitespace();
    let Some(partition) = words.next().map(str::to_string) else {
        return Err(PlanError::MissingPartition {
            line: line_no,
            text: line.to_string(),
        });
    };

    let step = match words.next() {
        None => Step::FlashPartition {
            partition,
            disable_avb: false,
            mode,
        },
        Some("disable") => Step::FlashPartition {
            partition,
            disable_avb: true,
            mode,
        },
        Some("del") => Step::DeleteLogicalPartition { partition, mode },
        Some("add") => {
            let Some(size) = words.next() else {
                return Err(PlanError::MissingSize {
                    line: line_no,
                    partition,
                });
            };
            if !is_valid_size(size) {
                return Err(PlanError::InvalidSize {
                    line: line_no,
                    size: size.to_string(),
                });
            }
            Step::CreateLogicalPartition {
                partition,
                size: size.to_string(),
                mode,
            }
        }
        Some(_) => {
            return Err(PlanError::UnknownDirective {
                line: line_no,
                text: line.to_string(),
            })
        }
    };

    if words.next().is_some() {
        return Err(PlanError::UnknownDirective {
            line: line_no,
            text: line.to_string(),
        });
    }

    Ok(step)
}

/// Check a logical partition size such as `512M`, `3G` or `4096`
fn is_valid_size(size: &str) -> bool {
    static SIZE: OnceLock<Option<Regex>> = OnceLock::new();
    SIZE.get_or_init(|| Regex::new(r"(?i)^\d+[kmgt]?b?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(size))
}
