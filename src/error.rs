//! Error types for scatterflash
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::plan::Mode;

/// Flash config parsing errors
///
/// Any of these means no plan was produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Config file could not be read
    #[error("Failed to read flash config '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Line is not one of the recognized directives
    #[error("Line {line}: unrecognized directive '{text}'")]
    UnknownDirective { line: usize, text: String },

    /// `-` with nothing after it
    #[error("Line {line}: partition name missing in '{text}'")]
    MissingPartition { line: usize, text: String },

    /// `-<partition> add` without a size
    #[error("Line {line}: '-{partition} add' requires a size (e.g. 512M)")]
    MissingSize { line: usize, partition: String },

    /// Size is not `<digits>[K|M|G|T][B]`
    #[error("Line {line}: invalid partition size '{size}'")]
    InvalidSize { line: usize, size: String },

    /// No `device:` line anywhere in the config
    #[error("Flash config has no 'device:' line")]
    NoDevices,
}

/// Errors invoking the `fastboot`/`adb` binaries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Process did not finish within its budget and was killed
    #[error("'{command}' timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// Process could not be started
    #[error("Failed to run '{program}': {error}")]
    Spawn { program: String, error: String },
}

/// Tool resolution errors
#[derive(Error, Debug)]
pub enum ToolError {
    /// Binary is not configured and not in PATH
    #[error("'{tool}' not found. Install Android platform-tools or set [tools].{tool} in config.toml")]
    NotFound { tool: String },
}

/// Image directory errors
#[derive(Error, Debug)]
pub enum ImageError {
    /// Directory does not exist
    #[error("Image directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Directory could not be listed
    #[error("Failed to scan image directory '{path}': {error}")]
    Scan { path: PathBuf, error: String },

    /// Directory has no `*.img` files
    #[error("No .img images found in {path}")]
    Empty { path: PathBuf },
}

/// Mode controller errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModeSwitchError {
    /// Reboot command exited with an error
    #[error("reboot command failed: {reason}")]
    RebootFailed { reason: String },

    /// Target mode never observed
    #[error("device did not reach {target} after {attempts} checks")]
    Timeout { target: Mode, attempts: u32 },
}

/// Fatal flash plan errors
///
/// Recoverable problems (missing images, failed single-slot writes, logical
/// partition warnings) never surface here; they are recorded in the
/// [`FlashReport`](crate::core::executor::FlashReport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    /// No declared device matches the attached one
    #[error("Device mismatch: expected one of [{}], device reports '{reported}'", expected.join(", "))]
    IdentityMismatch {
        expected: Vec<String>,
        reported: String,
    },

    /// `getvar product` failed
    #[error("Could not read device product: {reason}")]
    IdentityQueryFailed { reason: String },

    /// Reboot into the target mode failed
    #[error("Step {step}: switching to {target} failed: {reason}")]
    ModeSwitchFailed {
        step: usize,
        target: Mode,
        reason: String,
    },

    /// Target mode never observed
    #[error("Step {step}: device did not reach {target} after {attempts} checks")]
    ModeTransitionTimeout {
        step: usize,
        target: Mode,
        attempts: u32,
    },

    /// Strict dual-slot write failed on one slot
    #[error("Step {step}: writing '{partition}' failed on {slot_partition}: {reason}")]
    SlotWriteAborted {
        step: usize,
        partition: String,
        slot_partition: String,
        reason: String,
    },
}
