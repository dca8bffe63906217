//! Platform-tools binary resolution
//!
//! A tool is taken from, in order: an explicit command-line path, the
//! `[tools]` section of the settings file, then `PATH`.

use std::path::{Path, PathBuf};

use crate::error::ToolError;

pub const FASTBOOT: &str = "fastboot";
pub const ADB: &str = "adb";

/// Resolve `tool` to an executable path
pub fn resolve(
    tool: &str,
    flag: Option<&Path>,
    configured: Option<&Path>,
) -> Result<PathBuf, ToolError> {
    if let Some(path) = flag.or(configured) {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        // A bare name such as "fastboot-custom" is looked up in PATH.
        if let Ok(found) = which::which(path) {
            return Ok(found);
        }
        tracing::warn!("configured {} '{}' not found", tool, path.display());
        return Err(ToolError::NotFound {
            tool: tool.to_string(),
        });
    }

    which::which(tool).map_err(|_| ToolError::NotFound {
        tool: tool.to_string(),
    })
}

/// Resolve an optional tool, logging instead of failing
pub fn resolve_optional(tool: &str, configured: Option<&Path>) -> Option<PathBuf> {
    match resolve(tool, None, configured) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!("{}", e);
            None
        }
    }
}
