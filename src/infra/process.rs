//! External process invocation
//!
//! Runs `fastboot`/`adb` with a hard timeout. stdout and stderr are merged
//! because fastboot reports most of its results on stderr.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::ProtocolError;

/// Exit status and combined output of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0
    pub success: bool,
    /// stdout followed by stderr, trimmed
    pub output: String,
}

impl CommandOutput {
    /// Successful invocation with the given output
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// Failed invocation with the given output
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }

    /// Non-empty output lines, trimmed
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Run `program args...`, killing it if it exceeds `timeout`
pub async fn run<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<CommandOutput, ProtocolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    let command_line = describe(program, &args);
    tracing::debug!("exec: {}", command_line);

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProtocolError::Spawn {
                program: program.display().to_string(),
                error: e.to_string(),
            })
        }
        Err(_) => {
            tracing::warn!("'{}' timed out after {:?}", command_line, timeout);
            return Err(ProtocolError::Timeout {
                command: command_line,
                timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = format!("{}\n{}", stdout.trim(), stderr.trim());

    Ok(CommandOutput {
        success: output.status.success(),
        output: combined.trim().to_string(),
    })
}

/// Human-readable command line for logs and errors
fn describe(program: &Path, args: &[std::ffi::OsString]) -> String {
    let name = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
    std::iter::once(name)
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}
