//! Doctor command logic
//!
//! Checks that the platform tools are reachable and the settings file
//! parses, and reports issues with suggestions.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::defaults;
use crate::core::settings::Settings;
use crate::infra::{process, tools};

const PLATFORM_TOOLS_HINT: &str = "Install Android SDK platform-tools \
     (https://developer.android.com/tools/releases/platform-tools) or set [tools] in config.toml";

/// Result of a single dependency check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Resolved path, if any
    pub path: Option<PathBuf>,
    /// Version if available
    pub version: Option<String>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, path: PathBuf, version: Option<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            path: Some(path),
            version,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            path: None,
            version: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default, Serialize)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Settings file problems
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed and the settings are valid
    pub fn all_required_passed(&self) -> bool {
        self.checks
            .iter()
            .filter(|c| c.required)
            .all(|c| c.passed)
            && self.config_issues.is_empty()
    }

    /// Check if all checks passed (including optional)
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Get all failed required checks
    pub fn failed_required(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .collect()
    }
}

/// Resolve `tool` and read its version
pub async fn check_tool(tool: &str, configured: Option<&Path>, required: bool) -> CheckResult {
    let path = match tools::resolve(tool, None, configured) {
        Ok(path) => path,
        Err(e) => {
            return CheckResult::fail(tool, &e.to_string(), Some(PLATFORM_TOOLS_HINT), required);
        }
    };

    let timeout = Duration::from_secs(defaults::GETVAR_TIMEOUT);
    match process::run(&path, ["--version"], timeout).await {
        Ok(out) if out.success => {
            let version = extract_version(&out.output);
            CheckResult::pass(tool, path, version, required)
        }
        Ok(out) => CheckResult::fail(
            tool,
            &format!("'{} --version' failed: {}", path.display(), out.output),
            Some(PLATFORM_TOOLS_HINT),
            required,
        ),
        Err(e) => CheckResult::fail(tool, &e.to_string(), Some(PLATFORM_TOOLS_HINT), required),
    }
}

/// Extract version string from `--version` output
///
/// fastboot prints `fastboot version 35.0.1-11580240`, adb prints
/// `Android Debug Bridge version 1.0.41` followed by `Version 35.0.1-...`.
fn extract_version(output: &str) -> Option<String> {
    let version_regex = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Run all doctor checks against the settings file at `settings_path`
pub async fn run_doctor(settings_path: &Path) -> DoctorReport {
    let mut report = DoctorReport::new();

    let settings = match Settings::load_from_path(settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            report.add_config_issue(e.to_string());
            Settings::default()
        }
    };

    report.add_check(check_tool(tools::FASTBOOT, settings.tools.fastboot.as_deref(), true).await);
    // adb is only needed to detect or reboot devices booted into Android
    report.add_check(check_tool(tools::ADB, settings.tools.adb.as_deref(), false).await);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass(
            "fastboot",
            PathBuf::from("/usr/bin/fastboot"),
            Some("35.0.1".to_string()),
            true,
        );
        assert!(result.passed);
        assert_eq!(result.name, "fastboot");
        assert_eq!(result.version, Some("35.0.1".to_string()));
        assert!(result.required);
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("adb", "error", Some("suggestion"), false);
        assert!(!result.passed);
        assert_eq!(result.error, Some("error".to_string()));
        assert_eq!(result.suggestion, Some("suggestion".to_string()));
        assert!(!result.required);
    }

    #[test]
    fn test_doctor_report_counts() {
        let mut report = DoctorReport::new();
        report.add_check(CheckResult::pass("a", PathBuf::from("a"), None, true));
        report.add_check(CheckResult::fail("b", "err", None, true));
        report.add_check(CheckResult::pass("c", PathBuf::from("c"), None, false));

        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.all_passed());
        assert!(!report.all_required_passed());
    }

    #[test]
    fn test_config_issue_fails_required() {
        let mut report = DoctorReport::new();
        report.add_check(CheckResult::pass("fastboot", PathBuf::from("fastboot"), None, true));
        report.add_config_issue("bad".to_string());
        assert!(!report.all_required_passed());
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(
            extract_version("fastboot version 35.0.1-11580240"),
            Some("35.0.1-11580240".to_string())
        );
        assert_eq!(
            extract_version("Android Debug Bridge version 1.0.41"),
            Some("1.0.41".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_settings_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[[[ not toml").unwrap();

        let report = run_doctor(&path).await;
        assert_eq!(report.config_issues.len(), 1);
        assert_eq!(report.checks.len(), 2);
    }
}
