//! CLI command for `scatterflash doctor`
//!
//! Checks platform tools and settings and reports issues with suggestions.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{
    is_json, is_quiet, print_detail, print_info, print_success, print_warning, status,
};
use crate::core::doctor::run_doctor;

/// Execute the doctor command
pub async fn execute(settings_path: &Path) -> Result<()> {
    let report = run_doctor(settings_path).await;

    // JSON output mode
    if is_json() {
        let outcome = if report.all_passed() {
            "success"
        } else if report.all_required_passed() {
            "warning"
        } else {
            "error"
        };
        let json_result = serde_json::json!({
            "status": outcome,
            "settings": settings_path,
            "checks": report.checks,
            "config_issues": report.config_issues,
            "passed_count": report.passed_count(),
            "total_count": report.checks.len()
        });
        println!("{}", serde_json::to_string_pretty(&json_result)?);

        if !report.all_required_passed() {
            return Err(anyhow::anyhow!("Required checks failed"));
        }
        return Ok(());
    }

    // Quiet mode - only show errors
    if is_quiet() {
        if !report.all_required_passed() {
            for check in report.failed_required() {
                eprintln!("{} Missing required: {}", status::ERROR, check.name);
            }
            for issue in &report.config_issues {
                eprintln!("{} {issue}", status::ERROR);
            }
            return Err(anyhow::anyhow!("Required checks failed"));
        }
        return Ok(());
    }

    print_info("Checking platform tools...");
    println!();

    for check in &report.checks {
        let version_str = check
            .version
            .as_ref()
            .map(|v| format!(" (v{v})"))
            .unwrap_or_default();

        let required_str = if check.required { "" } else { " [optional]" };

        if check.passed {
            println!("  {} {}{version_str}{required_str}", status::SUCCESS, check.name);
            if let Some(path) = &check.path {
                print_detail(&format!("  {}", path.display()));
            }
        } else {
            println!("  {} {}{required_str}", status::ERROR, check.name);
            if let Some(error) = &check.error {
                print_detail(&format!("Error: {error}"));
            }
            if let Some(suggestion) = &check.suggestion {
                print_detail(&format!("Suggestion: {suggestion}"));
            }
        }
    }

    println!();
    if report.config_issues.is_empty() {
        println!("  {} settings ({})", status::SUCCESS, settings_path.display());
    } else {
        print_warning("Settings issues:");
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    println!();
    let passed = report.passed_count();
    let total = report.checks.len();

    if report.all_passed() {
        print_success(&format!("All checks passed ({passed}/{total})"));
    } else if report.all_required_passed() {
        print_warning(&format!("{passed}/{total} checks passed (optional tools missing)"));
        print_detail("Devices booted into Android cannot be detected or rebooted without adb.");
    } else {
        println!("{} {passed}/{total} checks passed", status::ERROR);
        return Err(anyhow::anyhow!(
            "Required checks failed. Run 'scatterflash doctor' for details."
        ));
    }

    Ok(())
}
