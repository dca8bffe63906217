//! CLI command for `scatterflash flash`

use anyhow::{anyhow, bail, Context, Result};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{
    is_json, print_detail, print_success, print_warning, status, ConsoleSink,
};
use crate::core::executor::{FlashExecutor, FlashOptions, FlashReport, StepOutcome};
use crate::core::images::DeviceImageSet;
use crate::core::plan::FlashPlan;
use crate::core::settings::Settings;
use crate::core::watcher;
use crate::infra::fastboot::FastbootCli;
use crate::infra::probe::{CommandProbe, ConnectivityProbe, ConnectivityState};

/// Arguments of `scatterflash flash`
#[derive(Debug, Clone)]
pub struct FlashArgs {
    pub images: PathBuf,
    pub config: PathBuf,
    pub keep_root: bool,
    pub wipe_data: bool,
    pub yes: bool,
    pub log_file: Option<PathBuf>,
    pub fastboot: Option<PathBuf>,
    pub force: bool,
}

/// Execute the flash command
pub async fn execute(settings: &Settings, args: FlashArgs) -> Result<()> {
    let plan = FlashPlan::from_file(&args.config)
        .with_context(|| format!("Invalid flash config: {}", args.config.display()))?;
    let images = DeviceImageSet::scan(&args.images)?;
    let (fastboot_path, adb) = super::resolve_tools(settings, args.fastboot.as_deref())?;

    let probe = Arc::new(
        CommandProbe::new(fastboot_path.clone(), adb).with_timeout(settings.timeouts().probe),
    );
    let state = probe.detect().await;
    if !state.mode.is_fastboot() {
        let message = format!(
            "Device must be in bootloader or fastbootd to flash (detected: {})",
            state.mode
        );
        if !args.force {
            bail!("{message}. Use --force to start anyway.");
        }
        print_warning(&message);
    }

    let options = FlashOptions {
        keep_root: args.keep_root || settings.keep_root(),
        wipe_data: args.wipe_data || settings.wipe_data(),
        timing: settings.mode_timing(),
        bootloader_settle: settings.bootloader_settle(),
    };

    if !args.yes {
        confirm(&plan, &state, &options)?;
    }

    let fastboot = FastbootCli::new(fastboot_path, settings.timeouts());
    let (watcher, suspension) = watcher::spawn_suspended(probe, settings.watcher_interval());

    let mut sink = ConsoleSink::new(plan.steps().len());
    if let Some(path) = &args.log_file {
        sink = sink
            .with_log_file(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("Cancelling after the current step...");
                cancel.cancel();
            }
        })
    };

    let executor = FlashExecutor::new(&fastboot, &images, options).with_watcher(suspension);
    let result = executor.run(&plan, &sink, &cancel).await;
    drop(executor);

    interrupt.abort();
    sink.finish();
    watcher.shutdown();

    let report = result.context("Flash aborted")?;
    print_report(&report)?;

    if report.cancelled {
        return Err(anyhow!(
            "Flash cancelled after {} of {} steps",
            report.steps.len(),
            report.total_steps
        ));
    }
    Ok(())
}

/// Ask before touching the device
fn confirm(plan: &FlashPlan, state: &ConnectivityState, options: &FlashOptions) -> Result<()> {
    if !io::stdin().is_terminal() {
        bail!(
            "Cannot prompt for confirmation in non-interactive mode.\n\
             Use --yes to skip confirmation."
        );
    }

    let serial = state.serial.as_deref().unwrap_or("unknown device");
    eprintln!();
    eprintln!(
        "{}  This will flash {serial} ({}) with a config for {}",
        status::WARNING,
        state.mode,
        plan.devices().join(", ")
    );
    eprintln!("   {} steps", plan.steps().len());
    if options.keep_root {
        eprintln!("   boot will not be flashed (keep root)");
    }
    if options.wipe_data {
        eprintln!("   All user data will be erased!");
    }
    eprintln!();
    eprint!("   Are you sure you want to continue? [y/N] ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => bail!("Flash cancelled by user"),
    }
}

fn print_report(report: &FlashReport) -> Result<()> {
    if is_json() {
        let outcome = if report.cancelled {
            "cancelled"
        } else if report.is_clean() {
            "success"
        } else {
            "warning"
        };
        let json = serde_json::json!({
            "status": outcome,
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let problems: Vec<_> = report
        .steps
        .iter()
        .filter(|r| !matches!(r.outcome, StepOutcome::Completed | StepOutcome::Unchanged))
        .collect();

    if report.is_clean() && problems.is_empty() {
        print_success(&format!(
            "Flashed {} ({} steps)",
            report.product, report.total_steps
        ));
        return Ok(());
    }

    if !report.cancelled {
        print_warning(&format!(
            "Flashed {} with {} skipped and {} failed step(s)",
            report.product,
            report.skipped(),
            report.failed()
        ));
    }
    for r in problems {
        match &r.outcome {
            StepOutcome::Skipped { reason } => {
                print_detail(&format!("[{}] {}: skipped, {reason}", r.index, r.step));
            }
            StepOutcome::Failed { reason } => {
                print_detail(&format!("[{}] {}: failed, {reason}", r.index, r.step));
            }
            StepOutcome::Completed | StepOutcome::Unchanged => {}
        }
    }
    Ok(())
}
