//! CLI command for `scatterflash detect`

use anyhow::Result;
use std::sync::Arc;

use crate::cli::output::{create_spinner, is_json, print_info, print_success, print_warning};
use crate::core::settings::Settings;
use crate::core::watcher;
use crate::infra::probe::{CommandProbe, ConnectionMode, ConnectivityProbe, ConnectivityState};

/// Execute the detect command
pub async fn execute(settings: &Settings, watch: bool) -> Result<()> {
    let (fastboot, adb) = super::resolve_tools(settings, None)?;
    if adb.is_none() {
        tracing::info!("adb not found, only fastboot devices will be detected");
    }
    let probe = CommandProbe::new(fastboot, adb).with_timeout(settings.timeouts().probe);

    if !watch {
        let spinner = create_spinner("Detecting device...");
        let state = probe.detect().await;
        spinner.finish_and_clear();
        return print_state(&state);
    }

    let handle = watcher::spawn(Arc::new(probe), settings.watcher_interval());
    let mut rx = handle.subscribe();
    print_info("Watching for devices (Ctrl-C to stop)");

    let mut last: Option<ConnectivityState> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if last.as_ref() != Some(&state) {
                    print_state(&state)?;
                    last = Some(state);
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}

fn print_state(state: &ConnectivityState) -> Result<()> {
    if is_json() {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }

    let serial = state.serial.as_deref().unwrap_or("unknown");
    match state.mode {
        ConnectionMode::None => print_warning("No device connected"),
        ConnectionMode::Offline => {
            print_warning(&format!("{serial}: offline or unauthorized"));
        }
        mode => print_success(&format!("{serial}: {mode}")),
    }
    Ok(())
}
