//! CLI command for `scatterflash reboot`

use anyhow::{Context, Result};

use crate::cli::output::{create_spinner, is_json, print_success};
use crate::core::settings::Settings;
use crate::infra::probe::{CommandProbe, ConnectivityProbe};
use crate::infra::reboot::{RebootDestination, Rebooter};

/// Execute the reboot command
pub async fn execute(settings: &Settings, target: RebootDestination) -> Result<()> {
    let (fastboot, adb) = super::resolve_tools(settings, None)?;
    let probe = CommandProbe::new(fastboot.clone(), adb.clone())
        .with_timeout(settings.timeouts().probe);

    let spinner = create_spinner("Detecting device...");
    let state = probe.detect().await;
    spinner.finish_and_clear();
    tracing::info!("device {:?} in {} mode", state.serial, state.mode);

    let outcome = Rebooter::new(fastboot, adb)
        .reboot(&state, target)
        .await
        .with_context(|| format!("Could not reboot to {target}"))?;

    if is_json() {
        let json = serde_json::json!({
            "status": "success",
            "from": state.mode,
            "serial": state.serial,
            "target": target,
            "command": outcome.command,
            "message": outcome.message,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print_success(&outcome.message);
    }
    Ok(())
}
