//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod check;
pub mod detect;
pub mod doctor;
pub mod flash;
pub mod reboot;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::core::settings::Settings;
use crate::infra::dirs::AppDirs;
use crate::infra::reboot::RebootDestination;
use crate::infra::tools;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a flash config against the attached device
    Flash {
        /// Directory holding the partition images (*.img)
        images: PathBuf,

        /// Flash config script
        #[arg(short, long)]
        config: PathBuf,

        /// Never flash boot (keeps a patched boot image and root)
        #[arg(long)]
        keep_root: bool,

        /// Factory-reset before the final reboot to system
        #[arg(long)]
        wipe_data: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Also write the flash log to this file
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Path to the fastboot binary
        #[arg(long, env = "SCATTERFLASH_FASTBOOT")]
        fastboot: Option<PathBuf>,

        /// Start even if the device is not detected in bootloader or fastbootd
        #[arg(long)]
        force: bool,
    },

    /// Parse a flash config and resolve it against an image directory
    Check {
        /// Directory holding the partition images (*.img)
        images: PathBuf,

        /// Flash config script
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show the connected device and its mode
    Detect {
        /// Keep polling and print every change
        #[arg(short, long)]
        watch: bool,
    },

    /// Reboot the device, picking adb or fastboot by its current mode
    Reboot {
        /// Where to reboot to
        #[arg(value_enum)]
        target: RebootDestination,
    },

    /// Check system dependencies and settings
    Doctor,
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        let dirs = AppDirs::new();

        match self {
            Self::Flash {
                images,
                config,
                keep_root,
                wipe_data,
                yes,
                log_file,
                fastboot,
                force,
            } => {
                let settings = load_settings(&dirs)?;
                let args = flash::FlashArgs {
                    images,
                    config,
                    keep_root,
                    wipe_data,
                    yes,
                    log_file,
                    fastboot,
                    force,
                };
                flash::execute(&settings, args).await
            }
            Self::Check { images, config } => {
                let settings = load_settings(&dirs)?;
                check::execute(&settings, &images, &config)
            }
            Self::Detect { watch } => {
                let settings = load_settings(&dirs)?;
                detect::execute(&settings, watch).await
            }
            Self::Reboot { target } => {
                let settings = load_settings(&dirs)?;
                reboot::execute(&settings, target).await
            }
            Self::Doctor => doctor::execute(&dirs.settings_path()).await,
        }
    }
}

fn load_settings(dirs: &AppDirs) -> Result<Settings> {
    Settings::load(dirs).context("Failed to load settings")
}

/// Resolve fastboot (required) and adb (optional)
fn resolve_tools(
    settings: &Settings,
    fastboot_flag: Option<&Path>,
) -> Result<(PathBuf, Option<PathBuf>)> {
    let fastboot = tools::resolve(
        tools::FASTBOOT,
        fastboot_flag,
        settings.tools.fastboot.as_deref(),
    )?;
    let adb = tools::resolve_optional(tools::ADB, settings.tools.adb.as_deref());
    tracing::debug!("fastboot: {}, adb: {:?}", fastboot.display(), adb);
    Ok((fastboot, adb))
}
