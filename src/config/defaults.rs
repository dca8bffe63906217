//! Default configuration values
//!
//! All durations are in seconds.

/// Name of the settings file inside the config directory
pub const SETTINGS_FILE: &str = "config.toml";

/// `getvar` queries (product, is-userspace)
pub const GETVAR_TIMEOUT: u64 = 5;

/// `fastboot devices` / `adb devices` during connectivity probing
pub const PROBE_TIMEOUT: u64 = 2;

/// Reboot commands; the device usually drops off the bus before answering
pub const REBOOT_TIMEOUT: u64 = 10;

/// Flashing a single partition image
pub const FLASH_TIMEOUT: u64 = 120;

/// Creating or deleting a logical partition
pub const LOGICAL_PARTITION_TIMEOUT: u64 = 30;

/// `set_active`
pub const SET_ACTIVE_TIMEOUT: u64 = 10;

/// `erase userdata` (large partition)
pub const ERASE_USERDATA_TIMEOUT: u64 = 180;

/// `erase metadata` and other erases
pub const ERASE_TIMEOUT: u64 = 60;

/// `fastboot -w`
pub const WIPE_TIMEOUT: u64 = 180;

/// Wait after a mode-switch reboot before polling starts
pub const MODE_SWITCH_SETTLE: u64 = 3;

/// Interval between mode checks
pub const MODE_POLL_INTERVAL: u64 = 1;

/// Number of mode checks before giving up
pub const MODE_POLL_ATTEMPTS: u32 = 10;

/// How long an in-plan reboot to bootloader is observed
pub const BOOTLOADER_REBOOT_SETTLE: u64 = 8;

/// Device watcher cadence
pub const WATCHER_INTERVAL: u64 = 2;

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
