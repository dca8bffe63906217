//! Bootloader protocol client
//!
//! [`Fastboot`] is the fixed vocabulary of operations the executor issues.
//! [`FastbootCli`] implements it by invoking the platform-tools `fastboot`
//! binary, one process per operation, each bounded by a timeout from
//! [`OperationTimeouts`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::defaults;
use crate::core::plan::Slot;
use crate::error::ProtocolError;
use crate::infra::process::{self, CommandOutput};

/// Result of one protocol operation
pub type ProtocolResult = Result<CommandOutput, ProtocolError>;

/// Operations understood by a device in bootloader or fastbootd mode
#[async_trait]
pub trait Fastboot: Send + Sync {
    /// `fastboot devices`
    async fn devices(&self) -> ProtocolResult;

    /// `fastboot getvar <name>`
    async fn get_var(&self, name: &str) -> ProtocolResult;

    /// `fastboot reboot-bootloader`
    async fn reboot_bootloader(&self) -> ProtocolResult;

    /// `fastboot reboot fastboot`
    async fn reboot_fastbootd(&self) -> ProtocolResult;

    /// `fastboot reboot`
    async fn reboot_system(&self) -> ProtocolResult;

    /// `fastboot [--disable-verity --disable-verification] flash <partition> <image>`
    async fn flash(&self, partition: &str, image: &Path, disable_verity: bool) -> ProtocolResult;

    /// `fastboot delete-logical-partition <name>`
    async fn delete_logical_partition(&self, name: &str) -> ProtocolResult;

    /// `fastboot create-logical-partition <name> <size>`
    async fn create_logical_partition(&self, name: &str, size: &str) -> ProtocolResult;

    /// `fastboot set_active <slot>`
    async fn set_active(&self, slot: Slot) -> ProtocolResult;

    /// `fastboot erase <partition>`
    async fn erase(&self, partition: &str) -> ProtocolResult;

    /// `fastboot -w`
    async fn wipe(&self) -> ProtocolResult;
}

/// Per-operation time budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub getvar: Duration,
    pub reboot: Duration,
    pub flash: Duration,
    pub logical_partition: Duration,
    pub set_active: Duration,
    pub erase_userdata: Duration,
    pub erase: Duration,
    pub wipe: Duration,
    pub probe: Duration,
}

impl OperationTimeouts {
    /// Budget for erasing `partition`; userdata is by far the largest
    pub fn erase_for(&self, partition: &str) -> Duration {
        if partition == "userdata" {
            self.erase_userdata
        } else {
            self.erase
        }
    }
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            getvar: Duration::from_secs(defaults::GETVAR_TIMEOUT),
            reboot: Duration::from_secs(defaults::REBOOT_TIMEOUT),
            flash: Duration::from_secs(defaults::FLASH_TIMEOUT),
            logical_partition: Duration::from_secs(defaults::LOGICAL_PARTITION_TIMEOUT),
            set_active: Duration::from_secs(defaults::SET_ACTIVE_TIMEOUT),
            erase_userdata: Duration::from_secs(defaults::ERASE_USERDATA_TIMEOUT),
            erase: Duration::from_secs(defaults::ERASE_TIMEOUT),
            wipe: Duration::from_secs(defaults::WIPE_TIMEOUT),
            probe: Duration::from_secs(defaults::PROBE_TIMEOUT),
        }
    }
}

/// [`Fastboot`] backed by the `fastboot` binary
#[derive(Debug, Clone)]
pub struct FastbootCli {
    binary: PathBuf,
    timeouts: OperationTimeouts,
}

impl FastbootCli {
    /// Create a client for the given `fastboot` binary
    pub fn new(binary: PathBuf, timeouts: OperationTimeouts) -> Self {
        Self { binary, timeouts }
    }

    /// Commands address whichever device fastboot picks; flashing assumes
    /// exactly one is attached.
    async fn exec(&self, args: &[&str], timeout: Duration) -> ProtocolResult {
        process::run(&self.binary, args, timeout).await
    }
}

#[async_trait]
impl Fastboot for FastbootCli {
    async fn devices(&self) -> ProtocolResult {
        self.exec(&["devices"], self.timeouts.probe).await
    }

    async fn get_var(&self, name: &str) -> ProtocolResult {
        self.exec(&["getvar", name], self.timeouts.getvar).await
    }

    async fn reboot_bootloader(&self) -> ProtocolResult {
        self.exec(&["reboot-bootloader"], self.timeouts.reboot).await
    }

    async fn reboot_fastbootd(&self) -> ProtocolResult {
        self.exec(&["reboot", "fastboot"], self.timeouts.reboot).await
    }

    async fn reboot_system(&self) -> ProtocolResult {
        self.exec(&["reboot"], self.timeouts.reboot).await
    }

    async fn flash(&self, partition: &str, image: &Path, disable_verity: bool) -> ProtocolResult {
        let image = image.to_string_lossy().into_owned();
        let mut args: Vec<&str> = Vec::with_capacity(5);
        if disable_verity {
            args.push("--disable-verity");
            args.push("--disable-verification");
        }
        args.extend_from_slice(&["flash", partition, image.as_str()]);
        self.exec(&args, self.timeouts.flash).await
    }

    async fn delete_logical_partition(&self, name: &str) -> ProtocolResult {
        self.exec(&["delete-logical-partition", name], self.timeouts.logical_partition)
            .await
    }

    async fn create_logical_partition(&self, name: &str, size: &str) -> ProtocolResult {
        self.exec(
            &["create-logical-partition", name, size],
            self.timeouts.logical_partition,
        )
        .await
    }

    async fn set_active(&self, slot: Slot) -> ProtocolResult {
        self.exec(&["set_active", slot.as_str()], self.timeouts.set_active)
            .await
    }

    async fn erase(&self, partition: &str) -> ProtocolResult {
        self.exec(&["erase", partition], self.timeouts.erase_for(partition))
            .await
    }

    async fn wipe(&self) -> ProtocolResult {
        self.exec(&["-w"], self.timeouts.wipe).await
    }
}

/// Serials listed by `fastboot devices`
pub fn parse_device_serials(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.to_lowercase().starts_with("(bootloader)"))
        .filter_map(|l| l.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Value of `<name>: <value>` in `getvar` output
///
/// fastboot prints `product: umi` followed by a timing line; older builds
/// prefix it with `(bootloader)`.
pub fn parse_var(output: &str, name: &str) -> Option<String> {
    let key = format!("{}:", name.to_ascii_lowercase());
    output.lines().find_map(|line| {
        let lower = line.to_ascii_lowercase();
        lower
            .find(&key)
            .map(|pos| line[pos + key.len()..].trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_serials() {
        let out = "1a2b3c4d\tfastboot\nemulator-5554\tfastboot\n\n";
        assert_eq!(parse_device_serials(out), vec!["1a2b3c4d", "emulator-5554"]);
    }

    #[test]
    fn test_parse_device_serials_empty() {
        assert!(parse_device_serials("").is_empty());
        assert!(parse_device_serials("(bootloader) noise\n").is_empty());
    }

    #[test]
    fn test_parse_var() {
        let out = "product: umi\nFinished. Total time: 0.002s";
        assert_eq!(parse_var(out, "product"), Some("umi".to_string()));
    }

    #[test]
    fn test_parse_var_with_bootloader_prefix() {
        let out = "(bootloader) is-userspace: yes\nOKAY";
        assert_eq!(parse_var(out, "is-userspace"), Some("yes".to_string()));
    }

    #[test]
    fn test_parse_var_missing() {
        assert_eq!(parse_var("FAILED (remote: 'unknown variable')", "product"), None);
    }

    #[test]
    fn test_erase_timeouts() {
        let t = OperationTimeouts::default();
        assert_eq!(t.erase_for("userdata"), Duration::from_secs(180));
        assert_eq!(t.erase_for("metadata"), Duration::from_secs(60));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flash_argument_order() {
        // /bin/echo stands in for fastboot so the argument list comes back as output
        let fb = FastbootCli::new(PathBuf::from("/bin/echo"), OperationTimeouts::default());
        let out = fb.flash("boot_a", Path::new("/img/boot.img"), true).await.unwrap();
        assert!(out.success);
        assert_eq!(
            out.output,
            "--disable-verity --disable-verification flash boot_a /img/boot.img"
        );
    }
}
