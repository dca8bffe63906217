//! Fake device for testing
//!
//! [`FakeFastboot`] records every protocol operation without touching
//! hardware and simulates the mode changes a real device goes through on
//! reboot. It also implements [`ConnectivityProbe`] so a device watcher can
//! be pointed at the same simulated device.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::plan::Slot;
use crate::error::ProtocolError;
use crate::infra::fastboot::{Fastboot, ProtocolResult};
use crate::infra::probe::{ConnectionMode, ConnectivityProbe, ConnectivityState};
use crate::infra::process::CommandOutput;

/// Serial reported by the fake device
pub const FAKE_SERIAL: &str = "FAKE0001";

/// A recorded protocol operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Devices,
    GetVar(String),
    RebootBootloader,
    RebootFastbootD,
    RebootSystem,
    Flash {
        partition: String,
        image: PathBuf,
        disable_verity: bool,
    },
    DeleteLogicalPartition(String),
    CreateLogicalPartition {
        name: String,
        size: String,
    },
    SetActive(Slot),
    Erase(String),
    Wipe,
}

impl Operation {
    /// fastboot command line for this operation, used to key scripted responses
    pub fn command(&self) -> String {
        match self {
            Self::Devices => "devices".to_string(),
            Self::GetVar(name) => format!("getvar {name}"),
            Self::RebootBootloader => "reboot-bootloader".to_string(),
            Self::RebootFastbootD => "reboot fastboot".to_string(),
            Self::RebootSystem => "reboot".to_string(),
            Self::Flash { partition, .. } => format!("flash {partition}"),
            Self::DeleteLogicalPartition(name) => format!("delete-logical-partition {name}"),
            Self::CreateLogicalPartition { name, size } => {
                format!("create-logical-partition {name} {size}")
            }
            Self::SetActive(slot) => format!("set_active {slot}"),
            Self::Erase(partition) => format!("erase {partition}"),
            Self::Wipe => "-w".to_string(),
        }
    }

    /// Whether the operation changes device state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Devices | Self::GetVar(_))
    }

    /// Whether the operation is a reboot of any kind
    pub fn is_reboot(&self) -> bool {
        matches!(
            self,
            Self::RebootBootloader | Self::RebootFastbootD | Self::RebootSystem
        )
    }
}

/// Scripted reply to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeResponse {
    /// Exit 0 with this output
    Ok(String),
    /// Non-zero exit with this output
    Fail(String),
    /// Never answers within its budget
    Timeout,
}

#[derive(Debug)]
struct FakeState {
    mode: ConnectionMode,
    product: String,
    /// Whether reboots change `mode`
    reboots_land: bool,
    responses: HashMap<String, FakeResponse>,
    operations: Vec<Operation>,
}

/// Recording fake of a fastboot device
#[derive(Debug, Clone)]
pub struct FakeFastboot {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeFastboot {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFastboot {
    /// A device in bootloader mode reporting product `foo`
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                mode: ConnectionMode::Bootloader,
                product: "foo".to_string(),
                reboots_land: true,
                responses: HashMap::new(),
                operations: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn in_mode(self, mode: ConnectionMode) -> Self {
        self.lock().mode = mode;
        self
    }

    #[must_use]
    pub fn with_product(self, product: &str) -> Self {
        self.lock().product = product.to_string();
        self
    }

    /// Reply to `command` (see [`Operation::command`]) with `response`
    #[must_use]
    pub fn respond(self, command: &str, response: FakeResponse) -> Self {
        self.lock()
            .responses
            .insert(command.to_string(), response);
        self
    }

    /// Accept reboot commands but never change mode
    #[must_use]
    pub fn stuck(self) -> Self {
        self.lock().reboots_land = false;
        self
    }

    /// Current simulated mode
    pub fn mode(&self) -> ConnectionMode {
        self.lock().mode
    }

    /// All operations recorded so far
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Recorded operations that change device state
    pub fn mutating_operations(&self) -> Vec<Operation> {
        self.lock()
            .operations
            .iter()
            .filter(|op| op.is_mutating())
            .cloned()
            .collect()
    }

    /// Command lines of the mutating operations, in order
    pub fn mutating_commands(&self) -> Vec<String> {
        self.mutating_operations()
            .iter()
            .map(Operation::command)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `op` and produce its reply, applying `on_success` to the
    /// simulated device when the reply is a success
    fn handle(
        &self,
        op: Operation,
        default_output: String,
        on_success: impl FnOnce(&mut FakeState),
    ) -> ProtocolResult {
        let mut state = self.lock();
        let command = op.command();
        state.operations.push(op);

        match state.responses.get(&command).cloned() {
            Some(FakeResponse::Ok(output)) => {
                on_success(&mut state);
                Ok(CommandOutput::ok(output))
            }
            Some(FakeResponse::Fail(output)) => Ok(CommandOutput::failed(output)),
            Some(FakeResponse::Timeout) => Err(ProtocolError::Timeout {
                command: format!("fastboot {command}"),
                timeout: Duration::from_secs(1),
            }),
            None => {
                on_success(&mut state);
                Ok(CommandOutput::ok(default_output))
            }
        }
    }

    fn reboot_to(state: &mut FakeState, mode: ConnectionMode) {
        if state.reboots_land {
            state.mode = mode;
        }
    }
}

#[async_trait]
impl Fastboot for FakeFastboot {
    async fn devices(&self) -> ProtocolResult {
        let listing = if self.mode().is_fastboot() {
            format!("{FAKE_SERIAL}\tfastboot")
        } else {
            String::new()
        };
        self.handle(Operation::Devices, listing, |_| {})
    }

    async fn get_var(&self, name: &str) -> ProtocolResult {
        let value = {
            let state = self.lock();
            match name {
                "product" => Some(state.product.clone()),
                "is-userspace" if state.mode == ConnectionMode::FastbootD => {
                    Some("yes".to_string())
                }
                "is-userspace" => Some("no".to_string()),
                _ => None,
            }
        };
        let output = value.map_or_else(
            || "FAILED (remote: 'GetVar Variable Not found')".to_string(),
            |v| format!("{name}: {v}\nFinished. Total time: 0.001s"),
        );
        self.handle(Operation::GetVar(name.to_string()), output, |_| {})
    }

    async fn reboot_bootloader(&self) -> ProtocolResult {
        self.handle(Operation::RebootBootloader, "Rebooting into bootloader".into(), |s| {
            Self::reboot_to(s, ConnectionMode::Bootloader);
        })
    }

    async fn reboot_fastbootd(&self) -> ProtocolResult {
        self.handle(Operation::RebootFastbootD, "Rebooting into fastboot".into(), |s| {
            Self::reboot_to(s, ConnectionMode::FastbootD);
        })
    }

    async fn reboot_system(&self) -> ProtocolResult {
        self.handle(Operation::RebootSystem, "Rebooting".into(), |s| {
            Self::reboot_to(s, ConnectionMode::System);
        })
    }

    async fn flash(&self, partition: &str, image: &Path, disable_verity: bool) -> ProtocolResult {
        let op = Operation::Flash {
            partition: partition.to_string(),
            image: image.to_path_buf(),
            disable_verity,
        };
        self.handle(op, format!("Writing '{partition}' OKAY"), |_| {})
    }

    async fn delete_logical_partition(&self, name: &str) -> ProtocolResult {
        self.handle(
            Operation::DeleteLogicalPartition(name.to_string()),
            format!("Deleting '{name}' OKAY"),
            |_| {},
        )
    }

    async fn create_logical_partition(&self, name: &str, size: &str) -> ProtocolResult {
        let op = Operation::CreateLogicalPartition {
            name: name.to_string(),
            size: size.to_string(),
        };
        self.handle(op, format!("Creating '{name}' OKAY"), |_| {})
    }

    async fn set_active(&self, slot: Slot) -> ProtocolResult {
        self.handle(
            Operation::SetActive(slot),
            format!("Setting current slot to '{slot}' OKAY"),
            |_| {},
        )
    }

    async fn erase(&self, partition: &str) -> ProtocolResult {
        self.handle(
            Operation::Erase(partition.to_string()),
            format!("Erasing '{partition}' OKAY"),
            |_| {},
        )
    }

    async fn wipe(&self) -> ProtocolResult {
        self.handle(Operation::Wipe, "wiping userdata".into(), |_| {})
    }
}

#[async_trait]
impl ConnectivityProbe for FakeFastboot {
    async fn detect(&self) -> ConnectivityState {
        match self.mode() {
            ConnectionMode::None => ConnectivityState::default(),
            mode => ConnectivityState::new(mode, FAKE_SERIAL),
        }
    }
}
