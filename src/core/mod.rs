//! Core flashing logic
//!
//! Process I/O lives behind the [`crate::infra::fastboot::Fastboot`] and
//! [`crate::infra::probe::ConnectivityProbe`] traits; everything here works
//! against those.
//!
//! # Submodules
//!
//! - [`plan`] - Flash config parsing
//! - [`partition`] - Partition token resolution and failure policy
//! - [`images`] - Image directory scanning
//! - [`identity`] - Device identity check
//! - [`mode`] - Bootloader/fastbootd mode switching
//! - [`executor`] - Plan execution
//! - [`watcher`] - Background connectivity polling
//! - [`sink`] - Log and progress reporting
//! - [`settings`] - Global settings
//! - [`doctor`] - Environment checks

pub mod doctor;
pub mod executor;
pub mod identity;
pub mod images;
pub mod mode;
pub mod partition;
pub mod plan;
pub mod settings;
pub mod sink;
pub mod watcher;
