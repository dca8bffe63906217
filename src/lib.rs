//! scatterflash - Scripted fastboot flashing for Android devices
//!
//! This library parses flash configs, resolves them against a directory of
//! partition images and executes them against one device over `fastboot`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Flash plans, execution and device state
//! - [`infra`] - Infrastructure layer (fastboot/adb processes, directories)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
