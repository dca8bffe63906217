//! Configuration constants
//!
//! - [`defaults`] - Timeouts, polling cadence and other default values

pub mod defaults;
