//! Fieldlink: connectivity core for a field telemetry station.
//!
//! WAN failover between cellular and WiFi, a publish/acknowledge client and
//! hash-checked self-update, all driven from one polling loop.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]` within
//! each module, so the whole crate builds and tests on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod selector;
pub mod update;

pub use error::{Error, Result};
