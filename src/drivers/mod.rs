//! Peripheral helpers.

pub mod watchdog;
