//! Connectivity core: ports, events and the orchestrating service.
//!
//! All interaction with radios, sockets and the serial line happens through
//! the **port traits** in [`ports`], so the core runs unchanged against
//! mocks on the host.

pub mod events;
pub mod ports;
pub mod service;
