//! Minimal publish/acknowledge protocol.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ Payload      │──▶│ codec        │──▶│ ProtocolClient       │──▶ ByteStream
//! │ (bytes/json) │   │ (pure bytes) │   │ (session, retries)   │
//! └──────────────┘   └──────────────┘   └──────────────────────┘
//! ```
//!
//! Supports CONNECT/CONNACK, PUBLISH (QoS 0 and 1)/PUBACK, PINGREQ/PINGRESP
//! and DISCONNECT.  Subscriptions and QoS 2 are out of scope.

pub mod client;
pub mod codec;
pub mod payload;

pub use client::ProtocolClient;
pub use codec::QoS;
pub use payload::Payload;
