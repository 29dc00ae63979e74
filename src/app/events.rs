//! Outbound link events.
//!
//! The [`LinkService`](super::service::LinkService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them.

use crate::error::Error;
use crate::selector::TransportState;

/// Structured events emitted by the connectivity core.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The service has started on the given transport.
    Started(TransportState),

    /// Cellular was unavailable again; carries the consecutive count.
    CellularDegraded { failures: u32 },

    /// The active transport changed.
    TransportSwitched { from: TransportState, to: TransportState },

    /// Fallback WiFi dropped and was re-associated in place.
    WifiReconnected,

    /// A WiFi connect attempt (fallback or in-place) failed.
    WifiConnectFailed,

    /// A telemetry message was acknowledged by the broker.
    TelemetryPublished { bytes: usize },

    /// A telemetry publish failed; the session will be re-established.
    PublishFailed(Error),

    /// An update check finished.
    UpdateChecked { updated: usize, failed: usize },

    /// Files were replaced; the host loop must restart the process.
    RestartRequired,
}
