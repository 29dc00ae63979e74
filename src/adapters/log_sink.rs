//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each [`LinkEvent`] as one line to the
//! logger (UART / USB-CDC on device, stderr on host).

use log::{info, warn};

use crate::app::events::LinkEvent;
use crate::app::ports::EventSink;

#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &LinkEvent) {
        match event {
            LinkEvent::Started(state) => info!("START | transport={}", state),
            LinkEvent::CellularDegraded { failures } => {
                warn!("LINK  | cellular unavailable, consecutive={}", failures);
            }
            LinkEvent::TransportSwitched { from, to } => info!("LINK  | {} -> {}", from, to),
            LinkEvent::WifiReconnected => info!("LINK  | wifi re-associated"),
            LinkEvent::WifiConnectFailed => warn!("LINK  | wifi connect failed"),
            LinkEvent::TelemetryPublished { bytes } => info!("TELEM | published {} bytes", bytes),
            LinkEvent::PublishFailed(e) => warn!("TELEM | publish failed: {}", e),
            LinkEvent::UpdateChecked { updated, failed } => {
                info!("OTA   | updated={} failed={}", updated, failed);
            }
            LinkEvent::RestartRequired => warn!("OTA   | files replaced, restart required"),
        }
    }
}
