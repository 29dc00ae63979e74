//! Link service: the polling loop's single entry point.
//!
//! [`LinkService`] owns the selector, the protocol client and the update
//! manager, and drives them in a fixed order once per [`poll`]:
//!
//! ```text
//!  cellular ─┐                              ┌──▶ EventSink
//!            ├─▶ snapshot ─▶ ┌────────────┐ │
//!  wifi ─────┘               │ LinkService│─┤
//!                            │ selector   │ └──▶ CycleOutcome
//!                            │ client     │
//!                            │ updater    │──▶ Connector (active route)
//!                            └────────────┘
//! ```
//!
//! 1. Capture a [`ConnectivitySnapshot`] (only when some job is due).
//! 2. Evaluate the selector on its interval; a switch drops the protocol
//!    session, since its stream was routed over the old link.
//! 3. Publish telemetry on its interval if the active link is usable.
//! 4. Run the update check on its interval if the active link is usable.
//! 5. Credit bytes moved to whichever transport is active.
//!
//! [`poll`]: LinkService::poll

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::LinkConfig;
use crate::error::{Error, TransportError};
use crate::protocol::{Payload, ProtocolClient};
use crate::scheduler::Cadence;
use crate::selector::{ConnectivitySnapshot, Evaluation, TransportSelector, TransportState};
use crate::update::{UpdateCycleResult, UpdateManager, UpdateStatus};

use super::events::LinkEvent;
use super::ports::{Connector, EventSink, LinkTransport, TrafficStats};

// ───────────────────────────────────────────────────────────────
// Cycle outcome
// ───────────────────────────────────────────────────────────────

/// What one [`LinkService::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Active transport after the cycle.
    pub state: TransportState,
    /// Selector result, when it ran this cycle.
    pub evaluation: Option<Evaluation>,
    /// `Some(true)` when a publish was acknowledged, `Some(false)` when
    /// one was attempted and failed.
    pub published: Option<bool>,
    /// Update result, when a check ran this cycle.
    pub update: Option<UpdateCycleResult>,
    /// Files were replaced; the caller must restart.
    pub restart_required: bool,
}

impl CycleOutcome {
    fn idle(state: TransportState) -> Self {
        Self { state, evaluation: None, published: None, update: None, restart_required: false }
    }
}

// ───────────────────────────────────────────────────────────────
// LinkService
// ───────────────────────────────────────────────────────────────

pub struct LinkService<C: Connector + Clone, D: DelayNs> {
    device_id: String,
    topic_prefix: String,
    max_reconnect_attempts: u32,
    selector: TransportSelector,
    client: ProtocolClient<C, D>,
    updater: UpdateManager<C>,
    check: Cadence,
    publish: Cadence,
    last_snapshot: ConnectivitySnapshot,
}

impl<C: Connector + Clone, D: DelayNs> LinkService<C, D> {
    /// `update_root` is the local directory the tracked files live in.
    pub fn new(config: LinkConfig, connector: C, delay: D, update_root: impl Into<std::path::PathBuf>) -> Self {
        let LinkConfig { device_id, transport, broker, update } = config;
        Self {
            topic_prefix: broker.topic_prefix.clone(),
            max_reconnect_attempts: broker.max_reconnect_attempts,
            check: Cadence::from_secs("check", transport.check_interval_secs),
            publish: Cadence::from_secs("publish", broker.publish_interval_secs),
            selector: TransportSelector::new(&transport),
            client: ProtocolClient::new(connector.clone(), delay, broker, device_id.clone()),
            updater: UpdateManager::new(connector, update, update_root),
            device_id,
            last_snapshot: ConnectivitySnapshot::default(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        let state = self.selector.state();
        info!("LinkService started on {} as {}", state, self.device_id);
        sink.emit(&LinkEvent::Started(state));
    }

    /// Close the protocol session (best effort).
    pub fn shutdown(&mut self) {
        self.client.disconnect();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> TransportState {
        self.selector.state()
    }

    pub fn selector(&self) -> &TransportSelector {
        &self.selector
    }

    pub fn client(&self) -> &ProtocolClient<C, D> {
        &self.client
    }

    pub fn last_snapshot(&self) -> &ConnectivitySnapshot {
        &self.last_snapshot
    }

    pub fn update_status(&mut self, now_secs: u64) -> UpdateStatus {
        self.updater.get_status(now_secs)
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one cycle.  `telemetry` is published when the publish interval
    /// has elapsed; `None` means there is nothing to send yet.
    pub fn poll(
        &mut self,
        now_ms: u64,
        cellular: &mut impl LinkTransport,
        wifi: &mut impl LinkTransport,
        telemetry: Option<Payload<'_>>,
        sink: &mut impl EventSink,
    ) -> CycleOutcome {
        let now_secs = now_ms / 1000;
        let check_due = self.check.due(now_ms);
        let publish_due = telemetry.is_some() && self.publish.due(now_ms);
        let update_due = self.updater.is_due(now_secs);
        if !(check_due || publish_due || update_due) {
            return CycleOutcome::idle(self.selector.state());
        }

        // 1. Snapshot
        let snapshot = ConnectivitySnapshot::from_status(&cellular.status(), &wifi.status());

        // 2. Transport selection
        let evaluation = check_due.then(|| self.evaluate(&snapshot, wifi, now_ms, sink));
        let usable = match evaluation {
            Some(Evaluation::Switched { to: TransportState::FallbackWifi, .. } | Evaluation::WifiReconnected) => {
                true
            }
            _ => self.selector.link_usable(&snapshot),
        };
        self.last_snapshot = snapshot;

        let mut outcome = CycleOutcome { evaluation, ..CycleOutcome::idle(self.selector.state()) };

        // 3. Telemetry
        if let (true, Some(payload)) = (publish_due, telemetry) {
            if usable {
                outcome.published = Some(self.publish_telemetry(payload, now_ms, sink));
            } else {
                warn!("LinkService: {} link unusable, telemetry skipped", self.selector.state());
            }
        }

        // 4. Self-update
        if update_due && usable {
            let result = self.updater.check_and_update(now_secs, false);
            sink.emit(&LinkEvent::UpdateChecked { updated: result.files_updated, failed: result.files_failed });
            if result.restart_required {
                sink.emit(&LinkEvent::RestartRequired);
                outcome.restart_required = true;
            }
            outcome.update = Some(result);
        }

        // 5. Traffic accounting
        let mut moved = self.client.take_traffic();
        let fetched = self.updater.take_traffic();
        moved.add(fetched.sent, fetched.received);
        self.credit_traffic(moved, cellular, wifi);

        outcome
    }

    // ── Internal ──────────────────────────────────────────────

    fn evaluate(
        &mut self,
        snapshot: &ConnectivitySnapshot,
        wifi: &mut impl LinkTransport,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Evaluation {
        let evaluation = self.selector.evaluate(snapshot, wifi, now_ms);
        match evaluation {
            Evaluation::Stayed => {}
            Evaluation::FailureCounted(failures) => sink.emit(&LinkEvent::CellularDegraded { failures }),
            Evaluation::FallbackAttemptFailed(failures) => {
                sink.emit(&LinkEvent::CellularDegraded { failures });
                sink.emit(&LinkEvent::WifiConnectFailed);
            }
            Evaluation::Switched { from, to } => {
                self.client.disconnect();
                sink.emit(&LinkEvent::TransportSwitched { from, to });
            }
            Evaluation::WifiReconnected => {
                self.client.disconnect();
                sink.emit(&LinkEvent::WifiReconnected);
            }
            Evaluation::WifiReconnectFailed => sink.emit(&LinkEvent::WifiConnectFailed),
        }
        evaluation
    }

    fn publish_telemetry(&mut self, payload: Payload<'_>, now_ms: u64, sink: &mut impl EventSink) -> bool {
        // After the reconnect bound is hit, only a fresh connect may lift it.
        if !self.client.is_connected() && self.client.reconnect_attempts() >= self.max_reconnect_attempts {
            info!("LinkService: reconnect bound reached, trying a fresh session");
            if let Err(e) = self.client.connect(true, now_ms) {
                sink.emit(&LinkEvent::PublishFailed(e));
                return false;
            }
        }

        match self.client.publish_telemetry(&self.topic_prefix, &self.device_id, payload, now_ms) {
            Ok(()) => {
                let bytes = payload.to_wire().map_or(0, |w| w.len());
                sink.emit(&LinkEvent::TelemetryPublished { bytes });
                true
            }
            Err(e) => {
                if e == Error::Transport(TransportError::RetriesExhausted) {
                    warn!("LinkService: reconnects exhausted, will retry next interval");
                }
                sink.emit(&LinkEvent::PublishFailed(e));
                false
            }
        }
    }

    fn credit_traffic(&self, moved: TrafficStats, cellular: &mut impl LinkTransport, wifi: &mut impl LinkTransport) {
        if moved.total() == 0 {
            return;
        }
        match self.selector.state() {
            TransportState::PrimaryCellular => cellular.record_traffic(moved.sent, moved.received),
            TransportState::FallbackWifi => wifi.record_traffic(moved.sent, moved.received),
        }
    }
}
