//! WAN transport selector.
//!
//! Decides once per evaluation interval whether traffic should flow over the
//! cellular modem (primary) or WiFi (fallback).
//!
//! ```text
//!                 cellular unavailable × threshold
//!                 AND WiFi connect succeeds
//!  PRIMARY_CELLULAR ─────────────────────────────▶ FALLBACK_WIFI
//!        ▲                                              │
//!        └──────────── cellular available ──────────────┘
//!                      (immediate, no threshold)
//! ```
//!
//! ## Hysteresis
//!
//! Leaving the primary needs `failure_threshold` consecutive bad
//! evaluations; returning to it needs one good one.  Cellular counts as
//! available when the modem answers its liveness probe and a SIM is present,
//! regardless of signal strength.
//!
//! A failed WiFi connect is never fatal: the counter keeps climbing and the
//! connect is retried at the next evaluation.

use core::fmt;
use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{LinkStatus, LinkTransport};
use crate::config::TransportConfig;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Which transport currently carries traffic.  Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    PrimaryCellular,
    FallbackWifi,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryCellular => write!(f, "PrimaryCellular"),
            Self::FallbackWifi => write!(f, "FallbackWifi"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-cycle input
// ---------------------------------------------------------------------------

/// Immutable view of both transports, captured once per cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub cellular_uart_ok: bool,
    /// `None` when the modem did not answer the SIM query.
    pub sim_present: Option<bool>,
    pub cellular_signal: Option<i16>,
    pub wifi_connected: bool,
    pub wifi_ip: Option<heapless::String<15>>,
    pub wifi_signal: Option<i16>,
}

impl ConnectivitySnapshot {
    pub fn from_status(cellular: &LinkStatus, wifi: &LinkStatus) -> Self {
        Self {
            cellular_uart_ok: cellular.responsive,
            sim_present: cellular.provisioned,
            cellular_signal: cellular.signal,
            wifi_connected: wifi.connected,
            wifi_ip: wifi.address.clone(),
            wifi_signal: wifi.signal,
        }
    }

    /// Modem alive and SIM detected.  Signal strength is deliberately ignored.
    pub fn cellular_available(&self) -> bool {
        self.cellular_uart_ok && self.sim_present == Some(true)
    }
}

// ---------------------------------------------------------------------------
// Per-cycle output
// ---------------------------------------------------------------------------

/// What a single evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Nothing changed (includes "cellular recovered, counter reset").
    Stayed,
    /// Cellular unavailable, still below the threshold.
    FailureCounted(u32),
    /// Threshold reached but the WiFi connect failed.
    FallbackAttemptFailed(u32),
    Switched { from: TransportState, to: TransportState },
    /// On fallback, WiFi had dropped and was re-associated.
    WifiReconnected,
    /// On fallback, WiFi had dropped and re-association failed.
    WifiReconnectFailed,
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

pub struct TransportSelector {
    state: TransportState,
    /// Consecutive cellular-unavailable evaluations while on the primary.
    failures: u32,
    last_switch_ms: Option<u64>,
    threshold: u32,
    wifi_timeout: Duration,
}

impl TransportSelector {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            state: TransportState::PrimaryCellular,
            failures: 0,
            last_switch_ms: None,
            threshold: config.failure_threshold.max(1),
            wifi_timeout: Duration::from_secs(u64::from(config.wifi_connect_timeout_secs)),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Monotonic time of the last transition, if any happened yet.
    pub fn last_switch_ms(&self) -> Option<u64> {
        self.last_switch_ms
    }

    /// Whether the currently active transport can carry a stream, judged
    /// from `snap`.
    pub fn link_usable(&self, snap: &ConnectivitySnapshot) -> bool {
        match self.state {
            TransportState::PrimaryCellular => snap.cellular_available(),
            TransportState::FallbackWifi => snap.wifi_connected,
        }
    }

    /// Run one evaluation against `snap`, driving `wifi` when needed.
    pub fn evaluate(
        &mut self,
        snap: &ConnectivitySnapshot,
        wifi: &mut impl LinkTransport,
        now_ms: u64,
    ) -> Evaluation {
        match self.state {
            TransportState::PrimaryCellular => self.evaluate_primary(snap, wifi, now_ms),
            TransportState::FallbackWifi => self.evaluate_fallback(snap, wifi, now_ms),
        }
    }

    // ── Internal ──────────────────────────────────────────────────

    fn evaluate_primary(
        &mut self,
        snap: &ConnectivitySnapshot,
        wifi: &mut impl LinkTransport,
        now_ms: u64,
    ) -> Evaluation {
        if snap.cellular_available() {
            if self.failures > 0 {
                info!("LINK: cellular recovered after {} failed checks", self.failures);
                self.failures = 0;
            }
            return Evaluation::Stayed;
        }

        self.failures = self.failures.saturating_add(1);
        warn!(
            "LINK: cellular unavailable (uart_ok={} sim={:?}) count={}",
            snap.cellular_uart_ok, snap.sim_present, self.failures
        );

        if self.failures < self.threshold {
            return Evaluation::FailureCounted(self.failures);
        }

        info!("LINK: threshold {} reached, trying WiFi fallback", self.threshold);
        if connect_confirmed(wifi, self.wifi_timeout) {
            self.failures = 0;
            self.transition(TransportState::FallbackWifi, now_ms);
            Evaluation::Switched {
                from: TransportState::PrimaryCellular,
                to: TransportState::FallbackWifi,
            }
        } else {
            warn!("LINK: WiFi fallback failed, retrying next check");
            Evaluation::FallbackAttemptFailed(self.failures)
        }
    }

    fn evaluate_fallback(
        &mut self,
        snap: &ConnectivitySnapshot,
        wifi: &mut impl LinkTransport,
        now_ms: u64,
    ) -> Evaluation {
        if snap.cellular_available() {
            info!("LINK: cellular back, leaving WiFi fallback");
            wifi.disconnect();
            self.failures = 0;
            self.transition(TransportState::PrimaryCellular, now_ms);
            return Evaluation::Switched {
                from: TransportState::FallbackWifi,
                to: TransportState::PrimaryCellular,
            };
        }

        if snap.wifi_connected {
            return Evaluation::Stayed;
        }

        warn!("LINK: fallback WiFi dropped, reconnecting");
        if connect_confirmed(wifi, self.wifi_timeout) {
            info!("LINK: WiFi reconnected");
            Evaluation::WifiReconnected
        } else {
            warn!("LINK: WiFi reconnect failed, retrying next check");
            Evaluation::WifiReconnectFailed
        }
    }

    fn transition(&mut self, next: TransportState, now_ms: u64) {
        info!("LINK transition: {} -> {}", self.state, next);
        self.state = next;
        self.last_switch_ms = Some(now_ms);
    }
}

/// Connect, then confirm the link actually reports connected.
fn connect_confirmed(wifi: &mut impl LinkTransport, timeout: Duration) -> bool {
    match wifi.connect(timeout) {
        Ok(()) => wifi.status().connected,
        Err(e) => {
            warn!("LINK: WiFi connect error: {}", e);
            false
        }
    }
}
