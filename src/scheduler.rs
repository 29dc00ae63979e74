//! Interval gates for the polling loop.
//!
//! The loop runs far more often than any of its jobs.  Each job owns a
//! [`Cadence`] that answers "is it time yet" against the monotonic clock.
//!
//! ```text
//!   poll ──▶ Cadence(check)   ──▶ TransportSelector::evaluate
//!        ──▶ Cadence(publish) ──▶ ProtocolClient::publish_telemetry
//! ```
//!
//! A cadence fires on its first query, then every `interval_ms`.  If the
//! clock is seen to go backwards the cadence re-anchors to the new time
//! instead of waiting out the difference.

use log::warn;

#[derive(Debug, Clone)]
pub struct Cadence {
    /// Shown in log lines (e.g. "check", "publish").
    label: &'static str,
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl Cadence {
    pub fn new(label: &'static str, interval_ms: u64) -> Self {
        Self { label, interval_ms, last_ms: None }
    }

    pub fn from_secs(label: &'static str, interval_secs: u32) -> Self {
        Self::new(label, u64::from(interval_secs) * 1000)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// True when the interval has elapsed; arms the next interval.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.last_ms {
            None => {
                self.last_ms = Some(now_ms);
                true
            }
            Some(last) if now_ms < last => {
                warn!("Cadence '{}': clock went backwards ({} < {}), re-anchoring", self.label, now_ms, last);
                self.last_ms = Some(now_ms);
                false
            }
            Some(last) if now_ms - last >= self.interval_ms => {
                self.last_ms = Some(now_ms);
                true
            }
            Some(_) => false,
        }
    }

    /// Milliseconds until the next firing; zero when due.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.last_ms {
            None => 0,
            Some(last) => self.interval_ms.saturating_sub(now_ms.saturating_sub(last)),
        }
    }
}
