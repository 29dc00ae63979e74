//! Port traits: the hexagonal boundary between the connectivity core and
//! the radios, sockets and serial lines it drives.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ TransportSelector / ProtocolClient / UpdateManager
//! ```
//!
//! Both WAN transports implement the same [`LinkTransport`] capability set,
//! so nothing in the core asks "does this transport support X" at runtime.
//! Stream-oriented components only see [`Connector`] and [`ByteStream`].
//!
//! ## Timeouts
//!
//! Every blocking call on these ports is bounded: `connect` takes an explicit
//! deadline, streams carry a read timeout, serial reads take one per call.

use core::fmt;
use core::time::Duration;

use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// WAN transport capability (cellular modem, WiFi radio)
// ───────────────────────────────────────────────────────────────

/// Which physical WAN link a transport drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Cellular,
    Wifi,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cellular => write!(f, "cellular"),
            Self::Wifi => write!(f, "wifi"),
        }
    }
}

/// Status record common to both transports.
///
/// | field         | cellular           | WiFi                  |
/// |---------------|--------------------|-----------------------|
/// | `responsive`  | modem answers `AT` | radio started         |
/// | `provisioned` | SIM detected       | credentials present   |
/// | `connected`   | responsive + SIM   | associated with an AP |
/// | `address`     | n/a                | station IPv4          |
/// | `signal`      | CSQ (0–31)         | RSSI (dBm)            |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub responsive: bool,
    /// `None` when the transport could not tell (e.g. modem silent).
    pub provisioned: Option<bool>,
    pub connected: bool,
    pub address: Option<heapless::String<15>>,
    pub signal: Option<i16>,
}

/// Monotonic byte counters for a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub sent: u64,
    pub received: u64,
}

impl TrafficStats {
    pub fn total(&self) -> u64 {
        self.sent.saturating_add(self.received)
    }

    /// Accumulate; counters saturate instead of wrapping.
    pub fn add(&mut self, sent: u64, received: u64) {
        self.sent = self.sent.saturating_add(sent);
        self.received = self.received.saturating_add(received);
    }
}

/// The one capability interface both WAN transports implement.
pub trait LinkTransport {
    fn kind(&self) -> TransportKind;

    /// Bring the link up, blocking at most `timeout`.
    fn connect(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Take the link down. Idempotent.
    fn disconnect(&mut self);

    /// Query live status (may issue bounded probes to the hardware).
    fn status(&mut self) -> LinkStatus;

    /// Bytes moved over this transport since the last explicit reset.
    fn traffic(&self) -> TrafficStats;

    /// Add bytes moved by whichever component currently owns the link.
    fn record_traffic(&mut self, sent: u64, received: u64);

    /// Zero the counters. Never called implicitly.
    fn reset_traffic(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Byte streams (TCP, TLS-over-TCP)
// ───────────────────────────────────────────────────────────────

/// Remote endpoint for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Negotiate TLS with certificate verification.
    pub secure: bool,
}

/// Blocking byte-oriented stream with a read deadline.
pub trait ByteStream {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed;
    /// [`TransportError::Timeout`] means the read deadline passed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write some prefix of `data`, returning how much was accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Deadline applied to each subsequent `read`.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Release the underlying socket. Idempotent.
    fn close(&mut self);

    fn write_all(&mut self, mut data: &[u8]) -> Result<(), TransportError> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => return Err(TransportError::Closed),
                n => data = &data[n..],
            }
        }
        Ok(())
    }

    /// Fill `buf` completely or fail.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Err(TransportError::Closed),
                n => filled += n,
            }
        }
        Ok(())
    }
}

/// Opens streams over whichever WAN link is currently routed.
pub trait Connector {
    type Stream: ByteStream;

    /// Open a stream, blocking at most `timeout` for the TCP connect and
    /// (when `endpoint.secure`) the TLS handshake.
    fn open(&mut self, endpoint: &Endpoint<'_>, timeout: Duration) -> Result<Self::Stream, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Serial line (modem AT channel)
// ───────────────────────────────────────────────────────────────

/// Raw UART access for the cellular modem.
pub trait SerialPort {
    /// Discard anything already buffered on the receive side.
    fn clear_input(&mut self);

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever arrives within `timeout_ms`; `Ok(0)` if nothing did.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`LinkEvent`](super::events::LinkEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::LinkEvent);
}
