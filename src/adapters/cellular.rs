//! Cellular modem adapter (AT command channel).
//!
//! Implements [`LinkTransport`] for a modem attached over UART.  The data
//! session itself is brought up by the modem firmware; this adapter only
//! answers "is the modem alive and does it have a SIM".
//!
//! ## Probes
//!
//! | command    | meaning                    | parse                          |
//! |------------|----------------------------|--------------------------------|
//! | `ATE0`     | disable echo               | `OK`                           |
//! | `AT`       | liveness                   | `OK`                           |
//! | `AT+CPIN?` | SIM presence               | `NOT INSERTED` / `+CPIN:`      |
//! | `AT+CSQ`   | signal quality (0–31)      | `+CSQ: <rssi>,<ber>`, 99 = n/a |
//!
//! Every probe clears stale input first and is bounded by its own timeout.

use core::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::{LinkStatus, LinkTransport, SerialPort, TrafficStats, TransportKind};
use crate::error::TransportError;

/// Liveness and SIM probes.
const PROBE_TIMEOUT_MS: u32 = 1_000;

/// Signal quality can take a moment after attach.
const CSQ_TIMEOUT_MS: u32 = 2_000;

/// Granularity of the serial read loop.
const READ_SLICE_MS: u32 = 100;

/// Probes never buffer more than this.
const MAX_RESPONSE: usize = 256;

/// CSQ value meaning "not known or not detectable".
const CSQ_UNKNOWN: i16 = 99;

pub struct CellularModem<S: SerialPort> {
    serial: S,
    traffic: TrafficStats,
}

impl<S: SerialPort> CellularModem<S> {
    pub fn new(serial: S) -> Self {
        Self { serial, traffic: TrafficStats::default() }
    }

    /// Send `cmd` and collect the reply until a final result code or the
    /// deadline.
    ///
    /// Returns the raw reply when it ends in `OK` or `ERROR`;
    /// [`TransportError::Timeout`] otherwise.
    pub fn probe(&mut self, cmd: &str, timeout_ms: u32) -> Result<String, TransportError> {
        self.serial.clear_input();
        self.serial.write(cmd.as_bytes())?;
        self.serial.write(b"\r\n")?;

        let mut reply = String::new();
        let mut buf = [0u8; 64];
        let mut remaining = timeout_ms;
        while remaining > 0 {
            let slice = remaining.min(READ_SLICE_MS);
            let n = self.serial.read(&mut buf, slice)?;
            remaining -= slice;
            if n == 0 {
                continue;
            }
            reply.push_str(&String::from_utf8_lossy(&buf[..n]));
            if has_final_result(&reply) {
                debug!("MODEM: {} -> {:?}", cmd, reply.trim());
                return Ok(reply);
            }
            if reply.len() > MAX_RESPONSE {
                break;
            }
        }
        debug!("MODEM: {} timed out ({:?})", cmd, reply.trim());
        Err(TransportError::Timeout)
    }

    /// Disable command echo so replies parse cleanly.
    pub fn init(&mut self) -> Result<(), TransportError> {
        let reply = self.probe("ATE0", PROBE_TIMEOUT_MS)?;
        if is_ok(&reply) {
            info!("MODEM: echo disabled");
            Ok(())
        } else {
            Err(TransportError::ModemUnresponsive)
        }
    }

    /// Liveness, SIM presence and signal quality.
    ///
    /// SIM and signal are only queried when the modem answers `AT`.
    pub fn modem_status(&mut self) -> LinkStatus {
        let responsive = self.probe("AT", PROBE_TIMEOUT_MS).is_ok_and(|r| is_ok(&r));
        if !responsive {
            warn!("MODEM: no answer to AT");
            return LinkStatus::default();
        }

        let provisioned = self.probe("AT+CPIN?", PROBE_TIMEOUT_MS).ok().and_then(|r| parse_cpin(&r));
        let signal = self.probe("AT+CSQ", CSQ_TIMEOUT_MS).ok().and_then(|r| parse_csq(&r));

        LinkStatus {
            responsive,
            provisioned,
            connected: provisioned == Some(true),
            address: None,
            signal,
        }
    }
}

impl<S: SerialPort> LinkTransport for CellularModem<S> {
    fn kind(&self) -> TransportKind {
        TransportKind::Cellular
    }

    fn connect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        self.init()?;
        if self.modem_status().connected {
            Ok(())
        } else {
            Err(TransportError::ModemUnresponsive)
        }
    }

    fn disconnect(&mut self) {
        debug!("MODEM: data session is modem-managed, nothing to tear down");
    }

    fn status(&mut self) -> LinkStatus {
        self.modem_status()
    }

    fn traffic(&self) -> TrafficStats {
        self.traffic
    }

    fn record_traffic(&mut self, sent: u64, received: u64) {
        self.traffic.add(sent, received);
    }

    fn reset_traffic(&mut self) {
        self.traffic = TrafficStats::default();
    }
}

// ───────────────────────────────────────────────────────────────
// Reply parsing
// ───────────────────────────────────────────────────────────────

fn has_final_result(reply: &str) -> bool {
    reply.lines().any(|l| matches!(l.trim(), "OK" | "ERROR") || l.contains("+CME ERROR"))
}

fn is_ok(reply: &str) -> bool {
    reply.lines().any(|l| l.trim() == "OK")
}

/// `Some(false)` for a missing SIM, `Some(true)` for any `+CPIN:` state.
fn parse_cpin(reply: &str) -> Option<bool> {
    let reply = reply.to_ascii_uppercase();
    if reply.contains("NOT INSERTED") {
        Some(false)
    } else if reply.contains("+CPIN:") {
        Some(true)
    } else {
        None
    }
}

fn parse_csq(reply: &str) -> Option<i16> {
    let line = reply.lines().find_map(|l| l.trim().strip_prefix("+CSQ:"))?;
    let rssi = line.split(',').next()?.trim().parse::<i16>().ok()?;
    (rssi != CSQ_UNKNOWN).then_some(rssi)
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF UART binding
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl SerialPort for esp_idf_hal::uart::UartDriver<'static> {
    fn clear_input(&mut self) {
        if let Err(e) = self.clear_rx() {
            debug!("MODEM: clear_rx failed: {}", e);
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut rest = data;
        while !rest.is_empty() {
            let n = esp_idf_hal::uart::UartDriver::write(self, rest).map_err(|_| TransportError::Io)?;
            rest = &rest[n..];
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, TransportError> {
        let ticks = esp_idf_hal::delay::TickType::new_millis(u64::from(timeout_ms)).ticks();
        // A timed-out read returns Ok(0) from the driver.
        esp_idf_hal::uart::UartDriver::read(self, buf, ticks).map_err(|_| TransportError::Io)
    }
}
