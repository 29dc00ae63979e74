//! Link configuration parameters
//!
//! All tunable parameters for the connectivity core. The value is built once
//! at startup and handed to each component by value; nothing mutates it
//! afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core link configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Identity used as protocol client id and telemetry topic suffix.
    /// Empty means "derive from the factory MAC".
    pub device_id: String,
    pub transport: TransportConfig,
    pub broker: BrokerConfig,
    pub update: UpdateConfig,
}

/// Cellular/WiFi arbitration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// How often the selector evaluates link health (seconds)
    pub check_interval_secs: u32,
    /// Consecutive cellular-unavailable evaluations before WiFi fallback
    pub failure_threshold: u32,
    /// Bound on a single WiFi association attempt (seconds)
    pub wifi_connect_timeout_secs: u32,
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,
}

/// Publish/acknowledge broker session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Wrap the stream in TLS (certificates are always verified)
    pub secure: bool,
    /// Keep-alive advertised in CONNECT; 0 disables pinging
    pub keep_alive_secs: u16,
    /// Stream open + CONNACK deadline (milliseconds)
    pub connect_timeout_ms: u32,
    /// PUBACK / PINGRESP deadline (milliseconds)
    pub response_timeout_ms: u32,
    /// Pause before each reconnect attempt (milliseconds)
    pub reconnect_delay_ms: u32,
    pub max_reconnect_attempts: u32,
    /// Telemetry topic is `{topic_prefix}/{device_id}`
    pub topic_prefix: String,
    /// Telemetry publish interval (seconds)
    pub publish_interval_secs: u32,
}

/// Self-update from a remote origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub enabled: bool,
    /// Minimum spacing between update checks (seconds)
    pub check_interval_secs: u32,
    /// `http://host[:port]/path` or `https://...`, no trailing slash needed
    pub base_url: String,
    /// Paths relative to the update root, fetched as `{base_url}/{path}`
    pub files: Vec<String>,
    /// Per-fetch socket deadline (milliseconds)
    pub fetch_timeout_ms: u32,
    /// Upper bound on a downloaded file (bytes)
    pub max_body_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            failure_threshold: 3,
            wifi_connect_timeout_secs: 10,
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::from("broker.local"),
            port: 1883,
            username: None,
            password: None,
            secure: false,
            keep_alive_secs: 60,
            connect_timeout_ms: 10_000,
            response_timeout_ms: 5_000,
            reconnect_delay_ms: 5_000,
            max_reconnect_attempts: 5,
            topic_prefix: String::from("stations"),
            publish_interval_secs: 60,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 3600,
            base_url: String::new(),
            files: vec![String::from("main.py")],
            fetch_timeout_ms: 10_000,
            max_body_bytes: 256 * 1024,
        }
    }
}

impl LinkConfig {
    /// Reject values that would make the core spin or block unbounded.
    pub fn validate(&self) -> Result<()> {
        let t = &self.transport;
        if t.check_interval_secs == 0 {
            return Err(Error::Config("transport.check_interval_secs must be > 0"));
        }
        if t.failure_threshold == 0 {
            return Err(Error::Config("transport.failure_threshold must be > 0"));
        }
        if t.wifi_connect_timeout_secs == 0 {
            return Err(Error::Config("transport.wifi_connect_timeout_secs must be > 0"));
        }

        let b = &self.broker;
        if b.host.is_empty() {
            return Err(Error::Config("broker.host is empty"));
        }
        if b.port == 0 {
            return Err(Error::Config("broker.port must be > 0"));
        }
        if b.connect_timeout_ms == 0 || b.response_timeout_ms == 0 {
            return Err(Error::Config("broker timeouts must be > 0"));
        }
        if b.publish_interval_secs == 0 {
            return Err(Error::Config("broker.publish_interval_secs must be > 0"));
        }
        if b.password.is_some() && b.username.is_none() {
            return Err(Error::Config("broker.password requires broker.username"));
        }

        let u = &self.update;
        if u.enabled {
            if u.check_interval_secs == 0 {
                return Err(Error::Config("update.check_interval_secs must be > 0"));
            }
            if u.base_url.is_empty() {
                return Err(Error::Config("update.base_url is empty"));
            }
            if u.fetch_timeout_ms == 0 {
                return Err(Error::Config("update.fetch_timeout_ms must be > 0"));
            }
        }
        Ok(())
    }

    /// Endpoints that will be reached without TLS.  Startup logs each one
    /// as a warning.
    pub fn plaintext_endpoints(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.broker.secure {
            out.push(format!("broker {}:{}", self.broker.host, self.broker.port));
        }
        if self.update.enabled && self.update.base_url.starts_with("http://") {
            out.push(format!("update origin {}", self.update.base_url));
        }
        out
    }

    /// Upper bound on one polling cycle, used to size the task watchdog.
    ///
    /// Sums the per-call deadlines on the slowest path: modem probes, a WiFi
    /// association, a full reconnect with CONNACK, ping plus PUBACK, and one
    /// fetch per tracked file (connect, request, response).
    pub fn worst_case_cycle_ms(&self) -> u64 {
        const MODEM_PROBES_MS: u64 = 4_000;
        let b = &self.broker;
        let wifi = u64::from(self.transport.wifi_connect_timeout_secs) * 1000;
        let broker = u64::from(b.reconnect_delay_ms)
            + 2 * u64::from(b.connect_timeout_ms)
            + 2 * u64::from(b.response_timeout_ms);
        let update = if self.update.enabled {
            self.update.files.len() as u64 * 3 * u64::from(self.update.fetch_timeout_ms)
        } else {
            0
        };
        MODEM_PROBES_MS + wifi + broker + update
    }
}
