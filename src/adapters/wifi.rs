//! WiFi station-mode adapter.
//!
//! Implements [`LinkTransport`] for the fallback WAN link.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via
//!   `esp_idf_svc::wifi::BlockingWifi`.
//! - **all other targets**: simulation with a settable access point, for
//!   host-side tests.
//!
//! Reconnection policy lives in the selector; this adapter makes exactly one
//! bounded attempt per `connect` call.

use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{LinkStatus, LinkTransport, TrafficStats, TransportKind};
use crate::error::{Error, Result, TransportError};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<()> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(Error::Config("wifi ssid must be 1-32 printable ASCII bytes"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if !password.is_empty() && (password.len() < 8 || password.len() > 64) {
        return Err(Error::Config("wifi password must be empty or 8-64 bytes"));
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    traffic: TrafficStats,
    #[cfg(target_os = "espidf")]
    driver: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimRadio,
}

/// Host-side stand-in for the radio.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Copy)]
struct SimRadio {
    ap_in_range: bool,
    associated: bool,
    rssi: i16,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(driver: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            traffic: TrafficStats::default(),
            driver,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            traffic: TrafficStats::default(),
            sim: SimRadio { ap_in_range: true, associated: false, rssi: -60 },
        }
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<()> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| Error::Config("wifi ssid too long"))?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| Error::Config("wifi password too long"))?;
        info!("WiFi: credentials set (SSID='{}')", self.ssid);
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.ssid.is_empty()
    }

    // ── Simulation controls ───────────────────────────────────

    /// Whether the simulated access point answers association requests.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_ap_in_range(&mut self, in_range: bool) {
        self.sim.ap_in_range = in_range;
    }

    /// Drop the simulated association as if the AP went away.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_drop(&mut self) {
        self.sim.associated = false;
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, timeout: Duration) -> core::result::Result<(), TransportError> {
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| TransportError::WifiUnavailable)?,
            password: self.password.as_str().try_into().map_err(|_| TransportError::WifiUnavailable)?,
            auth_method: if self.password.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal },
            ..Default::default()
        });
        let map = |e: esp_idf_sys::EspError| {
            warn!("WiFi(espidf): {}", e);
            TransportError::WifiUnavailable
        };
        self.driver.set_configuration(&conf).map_err(map)?;
        if !self.driver.is_started().map_err(map)? {
            self.driver.start().map_err(map)?;
        }
        self.driver.wifi_mut().connect().map_err(map)?;
        self.driver
            .ip_wait_while(|w| w.is_up().map(|up| !up), Some(timeout))
            .map_err(|_| TransportError::Timeout)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, _timeout: Duration) -> core::result::Result<(), TransportError> {
        if !self.sim.ap_in_range {
            warn!("WiFi(sim): '{}' not in range", self.ssid);
            return Err(TransportError::WifiUnavailable);
        }
        self.sim.associated = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.driver.disconnect() {
            warn!("WiFi(espidf): disconnect: {}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim.associated = false;
    }

    #[cfg(target_os = "espidf")]
    fn platform_status(&mut self) -> LinkStatus {
        use core::fmt::Write;

        let started = self.driver.is_started().unwrap_or(false);
        let connected = self.driver.is_up().unwrap_or(false);
        let mut status = LinkStatus {
            responsive: started,
            provisioned: Some(self.has_credentials()),
            connected,
            ..LinkStatus::default()
        };
        if connected {
            if let Ok(info) = self.driver.wifi().sta_netif().get_ip_info() {
                let mut ip = heapless::String::new();
                if write!(ip, "{}", info.ip).is_ok() {
                    status.address = Some(ip);
                }
            }
            // SAFETY: plain C struct filled in by the driver; zeroed is a valid initial value.
            let mut ap: esp_idf_sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
            if unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut ap) } == esp_idf_sys::ESP_OK {
                status.signal = Some(i16::from(ap.rssi));
            }
        }
        status
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_status(&mut self) -> LinkStatus {
        let connected = self.sim.associated;
        LinkStatus {
            responsive: true,
            provisioned: Some(self.has_credentials()),
            connected,
            address: connected.then(|| heapless::String::try_from("192.168.4.2").unwrap_or_default()),
            signal: connected.then_some(self.sim.rssi),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// LinkTransport
// ───────────────────────────────────────────────────────────────

impl LinkTransport for WifiAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Wifi
    }

    fn connect(&mut self, timeout: Duration) -> core::result::Result<(), TransportError> {
        if !self.has_credentials() {
            warn!("WiFi: no credentials configured");
            return Err(TransportError::WifiUnavailable);
        }
        info!("WiFi: connecting to '{}' (timeout {}s)", self.ssid, timeout.as_secs());
        match self.platform_connect(timeout) {
            Ok(()) => {
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: connection failed: {}", e);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        info!("WiFi: disconnected");
    }

    fn status(&mut self) -> LinkStatus {
        self.platform_status()
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
// Tests
// ───────────────────────────────────────────────────────────────
