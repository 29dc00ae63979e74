//! Fieldlink station firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  CellularModem   WifiAdapter   TcpConnector   LogEventSink   │
//! │  (UART AT)       (ESP-IDF STA) (TCP / TLS)    (serial log)   │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ─────────────────       │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  LinkService: TransportSelector · ProtocolClient ·     │  │
//! │  │               UpdateManager                            │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  Watchdog (fed per cycle) · esp-ota (restart after update)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{self, UartDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use serde_json::json;

use fieldlink::adapters::cellular::CellularModem;
use fieldlink::adapters::device_id;
use fieldlink::adapters::log_sink::LogEventSink;
use fieldlink::adapters::net::TcpConnector;
use fieldlink::adapters::time::MonotonicClock;
use fieldlink::adapters::wifi::WifiAdapter;
use fieldlink::app::ports::LinkTransport;
use fieldlink::app::service::LinkService;
use fieldlink::config::LinkConfig;
use fieldlink::drivers::watchdog::Watchdog;
use fieldlink::protocol::Payload;
use fieldlink::selector::TransportState;

/// Tracked files live on the SPIFFS partition mounted here.
const UPDATE_ROOT: &str = "/spiffs";

/// Loop period; every job runs on its own, longer interval.
const POLL_INTERVAL_MS: u32 = 1_000;

/// Slack on top of the computed worst-case cycle.
const WATCHDOG_MARGIN_MS: u32 = 10_000;

/// Build-time configuration (JSON), e.g. from CI secrets.
const EMBEDDED_CONFIG: Option<&str> = option_env!("FIELDLINK_CONFIG_JSON");

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Fieldlink v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: running image marked valid"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }

    // ── 2. Configuration ──────────────────────────────────────
    let mut config = load_config();
    config.device_id = device_id::resolve(&config.device_id);
    config.validate()?;
    for endpoint in config.plaintext_endpoints() {
        warn!("SECURITY: {} is plaintext; traffic can be read and altered on the wire", endpoint);
    }

    // ── 3. Storage + peripherals ──────────────────────────────
    mount_storage()?;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi_driver = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?, sysloop)?;
    let mut wifi = WifiAdapter::new(wifi_driver);
    if config.transport.wifi_ssid.is_empty() {
        warn!("WiFi: no SSID configured, fallback disabled");
    } else {
        wifi.set_credentials(&config.transport.wifi_ssid, &config.transport.wifi_password)?;
    }

    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart::config::Config::default().baudrate(Hertz(115_200)),
    )?;
    let mut cellular = CellularModem::new(uart);
    if let Err(e) = cellular.init() {
        warn!("MODEM: init failed ({}), will keep probing", e);
    }

    // ── 4. Service ────────────────────────────────────────────
    let watchdog = Watchdog::for_cycle(&config, WATCHDOG_MARGIN_MS);
    let clock = MonotonicClock::new();
    let mut sink = LogEventSink::new();
    let station = config.device_id.clone();
    let mut service = LinkService::new(config, TcpConnector::new(), FreeRtos, UPDATE_ROOT);
    service.start(&mut sink);

    // ── 5. Main loop ──────────────────────────────────────────
    loop {
        watchdog.feed();
        let now_ms = clock.now_ms();

        let snap = service.last_snapshot();
        let traffic = match service.state() {
            TransportState::PrimaryCellular => cellular.traffic(),
            TransportState::FallbackWifi => wifi.traffic(),
        };
        let heartbeat = json!({
            "station": station,
            "uptime_s": now_ms / 1000,
            "transport": service.state().to_string(),
            "cellular_signal": snap.cellular_signal,
            "wifi_signal": snap.wifi_signal,
            "bytes_total": traffic.total(),
        });

        let outcome = service.poll(
            now_ms,
            &mut cellular,
            &mut wifi,
            Some(Payload::Structured(&heartbeat)),
            &mut sink,
        );
        if outcome.restart_required {
            service.shutdown();
            info!("OTA: restarting into updated files");
            esp_ota::restart();
        }

        FreeRtos::delay_ms(POLL_INTERVAL_MS);
    }
}

fn load_config() -> LinkConfig {
    match EMBEDDED_CONFIG.map(serde_json::from_str::<LinkConfig>) {
        Some(Ok(cfg)) => {
            info!("Config: loaded build-time configuration");
            cfg
        }
        Some(Err(e)) => {
            warn!("Config: build-time JSON invalid ({}), using defaults", e);
            LinkConfig::default()
        }
        None => {
            warn!("Config: none embedded, using defaults");
            LinkConfig::default()
        }
    }
}

fn mount_storage() -> Result<()> {
    let conf = esp_idf_sys::esp_vfs_spiffs_conf_t {
        base_path: c"/spiffs".as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // SAFETY: `conf` and its string outlive the call; the VFS copies them.
    esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_vfs_spiffs_register(&conf) })?;
    info!("Storage: SPIFFS mounted at {}", UPDATE_ROOT);
    Ok(())
}
