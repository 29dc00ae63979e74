//! Station identity derived from the factory MAC address.
//!
//! Produces a stable id of the form `ST-XXYYZZ` (last three MAC bytes,
//! uppercase hex).  It doubles as the protocol client id and the telemetry
//! topic suffix when the configuration leaves `device_id` empty.

use core::fmt::Write;

/// "ST-XXYYZZ" fits with room to spare.
pub type DeviceIdString = heapless::String<16>;

pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed, locally administered MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x02, 0x00, 0x5E, 0x10, 0x20, 0x30]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "ST-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// The configured id, or the MAC-derived one when none is configured.
pub fn resolve(configured: &str) -> String {
    if configured.is_empty() {
        device_id(&read_mac()).as_str().to_owned()
    } else {
        configured.to_owned()
    }
}
