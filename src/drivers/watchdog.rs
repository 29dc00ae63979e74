//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the polling loop stalls.  The timeout is sized from
//! the configuration's worst-case cycle (see
//! [`LinkConfig::worst_case_cycle_ms`]) plus a margin, so a cycle that is
//! slow but still bounded never trips it.
//!
//! The main loop must call `feed()` once per cycle.

use log::info;

use crate::config::LinkConfig;

pub struct Watchdog {
    timeout_ms: u32,
    /// Current task is subscribed to the TWDT.
    armed: bool,
}

impl Watchdog {
    /// Timeout = worst-case cycle of `config` + `margin_ms`.
    pub fn for_cycle(config: &LinkConfig, margin_ms: u32) -> Self {
        let budget = u32::try_from(config.worst_case_cycle_ms()).unwrap_or(u32::MAX);
        Self::new(budget.saturating_add(margin_ms))
    }

    /// Configure the TWDT and subscribe the current task.
    pub fn new(timeout_ms: u32) -> Self {
        let armed = platform_arm(timeout_ms);
        Self { timeout_ms, armed }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Must be called at least once per timeout.
    pub fn feed(&self) {
        if self.armed {
            platform_feed();
        }
    }
}

#[cfg(target_os = "espidf")]
fn platform_arm(timeout_ms: u32) -> bool {
    use esp_idf_sys::{esp, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_reconfigure};

    let cfg = esp_task_wdt_config_t { timeout_ms, idle_core_mask: 0, trigger_panic: true };
    // SAFETY: `cfg` outlives the call; a null handle means "current task".
    if let Err(e) = esp!(unsafe { esp_task_wdt_reconfigure(&cfg) }) {
        log::warn!("Watchdog: reconfigure failed ({}), keeping boot settings", e);
    }
    match esp!(unsafe { esp_task_wdt_add(core::ptr::null_mut()) }) {
        Ok(()) => {
            info!("Watchdog: armed, {} ms, panic on trigger", timeout_ms);
            true
        }
        Err(e) => {
            log::warn!("Watchdog: subscribe failed ({}), running unguarded", e);
            false
        }
    }
}

#[cfg(target_os = "espidf")]
fn platform_feed() {
    // SAFETY: only reached once the current task is subscribed.
    unsafe {
        esp_idf_sys::esp_task_wdt_reset();
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_arm(timeout_ms: u32) -> bool {
    info!("Watchdog(sim): not armed ({} ms)", timeout_ms);
    false
}

#[cfg(not(target_os = "espidf"))]
fn platform_feed() {}
