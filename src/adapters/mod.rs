//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                    |
//! |-------------|---------------------|--------------------------------|
//! | `cellular`  | LinkTransport       | Modem AT channel (UART)        |
//! | `wifi`      | LinkTransport       | ESP-IDF WiFi STA               |
//! | `net`       | Connector           | TCP, TLS with cert bundle      |
//! | `log_sink`  | EventSink           | Serial log output              |
//! | `time`      | n/a                 | Monotonic system timer         |
//! | `delay`     | DelayNs             | `std::thread::sleep` (host)    |
//! | `device_id` | n/a                 | Factory MAC                    |

pub mod cellular;
pub mod delay;
pub mod device_id;
pub mod log_sink;
pub mod net;
pub mod time;
pub mod wifi;
