//! TCP (and TLS-over-TCP) stream adapter.
//!
//! Implements [`Connector`] / [`ByteStream`] on top of `std::net::TcpStream`,
//! which lwIP backs on ESP-IDF and the OS backs on host.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: secure endpoints are wrapped with ESP-IDF
//!   TLS with the certificate bundle attached, so the peer certificate and
//!   hostname are always verified.
//! - **all other targets**: no TLS stack.  A secure endpoint fails with
//!   [`TransportError::SecureUnavailable`] and is never downgraded.
//!
//! Whichever WAN link is up owns the default route, so the connector does not
//! need to know about cellular vs WiFi.

use core::time::Duration;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use log::{debug, warn};

use crate::app::ports::{ByteStream, Connector, Endpoint};
use crate::error::TransportError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::tls::{self, EspTls};

/// Smallest read timeout the socket layer accepts.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

// ───────────────────────────────────────────────────────────────
// Error mapping
// ───────────────────────────────────────────────────────────────

fn map_io(e: &io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportError::Closed,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected => TransportError::ConnectFailed,
        _ => TransportError::Io,
    }
}

// ───────────────────────────────────────────────────────────────
// Stream
// ───────────────────────────────────────────────────────────────

pub enum NetStream {
    Plain(TcpStream),
    #[cfg(target_os = "espidf")]
    Tls {
        tls: EspTls<TcpStream>,
        /// Second handle on the same socket, used for `SO_RCVTIMEO`.
        raw: TcpStream,
    },
}

impl NetStream {
    fn socket(&self) -> &TcpStream {
        match self {
            Self::Plain(s) => s,
            #[cfg(target_os = "espidf")]
            Self::Tls { raw, .. } => raw,
        }
    }
}

impl ByteStream for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self {
            Self::Plain(s) => s.read(buf).map_err(|e| map_io(&e)),
            #[cfg(target_os = "espidf")]
            Self::Tls { tls, .. } => tls.read(buf).map_err(|e| {
                debug!("TLS: read failed: {}", e);
                TransportError::Io
            }),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        match self {
            Self::Plain(s) => s.write(data).map_err(|e| map_io(&e)),
            #[cfg(target_os = "espidf")]
            Self::Tls { tls, .. } => tls.write(data).map_err(|e| {
                debug!("TLS: write failed: {}", e);
                TransportError::Io
            }),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.socket()
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(|e| map_io(&e))
    }

    fn close(&mut self) {
        // Already-closed sockets report NotConnected here; nothing to do.
        let _ = self.socket().shutdown(Shutdown::Both);
    }
}

// ───────────────────────────────────────────────────────────────
// Connector
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }

    fn open_tcp(endpoint: &Endpoint<'_>, timeout: Duration) -> Result<TcpStream, TransportError> {
        let addrs = (endpoint.host, endpoint.port).to_socket_addrs().map_err(|e| {
            warn!("NET: cannot resolve {}: {}", endpoint.host, e);
            TransportError::ConnectFailed
        })?;

        let mut last = TransportError::ConnectFailed;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(s) => {
                    debug!("NET: connected to {}", addr);
                    s.set_write_timeout(Some(timeout)).map_err(|e| map_io(&e))?;
                    return Ok(s);
                }
                Err(e) => {
                    debug!("NET: {} unreachable: {}", addr, e);
                    last = map_io(&e);
                }
            }
        }
        Err(last)
    }

    #[cfg(target_os = "espidf")]
    fn platform_secure(
        endpoint: &Endpoint<'_>,
        tcp: TcpStream,
        timeout: Duration,
    ) -> Result<NetStream, TransportError> {
        let raw = tcp.try_clone().map_err(|e| map_io(&e))?;
        let mut tls = EspTls::adopt(tcp).map_err(|_| TransportError::Handshake)?;
        let cfg = tls::Config {
            common_name: Some(endpoint.host),
            use_crt_bundle_attach: true,
            timeout_ms: timeout.as_millis() as u32,
            ..tls::Config::new()
        };
        tls.negotiate(endpoint.host, &cfg).map_err(|e| {
            warn!("TLS: handshake with {} failed: {}", endpoint.host, e);
            TransportError::Handshake
        })?;
        Ok(NetStream::Tls { tls, raw })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_secure(
        endpoint: &Endpoint<'_>,
        tcp: TcpStream,
        _timeout: Duration,
    ) -> Result<NetStream, TransportError> {
        let _ = tcp.shutdown(Shutdown::Both);
        warn!("TLS: {} requires TLS, which this build lacks; refusing", endpoint.host);
        Err(TransportError::SecureUnavailable)
    }
}

impl Connector for TcpConnector {
    type Stream = NetStream;

    fn open(&mut self, endpoint: &Endpoint<'_>, timeout: Duration) -> Result<NetStream, TransportError> {
        let tcp = Self::open_tcp(endpoint, timeout)?;
        if endpoint.secure {
            Self::platform_secure(endpoint, tcp, timeout)
        } else {
            Ok(NetStream::Plain(tcp))
        }
    }
}
