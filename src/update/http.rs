//! One-shot HTTP/1.1 GET over a [`Connector`] stream.
//!
//! ```text
//! GET {path} HTTP/1.1\r\n
//! Host: {host}\r\n
//! Connection: close\r\n
//! \r\n
//! ```
//!
//! The response is read until the peer closes or a read times out, then
//! split on the first blank line.  The status line must contain `200 OK`.
//! Everything after the blank line is the body; `Content-Length` is not
//! consulted.  No redirects, no chunked bodies.

use core::time::Duration;

use log::debug;

use crate::app::ports::{ByteStream, Connector, Endpoint, TrafficStats};
use crate::error::{IntegrityError, TransportError};

/// Headers beyond this size are treated as a malformed response.
const MAX_HEADER_BYTES: usize = 2048;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parsed `http[s]://host[:port][/path]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub secure: bool,
    pub host: &'a str,
    pub port: u16,
    /// Always starts with `/`.
    pub path: &'a str,
}

pub fn parse_url(url: &str) -> Result<Url<'_>, IntegrityError> {
    let (secure, rest) = if let Some(r) = url.strip_prefix("http://") {
        (false, r)
    } else if let Some(r) = url.strip_prefix("https://") {
        (true, r)
    } else {
        return Err(IntegrityError::InvalidUrl);
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().map_err(|_| IntegrityError::InvalidUrl)?),
        None => (authority, if secure { 443 } else { 80 }),
    };
    if host.is_empty() || port == 0 {
        return Err(IntegrityError::InvalidUrl);
    }
    Ok(Url { secure, host, port, path })
}

/// `{base}/{path}` with exactly one separating slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// GET `url` and return the body.
///
/// `traffic` accumulates every byte written and read, even on failure.
pub fn fetch<C: Connector>(
    connector: &mut C,
    url: &str,
    timeout: Duration,
    max_body: usize,
    traffic: &mut TrafficStats,
) -> Result<Vec<u8>, IntegrityError> {
    let target = parse_url(url)?;
    let endpoint = Endpoint { host: target.host, port: target.port, secure: target.secure };
    let mut stream = connector.open(&endpoint, timeout)?;

    let result = exchange(&mut stream, &target, timeout, max_body, traffic);
    stream.close();
    result
}

fn exchange(
    stream: &mut impl ByteStream,
    target: &Url<'_>,
    timeout: Duration,
    max_body: usize,
    traffic: &mut TrafficStats,
) -> Result<Vec<u8>, IntegrityError> {
    let default_port = if target.secure { 443 } else { 80 };
    let host_header = if target.port == default_port {
        target.host.to_owned()
    } else {
        format!("{}:{}", target.host, target.port)
    };
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path, host_header
    );

    stream.set_read_timeout(timeout)?;
    stream.write_all(request.as_bytes())?;
    traffic.add(request.len() as u64, 0);

    let raw = read_response(stream, max_body.saturating_add(MAX_HEADER_BYTES), traffic)?;
    let body = split_response(&raw, max_body)?;
    debug!("OTA: GET {} -> {} bytes", target.path, body.len());
    Ok(body.to_vec())
}

/// Read until close, a read timeout, or `cap`.
///
/// A timeout ends the response rather than failing it; a timeout before the
/// header terminator surfaces later as a malformed response.
fn read_response(
    stream: &mut impl ByteStream,
    cap: usize,
    traffic: &mut TrafficStats,
) -> Result<Vec<u8>, IntegrityError> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(TransportError::Closed) => return Ok(raw),
            Err(TransportError::Timeout) => {
                debug!("OTA: read timed out after {} bytes", raw.len());
                return Ok(raw);
            }
            Ok(n) => n,
            Err(e) => return Err(e.into()),
        };
        traffic.add(0, n as u64);
        raw.extend_from_slice(&buf[..n]);
        if raw.len() > cap {
            return Err(IntegrityError::BodyTooLarge);
        }
    }
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(HEADER_END.len()).position(|w| w == HEADER_END)
}

/// Validate the status line and return the body slice.
fn split_response(raw: &[u8], max_body: usize) -> Result<&[u8], IntegrityError> {
    let end = find_header_end(raw).ok_or(IntegrityError::MalformedResponse)?;
    let status_line = raw[..end].split(|&b| b == b'\n').next().unwrap_or_default();
    let status_line = String::from_utf8_lossy(status_line);
    if !status_line.contains("200 OK") {
        debug!("OTA: rejected status line {:?}", status_line.trim_end());
        return Err(IntegrityError::BadStatus);
    }

    let body = &raw[end + HEADER_END.len()..];
    if body.len() > max_body {
        return Err(IntegrityError::BodyTooLarge);
    }
    Ok(body)
}
