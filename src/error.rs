//! Unified error types for the connectivity core.
//!
//! Each component owns a closed error kind (transport, protocol, integrity)
//! and every kind converts into the crate-wide [`Error`], so the polling
//! loop can match on one type.  All variants are `Copy`; nothing here
//! allocates.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Socket, serial or radio failure. Always retried next cycle.
    Transport(TransportError),
    /// Malformed or unexpected packet. The session must be torn down.
    Protocol(ProtocolError),
    /// A remote file could not be fetched or reconciled.
    Integrity(IntegrityError),
    /// Configuration failed validation.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Integrity(e) => write!(f, "integrity: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// A read, write or connect did not complete before its deadline.
    Timeout,
    /// The remote endpoint refused or could not be reached.
    ConnectFailed,
    /// The peer closed the stream.
    Closed,
    /// Any other socket or serial I/O failure.
    Io,
    /// Operation requires an open stream but none is present.
    NotConnected,
    /// A secure endpoint was requested on a build without a TLS stack.
    SecureUnavailable,
    /// TLS negotiation or certificate verification failed.
    Handshake,
    /// The reconnect bound was reached.
    RetriesExhausted,
    /// WiFi association failed or no credentials are configured.
    WifiUnavailable,
    /// The cellular modem did not answer.
    ModemUnresponsive,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Closed => write!(f, "stream closed by peer"),
            Self::Io => write!(f, "I/O error"),
            Self::NotConnected => write!(f, "not connected"),
            Self::SecureUnavailable => write!(f, "secure transport not available on this build"),
            Self::Handshake => write!(f, "TLS handshake failed"),
            Self::RetriesExhausted => write!(f, "reconnect attempts exhausted"),
            Self::WifiUnavailable => write!(f, "WiFi unavailable"),
            Self::ModemUnresponsive => write!(f, "modem unresponsive"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first byte of a response did not match the expected packet type.
    UnexpectedPacket { expected: u8, got: u8 },
    /// The broker answered CONNACK with a non-zero return code.
    Refused(u8),
    /// A remaining-length field ran past four bytes.
    MalformedRemainingLength,
    /// A remaining-length value does not fit in four varint bytes.
    RemainingLengthOverflow,
    /// A length-prefixed string exceeds 65535 bytes.
    StringTooLong,
    /// The packet ended before its declared length.
    Truncated,
    /// A structured payload could not be serialised.
    PayloadEncoding,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedPacket { expected, got } => {
                write!(f, "expected packet 0x{expected:02X}, got 0x{got:02X}")
            }
            Self::Refused(code) => write!(f, "connection refused (code {code})"),
            Self::MalformedRemainingLength => write!(f, "malformed remaining length"),
            Self::RemainingLengthOverflow => write!(f, "remaining length too large"),
            Self::StringTooLong => write!(f, "string longer than 65535 bytes"),
            Self::Truncated => write!(f, "packet truncated"),
            Self::PayloadEncoding => write!(f, "payload encoding failed"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Integrity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityError {
    /// The remote fetch failed at the transport level.
    Fetch(TransportError),
    /// The status line did not contain `200 OK`.
    BadStatus,
    /// The response had no header terminator.
    MalformedResponse,
    /// The origin answered `200 OK` with nothing after the headers.
    EmptyBody,
    /// The remote origin URL could not be parsed.
    InvalidUrl,
    /// A tracked path is absolute or escapes the update root.
    InvalidPath,
    /// The response body exceeded the configured cap.
    BodyTooLarge,
    /// The local file could not be written.
    WriteFailed,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::BadStatus => write!(f, "remote answered without 200 OK"),
            Self::MalformedResponse => write!(f, "malformed HTTP response"),
            Self::EmptyBody => write!(f, "empty response body"),
            Self::InvalidUrl => write!(f, "invalid origin URL"),
            Self::InvalidPath => write!(f, "tracked path escapes update root"),
            Self::BodyTooLarge => write!(f, "response body too large"),
            Self::WriteFailed => write!(f, "local write failed"),
        }
    }
}

impl From<IntegrityError> for Error {
    fn from(e: IntegrityError) -> Self {
        Self::Integrity(e)
    }
}

impl From<TransportError> for IntegrityError {
    fn from(e: TransportError) -> Self {
        Self::Fetch(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
