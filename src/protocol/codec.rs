//! Packet assembly and parsing.
//!
//! Wire format:
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────────┬─────────┐
//! │ Fixed header │ Remaining length     │ Variable header  │ Payload │
//! │ 1 B          │ varint, 1..=4 B      │                  │         │
//! └──────────────┴──────────────────────┴──────────────────┴─────────┘
//! ```
//!
//! Remaining length counts everything after itself.  Each varint byte carries
//! 7 value bits, least-significant group first; bit 7 set means "more bytes
//! follow".  Four bytes cap the value at 268 435 455.
//!
//! Everything here is pure: no I/O, no clock.

use crate::error::ProtocolError;

/// Largest value a 4-byte remaining-length varint can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Protocol name and level sent in CONNECT.
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Two-byte packets with no body.
pub const PINGREQ: [u8; 2] = [PacketType::PingReq as u8, 0x00];
pub const DISCONNECT: [u8; 2] = [PacketType::Disconnect as u8, 0x00];

// ---------------------------------------------------------------------------
// Packet types
// ---------------------------------------------------------------------------

/// Upper nibble of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 0x10,
    ConnAck = 0x20,
    Publish = 0x30,
    PubAck = 0x40,
    PingReq = 0xC0,
    PingResp = 0xD0,
    Disconnect = 0xE0,
}

impl PacketType {
    pub fn from_header(byte: u8) -> Option<Self> {
        match byte & 0xF0 {
            0x10 => Some(Self::Connect),
            0x20 => Some(Self::ConnAck),
            0x30 => Some(Self::Publish),
            0x40 => Some(Self::PubAck),
            0xC0 => Some(Self::PingReq),
            0xD0 => Some(Self::PingResp),
            0xE0 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Delivery guarantee for PUBLISH.  Exactly-once is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget; no packet id, no acknowledgement.
    #[default]
    AtMostOnce = 0,
    /// Carries a packet id; the broker answers with PUBACK.
    AtLeastOnce = 1,
}

// ---------------------------------------------------------------------------
// Remaining length
// ---------------------------------------------------------------------------

/// Encode `len` as a 1–4 byte varint.
pub fn encode_remaining_length(len: usize) -> Result<heapless::Vec<u8, 4>, ProtocolError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::RemainingLengthOverflow);
    }
    let mut out = heapless::Vec::new();
    let mut value = len;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        // Cannot overflow: the bound check above keeps us at four bytes.
        out.push(byte).map_err(|_| ProtocolError::RemainingLengthOverflow)?;
        if value == 0 {
            return Ok(out);
        }
    }
}

/// Decode a varint from the front of `bytes`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(usize, usize), ProtocolError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in bytes.iter().enumerate() {
        if i == 4 {
            return Err(ProtocolError::MalformedRemainingLength);
        }
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        multiplier *= 128;
    }
    if bytes.len() >= 4 {
        Err(ProtocolError::MalformedRemainingLength)
    } else {
        Err(ProtocolError::Truncated)
    }
}

/// Append a 2-byte big-endian length prefix followed by `data`.
pub fn pack_str(out: &mut Vec<u8>, data: &[u8]) -> Result<(), ProtocolError> {
    let len = u16::try_from(data.len()).map_err(|_| ProtocolError::StringTooLong)?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One protocol packet.
///
/// When produced by [`Packet::decode`] the body is not split: the whole body
/// lands in `payload` and `variable_header` is empty, since the split depends
/// on the packet type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: u8,
    pub variable_header: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_header(self.header)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body_len = self.variable_header.len() + self.payload.len();
        let rl = encode_remaining_length(body_len)?;
        let mut out = Vec::with_capacity(1 + rl.len() + body_len);
        out.push(self.header);
        out.extend_from_slice(&rl);
        out.extend_from_slice(&self.variable_header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse one packet from the front of `buf`.
    ///
    /// Returns the packet and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let (&header, rest) = buf.split_first().ok_or(ProtocolError::Truncated)?;
        let (len, used) = decode_remaining_length(rest)?;
        let body = rest.get(used..used + len).ok_or(ProtocolError::Truncated)?;
        let packet = Self { header, variable_header: Vec::new(), payload: body.to_vec() };
        Ok((packet, 1 + used + len))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Parameters for a CONNECT packet.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub clean_session: bool,
    pub keep_alive_secs: u16,
}

pub fn connect(opts: &ConnectOptions<'_>) -> Result<Packet, ProtocolError> {
    let mut flags = 0u8;
    if opts.clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }
    if opts.username.is_some() {
        flags |= FLAG_USERNAME;
    }
    if opts.password.is_some() {
        flags |= FLAG_PASSWORD;
    }

    let mut variable_header = Vec::with_capacity(10);
    pack_str(&mut variable_header, PROTOCOL_NAME)?;
    variable_header.push(PROTOCOL_LEVEL);
    variable_header.push(flags);
    variable_header.extend_from_slice(&opts.keep_alive_secs.to_be_bytes());

    let mut payload = Vec::new();
    pack_str(&mut payload, opts.client_id.as_bytes())?;
    if let Some(user) = opts.username {
        pack_str(&mut payload, user.as_bytes())?;
    }
    if let Some(pass) = opts.password {
        pack_str(&mut payload, pass.as_bytes())?;
    }

    Ok(Packet { header: PacketType::Connect as u8, variable_header, payload })
}

/// Build a PUBLISH.  `packet_id` is written only for QoS above zero.
pub fn publish(
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retain: bool,
    packet_id: u16,
) -> Result<Packet, ProtocolError> {
    let header = PacketType::Publish as u8 | ((qos as u8) << 1) | u8::from(retain);
    let mut variable_header = Vec::with_capacity(topic.len() + 4);
    pack_str(&mut variable_header, topic.as_bytes())?;
    if qos != QoS::AtMostOnce {
        variable_header.extend_from_slice(&packet_id.to_be_bytes());
    }
    Ok(Packet { header, variable_header, payload: payload.to_vec() })
}

// ---------------------------------------------------------------------------
// Response checks
// ---------------------------------------------------------------------------

fn expect_type(got: u8, expected: PacketType) -> Result<(), ProtocolError> {
    if got == expected as u8 {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedPacket { expected: expected as u8, got })
    }
}

/// Accept iff the type byte is CONNACK and the return code is zero.
pub fn check_connack(resp: &[u8; 4]) -> Result<(), ProtocolError> {
    expect_type(resp[0], PacketType::ConnAck)?;
    match resp[3] {
        0 => Ok(()),
        code => Err(ProtocolError::Refused(code)),
    }
}

pub fn check_puback(resp: &[u8; 4]) -> Result<(), ProtocolError> {
    expect_type(resp[0], PacketType::PubAck)
}

pub fn check_pingresp(resp: &[u8; 2]) -> Result<(), ProtocolError> {
    expect_type(resp[0], PacketType::PingResp)
}

// ---------------------------------------------------------------------------
// Packet identifiers
// ---------------------------------------------------------------------------

/// Cyclic packet id in `[1, 65535]`.  Zero is never produced.
#[derive(Debug, Clone)]
pub struct PacketIdCounter {
    next: u16,
}

impl Default for PacketIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdCounter {
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// The id the next QoS-1 publish will carry.
    pub fn peek(&self) -> u16 {
        self.next
    }

    /// Commit the current id; call only once its packet is on the wire.
    pub fn advance(&mut self) {
        self.next = self.next % u16::MAX + 1;
    }
}
