//! Publish/acknowledge client over a blocking byte stream.
//!
//! ```text
//!          connect ok                      ping/publish I/O error
//!   ┌────────────────────┐            ┌─────────────────────────┐
//!   │                    ▼            │                         ▼
//! [no session] ◀── disconnect ── [connected] ──────────▶ [stale session]
//!      ▲                                                        │
//!      └──────────── reconnect (bounded, delayed) ──────────────┘
//! ```
//!
//! An I/O failure only marks the session stale; the next
//! [`ProtocolClient::publish_telemetry`] re-establishes it.  A protocol
//! violation (wrong packet type, refused CONNACK) drops the session at once
//! since the stream position can no longer be trusted.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::{ByteStream, Connector, Endpoint, TrafficStats};
use crate::config::BrokerConfig;
use crate::error::{Error, Result, TransportError};

use super::codec::{self, ConnectOptions, PacketIdCounter, QoS};
use super::payload::Payload;

struct Session<S> {
    stream: S,
    connected: bool,
    last_ping_ms: u64,
}

pub struct ProtocolClient<C: Connector, D: DelayNs> {
    connector: C,
    delay: D,
    config: BrokerConfig,
    client_id: String,
    session: Option<Session<C::Stream>>,
    // Both outlive any single session.
    packet_ids: PacketIdCounter,
    reconnect_attempts: u32,
    traffic: TrafficStats,
}

impl<C: Connector, D: DelayNs> ProtocolClient<C, D> {
    pub fn new(connector: C, delay: D, config: BrokerConfig, client_id: impl Into<String>) -> Self {
        Self {
            connector,
            delay,
            config,
            client_id: client_id.into(),
            session: None,
            packet_ids: PacketIdCounter::new(),
            reconnect_attempts: 0,
            traffic: TrafficStats::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.connected)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Bytes moved since the previous call.
    pub fn take_traffic(&mut self) -> TrafficStats {
        core::mem::take(&mut self.traffic)
    }

    /// Open a stream and complete the CONNECT/CONNACK handshake.
    ///
    /// Any existing session is dropped first.  On success the reconnect
    /// bound and the ping clock are reset.
    pub fn connect(&mut self, clean_session: bool, now_ms: u64) -> Result<()> {
        self.drop_session();

        let packet = codec::connect(&ConnectOptions {
            client_id: &self.client_id,
            username: self.config.username.as_deref(),
            password: self.config.password.as_deref(),
            clean_session,
            keep_alive_secs: self.config.keep_alive_secs,
        })?
        .encode()?;

        let endpoint = Endpoint {
            host: &self.config.host,
            port: self.config.port,
            secure: self.config.secure,
        };
        let connect_timeout = Duration::from_millis(u64::from(self.config.connect_timeout_ms));
        info!(
            "MQTT: connecting to {}:{} (secure={})",
            endpoint.host, endpoint.port, endpoint.secure
        );
        let mut stream = self.connector.open(&endpoint, connect_timeout)?;

        let response_timeout = Duration::from_millis(u64::from(self.config.response_timeout_ms));
        if let Err(e) = handshake(&mut stream, &mut self.traffic, &packet, connect_timeout, response_timeout) {
            warn!("MQTT: connect failed: {}", e);
            stream.close();
            return Err(e);
        }

        info!("MQTT: connected as {}", self.client_id);
        self.session = Some(Session { stream, connected: true, last_ping_ms: now_ms });
        self.reconnect_attempts = 0;
        Ok(())
    }

    /// Publish `payload` to `topic`, connecting first when needed.
    ///
    /// QoS 0 returns once the bytes are written; QoS 1 waits for PUBACK.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: Payload<'_>,
        qos: QoS,
        retain: bool,
        now_ms: u64,
    ) -> Result<()> {
        let body = payload.to_wire()?;
        let packet_id = self.packet_ids.peek();
        let packet = codec::publish(topic, &body, qos, retain, packet_id)?.encode()?;

        if !self.is_connected() {
            self.connect(true, now_ms)?;
        }

        self.with_session(|stream, traffic| send(stream, traffic, &packet).map_err(Error::from))?;
        if qos == QoS::AtMostOnce {
            debug!("MQTT: published {} bytes to {} (qos0)", body.len(), topic);
            return Ok(());
        }

        self.packet_ids.advance();
        self.with_session(|stream, traffic| {
            let ack: [u8; 4] = recv(stream, traffic)?;
            codec::check_puback(&ack)?;
            Ok(())
        })?;
        debug!("MQTT: published {} bytes to {} (id {})", body.len(), topic, packet_id);
        Ok(())
    }

    /// PINGREQ → PINGRESP.  Failure marks the session stale.
    pub fn ping(&mut self, now_ms: u64) -> Result<()> {
        self.with_session(|stream, traffic| {
            send(stream, traffic, &codec::PINGREQ)?;
            let resp: [u8; 2] = recv(stream, traffic)?;
            codec::check_pingresp(&resp)?;
            Ok(())
        })?;
        if let Some(s) = self.session.as_mut() {
            s.last_ping_ms = now_ms;
        }
        Ok(())
    }

    /// Ping when half the keep-alive has elapsed.  Returns whether the
    /// session is usable afterwards.
    pub fn check_connection(&mut self, now_ms: u64) -> bool {
        let Some(session) = self.session.as_ref().filter(|s| s.connected) else {
            return false;
        };
        if self.config.keep_alive_secs == 0 {
            return true;
        }
        let half_keep_alive_ms = u64::from(self.config.keep_alive_secs) * 1000 / 2;
        if now_ms.saturating_sub(session.last_ping_ms) < half_keep_alive_ms {
            return true;
        }
        match self.ping(now_ms) {
            Ok(()) => true,
            Err(e) => {
                warn!("MQTT: keep-alive ping failed: {}", e);
                false
            }
        }
    }

    /// Drop the session and try again after the configured delay.
    ///
    /// Fails with [`TransportError::RetriesExhausted`] once the bound is
    /// reached; only a successful [`connect`](Self::connect) lifts it.
    pub fn reconnect(&mut self, now_ms: u64) -> Result<()> {
        self.disconnect();
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            warn!("MQTT: giving up after {} reconnect attempts", self.reconnect_attempts);
            return Err(TransportError::RetriesExhausted.into());
        }
        self.reconnect_attempts += 1;
        info!(
            "MQTT: reconnect attempt {}/{} in {} ms",
            self.reconnect_attempts, self.config.max_reconnect_attempts, self.config.reconnect_delay_ms
        );
        self.delay.delay_ms(self.config.reconnect_delay_ms);
        self.connect(true, now_ms)
    }

    /// Best-effort DISCONNECT, then release the stream.  Never fails.
    pub fn disconnect(&mut self) {
        if let Some(mut s) = self.session.take() {
            if s.connected && send(&mut s.stream, &mut self.traffic, &codec::DISCONNECT).is_ok() {
                debug!("MQTT: disconnect sent");
            }
            s.stream.close();
        }
    }

    /// Ensure a live session and publish `payload` to `{prefix}/{device_id}`
    /// at QoS 1.
    pub fn publish_telemetry(
        &mut self,
        prefix: &str,
        device_id: &str,
        payload: Payload<'_>,
        now_ms: u64,
    ) -> Result<()> {
        if !self.check_connection(now_ms) {
            self.reconnect(now_ms)?;
        }
        let topic = format!("{prefix}/{device_id}");
        self.publish(&topic, payload, QoS::AtLeastOnce, false, now_ms)
    }

    // ── Internal ──────────────────────────────────────────────────

    /// Run `op` against the live stream and classify its failure.
    fn with_session<T>(
        &mut self,
        op: impl FnOnce(&mut C::Stream, &mut TrafficStats) -> Result<T>,
    ) -> Result<T> {
        let Some(session) = self.session.as_mut().filter(|s| s.connected) else {
            return Err(TransportError::NotConnected.into());
        };
        let result = op(&mut session.stream, &mut self.traffic);
        match &result {
            Err(Error::Protocol(e)) => {
                warn!("MQTT: protocol violation, dropping session: {}", e);
                self.drop_session();
            }
            Err(_) => session.connected = false,
            Ok(_) => {}
        }
        result
    }

    fn drop_session(&mut self) {
        if let Some(mut s) = self.session.take() {
            s.stream.close();
        }
    }
}

/// CONNECT out, CONNACK in, then switch to the response deadline.
fn handshake(
    stream: &mut impl ByteStream,
    traffic: &mut TrafficStats,
    packet: &[u8],
    connect_timeout: Duration,
    response_timeout: Duration,
) -> Result<()> {
    stream.set_read_timeout(connect_timeout)?;
    send(stream, traffic, packet)?;
    let ack: [u8; 4] = recv(stream, traffic)?;
    codec::check_connack(&ack)?;
    stream.set_read_timeout(response_timeout)?;
    Ok(())
}

fn send(
    stream: &mut impl ByteStream,
    traffic: &mut TrafficStats,
    bytes: &[u8],
) -> core::result::Result<(), TransportError> {
    stream.write_all(bytes)?;
    traffic.add(bytes.len() as u64, 0);
    Ok(())
}

fn recv<const N: usize>(
    stream: &mut impl ByteStream,
    traffic: &mut TrafficStats,
) -> core::result::Result<[u8; N], TransportError> {
    let mut buf = [0u8; N];
    stream.read_exact(&mut buf)?;
    traffic.add(0, N as u64);
    Ok(buf)
}
