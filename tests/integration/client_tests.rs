//! ProtocolClient against a scripted broker.

use fieldlink::config::BrokerConfig;
use fieldlink::error::{Error, ProtocolError, TransportError};
use fieldlink::protocol::codec::{Packet, PacketType};
use fieldlink::protocol::{Payload, ProtocolClient, QoS};

use crate::mock_link::*;

fn broker() -> BrokerConfig {
    BrokerConfig {
        host: String::from("broker.test"),
        port: 1883,
        keep_alive_secs: 60,
        reconnect_delay_ms: 250,
        max_reconnect_attempts: 2,
        ..BrokerConfig::default()
    }
}

fn make_client(connector: &MockConnector) -> (ProtocolClient<MockConnector, NoDelay>, NoDelay) {
    let delay = NoDelay::default();
    let client = ProtocolClient::new(connector.clone(), delay.clone(), broker(), "ST-102030");
    (client, delay)
}

/// Packet id of a decoded QoS 1 PUBLISH (body = topic, id, payload).
fn publish_id(p: &Packet) -> u16 {
    let topic_len = usize::from(u16::from_be_bytes([p.payload[0], p.payload[1]]));
    u16::from_be_bytes([p.payload[2 + topic_len], p.payload[3 + topic_len]])
}

fn publishes(wire: &[u8]) -> Vec<Packet> {
    packets(wire)
        .into_iter()
        .filter(|p| p.packet_type() == Some(PacketType::Publish))
        .collect()
}

// ── Connect ──────────────────────────────────────────────────

#[test]
fn connect_sends_exact_connect_packet() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);

    client.connect(true, 0).unwrap();
    assert!(client.is_connected());

    let mut expected = vec![0x10, 21, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 60, 0x00, 0x09];
    expected.extend_from_slice(b"ST-102030");
    assert_eq!(net.written(0), expected);
    assert_eq!(
        net.opens(),
        vec![OpenRecord { host: String::from("broker.test"), port: 1883, secure: false }]
    );
}

#[test]
fn credentials_set_flags() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let cfg = BrokerConfig {
        username: Some(String::from("u")),
        password: Some(String::from("p")),
        ..broker()
    };
    let mut client = ProtocolClient::new(net.clone(), NoDelay::default(), cfg, "id");
    client.connect(true, 0).unwrap();

    let wire = net.written(0);
    // Fixed header (2) + name (6) + level (1), then the flag byte.
    assert_eq!(wire[9], 0x02 | 0x40 | 0x80);
    assert!(wire.ends_with(&[0x00, 0x01, b'u', 0x00, 0x01, b'p']));
}

#[test]
fn secure_broker_requests_secure_stream() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let cfg = BrokerConfig { secure: true, port: 8883, ..broker() };
    let mut client = ProtocolClient::new(net.clone(), NoDelay::default(), cfg, "id");
    client.connect(true, 0).unwrap();
    assert!(net.opens()[0].secure, "secure flag must reach the connector");
}

#[test]
fn refused_connack_drops_session() {
    let net = MockConnector::new();
    net.accept(&[0x20, 0x02, 0x00, 0x05]);
    let (mut client, _) = make_client(&net);

    assert_eq!(client.connect(true, 0), Err(Error::Protocol(ProtocolError::Refused(5))));
    assert!(!client.is_connected());
    assert!(net.stream(0).borrow().closed, "stream released after refusal");
}

#[test]
fn silent_broker_times_out_connect() {
    let net = MockConnector::new();
    net.accept(&[]);
    let (mut client, _) = make_client(&net);

    assert_eq!(client.connect(true, 0), Err(Error::Transport(TransportError::Timeout)));
    assert!(!client.is_connected());
}

#[test]
fn wrong_packet_type_for_connack_rejected() {
    let net = MockConnector::new();
    net.accept(&puback(1));
    let (mut client, _) = make_client(&net);

    assert_eq!(
        client.connect(true, 0),
        Err(Error::Protocol(ProtocolError::UnexpectedPacket { expected: 0x20, got: 0x40 }))
    );
}

// ── Publish ──────────────────────────────────────────────────

#[test]
fn qos0_publish_does_not_wait_for_ack() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    // Nothing else is scripted: any read would time out.
    client.publish("t/x", Payload::Text("hi"), QoS::AtMostOnce, false, 0).unwrap();
    assert!(client.is_connected());

    let pubs = publishes(&net.written(0));
    assert_eq!(pubs.len(), 1);
    assert_eq!(pubs[0].header, 0x30);
    assert_eq!(pubs[0].payload, [&[0x00, 0x03][..], b"t/x", b"hi"].concat());
}

#[test]
fn qos1_publish_waits_for_puback() {
    let net = MockConnector::new();
    net.accept(&[&CONNACK_OK[..], &puback(1), &puback(2)].concat());
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    client.publish("t", Payload::Bytes(b"a"), QoS::AtLeastOnce, false, 0).unwrap();
    client.publish("t", Payload::Bytes(b"b"), QoS::AtLeastOnce, true, 0).unwrap();

    let pubs = publishes(&net.written(0));
    assert_eq!(pubs.len(), 2);
    assert_eq!(pubs[0].header, 0x32);
    assert_eq!(pubs[1].header, 0x33, "retain bit set");
    assert_eq!(publish_id(&pubs[0]), 1);
    assert_eq!(publish_id(&pubs[1]), 2);
}

#[test]
fn wrong_ack_type_drops_session() {
    let net = MockConnector::new();
    net.accept(&[&CONNACK_OK[..], &[0x50, 0x02, 0x00, 0x01]].concat());
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    let err = client.publish("t", Payload::Bytes(b"a"), QoS::AtLeastOnce, false, 0);
    assert_eq!(err, Err(Error::Protocol(ProtocolError::UnexpectedPacket { expected: 0x40, got: 0x50 })));
    assert!(!client.is_connected());
    assert!(net.stream(0).borrow().closed);
}

#[test]
fn missing_puback_marks_session_stale() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    let err = client.publish("t", Payload::Bytes(b"a"), QoS::AtLeastOnce, false, 0);
    assert_eq!(err, Err(Error::Transport(TransportError::Timeout)));
    assert!(!client.is_connected());
}

#[test]
fn structured_payload_is_canonical_json() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    let value = serde_json::json!({ "b": 2, "a": 1 });
    client.publish("t", Payload::Structured(&value), QoS::AtMostOnce, false, 0).unwrap();

    let pubs = publishes(&net.written(0));
    assert!(pubs[0].payload.ends_with(br#"{"a":1,"b":2}"#));
}

#[test]
fn publish_without_session_connects_first() {
    let net = MockConnector::new();
    net.accept(&[&CONNACK_OK[..], &puback(1)].concat());
    let (mut client, _) = make_client(&net);

    client.publish("t", Payload::Bytes(b"a"), QoS::AtLeastOnce, false, 0).unwrap();
    let kinds: Vec<_> = packets(&net.written(0)).iter().map(Packet::packet_type).collect();
    assert_eq!(kinds, vec![Some(PacketType::Connect), Some(PacketType::Publish)]);
}

#[test]
fn packet_id_advances_only_after_write() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    net.accept(&[&CONNACK_OK[..], &puback(1)].concat());
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    net.stream(0).borrow_mut().fail_writes = true;
    let err = client.publish("t", Payload::Bytes(b"a"), QoS::AtLeastOnce, false, 0);
    assert_eq!(err, Err(Error::Transport(TransportError::Io)));
    assert!(!client.is_connected());

    // The stale session is replaced; the unsent id is reused.
    client.publish("t", Payload::Bytes(b"a"), QoS::AtLeastOnce, false, 0).unwrap();
    let pubs = publishes(&net.written(1));
    assert_eq!(publish_id(&pubs[0]), 1);
}

// ── Keep-alive ───────────────────────────────────────────────

#[test]
fn check_connection_pings_at_half_keep_alive() {
    let net = MockConnector::new();
    net.accept(&[&CONNACK_OK[..], &PINGRESP].concat());
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    assert!(client.check_connection(29_999));
    assert_eq!(net.written(0).len(), 23, "no ping before half the keep-alive");

    assert!(client.check_connection(30_000));
    assert!(net.written(0).ends_with(&[0xC0, 0x00]));
}

#[test]
fn failed_ping_marks_session_stale() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    assert_eq!(client.ping(1_000), Err(Error::Transport(TransportError::Timeout)));
    assert!(!client.is_connected());
    assert!(!client.check_connection(2_000));
}

#[test]
fn zero_keep_alive_never_pings() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let cfg = BrokerConfig { keep_alive_secs: 0, ..broker() };
    let mut client = ProtocolClient::new(net.clone(), NoDelay::default(), cfg, "id");
    client.connect(true, 0).unwrap();

    let before = net.written(0).len();
    assert!(client.check_connection(10_000_000));
    assert_eq!(net.written(0).len(), before);
}

// ── Reconnect ────────────────────────────────────────────────

#[test]
fn reconnect_is_bounded_and_delayed() {
    let net = MockConnector::new();
    let (mut client, delay) = make_client(&net);

    assert_eq!(client.reconnect(0), Err(Error::Transport(TransportError::ConnectFailed)));
    assert_eq!(client.reconnect_attempts(), 1);
    assert_eq!(client.reconnect(0), Err(Error::Transport(TransportError::ConnectFailed)));
    assert_eq!(client.reconnect_attempts(), 2);

    assert_eq!(client.reconnect(0), Err(Error::Transport(TransportError::RetriesExhausted)));
    assert_eq!(client.reconnect_attempts(), 2);
    assert_eq!(net.opens().len(), 2, "no open once the bound is hit");
    assert_eq!(delay.total_ms(), 500);
}

#[test]
fn successful_connect_lifts_reconnect_bound() {
    let net = MockConnector::new();
    net.refuse(TransportError::ConnectFailed);
    net.refuse(TransportError::ConnectFailed);
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);

    let _ = client.reconnect(0);
    let _ = client.reconnect(0);
    assert!(client.reconnect(0).is_err());

    client.connect(true, 0).unwrap();
    assert_eq!(client.reconnect_attempts(), 0);
}

#[test]
fn disconnect_sends_packet_and_closes() {
    let net = MockConnector::new();
    net.accept(&CONNACK_OK);
    let (mut client, _) = make_client(&net);
    client.connect(true, 0).unwrap();

    client.disconnect();
    assert!(!client.is_connected());
    let stream = net.stream(0);
    assert!(stream.borrow().written.ends_with(&[0xE0, 0x00]));
    assert!(stream.borrow().closed);

    // Idempotent.
    client.disconnect();
}

// ── Telemetry ────────────────────────────────────────────────

#[test]
fn telemetry_goes_to_device_topic_at_qos1() {
    let net = MockConnector::new();
    net.accept(&[&CONNACK_OK[..], &puback(1)].concat());
    let (mut client, _) = make_client(&net);

    client.publish_telemetry("stations", "ST-102030", Payload::Text("{}"), 0).unwrap();

    let pubs = publishes(&net.written(0));
    assert_eq!(pubs.len(), 1);
    assert_eq!(pubs[0].header, 0x32);
    assert!(pubs[0].payload.starts_with(&[&[0x00, 0x12][..], b"stations/ST-102030"].concat()));

    let traffic = client.take_traffic();
    assert_eq!(traffic.sent, net.written(0).len() as u64);
    assert_eq!(traffic.received, 8);
    assert_eq!(client.take_traffic().total(), 0, "taking resets the counters");
}
