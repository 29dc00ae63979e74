//! End-to-end polling cycles through LinkService.

use std::fs;

use fieldlink::app::events::LinkEvent;
use fieldlink::app::ports::LinkTransport;
use fieldlink::app::service::LinkService;
use fieldlink::config::LinkConfig;
use fieldlink::error::{Error, TransportError};
use fieldlink::protocol::Payload;
use fieldlink::selector::{Evaluation, TransportState};

use crate::mock_link::*;

type Service = LinkService<MockConnector, NoDelay>;

fn config() -> LinkConfig {
    let mut c = LinkConfig::default();
    c.device_id = String::from("ST-102030");
    c.transport.check_interval_secs = 30;
    c.transport.failure_threshold = 3;
    c.broker.publish_interval_secs = 60;
    c.broker.max_reconnect_attempts = 2;
    c.update.enabled = false;
    c
}

fn make_service(config: LinkConfig, root: &std::path::Path) -> (Service, MockConnector, RecordingSink) {
    let net = MockConnector::new();
    let mut service = LinkService::new(config, net.clone(), NoDelay::default(), root);
    let mut sink = RecordingSink::new();
    service.start(&mut sink);
    (service, net, sink)
}

// ── Startup ──────────────────────────────────────────────────

#[test]
fn start_announces_primary() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _, sink) = make_service(config(), dir.path());

    assert_eq!(service.state(), TransportState::PrimaryCellular);
    assert!(matches!(sink.events.as_slice(), [LinkEvent::Started(TransportState::PrimaryCellular)]));
}

#[test]
fn nothing_due_means_idle_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, net, mut sink) = make_service(config(), dir.path());
    let mut cellular = MockTransport::cellular_healthy();
    let mut wifi = MockTransport::wifi(true);

    service.poll(0, &mut cellular, &mut wifi, None, &mut sink);
    let outcome = service.poll(1_000, &mut cellular, &mut wifi, None, &mut sink);
    assert_eq!(outcome.evaluation, None);
    assert_eq!(outcome.published, None);
    assert_eq!(outcome.update, None);
    assert!(net.opens().is_empty());
}

// ── Failover ─────────────────────────────────────────────────

#[test]
fn failover_emits_exactly_one_switch() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _, mut sink) = make_service(config(), dir.path());
    let mut cellular = MockTransport::cellular_no_sim();
    let mut wifi = MockTransport::wifi(true);

    let mut evaluations = Vec::new();
    for t in [0, 30_000, 60_000, 90_000] {
        let outcome = service.poll(t, &mut cellular, &mut wifi, None, &mut sink);
        evaluations.push(outcome.evaluation);
    }

    assert_eq!(evaluations[2], Some(Evaluation::Switched {
        from: TransportState::PrimaryCellular,
        to: TransportState::FallbackWifi,
    }));
    assert_eq!(evaluations[3], Some(Evaluation::Stayed));
    assert_eq!(service.state(), TransportState::FallbackWifi);
    assert_eq!(sink.count(|e| matches!(e, LinkEvent::TransportSwitched { .. })), 1);
    assert_eq!(sink.count(|e| matches!(e, LinkEvent::CellularDegraded { .. })), 2);
    assert!(service.last_snapshot().wifi_connected);
}

#[test]
fn unusable_link_skips_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, net, mut sink) = make_service(config(), dir.path());
    let mut cellular = MockTransport::cellular_no_sim();
    let mut wifi = MockTransport::wifi(false);

    let outcome = service.poll(0, &mut cellular, &mut wifi, Some(Payload::Text("t")), &mut sink);
    assert_eq!(outcome.evaluation, Some(Evaluation::FailureCounted(1)));
    assert_eq!(outcome.published, None);
    assert!(net.opens().is_empty(), "no stream opened over a dead link");
}

// ── Telemetry ────────────────────────────────────────────────

#[test]
fn telemetry_published_and_traffic_credited_to_cellular() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, net, mut sink) = make_service(config(), dir.path());
    net.accept(&[&CONNACK_OK[..], &puback(1)].concat());
    let mut cellular = MockTransport::cellular_healthy();
    let mut wifi = MockTransport::wifi(true);

    let outcome = service.poll(0, &mut cellular, &mut wifi, Some(Payload::Text("hello")), &mut sink);
    assert_eq!(outcome.published, Some(true));
    assert!(service.client().is_connected());
    assert_eq!(sink.count(|e| matches!(e, LinkEvent::TelemetryPublished { bytes: 5 })), 1);

    let sent = net.written(0).len() as u64;
    assert_eq!(cellular.traffic().sent, sent);
    assert_eq!(cellular.traffic().received, 8);
    assert_eq!(wifi.traffic().total(), 0);
}

#[test]
fn switch_drops_session_and_next_publish_rides_wifi() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.transport.failure_threshold = 1;
    let (mut service, net, mut sink) = make_service(cfg, dir.path());
    net.accept(&[&CONNACK_OK[..], &puback(1)].concat());
    net.accept(&[&CONNACK_OK[..], &puback(2)].concat());
    let mut cellular = MockTransport::cellular_healthy();
    let mut wifi = MockTransport::wifi(true);

    let outcome = service.poll(0, &mut cellular, &mut wifi, Some(Payload::Text("a")), &mut sink);
    assert_eq!(outcome.published, Some(true));

    cellular.set_cellular_available(false);
    let outcome = service.poll(30_000, &mut cellular, &mut wifi, Some(Payload::Text("b")), &mut sink);
    assert!(matches!(outcome.evaluation, Some(Evaluation::Switched { .. })));
    assert!(!service.client().is_connected(), "old session must be dropped on switch");
    assert!(net.stream(0).borrow().closed);

    let before = cellular.traffic();
    let outcome = service.poll(60_000, &mut cellular, &mut wifi, Some(Payload::Text("c")), &mut sink);
    assert_eq!(outcome.published, Some(true));
    assert_eq!(net.opens().len(), 2);
    assert!(wifi.traffic().total() > 0);
    assert_eq!(cellular.traffic(), before, "nothing credited to the inactive link");
}

#[test]
fn exhausted_reconnects_recover_on_later_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.broker.max_reconnect_attempts = 1;
    let (mut service, net, mut sink) = make_service(cfg, dir.path());
    net.refuse(TransportError::ConnectFailed);
    net.refuse(TransportError::ConnectFailed);
    net.accept(&[&CONNACK_OK[..], &puback(1)].concat());
    let mut cellular = MockTransport::cellular_healthy();
    let mut wifi = MockTransport::wifi(true);

    let payload = Some(Payload::Text("x"));
    assert_eq!(service.poll(0, &mut cellular, &mut wifi, payload, &mut sink).published, Some(false));
    assert_eq!(service.client().reconnect_attempts(), 1);

    assert_eq!(service.poll(60_000, &mut cellular, &mut wifi, payload, &mut sink).published, Some(false));
    assert_eq!(service.poll(120_000, &mut cellular, &mut wifi, payload, &mut sink).published, Some(true));
    assert_eq!(service.client().reconnect_attempts(), 0);
    assert_eq!(
        sink.count(|e| matches!(e, LinkEvent::PublishFailed(Error::Transport(TransportError::ConnectFailed)))),
        2
    );
}

// ── Self-update ──────────────────────────────────────────────

#[test]
fn changed_file_requests_restart() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.py"), b"old").unwrap();

    let mut cfg = config();
    cfg.update.enabled = true;
    cfg.update.check_interval_secs = 60;
    cfg.update.base_url = String::from("http://updates.local");
    cfg.update.files = vec![String::from("main.py")];
    let (mut service, net, mut sink) = make_service(cfg, dir.path());
    net.accept_then_close(&http_response("200 OK", b"new"));
    let mut cellular = MockTransport::cellular_healthy();
    let mut wifi = MockTransport::wifi(true);

    let outcome = service.poll(60_000, &mut cellular, &mut wifi, None, &mut sink);
    assert!(outcome.restart_required);
    assert_eq!(outcome.update.map(|u| u.files_updated), Some(1));
    assert_eq!(fs::read(dir.path().join("main.py")).unwrap(), b"new");
    assert_eq!(sink.count(|e| matches!(e, LinkEvent::UpdateChecked { updated: 1, failed: 0 })), 1);
    assert_eq!(sink.count(|e| matches!(e, LinkEvent::RestartRequired)), 1);
    assert!(cellular.traffic().received > 0, "fetch bytes credited to the active link");

    let status = service.update_status(60);
    assert_eq!(status.last_check_secs, 60);
    assert_eq!(status.secs_until_next_check, 60);
}
