//! UpdateManager against a scripted HTTP origin and a real temp directory.

use std::fs;

use fieldlink::config::UpdateConfig;
use fieldlink::error::TransportError;
use fieldlink::update::UpdateManager;
use fieldlink::update::digest;

use crate::mock_link::*;

fn config(files: &[&str]) -> UpdateConfig {
    UpdateConfig {
        enabled: true,
        check_interval_secs: 3600,
        base_url: String::from("http://updates.local/fw"),
        files: files.iter().map(|f| String::from(*f)).collect(),
        fetch_timeout_ms: 1_000,
        max_body_bytes: 4096,
    }
}

fn serve(net: &MockConnector, body: &[u8]) {
    net.accept_then_close(&http_response("200 OK", body));
}

#[test]
fn request_line_and_host_header() {
    let dir = tempfile::tempdir().unwrap();
    let net = MockConnector::new();
    serve(&net, b"x");
    let mut m = UpdateManager::new(net.clone(), config(&["main.py"]), dir.path());

    m.check_and_update(3600, false);
    assert_eq!(
        net.written(0),
        b"GET /fw/main.py HTTP/1.1\r\nHost: updates.local\r\nConnection: close\r\n\r\n"
    );
    assert_eq!(net.opens()[0], OpenRecord { host: String::from("updates.local"), port: 80, secure: false });
}

#[test]
fn identical_file_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"print('v1')\n").unwrap();
    let mtime = fs::metadata(&path).unwrap().modified().unwrap();

    let net = MockConnector::new();
    serve(&net, b"print('v1')\n");
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_updated, 0);
    assert_eq!(r.files_failed, 0);
    assert!(!r.restart_required);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime, "file must not be rewritten");
    assert_eq!(m.tracked()[0].last_observed, Some(digest::digest(b"print('v1')\n")));
}

#[test]
fn differing_file_overwritten_and_restart_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"print('v1')\n").unwrap();

    let net = MockConnector::new();
    serve(&net, b"print('v2')\n");
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_updated, 1);
    assert!(r.restart_required);
    assert_eq!(fs::read(&path).unwrap(), b"print('v2')\n");
}

#[test]
fn missing_local_file_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let net = MockConnector::new();
    serve(&net, b"cfg = 1\n");
    let mut m = UpdateManager::new(net, config(&["lib/settings.py"]), dir.path());

    let r = m.check_and_update(0, true);
    assert_eq!(r.files_updated, 1);
    assert_eq!(fs::read(dir.path().join("lib/settings.py")).unwrap(), b"cfg = 1\n");
}

#[test]
fn failed_fetch_does_not_stop_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.py"), b"old a").unwrap();
    fs::write(dir.path().join("b.py"), b"old b").unwrap();

    let net = MockConnector::new();
    net.refuse(TransportError::ConnectFailed);
    serve(&net, b"new b");
    let mut m = UpdateManager::new(net, config(&["a.py", "b.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_failed, 1);
    assert_eq!(r.files_updated, 1);
    assert!(r.restart_required);
    assert_eq!(fs::read(dir.path().join("a.py")).unwrap(), b"old a");
    assert_eq!(fs::read(dir.path().join("b.py")).unwrap(), b"new b");
}

#[test]
fn non_200_response_leaves_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"keep").unwrap();

    let net = MockConnector::new();
    net.accept_then_close(&http_response("404 Not Found", b"nope"));
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_failed, 1);
    assert!(!r.restart_required);
    assert_eq!(fs::read(&path).unwrap(), b"keep");
}

#[test]
fn body_ends_when_origin_goes_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"old").unwrap();

    let net = MockConnector::new();
    // No Content-Length and no close; the read timeout ends the body.
    net.accept(b"HTTP/1.1 200 OK\r\nServer: t\r\n\r\nnew");
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_updated, 1);
    assert_eq!(r.files_failed, 0);
    assert_eq!(fs::read(&path).unwrap(), b"new");
}

#[test]
fn content_length_is_not_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"old").unwrap();

    let net = MockConnector::new();
    net.accept_then_close(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nnew");
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_updated, 1);
    assert_eq!(fs::read(&path).unwrap(), b"new", "short body written as received");
}

#[test]
fn empty_body_never_replaces_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"print('firmware')").unwrap();

    let net = MockConnector::new();
    net.accept_then_close(&http_response("200 OK", b""));
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_updated, 0);
    assert_eq!(r.files_failed, 1);
    assert!(!r.restart_required);
    assert_eq!(fs::read(&path).unwrap(), b"print('firmware')");
    assert_eq!(m.tracked()[0].last_observed, None);
}

#[test]
fn status_line_must_say_200_ok() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.py");
    fs::write(&path, b"keep").unwrap();

    let net = MockConnector::new();
    net.accept_then_close(&http_response("200 Partial", b"new"));
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let r = m.check_and_update(3600, false);
    assert_eq!(r.files_updated, 0);
    assert_eq!(r.files_failed, 1);
    assert!(!r.restart_required);
    assert_eq!(fs::read(&path).unwrap(), b"keep");
}

#[test]
fn escaping_path_fails_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let net = MockConnector::new();
    let mut m = UpdateManager::new(net.clone(), config(&["../outside.py"]), dir.path());

    let r = m.check_and_update(0, true);
    assert_eq!(r.files_failed, 1);
    assert!(net.opens().is_empty());
}

#[test]
fn interval_gates_checks() {
    let dir = tempfile::tempdir().unwrap();
    let net = MockConnector::new();
    serve(&net, b"x");
    serve(&net, b"x");
    let mut m = UpdateManager::new(net.clone(), config(&["main.py"]), dir.path());

    m.check_and_update(3600, false);
    assert_eq!(net.opens().len(), 1);

    m.check_and_update(3601, false);
    m.check_and_update(7199, false);
    assert_eq!(net.opens().len(), 1, "no fetch inside the interval");

    m.check_and_update(7200, false);
    assert_eq!(net.opens().len(), 2);
}

#[test]
fn status_countdown_resets_after_check() {
    let dir = tempfile::tempdir().unwrap();
    let net = MockConnector::new();
    serve(&net, b"x");
    let mut m = UpdateManager::new(net, config(&["main.py"]), dir.path());

    let s = m.get_status(100);
    assert!(s.enabled);
    assert_eq!(s.secs_until_next_check, 3500);
    assert_eq!(m.get_status(10_000).secs_until_next_check, 0, "countdown never goes negative");

    m.check_and_update(10_000, false);
    let s = m.get_status(10_000);
    assert_eq!(s.last_check_secs, 10_000);
    assert_eq!(s.secs_until_next_check, 3600);
}
