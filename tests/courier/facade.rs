//! Facade Tests
//!
//! `Courier` wiring: send, transactions, garbage collection ticker, shutdown.

use crate::common::*;
use courier::{HttpConnector, TickClock};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn send_through_facade() {
    let connector = ScriptedConnector::new();
    let courier: Courier<()> = scripted_courier(connector.clone());
    let answers = Answers::new();

    assert!(courier.send("peer:1/search", "POST", "q", answers.callback("q")));
    let (_, answer) = answers.wait(1, WAIT).remove(0);
    assert!(answer.ok);
    assert_eq!(answer.body_str(), Some("q"));
    assert_eq!(courier.connections(), 1);
    assert!(courier.stats().completed() >= 1);
}

#[test]
fn connection_limit_returns_false() {
    let courier: Courier<()> = Courier::builder()
        .connector(ScriptedConnector::new())
        .max_connections(1)
        .open()
        .unwrap();
    let answers = Answers::new();

    assert!(courier.send("a:1", "GET", "", answers.callback("a")));
    assert!(!courier.send("b:1", "GET", "", answers.callback("b")));
    let (label, _) = answers.wait(1, WAIT).remove(0);
    assert_eq!(label, "a");
    assert!(answers.drain().is_empty());
}

#[test]
fn ticker_expires_idle_transactions() {
    let courier: Courier<String> = Courier::builder()
        .connector(ScriptedConnector::new())
        .clock(TickClock::starting_at(0))
        .wake_period_ms(20)
        .max_idle_time(5)
        .open()
        .unwrap();

    let short = courier.create_transaction("short".to_string(), 1).unwrap();
    let long = courier.create_transaction("long".to_string(), 5).unwrap();
    assert_eq!(courier.transactions().len(), 2);

    // Deadline band 1 is collected once the clock reaches tick 2
    let deadline = Instant::now() + Duration::from_secs(6);
    while courier.transactions().contains(short) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(!courier.transactions().contains(short));
    assert!(courier.tick() >= 2);
    assert!(courier.transactions().contains(long));
}

#[test]
fn transactions_survive_shutdown() {
    let courier: Courier<Vec<u8>> = scripted_courier(ScriptedConnector::new());
    let id = courier.create_transaction(vec![1, 2, 3], 60).unwrap();
    courier.shutdown();
    assert!(courier.is_shutdown());

    let txn = courier.fetch_transaction(&id.encode()).unwrap().unwrap();
    assert_eq!(txn.into_context(), vec![1, 2, 3]);
}

#[test]
fn shutdown_answers_pending_sends() {
    let courier: Courier<()> = scripted_courier(ScriptedConnector::new());
    let answers = Answers::new();

    courier.send("peer:1", "POST", "slow", answers.callback("slow"));
    courier.send("peer:1", "POST", "x", answers.callback("queued"));
    courier.shutdown();

    let got = answers.drain();
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|(_, a)| a.app_error_code == ErrorCode::Shutdown));
    assert!(courier.send("peer:1", "POST", "x", answers.callback("late")));
    assert_eq!(answers.drain()[0].1.app_error_code, ErrorCode::Shutdown);
}

#[test]
fn dropping_courier_answers_pending_sends() {
    let answers = Answers::new();
    {
        let courier: Courier<()> = scripted_courier(ScriptedConnector::new());
        courier.send("peer:1", "POST", "slow", answers.callback("slow"));
    }
    let got = answers.drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1.app_error_code, ErrorCode::Shutdown);
}

#[test]
fn http_end_to_end() {
    let server = TestServer::start();
    let courier: Courier<()> = Courier::builder()
        .connector(Arc::new(HttpConnector::new(Duration::from_secs(2), None)))
        .open()
        .unwrap();
    let answers = Answers::new();

    courier.send(&server.address("/delegate"), "POST", "ping", answers.callback("ping"));
    let (_, answer) = answers.wait(1, WAIT).remove(0);
    assert_eq!(answer.body_str(), Some("POST /delegate - ping"));
}

#[test]
fn malformed_and_unknown_ids() {
    let courier: Courier<()> = scripted_courier(ScriptedConnector::new());
    assert!(courier.fetch_transaction("not-an-id").unwrap_err().is_malformed_id());
    assert!(courier.fetch_transaction("00000000000000zz").unwrap_err().is_malformed_id());
    assert!(courier.fetch_transaction("0123456789abcdef").unwrap().is_none());
    assert!(!courier.release_transaction("0123456789abcdef").unwrap());
}
