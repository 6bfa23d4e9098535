//! Failure Handling Tests
//!
//! Failed exchanges, failed reconnects, timeouts and limits. Every accepted
//! request is answered exactly once.

use crate::common::*;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn failed_exchange_reconnects_and_continues() {
    let connector = ScriptedConnector::new();
    let dispatcher = start_dispatcher(connector.clone(), 16, Duration::from_secs(5));
    let answers = Answers::new();

    for body in ["a", "fail", "b"] {
        assert!(dispatcher.send("peer:1", "POST", body, answers.callback(body)));
    }
    let got = answers.wait(3, WAIT);
    let summary: Vec<(&str, bool)> = got.iter().map(|(l, a)| (l.as_str(), a.ok)).collect();
    assert_eq!(summary, vec![("a", true), ("fail", false), ("b", true)]);

    let failed = &got[1].1;
    assert_eq!(failed.app_error_code, ErrorCode::RequestFailed);
    assert_eq!(failed.http_status, 502);
    assert!(failed.error_message.as_deref().unwrap().contains("connection reset"));
    assert_eq!(connector.connects(), 2);
}

#[test]
fn slow_reconnect_does_not_delay_other_addresses() {
    let connector = ScriptedConnector::new();
    connector.reconnect_delay(Duration::from_millis(1500));
    let dispatcher = start_dispatcher(connector.clone(), 16, Duration::from_secs(5));
    let answers = Answers::new();
    let started = std::time::Instant::now();

    assert!(dispatcher.send("a:1", "POST", "fail", answers.callback("a-fail")));
    assert!(dispatcher.send("a:1", "POST", "queued", answers.callback("a-queued")));
    let (label, _) = answers.wait(1, WAIT).remove(0);
    assert_eq!(label, "a-fail");

    // a:1 is reconnecting; b:1 is answered meanwhile
    assert!(dispatcher.send("b:1", "POST", "quick", answers.callback("b")));
    let (label, answer) = answers.wait(1, WAIT).remove(0);
    assert_eq!(label, "b");
    assert!(answer.ok);
    assert!(started.elapsed() < Duration::from_millis(1000));

    let (label, answer) = answers.wait(1, WAIT).remove(0);
    assert_eq!(label, "a-queued");
    assert!(answer.ok);
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[test]
fn failed_reconnect_drops_queue_exactly_once() {
    let connector = ScriptedConnector::with_delay(Duration::from_millis(50));
    let dispatcher = start_dispatcher(connector.clone(), 16, Duration::from_secs(5));
    let answers = Answers::new();

    assert!(dispatcher.send("peer:1", "POST", "fail", answers.callback("head")));
    for n in 0..3 {
        assert!(dispatcher.send("peer:1", "POST", "queued", answers.callback(format!("q{}", n))));
    }
    // The head is in flight; refuse the reconnect that follows its failure
    connector.refuse(true);

    let got = answers.wait(4, WAIT);
    let labels: Vec<&str> = got.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec!["head", "q0", "q1", "q2"]);
    assert_eq!(got[0].1.app_error_code, ErrorCode::RequestFailed);
    for (_, answer) in &got[1..] {
        assert!(!answer.ok);
        assert_eq!(answer.app_error_code, ErrorCode::Dropped);
    }

    // Nothing else arrives
    std::thread::sleep(Duration::from_millis(100));
    assert!(answers.drain().is_empty());

    // The connection starts over on the next send
    connector.refuse(false);
    assert!(dispatcher.send("peer:1", "POST", "again", answers.callback("again")));
    let (_, answer) = answers.wait(1, WAIT).remove(0);
    assert_eq!(answer.body_str(), Some("again"));
}

#[test]
fn refused_connect_is_answered_synchronously() {
    let connector = ScriptedConnector::new();
    connector.refuse(true);
    let dispatcher = start_dispatcher(connector, 16, Duration::from_secs(5));
    let answers = Answers::new();

    assert!(dispatcher.send("peer:1", "POST", "x", answers.callback("x")));
    let got = answers.drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1.app_error_code, ErrorCode::ConnectFailed);
    assert_eq!(got[0].1.http_status, 503);
}

#[test]
fn timeout_is_answered_and_queue_continues() {
    let connector = ScriptedConnector::new();
    let dispatcher = start_dispatcher(connector, 16, Duration::from_millis(50));
    let answers = Answers::new();

    dispatcher.send("peer:1", "POST", "slow", answers.callback("slow"));
    dispatcher.send("peer:1", "POST", "next", answers.callback("next"));

    let got = answers.wait(2, WAIT);
    assert_eq!(got[0].0, "slow");
    assert_eq!(got[0].1.app_error_code, ErrorCode::Timeout);
    assert_eq!(got[0].1.http_status, 504);
    assert_eq!(got[1].0, "next");
    assert!(got[1].1.ok);
}

#[test]
fn queue_limit_rejects_without_callback() {
    let connector = ScriptedConnector::new();
    let dispatcher = start_dispatcher(connector, 2, Duration::from_secs(60));
    let answers = Answers::new();

    assert!(dispatcher.send("peer:1", "POST", "slow", answers.callback("in-flight")));
    assert!(dispatcher.send("peer:1", "POST", "x", answers.callback("q1")));
    assert!(dispatcher.send("peer:1", "POST", "x", answers.callback("q2")));
    assert!(!dispatcher.send("peer:1", "POST", "x", answers.callback("rejected")));
    assert!(answers.drain().is_empty());

    // Other addresses are unaffected
    assert!(dispatcher.send("other:1", "POST", "y", answers.callback("other")));
    let (label, _) = answers.wait(1, WAIT).remove(0);
    assert_eq!(label, "other");
}

#[test]
fn invalid_inputs_are_answered() {
    let dispatcher = start_dispatcher(ScriptedConnector::new(), 4, Duration::from_secs(5));
    let answers = Answers::new();

    assert!(dispatcher.send("ftp://peer", "GET", "", answers.callback("address")));
    assert!(dispatcher.send("peer:1", "", "", answers.callback("method")));
    let got = answers.drain();
    assert_eq!(got[0].1.app_error_code, ErrorCode::InvalidAddress);
    assert_eq!(got[1].1.app_error_code, ErrorCode::InvalidMethod);
    assert!(got.iter().all(|(_, a)| a.http_status == 400));
}
