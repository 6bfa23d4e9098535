//! Ordering Tests
//!
//! Requests to one address are answered in submission order; addresses do
//! not wait for each other.

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn single_address_answers_in_submission_order() {
    let connector = ScriptedConnector::with_delay(Duration::from_millis(2));
    let dispatcher = start_dispatcher(connector.clone(), 64, Duration::from_secs(5));
    let answers = Answers::new();

    for n in 0..20 {
        let label = format!("r{}", n);
        assert!(dispatcher.send("peer:1/q", "POST", label.clone(), answers.callback(label)));
    }

    let labels: Vec<String> = answers.wait(20, WAIT).into_iter().map(|(l, _)| l).collect();
    let expected: Vec<String> = (0..20).map(|n| format!("r{}", n)).collect();
    assert_eq!(labels, expected);
    assert_eq!(connector.seen(), expected);
    // One connection served every request
    assert_eq!(connector.connects(), 1);
}

#[test]
fn answers_carry_response() {
    let connector = ScriptedConnector::new();
    let dispatcher = start_dispatcher(connector, 8, Duration::from_secs(5));
    let answers = Answers::new();

    dispatcher.send("peer:1", "GET", "hello", answers.callback("a"));
    let (_, answer) = answers.wait(1, WAIT).remove(0);
    assert!(answer.ok);
    assert_eq!(answer.http_status, 200);
    assert_eq!(answer.app_error_code, ErrorCode::Ok);
    assert_eq!(answer.content_type.as_deref(), Some("text/plain"));
    assert_eq!(answer.charset.as_deref(), Some("utf-8"));
    assert_eq!(answer.body_str(), Some("hello"));
}

#[test]
fn slow_address_does_not_block_others() {
    let connector = ScriptedConnector::new();
    let dispatcher = start_dispatcher(connector, 8, Duration::from_secs(60));
    let answers = Answers::new();

    // Never completes within the test
    dispatcher.send("stuck:1", "POST", "slow", answers.callback("slow"));
    dispatcher.send("fast:1", "POST", "quick", answers.callback("fast"));

    let (label, answer) = answers.wait(1, WAIT).remove(0);
    assert_eq!(label, "fast");
    assert!(answer.ok);
}

#[test]
fn concurrent_senders_keep_per_thread_order() {
    let connector = ScriptedConnector::with_delay(Duration::from_millis(1));
    let dispatcher = Arc::new(start_dispatcher(connector, 256, Duration::from_secs(5)));
    let answers = Arc::new(Answers::new());

    let senders: Vec<_> = (0..4)
        .map(|t| {
            let dispatcher = Arc::clone(&dispatcher);
            let answers = Arc::clone(&answers);
            thread::spawn(move || {
                for n in 0..25 {
                    let label = format!("{}:{}", t, n);
                    assert!(dispatcher.send("shared:1", "POST", label.clone(), answers.callback(label)));
                }
            })
        })
        .collect();
    for s in senders {
        s.join().unwrap();
    }

    let labels: Vec<String> = answers.wait(100, WAIT).into_iter().map(|(l, _)| l).collect();
    for t in 0..4 {
        let mine: Vec<usize> = labels
            .iter()
            .filter_map(|l| l.strip_prefix(&format!("{}:", t)))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(mine, (0..25).collect::<Vec<_>>());
    }
}
