//! Shutdown Tests
//!
//! Stopping the loop answers everything still outstanding.

use crate::common::*;
use courier_engine::{EventLoop, EventLoopConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn stop_answers_in_flight_and_queued() {
    let connector = ScriptedConnector::new();
    let dispatcher = start_dispatcher(connector, 64, Duration::from_secs(60));
    let answers = Answers::new();

    for address in ["a:1", "b:1"] {
        assert!(dispatcher.send(address, "POST", "slow", answers.callback(format!("{} head", address))));
        for n in 0..3 {
            assert!(dispatcher.send(address, "POST", "x", answers.callback(format!("{} q{}", address, n))));
        }
    }
    std::thread::sleep(Duration::from_millis(50));
    dispatcher.event_loop().stop();

    let got = answers.drain();
    assert_eq!(got.len(), 8);
    assert!(got.iter().all(|(_, a)| a.app_error_code == ErrorCode::Shutdown));

    // Per address, the head is answered before its queue
    for address in ["a:1", "b:1"] {
        let mine: Vec<&str> = got
            .iter()
            .map(|(l, _)| l.as_str())
            .filter(|l| l.starts_with(address))
            .collect();
        assert_eq!(mine[0], format!("{} head", address));
        assert_eq!(mine.len(), 4);
    }
}

#[test]
fn send_after_stop_is_answered_with_shutdown() {
    let dispatcher = start_dispatcher(ScriptedConnector::new(), 8, Duration::from_secs(5));
    dispatcher.event_loop().stop();
    let answers = Answers::new();

    assert!(dispatcher.send("peer:1", "POST", "late", answers.callback("late")));
    let got = answers.drain();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1.app_error_code, ErrorCode::Shutdown);
}

#[test]
fn stop_from_callback_does_not_deadlock() {
    let dispatcher = Arc::new(start_dispatcher(
        ScriptedConnector::new(),
        8,
        Duration::from_secs(5),
    ));
    let answers = Answers::new();
    let event_loop = Arc::clone(dispatcher.event_loop());
    let record = answers.callback("stopper");
    dispatcher.send("peer:1", "POST", "x", move |answer| {
        event_loop.stop();
        record(answer);
    });

    let (_, answer) = answers.wait(1, Duration::from_secs(5)).remove(0);
    assert!(answer.ok);
    assert!(dispatcher.event_loop().is_stopped());
}

#[test]
fn tickers_run_by_period_and_by_job_count() {
    init_tracing();
    let event_loop = EventLoop::new(EventLoopConfig {
        wake_period: Duration::from_secs(60),
        ticker_job_interval: 4,
        request_timeout: Duration::from_secs(5),
    })
    .unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    event_loop.add_ticker(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    event_loop.start().unwrap();
    let event_loop = Arc::new(event_loop);

    let registry = courier_engine::ConnectionRegistry::new(
        ScriptedConnector::new(),
        courier_engine::RegistryConfig::default(),
    );
    let dispatcher = courier_engine::Dispatcher::new(Arc::new(registry), Arc::clone(&event_loop));
    let answers = Answers::new();
    for n in 0..8 {
        dispatcher.send("peer:1", "POST", "x", answers.callback(n.to_string()));
    }
    answers.wait(8, Duration::from_secs(5));

    // Eight completions with an interval of four; the timer never fired
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while ticks.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
    assert_eq!(event_loop.stats().completed(), 8);
    assert_eq!(event_loop.stats().ticks(), 2);
}
