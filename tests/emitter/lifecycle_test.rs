//! Tests for emitter start/stop and restart behavior.

use std::sync::{Arc, Mutex};

use gerrit_stream::stream::StreamSignal;
use gerrit_stream::{LifecycleState, StreamEmitter, STREAM_END_EVENT};

use super::fake::{FakeConnector, Session};

fn emitter_with(auto_restart: bool, connector: &FakeConnector) -> StreamEmitter {
    StreamEmitter::with_connector("gerrit.example.com", 29418, auto_restart, connector.clone())
}

#[test]
fn new_emitter_keeps_settings() {
    let emitter = emitter_with(false, &FakeConnector::new());

    assert_eq!(emitter.host(), "gerrit.example.com");
    assert_eq!(emitter.port(), 29418);
    assert!(!emitter.auto_restart_enabled());
}

#[test]
fn new_emitter_is_not_started() {
    let emitter = emitter_with(false, &FakeConnector::new());
    assert!(!emitter.is_started());
    assert_eq!(emitter.state(), LifecycleState::Stopped);
}

#[test]
fn start_then_stop() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);

    emitter.start().unwrap();
    assert!(emitter.is_started());
    assert_eq!(emitter.state(), LifecycleState::Started);

    emitter.stop();
    assert!(!emitter.is_started());
    assert_eq!(connector.opened(), 1);
    assert_eq!(connector.closed(), 1);
}

#[test]
fn start_passes_host_and_port() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);
    emitter.start().unwrap();

    let counters = connector.counters.lock().unwrap();
    assert_eq!(counters.hosts, vec![("gerrit.example.com".to_string(), 29418)]);
}

#[test]
fn repeated_start_holds_one_handle() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);

    emitter.start().unwrap();
    emitter.start().unwrap();
    emitter.start().unwrap();

    assert!(emitter.is_started());
    assert_eq!(connector.opened(), 1);
}

#[test]
fn stop_when_stopped_is_noop() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);

    emitter.stop();
    assert!(!emitter.is_started());
    assert_eq!(connector.closed(), 0);
}

#[test]
fn failed_start_stays_stopped() {
    let connector = FakeConnector::scripted(vec![Session::failing()]);
    let mut emitter = emitter_with(false, &connector);

    assert!(emitter.start().is_err());
    assert!(!emitter.is_started());

    emitter.start().unwrap();
    assert!(emitter.is_started());
}

#[test]
fn stream_end_stops_emitter() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);
    emitter.start().unwrap();

    emitter.on_stream_end("end");

    assert!(!emitter.is_started());
    assert_eq!(connector.closed(), 1);
    assert_eq!(connector.opened(), 1);
}

#[test]
fn stream_end_while_stopped_still_publishes() {
    let mut emitter = emitter_with(false, &FakeConnector::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    emitter.subscribe(STREAM_END_EVENT, move |payload| {
        sink.lock().unwrap().push(payload.as_text().unwrap().to_string());
    });

    emitter.on_stream_end("end");

    assert!(!emitter.is_started());
    assert_eq!(*seen.lock().unwrap(), vec!["end"]);
}

#[test]
fn stream_end_is_stopped_when_end_listener_runs() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(true, &connector);
    emitter.start().unwrap();

    let counters = Arc::clone(&connector.counters);
    let observed = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&observed);
    emitter.subscribe(STREAM_END_EVENT, move |_| {
        let counters = counters.lock().unwrap();
        *slot.lock().unwrap() = Some((counters.opened, counters.closed));
    });

    emitter.on_stream_end("end");

    // One handle opened and released before the restart opens another.
    assert_eq!(*observed.lock().unwrap(), Some((1, 1)));
    assert!(emitter.is_started());
}

#[test]
fn auto_restart_reopens_stream() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(true, &connector);
    emitter.start().unwrap();

    emitter.on_stream_end("end");

    assert!(emitter.is_started());
    assert_eq!(connector.opened(), 2);
    assert_eq!(emitter.restart_count(), 1);
}

#[test]
fn auto_restart_from_stopped_starts() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(true, &connector);

    emitter.on_stream_end("end");

    assert!(emitter.is_started());
    assert_eq!(connector.opened(), 1);
}

#[test]
fn disabled_auto_restart_stays_stopped() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);
    emitter.start().unwrap();

    emitter.on_stream_end("end");

    assert!(!emitter.is_started());
    assert_eq!(emitter.restart_count(), 0);
}

#[test]
fn auto_restart_can_be_toggled() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);
    emitter.set_auto_restart(true);
    assert!(emitter.auto_restart_enabled());

    emitter.start().unwrap();
    emitter.on_stream_end("end");
    assert!(emitter.is_started());
}

#[test]
fn failed_restart_leaves_emitter_stopped() {
    let connector = FakeConnector::scripted(vec![Session::default(), Session::failing()]);
    let mut emitter = emitter_with(true, &connector);
    emitter.start().unwrap();

    emitter.on_stream_end("connection reset");

    assert!(!emitter.is_started());
    assert_eq!(emitter.restart_count(), 1);
}

#[test]
fn signals_from_released_handle_are_ignored() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);
    let mut signals = emitter.take_signals().unwrap();
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    emitter.subscribe("commentAdded", move |_| *counter.lock().unwrap() += 1);

    emitter.start().unwrap();
    let old_sink = connector.counters.lock().unwrap().sinks[0].clone();
    emitter.stop();
    emitter.start().unwrap();

    old_sink.write("{\"type\":\"comment-added\"}\n");
    let stale = signals.try_recv().unwrap();
    assert_eq!(stale.generation(), 1);
    assert!(!emitter.dispatch(stale));
    assert_eq!(*hits.lock().unwrap(), 0);

    let new_sink = connector.counters.lock().unwrap().sinks[1].clone();
    new_sink.write("{\"type\":\"comment-added\"}\n");
    assert!(emitter.dispatch(signals.try_recv().unwrap()));
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn dispatch_end_signal_runs_end_handling() {
    let connector = FakeConnector::new();
    let mut emitter = emitter_with(false, &connector);
    emitter.start().unwrap();

    let handled = emitter.dispatch(StreamSignal::End {
        generation: emitter.generation(),
        payload: "end".to_string(),
    });

    assert!(handled);
    assert!(!emitter.is_started());
}

#[test]
fn dispatch_while_stopped_is_ignored() {
    let mut emitter = emitter_with(false, &FakeConnector::new());
    let handled = emitter.dispatch(StreamSignal::Write {
        generation: 0,
        chunk: "{\"type\":\"comment-added\"}\n".to_string(),
    });
    assert!(!handled);
}
