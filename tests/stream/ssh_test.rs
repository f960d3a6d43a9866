//! Tests for the SSH connector against stand-in client binaries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gerrit_stream::stream::{ConnectError, SshConnector};
use gerrit_stream::{
    EventPayload, RunOutcome, StreamEmitter, StreamRunner, STREAM_END_EVENT, STREAM_WRITE_EVENT,
};
use tokio_util::sync::CancellationToken;

type Seen = Arc<Mutex<Vec<(String, EventPayload)>>>;

fn record_all(emitter: &mut StreamEmitter) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    emitter.subscribe_all(move |event, payload| {
        sink.lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
    });
    seen
}

async fn run_to_close(emitter: StreamEmitter) -> RunOutcome {
    let mut runner = StreamRunner::new(emitter).unwrap();
    tokio::time::timeout(Duration::from_secs(10), runner.run(&CancellationToken::new()))
        .await
        .expect("stream did not close")
        .unwrap()
}

#[tokio::test]
async fn missing_binary_fails_to_start() {
    let connector = SshConnector::new().binary("/nonexistent/gerrit-stream-ssh");
    let mut emitter = StreamEmitter::with_connector("gerrit.example.com", 29418, false, connector);

    let result = emitter.start();

    assert!(matches!(result, Err(ConnectError::NotFound(_))));
    assert!(!emitter.is_started());
}

#[cfg(unix)]
#[tokio::test]
async fn echo_client_output_reaches_listeners() {
    let connector = SshConnector::new().binary("echo");
    let mut emitter = StreamEmitter::with_connector("gerrit.example.com", 29418, false, connector);
    let seen = record_all(&mut emitter);

    let outcome = run_to_close(emitter).await;
    assert_eq!(outcome, RunOutcome::StreamClosed);

    let seen = seen.lock().unwrap();
    let written: String = seen
        .iter()
        .filter(|(name, _)| name == STREAM_WRITE_EVENT)
        .filter_map(|(_, payload)| payload.as_text())
        .collect();
    assert_eq!(
        written,
        "-p 29418 gerrit.example.com gerrit stream-events\n"
    );

    let (last_name, last_payload) = seen.last().unwrap();
    assert_eq!(last_name, STREAM_END_EVENT);
    assert!(last_payload.as_text().unwrap().starts_with("stream exited"));
    assert_eq!(seen.len(), seen.iter().filter(|(n, _)| n.starts_with("gerritStream")).count());
}

#[cfg(unix)]
#[tokio::test]
async fn scripted_client_publishes_domain_events() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-ssh");
    std::fs::write(
        &script,
        "#!/bin/sh\nprintf '%s\\n' '{\"type\":\"comment-added\",\"id\":19234}'\nprintf '%s\\n' 'not json'\nprintf '%s\\n' '{\"type\":\"change-merged\",\"id\":2}'\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let connector = SshConnector::new().binary(script.display().to_string());
    let mut emitter = StreamEmitter::with_connector("gerrit.example.com", 29418, false, connector);
    let seen = record_all(&mut emitter);

    let outcome = run_to_close(emitter).await;
    assert_eq!(outcome, RunOutcome::StreamClosed);

    let seen = seen.lock().unwrap();
    let domain: Vec<(&str, Option<i64>)> = seen
        .iter()
        .filter(|(name, _)| !name.starts_with("gerritStream"))
        .map(|(name, payload)| {
            (
                name.as_str(),
                payload.get("id").and_then(serde_json::Value::as_i64),
            )
        })
        .collect();
    assert_eq!(
        domain,
        vec![("commentAdded", Some(19234)), ("changeMerged", Some(2))]
    );
    assert_eq!(seen.last().unwrap().0, STREAM_END_EVENT);
}

#[cfg(unix)]
#[tokio::test]
async fn stop_terminates_long_running_client() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-ssh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let connector = SshConnector::new()
        .binary(script.display().to_string())
        .terminate_timeout(Duration::from_millis(500));
    let mut emitter = StreamEmitter::with_connector("gerrit.example.com", 29418, false, connector);
    let mut signals = emitter.take_signals().unwrap();

    emitter.start().unwrap();
    assert!(emitter.is_started());
    emitter.stop();
    assert!(!emitter.is_started());

    // A closed handle never reports an end signal.
    let next = tokio::time::timeout(Duration::from_millis(300), signals.recv()).await;
    assert!(next.is_err());
}
