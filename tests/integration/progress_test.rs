//! Integration tests for progress subscriptions.

mod helpers;

use std::time::Duration;

use bytes::Bytes;

use drivehub_entity::job::JobState;
use drivehub_realtime::{ProgressEvent, Subscription};
use drivehub_worker::SubmitRequest;

async fn next_event(sub: &mut Subscription) -> ProgressEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("event in time")
        .expect("subscription open")
}

fn request(url: &str) -> SubmitRequest {
    SubmitRequest {
        url: url.to_string(),
        target_folder_id: None,
    }
}

#[tokio::test]
async fn test_late_subscriber_starts_from_snapshot() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let url = "https://example.com/stream.bin";
    let tx = app.source.gate(url, Some(6));

    let queued = app
        .engine
        .tasks
        .submit(&ctx, request(url))
        .await
        .expect("submit");
    tx.send(Ok(Bytes::from_static(b"abc"))).expect("send");
    app.wait_until(&ctx, queued.job_id, |s| s.bytes_transferred == 3)
        .await;

    let mut late = app.engine.progress.subscribe(ctx.owner);
    let first = next_event(&mut late).await;
    assert!(matches!(first, ProgressEvent::Snapshot { .. }));
    assert_eq!(first.job_id(), queued.job_id);
    assert_eq!(first.job().bytes_transferred, 3);

    tx.send(Ok(Bytes::from_static(b"def"))).expect("send");
    drop(tx);

    loop {
        let event = next_event(&mut late).await;
        assert!(event.sequence() > first.sequence());
        if event.is_terminal() {
            assert!(matches!(event, ProgressEvent::Completed { .. }));
            assert_eq!(event.job().bytes_transferred, 6);
            break;
        }
    }
}

#[tokio::test]
async fn test_subscribers_only_see_their_own_jobs() {
    let app = helpers::TestApp::new().await;
    let alice = app.owner();
    let bob = app.owner();
    app.source.serve("https://example.com/alice.txt", &[b"alice"], None);
    app.source.serve("https://example.com/bob.txt", &[b"bob"], None);

    let mut alice_events = app.engine.progress.subscribe(alice.owner);
    let alice_job = app
        .engine
        .tasks
        .submit(&alice, request("https://example.com/alice.txt"))
        .await
        .expect("submit alice");
    let bob_job = app
        .engine
        .tasks
        .submit(&bob, request("https://example.com/bob.txt"))
        .await
        .expect("submit bob");
    app.wait_for_job(&bob, bob_job.job_id).await;

    loop {
        let event = next_event(&mut alice_events).await;
        assert_eq!(event.job_id(), alice_job.job_id);
        assert_eq!(event.job().owner, alice.owner);
        if event.is_terminal() {
            break;
        }
    }
}

#[tokio::test]
async fn test_failed_job_ends_with_failed_event() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let mut events = app.engine.progress.subscribe(ctx.owner);

    let queued = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/gone.bin"))
        .await
        .expect("submit");

    let terminal = loop {
        let event = next_event(&mut events).await;
        if event.is_terminal() {
            break event;
        }
    };
    assert!(matches!(terminal, ProgressEvent::Failed { .. }));
    assert_eq!(terminal.job_id(), queued.job_id);
    assert_eq!(terminal.job().state, JobState::Failed);
    assert!(!terminal.job().can_cancel);

    let wire = serde_json::to_value(&terminal).expect("serialize");
    assert_eq!(wire["event"], "failed");
    assert_eq!(wire["job"]["state"], "failed");

    let latest = app.engine.progress.latest(queued.job_id).expect("retained");
    assert_eq!(latest.state, JobState::Failed);
}
