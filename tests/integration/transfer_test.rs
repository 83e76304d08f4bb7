//! Integration tests for background URL transfers.

mod helpers;

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use drivehub_core::error::ErrorKind;
use drivehub_core::types::PageRequest;
use drivehub_entity::job::JobState;
use drivehub_service::node::ListFilter;
use drivehub_storage::digest::digest_bytes;
use drivehub_worker::SubmitRequest;

fn request(url: &str, folder: Option<drivehub_core::types::NodeId>) -> SubmitRequest {
    SubmitRequest {
        url: url.to_string(),
        target_folder_id: folder,
    }
}

#[tokio::test]
async fn test_download_completes_and_registers_file() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let inbox = app.folder(&ctx, None, "inbox").await;

    let chunks: [&[u8]; 3] = [b"col_a,col_b\n", b"1,2\n", b"3,4\n"];
    app.source
        .serve("https://files.example.com/exports/data.csv", &chunks, Some("text/csv"));

    let mut events = app.engine.progress.subscribe(ctx.owner);
    let queued = app
        .engine
        .tasks
        .submit(&ctx, request("https://files.example.com/exports/data.csv", Some(inbox.id)))
        .await
        .expect("submit");
    assert_eq!(queued.state, JobState::Queued);

    let mut states = Vec::new();
    let mut last_bytes = 0;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("subscription open");
        let job = event.job();
        assert!(job.bytes_transferred >= last_bytes, "progress never goes back");
        last_bytes = job.bytes_transferred;
        if states.last() != Some(&job.state) {
            states.push(job.state);
        }
        if event.is_terminal() {
            break;
        }
    }
    assert_eq!(
        states,
        [JobState::Queued, JobState::Running, JobState::Completed]
    );

    let done = app.wait_for_job(&ctx, queued.job_id).await;
    assert_eq!(done.bytes_transferred, 20);
    assert_eq!(done.progress_percent, Some(100.0));
    let node_id = done.result_node_id.expect("registered node");

    let node = app.engine.nodes.get_live(&ctx, node_id).await.expect("node");
    assert_eq!(node.name, "data.csv");
    assert_eq!(node.parent_id, Some(inbox.id));
    let content = node.file().expect("file");
    assert_eq!(content.mime_type, "text/csv");
    assert_eq!(content.content_hash, digest_bytes(b"col_a,col_b\n1,2\n3,4\n"));

    let (_, mut stream) = app
        .engine
        .nodes
        .open_content(&ctx, node_id)
        .await
        .expect("open");
    let mut read = Vec::new();
    while let Some(chunk) = stream.next().await {
        read.extend_from_slice(&chunk.expect("chunk"));
    }
    assert_eq!(read, b"col_a,col_b\n1,2\n3,4\n");
}

#[tokio::test]
async fn test_cancel_mid_transfer_leaves_no_file() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let url = "https://files.example.com/huge.iso";
    let tx = app.source.gate(url, Some(1_000_000));

    let queued = app
        .engine
        .tasks
        .submit(&ctx, request(url, None))
        .await
        .expect("submit");
    tx.send(Ok(Bytes::from_static(b"first chunk"))).expect("send");

    app.wait_until(&ctx, queued.job_id, |s| s.bytes_transferred > 0)
        .await;
    let during = app
        .engine
        .tasks
        .cancel(&ctx, queued.job_id)
        .await
        .expect("cancel");
    assert!(during.can_cancel);

    let done = app.wait_for_job(&ctx, queued.job_id).await;
    assert_eq!(done.state, JobState::Cancelled);
    assert!(done.result_node_id.is_none());

    let listing = app
        .engine
        .nodes
        .list_children(&ctx, None, ListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert!(listing.items.is_empty());
    assert_eq!(app.blobs.len(), 0);

    let err = app
        .engine
        .tasks
        .cancel(&ctx, queued.job_id)
        .await
        .expect_err("already cancelled");
    assert_eq!(err.kind, ErrorKind::InvalidOperation);
}

#[tokio::test]
async fn test_queued_job_cancels_immediately() {
    let app = helpers::TestApp::with_config(|c| c.transfer.max_concurrent = 1).await;
    let ctx = app.owner();
    let busy = app.source.gate("https://example.com/slow.bin", None);
    app.source.serve("https://example.com/next.bin", &[b"next"], None);

    let first = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/slow.bin", None))
        .await
        .expect("submit first");
    app.wait_until(&ctx, first.job_id, |s| s.state == JobState::Running)
        .await;

    let second = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/next.bin", None))
        .await
        .expect("submit second");
    let cancelled = app
        .engine
        .tasks
        .cancel(&ctx, second.job_id)
        .await
        .expect("cancel queued");
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert!(cancelled.started_at.is_none());

    busy.send(Ok(Bytes::from_static(b"slow body"))).expect("send");
    drop(busy);
    let first_done = app.wait_for_job(&ctx, first.job_id).await;
    assert_eq!(first_done.state, JobState::Completed);

    let second_done = app.wait_for_job(&ctx, second.job_id).await;
    assert_eq!(second_done.state, JobState::Cancelled);
}

#[tokio::test]
async fn test_name_collision_gets_numbered_suffix() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    app.file(&ctx, None, "report.pdf", b"older report").await;
    app.source
        .serve("https://example.com/q/report.pdf", &[b"%PDF-1.7 newer"], None);

    let queued = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/q/report.pdf", None))
        .await
        .expect("submit");
    let done = app.wait_for_job(&ctx, queued.job_id).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.file_name.as_deref(), Some("report (1).pdf"));

    let node = app
        .engine
        .nodes
        .get(&ctx, done.result_node_id.expect("node"))
        .await
        .expect("get");
    assert_eq!(node.file().expect("file").mime_type, "application/pdf");
}

#[tokio::test]
async fn test_download_of_known_content_is_deduplicated() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let existing = app.file(&ctx, None, "logo.png", b"\x89PNG logo").await;
    app.source
        .serve("https://cdn.example.com/logo-copy.png", &[b"\x89PNG logo"], Some("image/png"));

    let queued = app
        .engine
        .tasks
        .submit(&ctx, request("https://cdn.example.com/logo-copy.png", None))
        .await
        .expect("submit");
    let done = app.wait_for_job(&ctx, queued.job_id).await;
    assert_eq!(done.state, JobState::Completed);

    let copy = app
        .engine
        .nodes
        .get(&ctx, done.result_node_id.expect("node"))
        .await
        .expect("get");
    assert_eq!(
        copy.file().expect("file").blob_locator,
        existing.file().expect("file").blob_locator
    );
    assert_eq!(app.blobs.len(), 1);
}

#[tokio::test]
async fn test_failures_are_recorded() {
    let app = helpers::TestApp::with_config(|c| c.transfer.max_download_bytes = 8).await;
    let ctx = app.owner();

    app.source
        .serve("https://example.com/too-big.bin", &[b"0123456789"], None);
    let short = app.source.gate("https://example.com/short.bin", Some(5));
    short.send(Ok(Bytes::from_static(b"abc"))).expect("send");
    drop(short);

    let too_big = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/too-big.bin", None))
        .await
        .expect("submit");
    let truncated = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/short.bin", None))
        .await
        .expect("submit");
    let missing = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/missing.bin", None))
        .await
        .expect("submit");

    for job_id in [too_big.job_id, truncated.job_id, missing.job_id] {
        let done = app.wait_for_job(&ctx, job_id).await;
        assert_eq!(done.state, JobState::Failed);
        assert!(done.error.is_some());
        assert!(done.result_node_id.is_none());
    }
    assert_eq!(app.blobs.len(), 0);

    let history = app
        .engine
        .tasks
        .history(&ctx, Some(JobState::Failed), &PageRequest::default())
        .await
        .expect("history");
    assert_eq!(history.total_items, 3);
}

#[tokio::test]
async fn test_source_longer_than_declared_fails() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let overlong = app.source.gate("https://example.com/overlong.bin", Some(3));
    overlong.send(Ok(Bytes::from_static(b"abc"))).expect("send");
    overlong.send(Ok(Bytes::from_static(b"def"))).expect("send");
    drop(overlong);

    let job = app
        .engine
        .tasks
        .submit(&ctx, request("https://example.com/overlong.bin", None))
        .await
        .expect("submit");
    let done = app.wait_for_job(&ctx, job.job_id).await;
    assert_eq!(done.state, JobState::Failed);
    assert!(done.error.as_deref().unwrap_or_default().contains("declared 3 bytes"));
    assert!(done.result_node_id.is_none());
    assert_eq!(done.bytes_transferred, 3);

    let root = app
        .engine
        .nodes
        .list_children(&ctx, None, ListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert_eq!(root.total_items, 0);
    assert_eq!(app.blobs.len(), 0);
}
