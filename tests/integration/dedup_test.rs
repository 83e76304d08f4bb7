//! Integration tests for content-addressed deduplication.

mod helpers;

use drivehub_core::error::ErrorKind;
use drivehub_core::types::NodeId;
use drivehub_storage::digest::digest_bytes;

const PARALLEL: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_registrations_share_one_blob() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let data = b"the same quarterly report, uploaded by every device";
    let hash = digest_bytes(data);

    let mut requests = Vec::with_capacity(PARALLEL);
    for i in 0..PARALLEL {
        requests.push(app.upload(None, &format!("copy-{i}.pdf"), data).await);
    }
    assert_eq!(app.blobs.len(), PARALLEL);

    let mut handles = Vec::with_capacity(PARALLEL);
    for request in requests {
        let nodes = app.engine.nodes.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move { nodes.register_file(&ctx, request).await }));
    }
    let mut ids: Vec<NodeId> = Vec::with_capacity(PARALLEL);
    for handle in handles {
        ids.push(handle.await.expect("join").expect("register").id);
    }

    let entry = app
        .engine
        .addresser
        .find_live(&hash)
        .await
        .expect("lookup")
        .expect("entry");
    assert_eq!(entry.ref_count, PARALLEL as i64);
    assert_eq!(app.blobs.len(), 1, "redundant uploads are removed");
    assert!(app.blobs.contains(&entry.blob_locator));

    for id in &ids {
        let node = app.engine.nodes.get(&ctx, *id).await.expect("get");
        assert_eq!(node.file().expect("file").blob_locator, entry.blob_locator);
    }
}

#[tokio::test]
async fn test_blob_outlives_all_but_last_reference() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let data = b"shared";

    let a = app.file(&ctx, None, "a.txt", data).await;
    let b = app.file(&ctx, None, "b.txt", data).await;
    let c = app.file(&ctx, None, "c.txt", data).await;
    let locator = a.file().expect("file").blob_locator.clone();
    app.blobs.take_deleted();

    for node in [&a, &b] {
        let report = app
            .engine
            .nodes
            .permanent_delete(&ctx, node.id)
            .await
            .expect("delete");
        assert_eq!(report.blobs_released, 0);
        assert!(app.blobs.contains(&locator));
    }

    let report = app
        .engine
        .nodes
        .permanent_delete(&ctx, c.id)
        .await
        .expect("delete last");
    assert_eq!(report.blobs_released, 1);
    assert_eq!(app.blobs.take_deleted(), vec![locator]);
    assert!(
        app.engine
            .addresser
            .find_live(&digest_bytes(data))
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn test_reupload_after_release_stores_fresh_blob() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let data = b"comes and goes";

    let first = app.file(&ctx, None, "x.bin", data).await;
    app.engine
        .nodes
        .permanent_delete(&ctx, first.id)
        .await
        .expect("delete");
    assert_eq!(app.blobs.len(), 0);

    let second = app.file(&ctx, None, "x.bin", data).await;
    let locator = &second.file().expect("file").blob_locator;
    assert!(app.blobs.contains(locator));

    let (_, mut stream) = app
        .engine
        .nodes
        .open_content(&ctx, second.id)
        .await
        .expect("open");
    let mut read = Vec::new();
    while let Some(chunk) = futures::StreamExt::next(&mut stream).await {
        read.extend_from_slice(&chunk.expect("chunk"));
    }
    assert_eq!(read, data);
}

#[tokio::test]
async fn test_register_rejects_malformed_hash() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let mut request = app.upload(None, "bad.bin", b"payload").await;
    request.content_hash = "not-a-digest".to_string();
    let err = app
        .engine
        .nodes
        .register_file(&ctx, request)
        .await
        .expect_err("bad hash");
    assert_eq!(err.kind, ErrorKind::Validation);
}
