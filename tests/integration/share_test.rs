//! Integration tests for public share links and storage usage.

mod helpers;

use drivehub_core::error::ErrorKind;
use drivehub_storage::digest::{digest_bytes, digest_stream};

#[tokio::test]
async fn test_link_follows_file_through_bin_and_restore() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let file = app.file(&ctx, None, "slides.pdf", b"deck contents").await;

    let link = app.engine.shares.generate(&ctx, file.id).await.expect("generate");

    app.engine.bin.bin(&ctx, file.id).await.expect("bin");
    let Err(err) = app.engine.shares.open(&link.link_id).await else {
        panic!("binned file opened");
    };
    assert_eq!(err.kind, ErrorKind::NotFound);

    app.engine.bin.restore(&ctx, file.id).await.expect("restore");
    let Ok((node, stream)) = app.engine.shares.open(&link.link_id).await else {
        panic!("restored file did not open");
    };
    assert_eq!(node.id, file.id);
    let (hash, _) = digest_stream(stream).await.expect("read");
    assert_eq!(hash, digest_bytes(b"deck contents"));

    let links = app.engine.shares.list(&ctx).await.expect("list");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].views, 2);
}

#[tokio::test]
async fn test_storage_usage_tracks_bin_and_purge() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let docs = app.folder(&ctx, None, "docs").await;
    app.file(&ctx, Some(docs.id), "a.txt", b"aaaa").await;
    app.file(&ctx, Some(docs.id), "b.txt", b"aaaa").await;
    app.file(&ctx, None, "c.txt", b"cc").await;

    let usage = app.engine.nodes.storage_usage(&ctx).await.expect("usage");
    assert_eq!(usage.total_usage_bytes, 10);

    app.engine.bin.bin(&ctx, docs.id).await.expect("bin");
    let usage = app.engine.nodes.storage_usage(&ctx).await.expect("usage");
    assert_eq!(usage.total_usage_bytes, 10, "binned files still count");

    app.engine.bin.empty_bin(&ctx).await.expect("empty");
    let usage = app.engine.nodes.storage_usage(&ctx).await.expect("usage");
    assert_eq!(usage.total_usage_bytes, 2);
}
