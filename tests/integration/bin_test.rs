//! Integration tests for the recycle bin.

mod helpers;

use std::time::Duration;

use chrono::Utc;

use drivehub_core::error::ErrorKind;
use drivehub_core::types::PageRequest;
use drivehub_service::RequestContext;
use drivehub_service::node::ListFilter;

/// A context for the same owner stamped now, so each bin gets its own batch.
async fn later(ctx: &RequestContext) -> RequestContext {
    tokio::time::sleep(Duration::from_millis(5)).await;
    RequestContext::new(ctx.owner)
}

#[tokio::test]
async fn test_bin_hides_subtree_and_restore_brings_it_back() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let project = app.folder(&ctx, None, "project").await;
    let src = app.folder(&ctx, Some(project.id), "src").await;
    let main = app.file(&ctx, Some(src.id), "main.rs", b"fn main() {}").await;

    let report = app.engine.bin.bin(&ctx, project.id).await.expect("bin");
    assert_eq!(report.binned, 3);

    let roots = app
        .engine
        .nodes
        .list_children(&ctx, None, ListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert!(roots.items.is_empty());

    let bin = app.engine.bin.list_bin(&ctx).await.expect("list bin");
    assert_eq!(bin.len(), 1);
    assert_eq!(bin[0].id, project.id);
    assert!(app.engine.bin.expires_at(&bin[0]).is_some());

    let err = app.engine.nodes.get_live(&ctx, main.id).await.expect_err("binned");
    assert_eq!(err.kind, ErrorKind::NotFound);

    let restored = app
        .engine
        .bin
        .restore(&later(&ctx).await, project.id)
        .await
        .expect("restore");
    assert_eq!(restored.restored, 3);
    assert!(!restored.reattached);
    app.engine.nodes.get_live(&ctx, main.id).await.expect("live again");
    assert!(app.engine.bin.list_bin(&ctx).await.expect("list").is_empty());
}

#[tokio::test]
async fn test_restore_keeps_separately_binned_children_in_bin() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let album = app.folder(&ctx, None, "album").await;
    let keep = app.file(&ctx, Some(album.id), "keep.jpg", b"keep").await;
    let drop = app.file(&ctx, Some(album.id), "drop.jpg", b"drop").await;

    app.engine.bin.bin(&ctx, drop.id).await.expect("bin child");
    app.engine
        .bin
        .bin(&later(&ctx).await, album.id)
        .await
        .expect("bin parent");

    let bin = app.engine.bin.list_bin(&ctx).await.expect("list bin");
    assert_eq!(bin.len(), 1, "child sits under a binned parent");

    let restored = app
        .engine
        .bin
        .restore(&later(&ctx).await, album.id)
        .await
        .expect("restore");
    assert_eq!(restored.restored, 2);

    app.engine.nodes.get_live(&ctx, keep.id).await.expect("keep restored");
    let still = app.engine.nodes.get(&ctx, drop.id).await.expect("drop");
    assert!(still.is_binned);

    let bin = app.engine.bin.list_bin(&ctx).await.expect("list bin");
    assert_eq!(bin.len(), 1);
    assert_eq!(bin[0].id, drop.id);
}

#[tokio::test]
async fn test_restore_reattaches_when_parent_is_binned() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let parent = app.folder(&ctx, None, "parent").await;
    let child = app.file(&ctx, Some(parent.id), "child.txt", b"child").await;

    app.engine.bin.bin(&ctx, child.id).await.expect("bin child");
    app.engine
        .bin
        .bin(&later(&ctx).await, parent.id)
        .await
        .expect("bin parent");

    let restored = app
        .engine
        .bin
        .restore(&later(&ctx).await, child.id)
        .await
        .expect("restore child");
    assert!(restored.reattached);
    assert_eq!(restored.node.parent_id, None);
    assert!(!restored.node.is_binned);
}

#[tokio::test]
async fn test_restore_conflict_restores_nothing() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let first = app.file(&ctx, None, "notes.md", b"v1").await;
    app.engine.bin.bin(&ctx, first.id).await.expect("bin");
    app.file(&ctx, None, "NOTES.md", b"v2").await;

    let err = app
        .engine
        .bin
        .restore(&later(&ctx).await, first.id)
        .await
        .expect_err("name taken");
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(app.engine.nodes.get(&ctx, first.id).await.expect("get").is_binned);
}

#[tokio::test]
async fn test_purge_expired_releases_content() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let old = app.folder(&ctx, None, "old").await;
    let file = app.file(&ctx, Some(old.id), "big.bin", b"soon gone").await;
    let locator = file.file().expect("file content").blob_locator.clone();
    app.engine.bin.bin(&ctx, old.id).await.expect("bin");

    let early = app
        .engine
        .bin
        .purge_expired(Utc::now())
        .await
        .expect("purge now");
    assert_eq!(early.roots, 0);
    assert!(app.blobs.contains(&locator));

    let retention = chrono::Duration::days(i64::from(app.config.bin.retention_days));
    let report = app
        .engine
        .bin
        .purge_expired(Utc::now() + retention + chrono::Duration::minutes(1))
        .await
        .expect("purge later");
    assert_eq!(report.roots, 1);
    assert_eq!(report.deleted.nodes_deleted, 2);
    assert_eq!(report.deleted.blobs_released, 1);
    assert!(!app.blobs.contains(&locator));
    assert!(app.engine.bin.list_bin(&ctx).await.expect("list").is_empty());
}

#[tokio::test]
async fn test_empty_bin_only_touches_binned_nodes() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let keep = app.file(&ctx, None, "keep.txt", b"shared bytes").await;
    let gone = app.file(&ctx, None, "gone.txt", b"shared bytes").await;
    app.engine.bin.bin(&ctx, gone.id).await.expect("bin");

    let report = app.engine.bin.empty_bin(&ctx).await.expect("empty");
    assert_eq!(report.nodes_deleted, 1);
    assert_eq!(report.blobs_released, 0, "content still referenced");

    let live = app.engine.nodes.get_live(&ctx, keep.id).await.expect("keep");
    let locator = &live.file().expect("file content").blob_locator;
    assert!(app.blobs.contains(locator));
}
