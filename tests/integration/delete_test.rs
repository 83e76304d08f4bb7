//! Integration tests for permanent, cascading deletion.

mod helpers;

use std::collections::HashSet;

use drivehub_core::error::ErrorKind;

const FOLDERS: usize = 10;
const FILES_PER_FOLDER: usize = 100;
const DISTINCT_CONTENTS: usize = 200;

#[tokio::test]
async fn test_interrupted_cascade_finishes_on_retry() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let root = app.folder(&ctx, None, "dataset").await;
    for f in 0..FOLDERS {
        let folder = app.folder(&ctx, Some(root.id), &format!("shard-{f:02}")).await;
        for i in 0..FILES_PER_FOLDER {
            let n = f * FILES_PER_FOLDER + i;
            let data = format!("record {}", n % DISTINCT_CONTENTS);
            app.file(&ctx, Some(folder.id), &format!("{i:03}.rec"), data.as_bytes())
                .await;
        }
    }
    let total_nodes = (1 + FOLDERS + FOLDERS * FILES_PER_FOLDER) as u64;
    assert_eq!(app.blobs.len(), DISTINCT_CONTENTS);
    app.blobs.take_deleted();

    app.nodes.fail_deletes_after(400);
    let first = app
        .engine
        .nodes
        .permanent_delete(&ctx, root.id)
        .await
        .expect("partial delete");
    assert_eq!(first.nodes_deleted, 400);
    assert!(!first.is_complete());
    assert_eq!(first.error_kind, Some(ErrorKind::Database));

    // What is left is still a well-formed tree.
    let remaining = app.engine.tree.tree(&ctx, Some(root.id)).await.expect("tree");
    assert_eq!(remaining.total_nodes, total_nodes - 400);

    app.nodes.heal();
    let second = app
        .engine
        .nodes
        .permanent_delete(&ctx, root.id)
        .await
        .expect("finish delete");
    assert!(second.is_complete());
    assert_eq!(first.nodes_deleted + second.nodes_deleted, total_nodes);
    assert_eq!(
        first.blobs_released + second.blobs_released,
        DISTINCT_CONTENTS as u64
    );

    let deleted = app.blobs.take_deleted();
    let unique: HashSet<&String> = deleted.iter().collect();
    assert_eq!(deleted.len(), DISTINCT_CONTENTS);
    assert_eq!(unique.len(), deleted.len(), "no blob deleted twice");
    assert_eq!(app.blobs.len(), 0);

    let third = app
        .engine
        .nodes
        .permanent_delete(&ctx, root.id)
        .await
        .expect("no-op");
    assert_eq!(third.nodes_deleted, 0);
}

#[tokio::test]
async fn test_failure_before_any_delete_is_an_error() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let folder = app.folder(&ctx, None, "keep").await;
    app.file(&ctx, Some(folder.id), "a.txt", b"a").await;

    app.nodes.fail_deletes_after(0);
    let err = app
        .engine
        .nodes
        .permanent_delete(&ctx, folder.id)
        .await
        .expect_err("nothing deleted");
    assert_eq!(err.kind, ErrorKind::Database);
    app.engine.nodes.get(&ctx, folder.id).await.expect("still there");
}

#[tokio::test]
async fn test_offline_blob_store_defers_release() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let file = app.file(&ctx, None, "video.mp4", b"frames").await;
    let locator = file.file().expect("file").blob_locator.clone();

    app.blobs.set_online(false);
    let report = app
        .engine
        .nodes
        .permanent_delete(&ctx, file.id)
        .await
        .expect("delete");
    assert_eq!(report.nodes_deleted, 1);
    assert_eq!(report.blobs_deferred, 1);
    assert!(app.engine.nodes.get(&ctx, file.id).await.is_err());

    app.blobs.set_online(true);
    let reaped = app
        .engine
        .addresser
        .reap_unreferenced(10)
        .await
        .expect("reap");
    assert_eq!(reaped, 1);
    assert!(!app.blobs.contains(&locator));
}

#[tokio::test]
async fn test_foreign_delete_is_unauthorized() {
    let app = helpers::TestApp::new().await;
    let alice = app.owner();
    let mallory = app.owner();
    let secret = app.file(&alice, None, "secret.txt", b"s3cr3t").await;

    let err = app
        .engine
        .nodes
        .permanent_delete(&mallory, secret.id)
        .await
        .expect_err("foreign");
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    app.engine.nodes.get(&alice, secret.id).await.expect("untouched");
}
