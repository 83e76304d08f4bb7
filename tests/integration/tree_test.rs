//! Integration tests for path resolution and tree views.

mod helpers;

use drivehub_core::error::ErrorKind;
use drivehub_service::node::ListFilter;
use drivehub_core::types::PageRequest;

#[tokio::test]
async fn test_breadcrumbs_follow_moves() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let docs = app.folder(&ctx, None, "Docs").await;
    let work = app.folder(&ctx, Some(docs.id), "Work").await;
    let archive = app.folder(&ctx, None, "Archive").await;
    let report = app.file(&ctx, Some(work.id), "report.txt", b"q3 numbers").await;

    let trail = app
        .engine
        .tree
        .breadcrumbs(&ctx, report.id, false)
        .await
        .expect("breadcrumbs");
    let names: Vec<&str> = trail.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["Docs", "Work", "report.txt"]);

    app.engine
        .nodes
        .move_node(&ctx, work.id, Some(archive.id))
        .await
        .expect("move");
    let trail = app
        .engine
        .tree
        .breadcrumbs(&ctx, report.id, false)
        .await
        .expect("breadcrumbs after move");
    let names: Vec<&str> = trail.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["Archive", "Work", "report.txt"]);
}

#[tokio::test]
async fn test_move_into_own_subtree_is_rejected() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let a = app.folder(&ctx, None, "a").await;
    let b = app.folder(&ctx, Some(a.id), "b").await;
    let c = app.folder(&ctx, Some(b.id), "c").await;

    let err = app
        .engine
        .nodes
        .move_node(&ctx, a.id, Some(c.id))
        .await
        .expect_err("cycle");
    assert_eq!(err.kind, ErrorKind::InvalidOperation);

    let err = app
        .engine
        .nodes
        .move_node(&ctx, a.id, Some(a.id))
        .await
        .expect_err("self");
    assert_eq!(err.kind, ErrorKind::InvalidOperation);

    let unchanged = app.engine.nodes.get(&ctx, a.id).await.expect("get");
    assert_eq!(unchanged.parent_id, None);
}

#[tokio::test]
async fn test_tree_lists_folders_first_and_hides_binned() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();

    let photos = app.folder(&ctx, None, "photos").await;
    app.file(&ctx, None, "a-notes.txt", b"notes").await;
    app.file(&ctx, Some(photos.id), "beach.jpg", b"jpeg bytes").await;
    let old = app.folder(&ctx, Some(photos.id), "old").await;
    app.file(&ctx, Some(old.id), "2019.jpg", b"older jpeg").await;
    let trash = app.file(&ctx, Some(photos.id), "blurry.jpg", b"blur").await;
    app.engine.bin.bin(&ctx, trash.id).await.expect("bin");

    let tree = app.engine.tree.tree(&ctx, None).await.expect("tree");
    let top: Vec<&str> = tree.roots.iter().map(|t| t.node.name.as_str()).collect();
    assert_eq!(top, ["photos", "a-notes.txt"]);

    let photos_children: Vec<&str> = tree.roots[0]
        .children
        .iter()
        .map(|t| t.node.name.as_str())
        .collect();
    assert_eq!(photos_children, ["old", "beach.jpg"]);
    assert_eq!(tree.total_nodes, 5);

    let sub = app
        .engine
        .tree
        .tree(&ctx, Some(old.id))
        .await
        .expect("subtree");
    assert_eq!(sub.roots.len(), 1);
    assert_eq!(sub.roots[0].children.len(), 1);
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let app = helpers::TestApp::new().await;
    let alice = app.owner();
    let bob = app.owner();

    let private = app.folder(&alice, None, "private").await;
    app.folder(&bob, None, "private").await;

    let err = app
        .engine
        .tree
        .breadcrumbs(&bob, private.id, false)
        .await
        .expect_err("foreign node");
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    let err = app
        .engine
        .nodes
        .create_folder(&bob, Some(private.id), "intrusion")
        .await
        .expect_err("foreign parent");
    assert!(matches!(err.kind, ErrorKind::NotFound | ErrorKind::Unauthorized));

    let page = app
        .engine
        .nodes
        .list_children(&bob, None, ListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].owner, bob.owner);
}
