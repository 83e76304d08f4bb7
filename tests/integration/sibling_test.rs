//! Integration tests for concurrent writes into one sibling scope.

mod helpers;

use drivehub_core::error::ErrorKind;
use drivehub_core::types::PageRequest;
use drivehub_service::node::ListFilter;

const RACERS: usize = 12;

/// `base` with the letters at the set bits of `mask` uppercased.
fn case_variant(base: &str, mask: usize) -> String {
    base.chars()
        .enumerate()
        .map(|(i, c)| {
            if mask & (1 << i) != 0 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_have_one_winner() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let parent = app.folder(&ctx, None, "Shared").await;

    let mut handles = Vec::with_capacity(RACERS);
    for i in 0..RACERS {
        let nodes = app.engine.nodes.clone();
        let ctx = ctx.clone();
        let name = case_variant("budget", i);
        handles.push(tokio::spawn(async move {
            nodes.create_folder(&ctx, Some(parent.id), &name).await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => created += 1,
            Err(e) if e.kind == ErrorKind::Conflict => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, RACERS - 1);

    let children = app
        .engine
        .nodes
        .list_children(&ctx, Some(parent.id), ListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert_eq!(children.total_items, 1);
    assert_eq!(children.items[0].name.to_lowercase(), "budget");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_renames_have_one_winner() {
    let app = helpers::TestApp::new().await;
    let ctx = app.owner();
    let parent = app.folder(&ctx, None, "Drafts").await;

    let mut drafts = Vec::with_capacity(RACERS);
    for i in 0..RACERS {
        drafts.push(app.folder(&ctx, Some(parent.id), &format!("draft-{i}")).await);
    }

    let mut handles = Vec::with_capacity(RACERS);
    for (i, draft) in drafts.iter().enumerate() {
        let nodes = app.engine.nodes.clone();
        let ctx = ctx.clone();
        let id = draft.id;
        let name = case_variant("final", i);
        handles.push(tokio::spawn(async move { nodes.rename(&ctx, id, &name).await }));
    }

    let mut renamed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => renamed += 1,
            Err(e) if e.kind == ErrorKind::Conflict => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(renamed, 1);
    assert_eq!(conflicts, RACERS - 1);

    let children = app
        .engine
        .nodes
        .list_children(&ctx, Some(parent.id), ListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert_eq!(children.total_items, RACERS as u64);
    let finals = children
        .items
        .iter()
        .filter(|n| n.name.eq_ignore_ascii_case("final"))
        .count();
    assert_eq!(finals, 1);
}
