mod common;

use futures::future::join_all;
use promptlab_runtime::{list_nodes, nodes_summary, Prompt, PromptContent, PromptUpdate, RuntimeError};

fn content(text: &str) -> PromptContent {
    serde_json::from_value(serde_json::json!({ "system": text, "user": "{input}" })).unwrap()
}

#[tokio::test]
#[ignore]
async fn versions_increase_per_node() {
    let pool = common::pool().await;
    let node = common::unique("versions");
    let other = common::unique("versions-other");

    for expected in 1..=3 {
        let prompt = Prompt::new_version(&pool, &node, content("v"), None).await.unwrap();
        assert_eq!(prompt.version, expected);
        assert!(!prompt.production);
    }

    let first = Prompt::new_version(&pool, &other, content("v"), Some("first".into())).await.unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(Prompt::count_by_node(&pool, &node).await.unwrap(), 3);

    let listed: Vec<i32> = Prompt::list_by_node(&pool, &node).await.unwrap().iter().map(|p| p.version).collect();
    assert_eq!(listed, vec![3, 2, 1]);
}

#[tokio::test]
#[ignore]
async fn concurrent_creates_get_distinct_versions() {
    let pool = common::pool().await;
    let node = common::unique("concurrent-create");

    let results = join_all((0..8).map(|_| Prompt::new_version(&pool, &node, content("v"), None))).await;
    let mut versions: Vec<i32> = results.into_iter().map(|r| r.unwrap().version).collect();
    versions.sort();
    assert_eq!(versions, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
#[ignore]
async fn blank_system_prompt_is_rejected() {
    let pool = common::pool().await;
    let err = Prompt::new_version(&pool, &common::unique("blank"), content("  "), None).await.unwrap_err();
    assert!(matches!(err, RuntimeError::BadRequest(_)));
}

#[tokio::test]
#[ignore]
async fn promotion_keeps_a_single_production_row() {
    let pool = common::pool().await;
    let node = common::unique("promote");

    let v1 = Prompt::new_version(&pool, &node, content("one"), None).await.unwrap();
    let v2 = Prompt::new_version(&pool, &node, content("two"), None).await.unwrap();

    Prompt::promote(&pool, v1.id).await.unwrap();
    let promoted = Prompt::promote(&pool, v2.id).await.unwrap();
    assert!(promoted.production);

    let production = Prompt::get_production(&pool, &node).await.unwrap();
    assert_eq!(production.id, v2.id);
    assert!(!Prompt::get(&pool, v1.id).await.unwrap().production);

    let demoted = Prompt::demote(&pool, v2.id).await.unwrap();
    assert!(!demoted.production);
    assert!(matches!(Prompt::get_production(&pool, &node).await, Err(RuntimeError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn demote_only_touches_the_production_flag() {
    let pool = common::pool().await;
    let node = common::unique("demote");

    let v1 = Prompt::new_version(&pool, &node, content("one"), Some("initial".into())).await.unwrap();
    Prompt::promote(&pool, v1.id).await.unwrap();

    // an uncommitted edit holds the row while demote runs
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("UPDATE prompts SET message = 'edited' WHERE id = $1")
        .bind(v1.id)
        .execute(&mut *tx)
        .await
        .unwrap();

    let demoting = tokio::spawn({
        let (pool, id) = (pool.clone(), v1.id);
        async move { Prompt::demote(&pool, id).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    tx.commit().await.unwrap();
    assert!(!demoting.await.unwrap().unwrap().production);

    let stored = Prompt::get(&pool, v1.id).await.unwrap();
    assert!(!stored.production);
    assert_eq!(stored.message.as_deref(), Some("edited"));
    assert_eq!(stored.content.system_text(), "one");

    let again = Prompt::demote(&pool, v1.id).await.unwrap();
    assert_eq!(again.message.as_deref(), Some("edited"));
    assert!(!again.production);

    let missing = Prompt::demote(&pool, uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, RuntimeError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn concurrent_promotions_leave_one_production_row() {
    let pool = common::pool().await;
    let node = common::unique("promote-race");

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(Prompt::new_version(&pool, &node, content("v"), None).await.unwrap().id);
    }

    let results = join_all(ids.iter().map(|id| Prompt::promote(&pool, *id))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let production = Prompt::list_by_node(&pool, &node).await.unwrap().into_iter().filter(|p| p.production).count();
    assert_eq!(production, 1);
}

#[tokio::test]
#[ignore]
async fn promoting_a_missing_prompt_is_not_found() {
    let pool = common::pool().await;
    let err = Prompt::promote(&pool, uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn update_through_flag_and_node_move() {
    let pool = common::pool().await;
    let node = common::unique("update");
    let target = common::unique("update-target");

    let v1 = Prompt::new_version(&pool, &node, content("one"), None).await.unwrap();
    Prompt::new_version(&pool, &target, content("t"), None).await.unwrap();

    let flagged = Prompt::patch(&pool, v1.id, PromptUpdate { production: Some(true), ..Default::default() }).await.unwrap();
    assert!(flagged.production);

    let moved = Prompt::patch(&pool, v1.id, PromptUpdate {
        node_name: Some(target.clone()),
        content: Some(content("moved")),
        ..Default::default()
    }).await.unwrap();
    assert_eq!(moved.node_name, target);
    assert_eq!(moved.version, 2);
    assert!(!moved.production);
    assert_eq!(moved.content.system_text(), "moved");

    let by_version = Prompt::patch_by_version(&pool, &target, 2, PromptUpdate {
        message: Some("renamed".into()),
        ..Default::default()
    }).await.unwrap();
    assert_eq!(by_version.message.as_deref(), Some("renamed"));

    let missing = Prompt::patch_by_version(&pool, &target, 99, PromptUpdate {
        message: Some("x".into()),
        ..Default::default()
    }).await.unwrap_err();
    assert!(matches!(missing, RuntimeError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn deletes_and_aggregates() {
    let pool = common::pool().await;
    let node = common::unique("aggregate");

    let v1 = Prompt::new_version(&pool, &node, content("one"), None).await.unwrap();
    let v2 = Prompt::new_version(&pool, &node, content("two"), None).await.unwrap();
    Prompt::new_version(&pool, &node, content("three"), None).await.unwrap();
    Prompt::promote(&pool, v2.id).await.unwrap();

    let counts = list_nodes(&pool).await.unwrap();
    assert_eq!(counts.iter().find(|n| n.node_name == node).unwrap().count, 3);

    let summaries = nodes_summary(&pool).await.unwrap();
    let summary = summaries.iter().find(|n| n.node_name == node).unwrap();
    assert_eq!(summary.total_versions, 3);
    assert_eq!(summary.latest_version, 3);
    assert_eq!(summary.production_version, Some(2));
    assert_eq!(summary.production_prompt_id, Some(v2.id));

    Prompt::remove(&pool, v1.id).await.unwrap();
    assert!(matches!(Prompt::remove(&pool, v1.id).await, Err(RuntimeError::NotFound(_))));
    Prompt::remove_by_version(&pool, &node, 3).await.unwrap();
    assert_eq!(Prompt::remove_node(&pool, &node).await.unwrap(), 1);
    assert_eq!(Prompt::count_by_node(&pool, &node).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn paginated_search_over_node_and_message() {
    let pool = common::pool().await;
    let node = common::unique("paged");

    for i in 0..5 {
        let message = if i % 2 == 0 { Some(format!("tuned_{}%", i)) } else { None };
        Prompt::new_version(&pool, &node, content("v"), message).await.unwrap();
    }

    let page = Prompt::list_paginated(&pool, Some(&node), None, promptlab_runtime::PageRequest::new(Some(2), Some(2)).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.has_next && page.has_prev);

    let matched = Prompt::list_paginated(&pool, Some(&node), Some("TUNED_2%"), Default::default()).await.unwrap();
    assert_eq!(matched.total, 1);
}
