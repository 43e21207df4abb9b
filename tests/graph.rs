//! Explicit linking, supersession, and the auto-link threshold policy,
//! exercised directly against manually-embedded memories so the assertions
//! don't depend on a reachable embedding model.

mod common;

use common::sample_memory;
use memory_palace::config::AutoLinkConfig;
use memory_palace::storage::{edges, memories};
use memory_palace::{graph, PalaceError};

#[tokio::test]
async fn link_memories_rejects_duplicate_edges_as_conflict() {
    let storage = common::test_storage().await;
    let a = memories::insert(&storage, &sample_memory("a")).await.unwrap();
    let b = memories::insert(&storage, &sample_memory("b")).await.unwrap();

    graph::link_memories(
        &storage,
        a,
        b,
        "relates_to",
        0.8,
        None,
        serde_json::Value::Null,
        None,
    )
    .await
    .unwrap();

    let err = graph::link_memories(
        &storage,
        a,
        b,
        "relates_to",
        0.8,
        None,
        serde_json::Value::Null,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PalaceError::Conflict(_)));
}

#[tokio::test]
async fn link_memories_rejects_an_unknown_source() {
    let storage = common::test_storage().await;
    let b = memories::insert(&storage, &sample_memory("b")).await.unwrap();

    let err = graph::link_memories(
        &storage,
        999,
        b,
        "relates_to",
        0.8,
        None,
        serde_json::Value::Null,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PalaceError::NotFound(999)));
}

#[tokio::test]
async fn supersede_memory_archives_the_old_memory_with_a_marker() {
    let storage = common::test_storage().await;
    let old = memories::insert(&storage, &sample_memory("old fact")).await.unwrap();
    let new = memories::insert(&storage, &sample_memory("new fact")).await.unwrap();

    graph::supersede_memory(&storage, new, old, true, Some("default"))
        .await
        .unwrap();

    let archived = memories::get_by_id(&storage, old).await.unwrap().unwrap();
    assert!(archived.is_archived);
    assert!(archived
        .source_context
        .unwrap()
        .contains(&format!("[SUPERSEDED by #{new}]")));

    let created = edges::list_for_source(&storage, new).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].relation_type, "supersedes");
    assert_eq!(created[0].target_id, old);
}

#[tokio::test]
async fn supersede_memory_rejects_self_supersession() {
    let storage = common::test_storage().await;
    let id = memories::insert(&storage, &sample_memory("x")).await.unwrap();

    let err = graph::supersede_memory(&storage, id, id, true, None).await.unwrap_err();
    assert!(matches!(err, PalaceError::Validation(_)));
}

/// Three candidates at cosine similarities of 1.0, ~0.994, and ~0.707
/// against a new memory pointing at [1,0,0]: the first two clear the
/// default 0.75 link threshold, the third lands between suggest (0.50) and
/// link thresholds and should surface only as a suggestion.
#[tokio::test]
async fn auto_link_links_above_threshold_and_suggests_between_thresholds() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let id_a = memories::insert(&storage, &sample_memory("alpha")).await.unwrap();
    let id_b = memories::insert(&storage, &sample_memory("beta")).await.unwrap();
    let id_c = memories::insert(&storage, &sample_memory("gamma")).await.unwrap();
    let id_new = memories::insert(&storage, &sample_memory("new memory")).await.unwrap();

    memories::set_embedding(&storage, id_a, &[1.0, 0.0, 0.0]).await.unwrap();
    memories::set_embedding(&storage, id_b, &[0.9, 0.1, 0.0]).await.unwrap();
    memories::set_embedding(&storage, id_c, &[0.6, 0.6, 0.0]).await.unwrap();
    memories::set_embedding(&storage, id_new, &[1.0, 0.0, 0.0]).await.unwrap();

    let new_memory = memories::get_by_id(&storage, id_new).await.unwrap().unwrap();
    let config = AutoLinkConfig {
        classify_edges: false,
        ..AutoLinkConfig::default()
    };

    let outcome = graph::auto_link(&storage, &model_client, &config, &new_memory)
        .await
        .unwrap();

    let linked_ids: Vec<i64> = outcome.links_created.iter().map(|l| l.target_id).collect();
    assert_eq!(linked_ids.len(), 2);
    assert!(linked_ids.contains(&id_a));
    assert!(linked_ids.contains(&id_b));
    assert!(outcome
        .links_created
        .iter()
        .all(|l| l.relation_type == "relates_to"));

    assert_eq!(outcome.suggested_links.len(), 1);
    assert_eq!(outcome.suggested_links[0].target_id, id_c);

    let created = edges::list_for_source(&storage, id_new).await.unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|e| e.bidirectional), "relates_to is symmetric");
}

#[tokio::test]
async fn auto_link_skips_candidates_without_an_embedding() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let unembedded = memories::insert(&storage, &sample_memory("no vector yet")).await.unwrap();
    let id_new = memories::insert(&storage, &sample_memory("new memory")).await.unwrap();
    memories::set_embedding(&storage, id_new, &[1.0, 0.0, 0.0]).await.unwrap();

    let new_memory = memories::get_by_id(&storage, id_new).await.unwrap().unwrap();
    let config = AutoLinkConfig {
        classify_edges: false,
        ..AutoLinkConfig::default()
    };
    let outcome = graph::auto_link(&storage, &model_client, &config, &new_memory)
        .await
        .unwrap();

    assert!(outcome.links_created.is_empty());
    assert!(outcome.suggested_links.is_empty());
    let _ = unembedded;
}

#[tokio::test]
async fn auto_link_is_a_noop_when_the_new_memory_has_no_embedding() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let new_memory = sample_memory("never embedded");
    let config = AutoLinkConfig::default();
    let outcome = graph::auto_link(&storage, &model_client, &config, &new_memory)
        .await
        .unwrap();

    assert!(outcome.links_created.is_empty());
    assert!(outcome.suggested_links.is_empty());
}
