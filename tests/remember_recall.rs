//! `remember`/`recall` end-to-end scenarios (no reachable model server, so
//! every path exercises the keyword-fallback / no-LLM branches).

mod common;

use memory_palace::memory::MemoryStore;
use memory_palace::{PalaceError, RecallInput, RememberInput};

#[tokio::test]
async fn remember_then_recall_returns_the_stored_memory() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let input = RememberInput {
        instance_id: "default".to_string(),
        memory_type: "fact".to_string(),
        content: "The deploy pipeline runs on Friday afternoons.".to_string(),
        subject: Some("deploy cadence".to_string()),
        ..Default::default()
    };
    let result = store.remember(input).await.expect("remember succeeds");
    assert!(!result.embedded, "no model server is reachable in this test");
    assert!(result.links_created.is_empty());

    let out = store
        .recall(RecallInput {
            query: "deploy cadence".to_string(),
            synthesize: false,
            ..Default::default()
        })
        .await
        .expect("recall succeeds");
    assert_eq!(out["count"], 1);
    assert_eq!(out["search_method"], "keyword (fallback)");
    assert_eq!(out["memories"][0]["id"], result.id);
}

#[tokio::test]
async fn remember_rejects_invalid_source_type() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let input = RememberInput {
        instance_id: "default".to_string(),
        memory_type: "fact".to_string(),
        content: "irrelevant".to_string(),
        source_type: Some("made_up".to_string()),
        ..Default::default()
    };
    let err = store.remember(input).await.unwrap_err();
    assert!(matches!(err, PalaceError::Validation(_)));
}

#[tokio::test]
async fn remember_clamps_importance_to_the_1_to_10_range() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let input = RememberInput {
        instance_id: "default".to_string(),
        memory_type: "fact".to_string(),
        content: "way too important".to_string(),
        importance: Some(99),
        ..Default::default()
    };
    let result = store.remember(input).await.unwrap();
    let stored = store.get_memory_by_id(result.id).await.unwrap().unwrap();
    assert_eq!(stored.importance, 10);
}

#[tokio::test]
async fn remember_defaults_project_to_life() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let result = store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "unscoped memory".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let stored = store.get_memory_by_id(result.id).await.unwrap().unwrap();
    assert_eq!(stored.project, "life");
}

#[tokio::test]
async fn recall_with_no_matches_falls_back_to_no_memories_found() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let out = store
        .recall(RecallInput {
            query: "nothing stored yet".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(out["count"], 0);
    assert_eq!(out["summary"], "No memories found");
}

#[tokio::test]
async fn recall_honors_the_subject_filter() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "editor preference noted".to_string(),
            subject: Some("editor".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "editor preference noted twice".to_string(),
            subject: Some("shell".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let out = store
        .recall(RecallInput {
            query: "preference".to_string(),
            subject: Some("editor".to_string()),
            synthesize: false,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(out["count"], 1);
    assert_eq!(out["memories"][0]["subject"], "editor");
}

#[tokio::test]
async fn forget_unknown_id_returns_not_found() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let err = store.forget(12345, None).await.unwrap_err();
    assert!(matches!(err, PalaceError::NotFound(12345)));
}

#[tokio::test]
async fn forget_archives_and_is_idempotent() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let result = store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "temporary note".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    store.forget(result.id, Some("no longer relevant")).await.unwrap();
    let archived = store.get_memory_by_id(result.id).await.unwrap().unwrap();
    assert!(archived.is_archived);
    assert!(archived
        .source_context
        .unwrap()
        .contains("[ARCHIVED: no longer relevant]"));

    // Idempotent: forgetting an already-archived memory succeeds silently.
    store.forget(result.id, None).await.unwrap();
}
