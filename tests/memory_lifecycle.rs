//! Update, batch fetch, stats, and backfill — the maintenance surface of
//! `MemoryStore` beyond `remember`/`recall`/`forget`.

mod common;

use memory_palace::memory::MemoryStore;
use memory_palace::storage::memories::MemoryPatch;
use memory_palace::RememberInput;

#[tokio::test]
async fn update_memory_overwrites_only_the_patched_fields() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let result = store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "original content".to_string(),
            subject: Some("original subject".to_string()),
            importance: Some(4),
            ..Default::default()
        })
        .await
        .unwrap();

    store
        .update_memory(
            result.id,
            MemoryPatch {
                subject: Some("new subject".to_string()),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();

    let updated = store.get_memory_by_id(result.id).await.unwrap().unwrap();
    assert_eq!(updated.subject.as_deref(), Some("new subject"));
    assert_eq!(updated.content, "original content");
    assert_eq!(updated.importance, 4);
}

#[tokio::test]
async fn update_memory_clamps_importance_on_patch() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let result = store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "x".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    store
        .update_memory(
            result.id,
            MemoryPatch {
                importance: Some(0),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();

    let updated = store.get_memory_by_id(result.id).await.unwrap().unwrap();
    assert_eq!(updated.importance, 1);
}

#[tokio::test]
async fn get_memories_by_ids_reports_not_found_for_missing_ids() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let result = store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "only one".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let out = store
        .get_memories_by_ids(&[result.id, 99999], false)
        .await
        .unwrap();
    assert_eq!(out["count"], 1);
    assert_eq!(out["not_found"][0], 99999);
}

#[tokio::test]
async fn backfill_embeddings_reports_success_when_nothing_is_missing() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    let out = store.backfill_embeddings().await.unwrap();
    assert_eq!(out["total"], 0);
    assert_eq!(out["message"], "All memories already have embeddings");
}

#[tokio::test]
async fn backfill_embeddings_counts_failures_when_no_model_is_reachable() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "needs an embedding".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let out = store.backfill_embeddings().await.unwrap();
    assert_eq!(out["total"], 1);
    assert_eq!(out["generated"], 0);
    assert_eq!(out["failed"], 1);
}

#[tokio::test]
async fn memory_stats_aggregates_active_memories_only() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();
    let config = common::test_config();
    let store = MemoryStore::new(&storage, &model_client, &config);

    store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "fact".to_string(),
            content: "a fact".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let preference = store
        .remember(RememberInput {
            instance_id: "default".to_string(),
            memory_type: "preference".to_string(),
            content: "a preference".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.forget(preference.id, None).await.unwrap();

    let stats = store.get_memory_stats().await.unwrap();
    assert_eq!(stats.total_memories, 1);
    assert_eq!(stats.by_type.get("fact").copied(), Some(1));
    assert!(!stats.by_type.contains_key("preference"));
    assert_eq!(stats.average_importance, 5.0);
}
