//! Shared test harness: an in-memory SQLite-backed storage plus a model
//! client pointed at a port nothing listens on, so every embedding/LLM call
//! fails fast into the "unavailable" path instead of reaching out over the
//! network.

use memory_palace::config::Config;
use memory_palace::modelclient::ModelClient;
use memory_palace::storage::Storage;
use memory_palace::types::Memory;

pub async fn test_storage() -> Storage {
    let storage = Storage::connect_in_memory()
        .await
        .expect("connect in-memory sqlite");
    storage.bootstrap(768).await.expect("bootstrap schema");
    storage
}

pub fn unreachable_model_client() -> ModelClient {
    ModelClient::new("http://127.0.0.1:1", None, None, None)
}

pub fn test_config() -> Config {
    Config::default()
}

pub fn sample_memory(content: &str) -> Memory {
    Memory {
        id: 0,
        created_at: chrono::Utc::now(),
        updated_at: None,
        instance_id: "default".to_string(),
        project: "life".to_string(),
        memory_type: "fact".to_string(),
        subject: None,
        content: content.to_string(),
        keywords: vec![],
        tags: vec![],
        importance: 5,
        source_type: Some("explicit".to_string()),
        source_context: None,
        source_session_id: None,
        embedding: None,
        last_accessed_at: None,
        access_count: 0,
        expires_at: None,
        is_archived: false,
    }
}
