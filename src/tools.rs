//! Thin tool surface: one function per operation named in this system's
//! external interface, doing argument-shape validation and dispatch only.
//! No business logic lives here — it belongs to `memory`, `graph`,
//! `reflection`, and `handoff`. There is no wire protocol: this module is
//! the seam where a wire adapter (MCP, HTTP, CLI) would plug in.

use serde::Serialize;
use serde_json::Value;

use crate::error::{PalaceError, Result};
use crate::graph;
use crate::handoff;
use crate::memory::MemoryStore;
use crate::reflection;
use crate::storage::memories::MemoryPatch;
use crate::types::{RecallInput, RememberInput};
use crate::Palace;

/// Uniform outcome shape for the tool surface: either a success payload
/// (already-serialized `Value`) or an error string, mirroring the
/// `{..}` / `{"error": "..."}` convention of the original tool wrappers.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolResult {
    Ok(Value),
    Err { error: String },
}

impl From<Result<Value>> for ToolResult {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(v) => ToolResult::Ok(v),
            Err(e) => ToolResult::Err { error: e.to_string() },
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(PalaceError::from)
}

pub async fn memory_remember(palace: &Palace, input: RememberInput) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    let result = store.remember(input).await.and_then(|r| to_value(&r));
    result.into()
}

pub async fn memory_recall(palace: &Palace, input: RecallInput) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    store.recall(input).await.into()
}

pub async fn memory_forget(palace: &Palace, memory_id: i64, reason: Option<&str>) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    let result = store
        .forget(memory_id, reason)
        .await
        .map(|_| serde_json::json!({ "success": true }));
    result.into()
}

pub async fn memory_get(palace: &Palace, id: i64) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    let result = store.get_memory_by_id(id).await.and_then(|m| match m {
        Some(memory) => Ok(memory.to_value("verbose")),
        None => Err(PalaceError::NotFound(id)),
    });
    result.into()
}

pub async fn memory_get_many(palace: &Palace, ids: &[i64], synthesize: bool) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    store.get_memories_by_ids(ids, synthesize).await.into()
}

pub async fn memory_update(
    palace: &Palace,
    id: i64,
    patch: MemoryPatch,
    regenerate_embedding: bool,
) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    let result = store
        .update_memory(id, patch, regenerate_embedding)
        .await
        .map(|_| serde_json::json!({ "success": true }));
    result.into()
}

pub async fn memory_backfill_embeddings(palace: &Palace) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    store.backfill_embeddings().await.into()
}

pub async fn memory_stats(palace: &Palace) -> ToolResult {
    let store = MemoryStore::new(&palace.storage, &palace.model_client, &palace.config);
    let result = store.get_memory_stats().await.and_then(|s| to_value(&s));
    result.into()
}

pub async fn memory_link(
    palace: &Palace,
    source_id: i64,
    target_id: i64,
    relation_type: &str,
    strength: f32,
    bidirectional: bool,
    metadata: Option<Value>,
    created_by: Option<&str>,
) -> ToolResult {
    let result = graph::link_memories(
        &palace.storage,
        source_id,
        target_id,
        relation_type,
        strength,
        Some(bidirectional),
        metadata.unwrap_or(Value::Null),
        created_by,
    )
    .await
    .map(|id| serde_json::json!({ "id": id }));
    result.into()
}

pub async fn memory_supersede(
    palace: &Palace,
    new_memory_id: i64,
    old_memory_id: i64,
    archive_old: bool,
    created_by: Option<&str>,
) -> ToolResult {
    let result = graph::supersede_memory(&palace.storage, new_memory_id, old_memory_id, archive_old, created_by)
        .await
        .map(|_| serde_json::json!({ "success": true, "archived_old": archive_old }));
    result.into()
}

pub async fn memory_reflect(
    palace: &Palace,
    transcript_path: &str,
    instance_id: &str,
    session_id: Option<&str>,
    dry_run: bool,
) -> ToolResult {
    let result = reflection::reflect(
        &palace.storage,
        &palace.model_client,
        transcript_path,
        instance_id,
        session_id,
        dry_run,
    )
    .await
    .and_then(|r| to_value(&r));
    result.into()
}

pub async fn memory_send_handoff(
    palace: &Palace,
    from_instance: &str,
    to_instance: &str,
    message_type: &str,
    content: &str,
    subject: Option<&str>,
) -> ToolResult {
    let result = handoff::send_handoff(
        &palace.storage,
        &palace.config,
        from_instance,
        to_instance,
        message_type,
        content,
        subject,
    )
    .await
    .map(|id| serde_json::json!({ "success": true, "id": id }));
    result.into()
}

pub async fn memory_get_handoffs(
    palace: &Palace,
    for_instance: &str,
    unread_only: bool,
    message_type: Option<&str>,
    limit: i64,
) -> ToolResult {
    let result = handoff::get_handoffs(&palace.storage, &palace.config, for_instance, unread_only, message_type, limit)
        .await
        .map(|messages| serde_json::json!({ "count": messages.len(), "messages": messages }));
    result.into()
}

pub async fn memory_mark_handoff_read(palace: &Palace, message_id: i64, read_by: &str) -> ToolResult {
    let result = handoff::mark_handoff_read(&palace.storage, &palace.config, message_id, read_by)
        .await
        .map(|_| serde_json::json!({ "message": "Marked read" }));
    result.into()
}
