//! Memory store: the primary write/read surface over memories, combining
//! the storage layer, the model-server client, the graph layer, and
//! synthesis.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PalaceError, Result};
use crate::graph;
use crate::modelclient::ModelClient;
use crate::similarity::cosine_similarity;
use crate::storage::memories::{self, MemoryFilter, MemoryPatch};
use crate::storage::Storage;
use crate::synthesis;
use crate::types::*;

pub struct MemoryStore<'a> {
    pub storage: &'a Storage,
    pub model_client: &'a ModelClient,
    pub config: &'a Config,
}

impl<'a> MemoryStore<'a> {
    pub fn new(storage: &'a Storage, model_client: &'a ModelClient, config: &'a Config) -> Self {
        Self {
            storage,
            model_client,
            config,
        }
    }

    /// Store a new memory. The row commits before embedding is attempted —
    /// `remember` is not a single atomic transaction (spec §5): a concurrent
    /// `recall` may observe the row before its embedding lands.
    pub async fn remember(&self, input: RememberInput) -> Result<RememberResult> {
        let source_type = input
            .source_type
            .clone()
            .unwrap_or_else(|| "explicit".to_string());
        if !VALID_SOURCE_TYPES.contains(&source_type.as_str()) {
            return Err(PalaceError::Validation(format!(
                "invalid source_type {source_type:?}, must be one of {VALID_SOURCE_TYPES:?}"
            )));
        }

        let importance = input.importance.unwrap_or(5).clamp(1, 10);
        let project = input.project.clone().unwrap_or_else(|| "life".to_string());

        let memory = Memory {
            id: 0,
            created_at: chrono::Utc::now(),
            updated_at: None,
            instance_id: input.instance_id.clone(),
            project,
            memory_type: input.memory_type.clone(),
            subject: input.subject.clone(),
            content: input.content.clone(),
            keywords: input.keywords.clone(),
            tags: input.tags.clone(),
            importance,
            source_type: Some(source_type),
            source_context: input.source_context.clone(),
            source_session_id: input.source_session_id.clone(),
            embedding: None,
            last_accessed_at: None,
            access_count: 0,
            expires_at: None,
            is_archived: false,
        };

        let id = memories::insert(self.storage, &memory).await?;
        info!(id, "memory stored");

        let mut stored = memory;
        stored.id = id;

        let embedded = match self.model_client.embed(&stored.embedding_text()).await {
            Ok(Some(vector)) => {
                memories::set_embedding(self.storage, id, &vector).await?;
                stored.embedding = Some(vector);
                true
            }
            Ok(None) => {
                warn!(id, "embedding unavailable, memory stored without vector");
                false
            }
            Err(e) => {
                warn!(id, error = %e, "embedding generation failed");
                false
            }
        };

        let mut links_created = vec![];

        if let Some(old_id) = input.supersedes_id {
            if memories::get_by_id(self.storage, old_id).await?.is_some() {
                graph::supersede_memory(self.storage, id, old_id, true, Some(&input.instance_id))
                    .await?;
                links_created.push(LinkCreated {
                    target_id: old_id,
                    target_subject: None,
                    relation_type: "supersedes".to_string(),
                    similarity: 1.0,
                    classified: false,
                });
            }
        }

        let mut suggested_links = vec![];

        let auto_link_enabled = input.auto_link.unwrap_or(self.config.auto_link.enabled);
        if auto_link_enabled && embedded {
            let outcome = graph::auto_link(
                self.storage,
                self.model_client,
                &self.config.auto_link,
                &stored,
            )
            .await?;
            links_created.extend(outcome.links_created);
            suggested_links.extend(outcome.suggested_links);
        }

        Ok(RememberResult {
            id,
            subject: input.subject,
            embedded,
            links_created,
            suggested_links,
        })
    }

    /// Hybrid search: semantic similarity when the query embeds, keyword
    /// AND-matching otherwise.
    pub async fn recall(&self, input: RecallInput) -> Result<serde_json::Value> {
        let synthesize = input.synthesize && self.config.synthesis.enabled;

        let filter = MemoryFilter {
            instance_id: input.instance_id.clone(),
            project: input.project.clone(),
            memory_type: input.memory_type.clone(),
            subject: input.subject.clone(),
            min_importance: input.min_importance,
            include_archived: input.include_archived,
            exclude_id: None,
        };

        let formatted_query = format!(
            "Instruct: Given a memory search query, retrieve relevant memories.\nQuery: {}",
            input.query
        );
        let query_embedding = self.model_client.embed(&formatted_query).await?;

        let (scored, search_method) = if let Some(query_vec) = query_embedding {
            let all = memories::fetch_filtered(self.storage, &filter).await?;
            let mut scored: Vec<ScoredMemory> = all
                .into_iter()
                .map(|m| {
                    let similarity = match &m.embedding {
                        Some(v) => cosine_similarity(&query_vec, v),
                        None => -1.0,
                    };
                    ScoredMemory {
                        memory: m,
                        similarity,
                    }
                })
                .collect();
            scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
            scored.truncate(input.limit.max(0) as usize);
            (scored, "semantic".to_string())
        } else {
            let matches = keyword_search(self.storage, &filter, &input.query, input.limit).await?;
            let scored = matches
                .into_iter()
                .map(|m| ScoredMemory {
                    memory: m,
                    similarity: -1.0,
                })
                .collect();
            (scored, "keyword (fallback)".to_string())
        };

        let ids: Vec<i64> = scored.iter().map(|s| s.memory.id).collect();
        memories::bump_access(self.storage, &ids).await?;

        if !synthesize {
            let out: Vec<serde_json::Value> = scored
                .iter()
                .map(|s| {
                    let mut v = s.memory.to_value(&input.detail_level);
                    if s.similarity >= 0.0 {
                        if let Some(obj) = v.as_object_mut() {
                            obj.insert(
                                "similarity_score".into(),
                                ((s.similarity * 10000.0).round() / 10000.0).into(),
                            );
                        }
                    }
                    v
                })
                .collect();
            return Ok(serde_json::json!({
                "memories": out,
                "count": out.len(),
                "search_method": search_method,
            }));
        }

        let similarity_scores: HashMap<i64, f32> =
            scored.iter().map(|s| (s.memory.id, s.similarity)).collect();
        let memories_only: Vec<Memory> = scored.into_iter().map(|s| s.memory).collect();

        let synthesis = synthesis::synthesize(
            self.model_client,
            &memories_only,
            Some(&input.query),
            Some(&similarity_scores),
        )
        .await?;

        match synthesis {
            Some(summary) => Ok(serde_json::json!({
                "summary": summary,
                "count": memories_only.len(),
                "search_method": search_method,
                "memory_ids": ids,
            })),
            None => {
                let text_list = synthesis::format_as_text(&memories_only);
                Ok(serde_json::json!({
                    "summary": text_list,
                    "count": memories_only.len(),
                    "search_method": format!("{search_method} (no LLM)"),
                    "memory_ids": ids,
                }))
            }
        }
    }

    /// Archive a memory. Idempotent: archiving an already-archived memory
    /// succeeds silently.
    pub async fn forget(&self, memory_id: i64, reason: Option<&str>) -> Result<()> {
        if memories::get_by_id(self.storage, memory_id).await?.is_none() {
            return Err(PalaceError::NotFound(memory_id));
        }
        memories::archive(self.storage, memory_id, reason).await
    }

    pub async fn get_memory_by_id(&self, id: i64) -> Result<Option<Memory>> {
        let memory = memories::get_by_id(self.storage, id).await?;
        if memory.is_some() {
            memories::bump_access(self.storage, &[id]).await?;
        }
        Ok(memory)
    }

    /// Batch fetch; `not_found` carries the set difference between
    /// requested and found ids.
    pub async fn get_memories_by_ids(
        &self,
        ids: &[i64],
        synthesize: bool,
    ) -> Result<serde_json::Value> {
        let found = memories::get_by_ids(self.storage, ids).await?;
        let found_ids: std::collections::HashSet<i64> = found.iter().map(|m| m.id).collect();
        let not_found: Vec<i64> = ids.iter().filter(|id| !found_ids.contains(id)).copied().collect();

        memories::bump_access(self.storage, &found_ids.iter().copied().collect::<Vec<_>>()).await?;

        // Synthesis is pointless for a single memory; skip it the way the
        // original implementation does.
        if synthesize && found.len() > 1 {
            if let Some(summary) = synthesis::synthesize(self.model_client, &found, None, None).await? {
                let mut out = serde_json::json!({
                    "summary": summary,
                    "count": found.len(),
                    "memory_ids": found.iter().map(|m| m.id).collect::<Vec<_>>(),
                });
                if !not_found.is_empty() {
                    out["not_found"] = serde_json::json!(not_found);
                }
                return Ok(out);
            }
        }

        let mut out = serde_json::json!({
            "memories": found.iter().map(|m| m.to_value("verbose")).collect::<Vec<_>>(),
            "count": found.len(),
        });
        if !not_found.is_empty() {
            out["not_found"] = serde_json::json!(not_found);
        }
        Ok(out)
    }

    pub async fn update_memory(&self, id: i64, patch: MemoryPatch, regenerate_embedding: bool) -> Result<()> {
        if memories::get_by_id(self.storage, id).await?.is_none() {
            return Err(PalaceError::NotFound(id));
        }
        let touches_embedding = patch.touches_embedding_text();
        memories::update(self.storage, id, &patch).await?;

        if regenerate_embedding && touches_embedding {
            if let Some(updated) = memories::get_by_id(self.storage, id).await? {
                if let Some(vector) = self.model_client.embed(&updated.embedding_text()).await? {
                    memories::set_embedding(self.storage, id, &vector).await?;
                }
            }
        }
        Ok(())
    }

    /// Generate embeddings for every memory (including archived) that
    /// lacks one. Returns aggregate counts and up to 20 failing ids.
    pub async fn backfill_embeddings(&self) -> Result<serde_json::Value> {
        let targets = memories::fetch_missing_embeddings(self.storage).await?;
        let total = targets.len();
        if total == 0 {
            return Ok(serde_json::json!({
                "success": true,
                "message": "All memories already have embeddings",
                "total": 0,
                "generated": 0,
                "failed": 0,
            }));
        }

        let mut generated = 0;
        let mut failed_ids = vec![];

        for memory in &targets {
            match self.model_client.embed(&memory.embedding_text()).await {
                Ok(Some(vector)) => {
                    memories::set_embedding(self.storage, memory.id, &vector).await?;
                    generated += 1;
                }
                _ => failed_ids.push(memory.id),
            }
        }

        let failed = failed_ids.len();
        let mut result = serde_json::json!({
            "success": true,
            "message": format!("Backfill complete: {generated}/{total} embeddings generated"),
            "total": total,
            "generated": generated,
            "failed": failed,
        });
        if !failed_ids.is_empty() {
            result["failed_memory_ids"] = serde_json::json!(failed_ids.iter().take(20).collect::<Vec<_>>());
            if failed > 20 {
                result["note"] = serde_json::json!(format!("showing first 20 of {failed} failed ids"));
            }
        }
        Ok(result)
    }

    pub async fn get_memory_stats(&self) -> Result<MemoryStats> {
        let active = memories::fetch_filtered(
            self.storage,
            &MemoryFilter {
                include_archived: false,
                ..Default::default()
            },
        )
        .await?;

        let mut by_type: HashMap<String, i64> = HashMap::new();
        let mut by_instance: HashMap<String, i64> = HashMap::new();
        let mut by_project: HashMap<String, i64> = HashMap::new();
        let mut importance_sum = 0i64;

        for m in &active {
            *by_type.entry(m.memory_type.clone()).or_insert(0) += 1;
            *by_instance.entry(m.instance_id.clone()).or_insert(0) += 1;
            *by_project.entry(m.project.clone()).or_insert(0) += 1;
            importance_sum += m.importance as i64;
        }

        let average_importance = if active.is_empty() {
            0.0
        } else {
            importance_sum as f64 / active.len() as f64
        };

        let mut by_access = active.clone();
        by_access.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        let most_accessed = by_access.iter().take(5).map(to_summary).collect();

        let mut by_created = active.clone();
        by_created.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let most_recent = by_created.iter().take(5).map(to_summary).collect();

        Ok(MemoryStats {
            total_memories: active.len() as i64,
            by_type,
            by_instance,
            by_project,
            average_importance,
            most_accessed,
            most_recent,
        })
    }
}

fn to_summary(m: &Memory) -> MemorySummary {
    MemorySummary {
        id: m.id,
        subject: m.subject.clone(),
        memory_type: m.memory_type.clone(),
        access_count: m.access_count,
        created_at: m.created_at,
    }
}

async fn keyword_search(
    storage: &Storage,
    filter: &MemoryFilter,
    query: &str,
    limit: i64,
) -> Result<Vec<Memory>> {
    let all = memories::fetch_filtered(storage, filter).await?;
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    let mut matched: Vec<Memory> = all
        .into_iter()
        .filter(|m| {
            if words.is_empty() {
                return true;
            }
            let haystacks: Vec<String> = std::iter::once(m.content.to_lowercase())
                .chain(m.subject.as_ref().map(|s| s.to_lowercase()))
                .chain(m.keywords.iter().map(|k| k.to_lowercase()))
                .collect();
            words
                .iter()
                .all(|w| haystacks.iter().any(|h| h.contains(w.as_str())))
        })
        .collect();

    matched.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then(b.access_count.cmp(&a.access_count))
            .then(b.created_at.cmp(&a.created_at))
    });
    matched.truncate(limit.max(0) as usize);
    Ok(matched)
}
