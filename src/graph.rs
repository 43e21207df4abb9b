//! Graph layer: explicit linking, supersession, and the automatic linking
//! policy run after a new memory embeds successfully.
//!
//! Unlike the rest of the memory store, auto-linking has no direct
//! `original_source` analog to port from — it is built from the policy
//! description in this system's own design notes, wired atop the graph's
//! storage primitives and the batched classifier.

use std::collections::HashMap;

use tracing::info;

use crate::config::AutoLinkConfig;
use crate::error::{PalaceError, Result};
use crate::modelclient::{classify_edges_batch, ModelClient};
use crate::similarity::cosine_similarity;
use crate::storage::edges;
use crate::storage::memories::{self, MemoryFilter};
use crate::storage::Storage;
use crate::types::{LinkCreated, Memory, SuggestedLink, SYMMETRIC_RELATION_TYPES};

/// Explicitly link two memories. Rejects an edge that already exists with
/// the same `(source, target, relation_type)` triple as a conflict rather
/// than silently no-opping, so a caller retrying a failed request can tell
/// the difference between "already linked" and "just linked".
pub async fn link_memories(
    storage: &Storage,
    source_id: i64,
    target_id: i64,
    relation_type: &str,
    strength: f32,
    bidirectional: Option<bool>,
    metadata: serde_json::Value,
    created_by: Option<&str>,
) -> Result<i64> {
    if memories::get_by_id(storage, source_id).await?.is_none() {
        return Err(PalaceError::NotFound(source_id));
    }
    if memories::get_by_id(storage, target_id).await?.is_none() {
        return Err(PalaceError::NotFound(target_id));
    }

    let bidirectional = bidirectional.unwrap_or(false);
    let strength = strength.clamp(0.0, 1.0);

    edges::insert(
        storage,
        source_id,
        target_id,
        relation_type,
        strength,
        bidirectional,
        &metadata,
        created_by,
    )
    .await
}

/// Mark `old_id` as superseded by `new_id`: creates a `supersedes` edge from
/// the new memory to the old one and, when `archive_old` is set, archives
/// the old memory with a `[SUPERSEDED by #N]` marker. This is the only
/// legitimate producer of `supersedes` edges in the system — the classifier
/// must never emit one (see `modelclient::classify::normalize_edge_type`).
pub async fn supersede_memory(
    storage: &Storage,
    new_id: i64,
    old_id: i64,
    archive_old: bool,
    created_by: Option<&str>,
) -> Result<()> {
    if old_id == new_id {
        return Err(PalaceError::Validation(
            "a memory cannot supersede itself".to_string(),
        ));
    }
    let Some(old_memory) = memories::get_by_id(storage, old_id).await? else {
        return Err(PalaceError::NotFound(old_id));
    };

    // The edge insert and the archive-with-marker must land together: a
    // process dying between them would otherwise leave a `supersedes` edge
    // pointing at an old memory that was never archived.
    let existing_source_context = old_memory.source_context;
    let created_by = created_by.map(str::to_string);

    storage
        .transaction(move |tx| async move {
            let (result, tx) = edges::insert_tx(
                tx,
                new_id,
                old_id,
                "supersedes",
                1.0,
                false,
                &serde_json::Value::Null,
                created_by.as_deref(),
            )
            .await;
            if let Err(e) = result {
                return (Err(e), tx);
            }
            if archive_old {
                let (result, tx) = memories::append_superseded_marker_tx(
                    tx,
                    old_id,
                    new_id,
                    existing_source_context.as_deref(),
                )
                .await;
                return (result, tx);
            }
            (Ok(()), tx)
        })
        .await
}

pub struct AutoLinkOutcome {
    pub links_created: Vec<LinkCreated>,
    pub suggested_links: Vec<SuggestedLink>,
}

/// Run the automatic linking policy for a freshly-embedded memory:
///
/// 1. Gather active candidate memories (same project only, when configured),
///    excluding the memory itself.
/// 2. Score each candidate against the new memory's embedding by cosine
///    similarity; candidates without an embedding are skipped.
/// 3. Candidates at or above `similarity_threshold`, up to `max_links`, are
///    linked — their relation type comes from the batched classifier when
///    `classify_edges` is enabled, else defaults to `relates_to`.
/// 4. Candidates between `suggest_threshold` and `similarity_threshold`, up
///    to `max_suggestions`, are returned as suggestions rather than linked.
/// 5. Symmetric relation types (`relates_to`, `contradicts`) are created as
///    bidirectional edges; others are directional, new -> existing.
/// 6. A duplicate `(source, target, relation_type)` triple is skipped rather
///    than treated as an error — auto-linking is best-effort.
pub async fn auto_link(
    storage: &Storage,
    model_client: &ModelClient,
    config: &AutoLinkConfig,
    memory: &Memory,
) -> Result<AutoLinkOutcome> {
    let Some(embedding) = &memory.embedding else {
        return Ok(AutoLinkOutcome {
            links_created: vec![],
            suggested_links: vec![],
        });
    };

    let filter = MemoryFilter {
        instance_id: None,
        project: if config.same_project_only {
            Some(memory.project.clone())
        } else {
            None
        },
        memory_type: None,
        subject: None,
        min_importance: None,
        include_archived: false,
        exclude_id: Some(memory.id),
    };
    let candidates = memories::fetch_filtered(storage, &filter).await?;

    let mut scored: Vec<(f32, &Memory)> = candidates
        .iter()
        .filter_map(|c| {
            c.embedding
                .as_ref()
                .map(|v| (cosine_similarity(embedding, v), c))
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

    let to_link: Vec<(f32, &Memory)> = scored
        .iter()
        .filter(|(sim, _)| *sim >= config.similarity_threshold)
        .take(config.max_links)
        .cloned()
        .collect();
    let to_suggest: Vec<(f32, &Memory)> = scored
        .iter()
        .filter(|(sim, _)| *sim >= config.suggest_threshold && *sim < config.similarity_threshold)
        .take(config.max_suggestions)
        .cloned()
        .collect();

    let relation_types: HashMap<i64, String> = if config.classify_edges && !to_link.is_empty() {
        let pairs: Vec<(i64, String)> = to_link
            .iter()
            .map(|(_, m)| (m.id, m.subject.clone().unwrap_or_else(|| m.content.clone())))
            .collect();
        let subject = memory.subject.clone().unwrap_or_else(|| memory.content.clone());
        classify_edges_batch(model_client, &subject, &pairs).await?
    } else {
        to_link.iter().map(|(_, m)| (m.id, "relates_to".to_string())).collect()
    };

    // Stage every candidate edge first — relation type resolved, duplicates
    // against the existing graph filtered out — then commit them together in
    // one transaction, so a failure partway through never leaves this memory
    // half-linked.
    let mut staged: Vec<(f32, &Memory, String, bool)> = vec![];
    for (similarity, candidate) in &to_link {
        let relation_type = relation_types
            .get(&candidate.id)
            .cloned()
            .unwrap_or_else(|| "relates_to".to_string());
        if edges::exists(storage, memory.id, candidate.id, &relation_type).await? {
            continue;
        }
        let bidirectional = SYMMETRIC_RELATION_TYPES.contains(&relation_type.as_str());
        staged.push((*similarity, candidate, relation_type, bidirectional));
    }

    let links_created = if staged.is_empty() {
        vec![]
    } else {
        let memory_id = memory.id;
        let classify_edges = config.classify_edges;
        storage
            .transaction(move |tx| async move {
                let mut tx = tx;
                let mut created = vec![];
                for (similarity, candidate, relation_type, bidirectional) in &staged {
                    let metadata = serde_json::json!({
                        "auto_linked": true,
                        "method": "embedding_similarity",
                        "classified": classify_edges,
                    });
                    let (result, next_tx) = edges::insert_tx(
                        tx,
                        memory_id,
                        candidate.id,
                        relation_type,
                        *similarity,
                        *bidirectional,
                        &metadata,
                        None,
                    )
                    .await;
                    tx = next_tx;
                    if let Err(e) = result {
                        return (Err(e), tx);
                    }
                    info!(
                        source = memory_id,
                        target = candidate.id,
                        relation_type = %relation_type,
                        similarity,
                        "auto-linked"
                    );
                    created.push(LinkCreated {
                        target_id: candidate.id,
                        target_subject: candidate.subject.clone(),
                        relation_type: relation_type.clone(),
                        similarity: *similarity,
                        classified: classify_edges,
                    });
                }
                (Ok(created), tx)
            })
            .await?
    };

    let suggested_links = to_suggest
        .iter()
        .map(|(similarity, candidate)| SuggestedLink {
            target_id: candidate.id,
            target_subject: candidate.subject.clone(),
            similarity: *similarity,
        })
        .collect();

    Ok(AutoLinkOutcome {
        links_created,
        suggested_links,
    })
}
