//! Core data model: memories, graph edges, handoff messages, and the
//! request/response shapes exchanged between components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical source-type values validated by `remember`. Custom values are
/// rejected; this set is small and closed, unlike `memory_type`.
pub const VALID_SOURCE_TYPES: &[&str] = &["conversation", "explicit", "inferred", "observation"];

/// Canonical handoff message types.
pub const VALID_MESSAGE_TYPES: &[&str] =
    &["handoff", "status", "question", "fyi", "context"];

/// Canonical relation types a classifier or explicit `link_memories` call
/// may use. Custom relation types are still accepted by the graph layer —
/// this list exists for classification/normalization, not validation.
pub const CANONICAL_RELATION_TYPES: &[&str] = &[
    "relates_to",
    "supersedes",
    "derived_from",
    "contradicts",
    "exemplifies",
    "refines",
];

/// Relation types that are symmetric by convention when auto-linked.
pub const SYMMETRIC_RELATION_TYPES: &[&str] = &["relates_to", "contradicts"];

/// A single persisted memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,

    pub instance_id: String,
    /// Project scope; defaults to `"life"` when unspecified.
    pub project: String,

    pub memory_type: String,
    pub subject: Option<String>,
    pub content: String,

    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    /// Clamped to 1..=10 at write time.
    pub importance: i32,

    pub source_type: Option<String>,
    pub source_context: Option<String>,
    pub source_session_id: Option<String>,

    /// Present only once an embedding has been generated; length always
    /// equals the configured embedding dimension when `Some`.
    pub embedding: Option<Vec<f32>>,

    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
}

impl Memory {
    /// Text used to generate this memory's embedding: `[type] [project:X]
    /// subject content`, project prefix omitted for the default project.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![format!("[{}]", self.memory_type)];
        if self.project != "life" {
            parts.push(format!("[project:{}]", self.project));
        }
        if let Some(subject) = &self.subject {
            if !subject.is_empty() {
                parts.push(subject.clone());
            }
        }
        parts.push(self.content.clone());
        parts.join(" ")
    }

    /// Serialize at the requested detail level. `"summary"` truncates
    /// content to 200 chars; anything else returns the full record.
    pub fn to_value(&self, detail_level: &str) -> serde_json::Value {
        let mut base = serde_json::json!({
            "id": self.id,
            "created_at": self.created_at.to_rfc3339(),
            "instance_id": self.instance_id,
            "project": self.project,
            "memory_type": self.memory_type,
            "subject": self.subject,
            "keywords": self.keywords,
            "tags": self.tags,
            "importance": self.importance,
            "access_count": self.access_count,
            "is_archived": self.is_archived,
        });
        let obj = base.as_object_mut().expect("json object");
        if detail_level == "summary" {
            let preview = if self.content.chars().count() > 200 {
                format!("{}...", self.content.chars().take(200).collect::<String>())
            } else {
                self.content.clone()
            };
            obj.insert("content_preview".into(), preview.into());
        } else {
            obj.insert("content".into(), self.content.clone().into());
            obj.insert("source_type".into(), self.source_type.clone().into());
            obj.insert("source_context".into(), self.source_context.clone().into());
            obj.insert(
                "source_session_id".into(),
                self.source_session_id.clone().into(),
            );
            obj.insert(
                "updated_at".into(),
                self.updated_at.map(|d| d.to_rfc3339()).into(),
            );
            obj.insert(
                "last_accessed_at".into(),
                self.last_accessed_at.map(|d| d.to_rfc3339()).into(),
            );
            obj.insert(
                "expires_at".into(),
                self.expires_at.map(|d| d.to_rfc3339()).into(),
            );
        }
        base
    }
}

/// A directed, optionally-symmetric labeled edge between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEdge {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub source_id: i64,
    pub target_id: i64,
    pub relation_type: String,
    pub strength: f32,
    pub bidirectional: bool,
    pub metadata: serde_json::Value,
    pub created_by: Option<String>,
}

/// A message sent between named instances, or broadcast to `"all"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffMessage {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub from_instance: String,
    pub to_instance: String,
    pub message_type: String,
    pub subject: Option<String>,
    pub content: String,
    pub read_at: Option<DateTime<Utc>>,
    pub read_by: Option<String>,
}

impl HandoffMessage {
    pub fn is_for_instance(&self, instance_id: &str) -> bool {
        self.to_instance == instance_id || self.to_instance == "all"
    }
}

/// Arguments to `memory::remember`.
#[derive(Debug, Clone, Default)]
pub struct RememberInput {
    pub instance_id: String,
    pub memory_type: String,
    pub content: String,
    pub subject: Option<String>,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub importance: Option<i32>,
    pub project: Option<String>,
    pub source_type: Option<String>,
    pub source_context: Option<String>,
    pub source_session_id: Option<String>,
    pub supersedes_id: Option<i64>,
    pub auto_link: Option<bool>,
}

/// Outcome of `memory::remember`.
#[derive(Debug, Clone, Serialize)]
pub struct RememberResult {
    pub id: i64,
    pub subject: Option<String>,
    pub embedded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links_created: Vec<LinkCreated>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_links: Vec<SuggestedLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkCreated {
    pub target_id: i64,
    pub target_subject: Option<String>,
    pub relation_type: String,
    pub similarity: f32,
    pub classified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedLink {
    pub target_id: i64,
    pub target_subject: Option<String>,
    pub similarity: f32,
}

/// Arguments to `memory::recall`.
#[derive(Debug, Clone)]
pub struct RecallInput {
    pub query: String,
    pub instance_id: Option<String>,
    pub project: Option<String>,
    pub memory_type: Option<String>,
    pub subject: Option<String>,
    pub min_importance: Option<i32>,
    pub include_archived: bool,
    pub limit: i64,
    pub detail_level: String,
    pub synthesize: bool,
}

impl Default for RecallInput {
    fn default() -> Self {
        Self {
            query: String::new(),
            instance_id: None,
            project: None,
            memory_type: None,
            subject: None,
            min_importance: None,
            include_archived: false,
            limit: 20,
            detail_level: "verbose".to_string(),
            synthesize: true,
        }
    }
}

/// A scored memory row, used internally during recall before the result is
/// shaped into either a synthesized summary or a plain list.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// `-1.0` sentinel when the memory has no embedding, so it sorts last.
    pub similarity: f32,
}

/// Aggregate counts returned by `memory::get_memory_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_memories: i64,
    pub by_type: HashMap<String, i64>,
    pub by_instance: HashMap<String, i64>,
    pub by_project: HashMap<String, i64>,
    pub average_importance: f64,
    pub most_accessed: Vec<MemorySummary>,
    pub most_recent: Vec<MemorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySummary {
    pub id: i64,
    pub subject: Option<String>,
    pub memory_type: String,
    pub access_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Result of a `reflect` call.
#[derive(Debug, Clone, Serialize)]
pub struct ReflectResult {
    pub success: bool,
    pub dry_run: bool,
    pub extracted: usize,
    pub embedded: usize,
    pub by_type: HashMap<String, usize>,
    pub memory_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_raw_response: Option<String>,
}

/// A candidate memory extracted from a transcript by reflection, before
/// persistence.
#[derive(Debug, Clone)]
pub struct ExtractedMemory {
    pub memory_type: String,
    pub subject: Option<String>,
    pub content: String,
    pub keywords: Vec<String>,
    pub importance: i32,
}
