//! Reflection: read a conversation transcript from disk and ask the LLM to
//! extract candidate memories from it, storing the ones it finds.

use std::collections::HashMap;
use std::io::ErrorKind;

use crate::error::Result;
use crate::modelclient::ModelClient;
use crate::storage::memories;
use crate::storage::Storage;
use crate::types::{ExtractedMemory, Memory, ReflectResult};

const MAX_TRANSCRIPT_CHARS: usize = 65_000;
const MIN_TRANSCRIPT_CHARS: usize = 50;

const REFLECTION_SYSTEM_PROMPT: &str = "You are reviewing a conversation transcript to identify \
durable facts, preferences, decisions, insights, and gotchas worth remembering long-term. Ignore \
small talk, acknowledgements, and anything purely procedural. For each memory worth keeping, \
respond with exactly one line in the form:\n\nM|TYPE|SUBJECT|CONTENT\n\nwhere TYPE is one of: \
fact, preference, event, context, insight, relationship, architecture, gotcha, blocker, solution, \
workaround, design_decision. SUBJECT is a short (few words) label. CONTENT is the full memory \
content, at least a full sentence, may contain any characters including `|`. Emit no other text, \
no numbering, no explanation. If nothing is worth keeping, respond with nothing.";

/// Minimum content length for an extracted line to be kept.
const MIN_CONTENT_CHARS: usize = 10;

/// Memory types whose importance is bumped above the default when extracted
/// via reflection.
const HIGH_IMPORTANCE_TYPES: &[&str] = &["insight", "decision", "architecture", "blocker", "gotcha"];

/// Read `transcript_path`, extract candidate memories via the LLM, and store
/// them (unless `dry_run`). Returns a structured failure rather than an
/// error for expected conditions: missing file, unreadable encoding, a
/// transcript too short to reflect on, or an LLM response with no
/// extractable lines.
pub async fn reflect(
    storage: &Storage,
    model_client: &ModelClient,
    transcript_path: &str,
    instance_id: &str,
    session_id: Option<&str>,
    dry_run: bool,
) -> Result<ReflectResult> {
    let text = match std::fs::read_to_string(transcript_path) {
        Ok(t) => t,
        Err(e) => {
            let message = match e.kind() {
                ErrorKind::NotFound => format!("transcript not found: {transcript_path}"),
                ErrorKind::PermissionDenied => {
                    format!("permission denied reading transcript: {transcript_path}")
                }
                ErrorKind::InvalidData => {
                    format!("transcript is not valid UTF-8: {transcript_path}")
                }
                _ => format!("failed to read transcript {transcript_path}: {e}"),
            };
            return Ok(empty_result(message));
        }
    };

    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TRANSCRIPT_CHARS {
        return Ok(empty_result(format!(
            "transcript too short to reflect on ({} chars, minimum {MIN_TRANSCRIPT_CHARS})",
            trimmed.chars().count()
        )));
    }

    let truncated: String = if trimmed.chars().count() > MAX_TRANSCRIPT_CHARS {
        trimmed.chars().take(MAX_TRANSCRIPT_CHARS).collect()
    } else {
        trimmed.to_string()
    };

    let raw_response = model_client
        .generate(&truncated, Some(REFLECTION_SYSTEM_PROMPT))
        .await?;

    let Some(raw_response) = raw_response else {
        return Ok(ReflectResult {
            success: false,
            dry_run,
            extracted: 0,
            embedded: 0,
            by_type: HashMap::new(),
            memory_ids: vec![],
            error: Some("model server unavailable".to_string()),
            llm_raw_response: None,
        });
    };

    let extracted = parse_extracted(&raw_response);
    if extracted.is_empty() {
        return Ok(ReflectResult {
            success: false,
            dry_run,
            extracted: 0,
            embedded: 0,
            by_type: HashMap::new(),
            memory_ids: vec![],
            error: Some("no extractable memories found in model response".to_string()),
            llm_raw_response: Some(raw_response),
        });
    }

    let mut by_type: HashMap<String, usize> = HashMap::new();
    for e in &extracted {
        *by_type.entry(e.memory_type.clone()).or_insert(0) += 1;
    }

    if dry_run {
        return Ok(ReflectResult {
            success: true,
            dry_run: true,
            extracted: extracted.len(),
            embedded: 0,
            by_type,
            memory_ids: vec![],
            error: None,
            llm_raw_response: None,
        });
    }

    let mut memory_ids = vec![];
    let mut embedded = 0;

    for item in &extracted {
        let memory = Memory {
            id: 0,
            created_at: chrono::Utc::now(),
            updated_at: None,
            instance_id: instance_id.to_string(),
            project: "life".to_string(),
            memory_type: item.memory_type.clone(),
            subject: item.subject.clone(),
            content: item.content.clone(),
            keywords: item.keywords.clone(),
            tags: vec![],
            importance: item.importance,
            source_type: Some("inferred".to_string()),
            source_context: Some("reflection".to_string()),
            source_session_id: session_id.map(str::to_string),
            embedding: None,
            last_accessed_at: None,
            access_count: 0,
            expires_at: None,
            is_archived: false,
        };

        let id = memories::insert(storage, &memory).await?;
        memory_ids.push(id);

        if let Some(vector) = model_client.embed(&memory.embedding_text()).await? {
            memories::set_embedding(storage, id, &vector).await?;
            embedded += 1;
        }
    }

    Ok(ReflectResult {
        success: true,
        dry_run: false,
        extracted: extracted.len(),
        embedded,
        by_type,
        memory_ids,
        error: None,
        llm_raw_response: None,
    })
}

fn empty_result(error: String) -> ReflectResult {
    ReflectResult {
        success: false,
        dry_run: false,
        extracted: 0,
        embedded: 0,
        by_type: HashMap::new(),
        memory_ids: vec![],
        error: Some(error),
        llm_raw_response: None,
    }
}

/// Parse `M|TYPE|SUBJECT|CONTENT` lines, splitting each into at most 4
/// fields so content may itself contain `|`. Lines that don't start with
/// `M|` or don't have all four fields are skipped rather than rejecting the
/// whole response.
fn parse_extracted(raw: &str) -> Vec<ExtractedMemory> {
    let mut out = vec![];
    for line in raw.lines() {
        let line = line.trim();
        if !line.starts_with("M|") {
            continue;
        }
        let fields: Vec<&str> = line.splitn(4, '|').collect();
        if fields.len() != 4 {
            continue;
        }
        let memory_type_raw = fields[1].trim().to_lowercase();
        let memory_type = if memory_type_raw.is_empty() {
            "fact".to_string()
        } else {
            memory_type_raw
        };
        let subject = fields[2].trim();
        let content = fields[3].trim();
        if content.chars().count() < MIN_CONTENT_CHARS {
            continue;
        }

        let keywords = subject
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();

        let importance = if HIGH_IMPORTANCE_TYPES.contains(&memory_type.as_str()) {
            7
        } else {
            5
        };

        out.push(ExtractedMemory {
            memory_type,
            subject: if subject.is_empty() {
                None
            } else {
                Some(subject.to_string())
            },
            content: content.to_string(),
            keywords,
            importance,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let raw = "M|fact|favorite editor|User prefers Helix over VS Code\nM|decision|deploy cadence|Ship every Friday";
        let extracted = parse_extracted(raw);
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted[0].memory_type, "fact");
        assert_eq!(extracted[1].importance, 7);
    }

    #[test]
    fn content_may_contain_pipes() {
        let raw = "M|fact|shell pipeline|ran `ls | grep foo | wc -l` to count matches";
        let extracted = parse_extracted(raw);
        assert_eq!(extracted.len(), 1);
        assert!(extracted[0].content.contains('|'));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let raw = "not a memory line\nM|fact|only two fields";
        assert!(parse_extracted(raw).is_empty());
    }
}
