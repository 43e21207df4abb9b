//! Turn a list of recalled memories into a single natural-language answer,
//! falling back to a plain bullet list when no LLM is available.

use std::collections::HashMap;

use crate::modelclient::ModelClient;
use crate::types::Memory;

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a memory synthesis assistant. You will be given a \
set of memories retrieved from a personal knowledge base, along with the query that retrieved \
them. Write a thorough, detail-preserving report that directly addresses the query using only \
the information in the memories, organized by topic or chronology. Do not invent details. If the \
retrieved memories only weakly match the query, acknowledge that relevance is weak rather than \
stretching them to fit.";

/// Similarity below which every retrieved memory is considered a weak
/// match, triggering an explicit low-confidence caveat in the prompt.
const LOW_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Ask the LLM to synthesize `memories` into one answer. Returns `None` when
/// no LLM is available or generation fails — callers fall back to
/// `format_as_text` in that case.
pub async fn synthesize(
    client: &ModelClient,
    memories: &[Memory],
    query: Option<&str>,
    similarity_scores: Option<&HashMap<i64, f32>>,
) -> crate::error::Result<Option<String>> {
    if memories.is_empty() {
        return Ok(None);
    }
    if !client.is_llm_available().await {
        return Ok(None);
    }

    let all_low_confidence = similarity_scores
        .map(|scores| {
            memories.iter().all(|m| {
                scores
                    .get(&m.id)
                    .map(|s| *s >= 0.0 && *s < LOW_CONFIDENCE_THRESHOLD)
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    let mut prompt = String::new();
    if let Some(query) = query {
        prompt.push_str(&format!("Query: {query}\n\n"));
    }
    if all_low_confidence {
        prompt.push_str(
            "Note: all retrieved memories are a weak match for this query (similarity below 0.5). \
             Say so explicitly rather than overstating relevance.\n\n",
        );
    }

    let blocks: Vec<String> = memories
        .iter()
        .map(|m| {
            let similarity = similarity_scores
                .and_then(|scores| scores.get(&m.id))
                .copied()
                .unwrap_or(-1.0);
            let subject = m.subject.as_deref().unwrap_or("");
            format!(
                "[{similarity:.2}] [{}] [{}] {subject}\n{}",
                m.memory_type, m.id, m.content
            )
        })
        .collect();
    prompt.push_str(&blocks.join("\n\n---\n\n"));

    Ok(client.generate(&prompt, Some(SYNTHESIS_SYSTEM_PROMPT)).await?)
}

/// Plain bullet list used when synthesis is skipped or unavailable:
/// `- [type] (subject): first 100 chars of content`.
pub fn format_as_text(memories: &[Memory]) -> String {
    if memories.is_empty() {
        return "No memories found".to_string();
    }
    memories
        .iter()
        .map(|m| {
            let subject = m.subject.as_deref().unwrap_or("no subject");
            let preview: String = m.content.chars().take(100).collect();
            format!("- [{}] ({subject}): {preview}", m.memory_type)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(id: i64, subject: &str, content: &str) -> Memory {
        Memory {
            id,
            created_at: Utc::now(),
            updated_at: None,
            instance_id: "test".to_string(),
            project: "life".to_string(),
            memory_type: "fact".to_string(),
            subject: Some(subject.to_string()),
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

    #[test]
    fn format_as_text_lists_each_memory_as_a_bullet() {
        let memories = vec![sample(1, "first", "content one"), sample(2, "second", "content two")];
        let text = format_as_text(&memories);
        assert!(text.contains("- [fact] (first): content one"));
        assert!(text.contains("- [fact] (second): content two"));
    }

    #[test]
    fn format_as_text_reports_empty_result_set() {
        assert_eq!(format_as_text(&[]), "No memories found");
    }

    #[test]
    fn format_as_text_truncates_to_100_chars() {
        let long = "x".repeat(200);
        let memories = vec![sample(1, "s", &long)];
        let text = format_as_text(&memories);
        assert_eq!(text, format!("- [fact] (s): {}", "x".repeat(100)));
    }
}
