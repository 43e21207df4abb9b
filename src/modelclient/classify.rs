//! Edge-type classification: single-pair and batched, both built on one
//! normalization pipeline that the human-gated supersession invariant runs
//! through on every exit path.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use super::ModelClient;
use crate::error::Result;
use crate::types::CANONICAL_RELATION_TYPES;

const CLASSIFICATION_PROMPT: &str = r#"You are classifying the relationship between two memories in a knowledge graph. Return ONLY one word from the list below.

IMPORTANT: You must NEVER return "supersedes". Only a human can decide that one memory supersedes another. If two memories conflict, return "contradicts" — the user will decide how to resolve it.

Relationship types:
- relates_to: General topical similarity, no direct logical dependency between the two
- derived_from: Memory B was built from, implements, or extends Memory A
- contradicts: Memory A and Memory B make conflicting or incompatible claims about the same thing. This includes cases where Memory B appears to update, replace, or override Memory A — always use contradicts, never supersedes.
- exemplifies: Memory B describes a specific real-world event or instance that illustrates the abstract concept in Memory A. Memory A is a rule; Memory B is a case where the rule applied.
- refines: Memory B is an updated, more precise version of the SAME statement in Memory A. Both say the same thing, but B adds exact numbers, names, or details that A left vague.

Memory A: "{subject_a}"

Memory B: "{subject_b}"

Relationship type:"#;

fn alias_map() -> &'static HashMap<&'static str, &'static str> {
    use std::sync::OnceLock;
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            ("relates", "relates_to"),
            ("relates_to", "relates_to"),
            ("supersedes", "supersedes"),
            ("supersede", "supersedes"),
            ("derived_from", "derived_from"),
            ("derives_from", "derived_from"),
            ("derives", "derived_from"),
            ("derived", "derived_from"),
            ("contradicts", "contradicts"),
            ("contradict", "contradicts"),
            ("contradiction", "contradicts"),
            ("exemplifies", "exemplifies"),
            ("exemplify", "exemplifies"),
            ("example", "exemplifies"),
            ("refines", "refines"),
            ("refine", "refines"),
            ("refined", "refines"),
        ])
    })
}

/// Normalize raw model output to a canonical edge type. Unrecognizable
/// output defaults to `relates_to`; any resolution to `supersedes` is
/// redirected to `contradicts` — the classifier must never emit it.
pub fn normalize_edge_type(raw: &str) -> String {
    let cleaned = raw
        .trim()
        .to_lowercase()
        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
        .to_string();
    let first_word = cleaned.split_whitespace().next().unwrap_or("");

    let resolved = if let Some(mapped) = alias_map().get(first_word) {
        mapped.to_string()
    } else if CANONICAL_RELATION_TYPES.contains(&first_word) {
        first_word.to_string()
    } else {
        CANONICAL_RELATION_TYPES
            .iter()
            .find(|valid| first_word.len() >= 4 && valid.starts_with(first_word))
            .map(|s| s.to_string())
            .unwrap_or_else(|| "relates_to".to_string())
    };

    if resolved == "supersedes" {
        "contradicts".to_string()
    } else {
        resolved
    }
}

impl ModelClient {
    /// Classify the relationship from `subject_a` to `subject_b`. Falls back
    /// to `relates_to` whenever no classification-tier model is available or
    /// the request fails — classification unavailability is never fatal.
    pub async fn classify_edge(&self, subject_a: &str, subject_b: &str) -> Result<String> {
        let Some(model) = self.classification_model().await else {
            return Ok("relates_to".to_string());
        };

        let prompt = CLASSIFICATION_PROMPT
            .replace("{subject_a}", subject_a)
            .replace("{subject_b}", subject_b);

        let sent = self
            .http()
            .post(format!("{}/api/generate", self.base_url()))
            .json(&json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
                "keep_alive": "0",
                "options": {
                    "temperature": 0.1,
                    "num_predict": 2000,
                },
            }))
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        let resp = match sent {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "edge classification request failed");
                return Ok("relates_to".to_string());
            }
        };

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "edge classification response parsing failed");
                return Ok("relates_to".to_string());
            }
        };

        let raw = body
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(normalize_edge_type(raw))
    }
}

/// Classify one new subject against up to `pairs.len()` existing
/// `(id, subject)` pairs in a single generation call. Unparseable or
/// missing lines default to `relates_to` for that id.
pub async fn classify_edges_batch(
    client: &ModelClient,
    new_subject: &str,
    pairs: &[(i64, String)],
) -> Result<HashMap<i64, String>> {
    let mut result: HashMap<i64, String> = pairs
        .iter()
        .map(|(id, _)| (*id, "relates_to".to_string()))
        .collect();

    if pairs.is_empty() {
        return Ok(result);
    }

    let Some(model) = client.classification_model().await else {
        return Ok(result);
    };

    let mut listing = String::new();
    for (id, subject) in pairs {
        listing.push_str(&format!("{id}: \"{subject}\"\n"));
    }

    let prompt = format!(
        "You are classifying relationships in a knowledge graph. The NEW memory's subject is:\n\n\"{new_subject}\"\n\n\
         For each EXISTING memory below, classify its relationship to the NEW memory. Respond with exactly one line per \
         memory in the form `ID|TYPE`, nothing else.\n\n\
         IMPORTANT: Never use \"supersedes\" — only a human can decide that. Use \"contradicts\" for conflicting or \
         superseding claims instead.\n\n\
         Relationship types: relates_to, derived_from, contradicts, exemplifies, refines.\n\n\
         Existing memories:\n{listing}"
    );

    let num_predict = (60 * pairs.len()).max(500);

    let sent = client
        .http()
        .post(format!("{}/api/generate", client.base_url()))
        .json(&json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "keep_alive": "0",
            "options": {
                "temperature": 0.1,
                "num_predict": num_predict,
            },
        }))
        .timeout(Duration::from_secs(60))
        .send()
        .await;

    let resp = match sent {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "batched edge classification request failed");
            return Ok(result);
        }
    };

    let body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "batched edge classification response parsing failed");
            return Ok(result);
        }
    };

    let raw = body.get("response").and_then(|v| v.as_str()).unwrap_or("");
    for line in raw.lines() {
        let mut fields = line.splitn(2, '|');
        let Some(id_field) = fields.next() else {
            continue;
        };
        let Some(type_field) = fields.next() else {
            continue;
        };
        let id_str: String = id_field
            .trim()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let Ok(id) = id_str.parse::<i64>() else {
            continue;
        };
        if result.contains_key(&id) {
            result.insert(id, normalize_edge_type(type_field));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_aliases() {
        assert_eq!(normalize_edge_type("Derives."), "derived_from");
        assert_eq!(normalize_edge_type("EXAMPLE!"), "exemplifies");
    }

    #[test]
    fn redirects_supersedes_to_contradicts() {
        assert_eq!(normalize_edge_type("supersedes"), "contradicts");
        assert_eq!(normalize_edge_type("supersede"), "contradicts");
    }

    #[test]
    fn unrecognizable_output_defaults_to_relates_to() {
        assert_eq!(normalize_edge_type("banana"), "relates_to");
        assert_eq!(normalize_edge_type(""), "relates_to");
    }

    #[test]
    fn fuzzy_prefix_match_requires_minimum_length() {
        assert_eq!(normalize_edge_type("contra"), "contradicts");
        // Too short to safely fuzzy-match against multiple candidates.
        assert_eq!(normalize_edge_type("re"), "relates_to");
    }
}
