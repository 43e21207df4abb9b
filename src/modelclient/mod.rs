//! Client for the local HTTP model server (Ollama-compatible): embeddings,
//! text generation, and edge-type classification, with per-role model
//! auto-detection and the retry/truncation policy embeddings require.

mod classify;

pub use classify::classify_edges_batch;

use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{
    PREFERRED_CLASSIFICATION_MODELS, PREFERRED_EMBEDDING_MODELS, PREFERRED_LLM_MODELS,
};
use crate::error::Result;

const DEFAULT_MAX_EMBEDDING_CHARS: usize = 6000;
const EMBEDDING_MAX_RETRIES: u32 = 3;
const EMBEDDING_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Embedding,
    Llm,
    Classification,
}

#[derive(Default)]
struct RoleCache {
    embedding: RwLock<Option<String>>,
    llm: RwLock<Option<String>>,
    classification: RwLock<Option<String>>,
}

impl RoleCache {
    fn slot(&self, role: ModelRole) -> &RwLock<Option<String>> {
        match role {
            ModelRole::Embedding => &self.embedding,
            ModelRole::Llm => &self.llm,
            ModelRole::Classification => &self.classification,
        }
    }
}

pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    configured_embedding_model: Option<String>,
    configured_llm_model: Option<String>,
    configured_classification_model: Option<String>,
    cache: RoleCache,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct EmbeddingsResponse {
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateResponse {
    response: Option<String>,
    #[allow(dead_code)]
    thinking: Option<String>,
    error: Option<String>,
}

impl ModelClient {
    pub fn new(
        base_url: impl Into<String>,
        configured_embedding_model: Option<String>,
        configured_llm_model: Option<String>,
        configured_classification_model: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            configured_embedding_model,
            configured_llm_model,
            configured_classification_model,
            cache: RoleCache::default(),
        }
    }

    /// Invalidate all three per-role model caches, forcing re-detection on
    /// next use. The only writer of the caches besides detection itself.
    pub fn clear_model_cache(&self) {
        *self.cache.embedding.write() = None;
        *self.cache.llm.write() = None;
        *self.cache.classification.write() = None;
    }

    async fn list_models(&self) -> Option<Vec<String>> {
        let resp = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .ok()?;
        let body: TagsResponse = resp.json().await.ok()?;
        Some(body.models.into_iter().map(|m| m.name).collect())
    }

    /// Exact match first, then prefix match (model name without a `:tag`
    /// suffix), across `preferred` in order.
    fn select_preferred<'a>(preferred: &[&str], available: &'a [String]) -> Option<&'a str> {
        for candidate in preferred {
            if let Some(found) = available.iter().find(|m| m.as_str() == *candidate) {
                return Some(found.as_str());
            }
            let base = candidate.split(':').next().unwrap_or(candidate);
            if let Some(found) = available.iter().find(|m| m.starts_with(base)) {
                return Some(found.as_str());
            }
        }
        None
    }

    async fn detect(&self, role: ModelRole) -> Option<String> {
        if let Some(cached) = self.cache.slot(role).read().clone() {
            return Some(cached);
        }

        let configured = match role {
            ModelRole::Embedding => self.configured_embedding_model.clone(),
            ModelRole::Llm => self.configured_llm_model.clone(),
            ModelRole::Classification => self.configured_classification_model.clone(),
        };
        if let Some(model) = configured {
            *self.cache.slot(role).write() = Some(model.clone());
            return Some(model);
        }

        let available = self.list_models().await?;

        let detected = match role {
            ModelRole::Embedding => Self::select_preferred(PREFERRED_EMBEDDING_MODELS, &available)
                .map(str::to_string)
                .or_else(|| {
                    available
                        .iter()
                        .find(|m| m.to_lowercase().contains("embed"))
                        .cloned()
                }),
            ModelRole::Llm => Self::select_preferred(PREFERRED_LLM_MODELS, &available)
                .map(str::to_string)
                .or_else(|| {
                    available
                        .iter()
                        .find(|m| !m.to_lowercase().contains("embed"))
                        .cloned()
                }),
            ModelRole::Classification => {
                Self::select_preferred(PREFERRED_CLASSIFICATION_MODELS, &available)
                    .map(str::to_string)
            }
        };

        if let Some(model) = &detected {
            *self.cache.slot(role).write() = Some(model.clone());
        }
        detected
    }

    /// Classification falls back to the main LLM model when no small
    /// classification-tier model is installed.
    async fn detect_classification_or_llm(&self) -> Option<String> {
        if let Some(model) = self.detect(ModelRole::Classification).await {
            return Some(model);
        }
        self.detect(ModelRole::Llm).await
    }

    pub async fn is_ollama_available(&self) -> bool {
        self.list_models().await.is_some()
    }

    pub async fn is_llm_available(&self) -> bool {
        self.detect(ModelRole::Llm).await.is_some()
    }

    fn truncate_for_embedding(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let marker = "\n[TRUNCATED FOR EMBEDDING]";
        let budget = max_chars.saturating_sub(marker.chars().count());
        let truncated: String = text.chars().take(budget).collect();
        info!(
            from = text.chars().count(),
            to = truncated.chars().count() + marker.chars().count(),
            limit = max_chars,
            "truncated embedding text"
        );
        format!("{truncated}{marker}")
    }

    /// Embed `text`, retrying transient failures with exponential backoff.
    /// Returns `None` (not an error) when no embedding model is available or
    /// every attempt failed — embedding failure is never fatal to the caller.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let Some(model) = self.detect(ModelRole::Embedding).await else {
            warn!("no embedding model available");
            return Ok(None);
        };

        let text = Self::truncate_for_embedding(text, DEFAULT_MAX_EMBEDDING_CHARS);
        let mut last_error: Option<String> = None;

        for attempt in 0..EMBEDDING_MAX_RETRIES {
            let timeout = if attempt == 0 {
                Duration::from_secs(30)
            } else {
                Duration::from_secs(60)
            };

            let sent = self
                .http
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&json!({
                    "model": model,
                    "prompt": text,
                    "keep_alive": "0",
                }))
                .timeout(timeout)
                .send()
                .await;

            let resp = match sent {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(format!("request error: {e}"));
                    warn!(attempt, error = %e, "embedding request failed");
                    Self::backoff(attempt).await;
                    continue;
                }
            };

            // Parse the body before checking status: a cold-start 500 can
            // still carry a meaningful `error` field.
            let body: EmbeddingsResponse = resp.json().await.unwrap_or_default();

            if let Some(error_msg) = body.error {
                if error_msg.to_lowercase().contains("context length") {
                    // Should be unreachable after truncation; retrying would
                    // not help so fail immediately.
                    tracing::error!(
                        chars = text.chars().count(),
                        "embedding input exceeds context length even after truncation"
                    );
                    return Ok(None);
                }
                last_error = Some(error_msg.clone());
                warn!(attempt, error = %error_msg, "model server embedding error");
                Self::backoff(attempt).await;
                continue;
            }

            match body.embedding {
                Some(vec) if !vec.is_empty() => {
                    if attempt > 0 {
                        info!(attempt, "embedding succeeded after retry");
                    }
                    return Ok(Some(vec));
                }
                _ => {
                    last_error = Some("empty embedding returned".to_string());
                    warn!(attempt, "model server returned empty embedding");
                    Self::backoff(attempt).await;
                }
            }
        }

        tracing::error!(
            attempts = EMBEDDING_MAX_RETRIES,
            last_error = ?last_error,
            chars = text.chars().count(),
            "embedding failed after all retries"
        );
        Ok(None)
    }

    async fn backoff(attempt: u32) {
        if attempt + 1 < EMBEDDING_MAX_RETRIES {
            let delay = EMBEDDING_RETRY_BASE_DELAY * 2u32.pow(attempt);
            tokio::time::sleep(delay).await;
        }
    }

    /// Single non-streaming generation call with a 180s ceiling and no retry.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<Option<String>> {
        let Some(model) = self.detect(ModelRole::Llm).await else {
            return Ok(None);
        };

        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "think": true,
            "keep_alive": "0",
            "options": {
                "num_ctx": 65536,
                "flash_attn": true,
            }
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let sent = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .timeout(Duration::from_secs(180))
            .send()
            .await;

        let resp = match sent {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "llm generation request failed");
                return Ok(None);
            }
        };

        let parsed: GenerateResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "llm response parsing failed");
                return Ok(None);
            }
        };

        if let Some(error_msg) = parsed.error {
            warn!(error = %error_msg, "model server generation error");
            return Ok(None);
        }

        Ok(parsed.response)
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn classification_model(&self) -> Option<String> {
        self.detect_classification_or_llm().await
    }
}
