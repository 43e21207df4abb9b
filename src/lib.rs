//! Memory Palace core — persistent semantic memory for conversational AI
//! agents: typed memories with embeddings, a knowledge graph between them,
//! LLM-assisted synthesis and reflection, and a small inter-instance
//! handoff bus.

pub mod config;
pub mod error;
pub mod graph;
pub mod handoff;
pub mod memory;
pub mod modelclient;
pub mod reflection;
pub mod similarity;
pub mod storage;
pub mod synthesis;
pub mod tools;
pub mod types;

pub use error::{PalaceError, Result};
pub use storage::Storage;
pub use types::*;

use modelclient::ModelClient;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Owns the storage pool, model-server client, and resolved configuration
/// for one process. Cheap to pass by reference; `Storage`'s pools and
/// `reqwest::Client` are internally `Arc`-backed.
pub struct Palace {
    pub storage: Storage,
    pub model_client: ModelClient,
    pub config: config::Config,
}

impl Palace {
    /// Load configuration, connect to storage, and bootstrap schema. The
    /// model-server client is constructed eagerly but makes no network call
    /// until first use.
    pub async fn connect() -> Result<Self> {
        let config = config::load()?;
        let data_dir = config::data_dir();
        let storage = Storage::connect(&config, &data_dir).await?;
        storage.bootstrap(config.embedding_dimension()).await?;

        let model_client = ModelClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.llm_model.clone(),
            config.auto_link.classification_model.clone(),
        );

        Ok(Self {
            storage,
            model_client,
            config,
        })
    }

    pub fn memory_store(&self) -> memory::MemoryStore<'_> {
        memory::MemoryStore::new(&self.storage, &self.model_client, &self.config)
    }
}
