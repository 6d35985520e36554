//! Application context: the database, embedding provider, memory store and
//! model catalog every agent-facing command shares.

use anyhow::Result;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::agent::{AgentError, AgentSettings, IterativeAgent};
use crate::config::SuttaConfig;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::memory::{CaseFoldFingerprint, MemoryStore};
use crate::models::{LlmCatalog, ModelCatalog};
use crate::retrieval::sqlite::SqliteRetriever;
use crate::retrieval::VectorRetriever;

/// Open the configured database and wrap it for sharing.
pub fn open_shared_database(config: &SuttaConfig) -> Result<Arc<Mutex<Connection>>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model differs from the one the corpus was imported with; re-run `sutta import`"
            );
        }
    }

    Ok(Arc::new(Mutex::new(conn)))
}

pub struct AppContext {
    pub config: Arc<SuttaConfig>,
    pub db: Arc<Mutex<Connection>>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub memory: MemoryStore,
    pub catalog: Arc<dyn ModelCatalog>,
}

impl AppContext {
    pub fn open(config: SuttaConfig) -> Result<Self> {
        let db = open_shared_database(&config)?;

        let provider = embedding::create_provider(&config.embedding)?;
        let embedding: Arc<dyn EmbeddingProvider> = Arc::from(provider);
        tracing::info!(provider = %config.embedding.provider, "embedding provider ready");

        let catalog: Arc<dyn ModelCatalog> = Arc::new(LlmCatalog::from_env(
            config.llm.clone(),
            config.agent.llm_timeout(),
        ));

        Ok(Self {
            memory: MemoryStore::new(Arc::clone(&db)),
            config: Arc::new(config),
            db,
            embedding,
            catalog,
        })
    }

    pub fn retriever(&self) -> Arc<dyn VectorRetriever> {
        Arc::new(SqliteRetriever::new(
            Arc::clone(&self.db),
            Arc::clone(&self.embedding),
        ))
    }

    /// Build an agent backed by `model`, or the configured default.
    pub fn build_agent(&self, model: Option<&str>) -> Result<IterativeAgent> {
        let model_id = model.unwrap_or(&self.config.llm.default_model);
        let info = self
            .catalog
            .find(model_id)
            .ok_or_else(|| AgentError::InvalidModel(model_id.to_string()))?;
        let synthesizer = self.catalog.build(&info)?;

        let fingerprinter = CaseFoldFingerprint {
            strip_punctuation: self.config.memory.strip_punctuation,
        };
        Ok(IterativeAgent::new(
            self.retriever(),
            self.memory.clone(),
            Arc::clone(&self.catalog),
            synthesizer,
            AgentSettings::from_config(&self.config),
        )
        .with_fingerprinter(Arc::new(fingerprinter)))
    }
}
