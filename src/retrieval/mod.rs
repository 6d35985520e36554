//! Passage retrieval over the indexed corpus.
//!
//! [`VectorRetriever`] is the seam the agent depends on. [`sqlite::SqliteRetriever`]
//! is the production implementation over sqlite-vec; [`grouped`] aggregates
//! wide retrievals by sutta for the `search` command.

pub mod grouped;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A passage returned by a retriever. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub sutta_uid: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nikaya: Option<String>,
    pub segment_range: String,
    pub text: String,
    /// Higher is more relevant. Only comparable within one retriever.
    pub score: f64,
}

impl RetrievedChunk {
    pub fn key(&self) -> EvidenceKey {
        EvidenceKey::new(&self.sutta_uid, &self.segment_range)
    }
}

/// Identity of a passage: `(sutta_uid, segment_range)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceKey {
    pub sutta_uid: String,
    pub segment_range: String,
}

impl EvidenceKey {
    pub fn new(sutta_uid: impl Into<String>, segment_range: impl Into<String>) -> Self {
        Self {
            sutta_uid: sutta_uid.into(),
            segment_range: segment_range.into(),
        }
    }
}

impl std::fmt::Display for EvidenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.sutta_uid, self.segment_range)
    }
}

#[async_trait]
pub trait VectorRetriever: Send + Sync {
    /// Up to `k` chunks, best score first. Fewer when the corpus is smaller.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Number of indexed chunks.
    async fn document_count(&self) -> Result<u64>;

    async fn is_ready(&self) -> bool {
        matches!(self.document_count().await, Ok(n) if n > 0)
    }
}
