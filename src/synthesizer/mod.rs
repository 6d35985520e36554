//! Language-model judgment and answer synthesis over retrieved evidence.

pub mod llm;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;

use crate::retrieval::{EvidenceKey, RetrievedChunk};

pub use llm::LlmSynthesizer;

/// Whether the evidence so far answers the question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub sufficient: bool,
    /// Refined query for the next search round. Empty when none was proposed.
    pub follow_up_query: String,
}

impl Judgment {
    pub fn sufficient() -> Self {
        Self {
            sufficient: true,
            follow_up_query: String::new(),
        }
    }

    pub fn search_more(follow_up_query: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            follow_up_query: follow_up_query.into(),
        }
    }
}

/// A synthesized answer with the passages it cites, most relevant first.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer_text: String,
    pub cited_evidence_keys: Vec<EvidenceKey>,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn judge_sufficiency(
        &self,
        question: &str,
        evidence: &[RetrievedChunk],
    ) -> Result<Judgment>;

    async fn synthesize(&self, question: &str, evidence: &[RetrievedChunk]) -> Result<Synthesis>;

    /// Identifier of the backing model, for logs.
    fn model_id(&self) -> &str;
}
