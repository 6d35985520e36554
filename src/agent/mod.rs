//! The research agent: memory recall, bounded retrieval rounds, synthesis and
//! learning.

pub mod evidence;
pub mod iterative;
pub mod progress;

use serde::Serialize;
use thiserror::Error;

use crate::memory::Citation;

pub use evidence::EvidenceSet;
pub use iterative::{AgentSettings, IterativeAgent};
pub use progress::{progress_channel, AgentProgress, Phase, ProgressCallback};

/// Errors surfaced to callers of [`IterativeAgent`]. Collaborator failures
/// (retrieval, model, persistence) are recovered inside the run and never
/// appear here.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("no passages are indexed; run `sutta import` first")]
    NotReady,

    #[error("model not available: {0}")]
    InvalidModel(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub answer_text: String,
    /// Passages supporting the answer, most relevant first.
    pub citations: Vec<Citation>,
    pub from_memory: bool,
    /// Search rounds run. 0 when answered from memory.
    pub iterations: u32,
    /// Distinct passages gathered across all rounds.
    pub evidence_count: usize,
}
