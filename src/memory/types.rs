//! Insight memory records.
//!
//! [`WisdomEntry`] is one learned answer keyed by question fingerprint;
//! [`Citation`] points at the passage supporting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retrieval::{EvidenceKey, RetrievedChunk};

/// A reference to a specific passage supporting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub sutta_uid: String,
    pub title: String,
    /// Segment range within the sutta, e.g. `sn12.1:1.1-2.4`.
    pub segment_range: String,
    pub text_snippet: String,
    pub score: f64,
}

impl Citation {
    /// Build a citation from a retrieved chunk, truncating the text to `max_chars`.
    pub fn from_chunk(chunk: &RetrievedChunk, max_chars: usize) -> Self {
        Self {
            sutta_uid: chunk.sutta_uid.clone(),
            title: chunk.title.clone(),
            segment_range: chunk.segment_range.clone(),
            text_snippet: truncate_chars(&chunk.text, max_chars),
            score: chunk.score,
        }
    }

    pub fn key(&self) -> EvidenceKey {
        EvidenceKey::new(&self.sutta_uid, &self.segment_range)
    }
}

/// A learned insight, matching the `wisdom` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WisdomEntry {
    pub fingerprint: String,
    pub original_question: String,
    pub answer_text: String,
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
    /// Number of times this entry answered a question from memory.
    pub hit_count: u32,
}

impl WisdomEntry {
    pub fn new(
        fingerprint: impl Into<String>,
        original_question: impl Into<String>,
        answer_text: impl Into<String>,
        citations: Vec<Citation>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            original_question: original_question.into(),
            answer_text: answer_text.into(),
            citations,
            created_at: Utc::now(),
            hit_count: 0,
        }
    }
}

/// Truncate on a char boundary, appending `...` when text was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
