//! Wide retrieval grouped by sutta.
//!
//! Pulls a large number of chunks for a query and reports, per sutta, its best
//! score, how many distinct passages matched and the top snippets. No LLM is
//! involved; this answers "which suttas talk about X".

use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::{RetrievedChunk, VectorRetriever};
use crate::memory::types::truncate_chars;

pub const MIN_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 500;
const SNIPPETS_PER_SUTTA: usize = 3;
const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub segment_range: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuttaHit {
    pub sutta_uid: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nikaya: Option<String>,
    pub best_score: f64,
    /// Distinct passages of this sutta in the result set.
    pub match_count: usize,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupedResults {
    pub query: String,
    pub total_chunks: usize,
    pub sutta_count: usize,
    /// Ordered by `best_score`, highest first.
    pub results: Vec<SuttaHit>,
}

/// Retrieve `top_k` chunks (clamped to `MIN_TOP_K..=MAX_TOP_K`) and group them.
pub async fn search(
    retriever: &dyn VectorRetriever,
    query: &str,
    top_k: usize,
) -> Result<GroupedResults> {
    let top_k = top_k.clamp(MIN_TOP_K, MAX_TOP_K);
    let chunks = retriever.retrieve(query, top_k).await?;
    Ok(group_by_sutta(query, chunks))
}

pub fn group_by_sutta(query: &str, chunks: Vec<RetrievedChunk>) -> GroupedResults {
    let mut seen = HashSet::new();
    let mut groups: HashMap<String, Vec<RetrievedChunk>> = HashMap::new();
    for chunk in chunks {
        if seen.insert(chunk.key()) {
            groups.entry(chunk.sutta_uid.clone()).or_default().push(chunk);
        }
    }
    let total_chunks = seen.len();

    let mut results: Vec<SuttaHit> = groups
        .into_iter()
        .map(|(sutta_uid, mut chunks)| {
            chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
            let best = &chunks[0];
            SuttaHit {
                title: best.title.clone(),
                nikaya: best.nikaya.clone(),
                best_score: best.score,
                match_count: chunks.len(),
                snippets: chunks
                    .iter()
                    .take(SNIPPETS_PER_SUTTA)
                    .map(|c| Snippet {
                        segment_range: c.segment_range.clone(),
                        text: truncate_chars(&c.text, SNIPPET_CHARS),
                        score: c.score,
                    })
                    .collect(),
                sutta_uid,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.best_score
            .total_cmp(&a.best_score)
            .then_with(|| a.sutta_uid.cmp(&b.sutta_uid))
    });

    GroupedResults {
        query: query.to_string(),
        total_chunks,
        sutta_count: results.len(),
        results,
    }
}
