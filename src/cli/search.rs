use anyhow::Result;
use std::sync::Arc;

use sutta_agent::config::SuttaConfig;
use sutta_agent::context::open_shared_database;
use sutta_agent::embedding::{self, EmbeddingProvider};
use sutta_agent::retrieval::grouped;
use sutta_agent::retrieval::sqlite::SqliteRetriever;

/// Print the suttas most related to `query`, grouped from a wide retrieval.
pub async fn search(
    config: SuttaConfig,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let db = open_shared_database(&config)?;
    let provider = embedding::create_provider(&config.embedding)?;
    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    let retriever = SqliteRetriever::new(db, embedding_provider);

    let top_k = top_k.unwrap_or(config.retrieval.search_top_k);
    let grouped = grouped::search(&retriever, query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&grouped)?);
        return Ok(());
    }

    if grouped.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!(
        "Found {} sutta(s) across {} passage(s)\n",
        grouped.sutta_count, grouped.total_chunks
    );

    for (i, hit) in grouped.results.iter().enumerate() {
        println!(
            "  {}. {}: {} [{}] (best: {:.4}, matches: {})",
            i + 1,
            hit.sutta_uid,
            hit.title,
            hit.nikaya.as_deref().unwrap_or("?"),
            hit.best_score,
            hit.match_count,
        );
        for snippet in &hit.snippets {
            println!(
                "     {}: {}",
                snippet.segment_range,
                snippet.text.replace('\n', " ")
            );
        }
        println!();
    }

    Ok(())
}
