use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

use sutta_agent::config::SuttaConfig;
use sutta_agent::db;
use sutta_agent::embedding::{self, EmbeddingProvider};
use sutta_agent::retrieval::sqlite::{count_chunks, upsert_chunk, ChunkRecord};

const BATCH_SIZE: usize = 32;

/// Parse a JSONL file of chunks. Blank lines are skipped; chunks with empty
/// text are dropped with a warning.
pub fn read_chunks(contents: &str) -> Result<Vec<ChunkRecord>> {
    let mut chunks = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chunk: ChunkRecord = serde_json::from_str(line)
            .with_context(|| format!("invalid chunk on line {}", n + 1))?;
        if chunk.text.trim().is_empty() {
            tracing::warn!(line = n + 1, sutta = %chunk.sutta_uid, "skipping chunk with empty text");
            continue;
        }
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Embed and index pre-chunked passages. Re-importing a
/// `(sutta_uid, segment_range)` replaces the stored passage.
pub async fn import(config: &SuttaConfig, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let chunks = read_chunks(&contents)?;
    if chunks.is_empty() {
        bail!("no chunks found in {}", file.display());
    }

    let db_path = config.resolved_db_path();
    let mut conn = db::open_database(&db_path)?;

    let provider = embedding::create_provider(&config.embedding)?;
    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::from(provider);

    println!("Importing {} chunks...", chunks.len());
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} chunks ({eta})")
            .expect("valid template")
            .progress_chars("##-"),
    );

    for batch in chunks.chunks(BATCH_SIZE) {
        let ep = Arc::clone(&embedding_provider);
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            ep.embed_batch(&refs)
        })
        .await??;

        let tx = conn.transaction()?;
        for (chunk, embedding) in batch.iter().zip(&embeddings) {
            upsert_chunk(&tx, chunk, embedding)
                .with_context(|| format!("failed to store {} {}", chunk.sutta_uid, chunk.segment_range))?;
        }
        tx.commit()?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    db::migrations::set_embedding_model(&conn, &config.embedding.model)?;
    let total = count_chunks(&conn)?;

    println!("Import complete:");
    println!("  Chunks processed:  {}", chunks.len());
    println!("  Chunks indexed:    {total}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_jsonl_and_skips_blank_and_empty() {
        let contents = r#"
{"sutta_uid": "mn1", "title": "The Root of All Things", "nikaya": "mn", "segment_range": "mn1:1.1-1.6", "text": "So I have heard."}

{"sutta_uid": "mn2", "title": "All the Defilements", "segment_range": "mn2:1.1", "text": "   "}
"#;
        let chunks = read_chunks(contents).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].nikaya.as_deref(), Some("mn"));
    }

    #[test]
    fn reports_bad_line_number() {
        let err = read_chunks("{\"sutta_uid\": \"mn1\"}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
