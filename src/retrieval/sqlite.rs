//! sqlite-vec backed corpus index.
//!
//! Chunks live in `chunks`; their embeddings live in `chunks_vec` under the same
//! rowid. Retrieval embeds the query, runs a KNN query and converts the L2
//! distance between unit vectors into cosine similarity for the score.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

use super::{RetrievedChunk, VectorRetriever};
use crate::db::embedding_to_bytes;
use crate::embedding::EmbeddingProvider;

/// One pre-chunked passage as read from an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    pub sutta_uid: String,
    pub title: String,
    #[serde(default)]
    pub nikaya: Option<String>,
    pub segment_range: String,
    pub text: String,
}

/// Insert or replace a chunk and its embedding. Returns the chunk rowid.
pub fn upsert_chunk(conn: &Connection, chunk: &ChunkRecord, embedding: &[f32]) -> Result<i64> {
    let id: i64 = conn.query_row(
        "INSERT INTO chunks (sutta_uid, title, nikaya, segment_range, text, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(sutta_uid, segment_range) DO UPDATE SET \
           title = excluded.title, nikaya = excluded.nikaya, text = excluded.text \
         RETURNING id",
        params![
            chunk.sutta_uid,
            chunk.title,
            chunk.nikaya,
            chunk.segment_range,
            chunk.text,
            chrono::Utc::now().to_rfc3339(),
        ],
        |row| row.get(0),
    )?;

    // vec0 has no upsert
    conn.execute("DELETE FROM chunks_vec WHERE rowid = ?1", params![id])?;
    conn.execute(
        "INSERT INTO chunks_vec (rowid, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(embedding)],
    )?;

    Ok(id)
}

pub fn count_chunks(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Cosine similarity of two unit vectors from their L2 distance.
fn l2_to_cosine(distance: f64) -> f64 {
    1.0 - (distance * distance) / 2.0
}

/// KNN over `chunks_vec`, joined back to chunk metadata, nearest first.
pub fn nearest_chunks(conn: &Connection, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
    if k == 0 {
        return Ok(vec![]);
    }

    let mut stmt = conn.prepare(
        "WITH knn AS ( \
             SELECT rowid, distance FROM chunks_vec \
             WHERE embedding MATCH ?1 AND k = ?2 \
         ) \
         SELECT c.sutta_uid, c.title, c.nikaya, c.segment_range, c.text, knn.distance \
         FROM knn JOIN chunks c ON c.id = knn.rowid \
         ORDER BY knn.distance",
    )?;

    let chunks = stmt
        .query_map(params![embedding_to_bytes(embedding), k as i64], |row| {
            Ok(RetrievedChunk {
                sutta_uid: row.get(0)?,
                title: row.get(1)?,
                nikaya: row.get(2)?,
                segment_range: row.get(3)?,
                text: row.get(4)?,
                score: l2_to_cosine(row.get(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chunks)
}

pub struct SqliteRetriever {
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
}

impl SqliteRetriever {
    pub fn new(db: Arc<Mutex<Connection>>, embedding: Arc<dyn EmbeddingProvider>) -> Self {
        Self { db, embedding }
    }
}

#[async_trait]
impl VectorRetriever for SqliteRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(vec![]);
        }

        let provider = Arc::clone(&self.embedding);
        let text = query.to_string();
        let query_embedding = tokio::task::spawn_blocking(move || provider.embed(&text))
            .await
            .context("embedding task failed")??;

        let db = Arc::clone(&self.db);
        let chunks = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            nearest_chunks(&conn, &query_embedding, k)
        })
        .await
        .context("retrieval task failed")??;

        tracing::debug!(k, returned = chunks.len(), "chunks retrieved");
        Ok(chunks)
    }

    async fn document_count(&self) -> Result<u64> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            count_chunks(&conn)
        })
        .await
        .context("count task failed")?
    }
}
