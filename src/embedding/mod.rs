//! Text-to-vector embedding for queries and corpus chunks.
//!
//! [`EmbeddingProvider`] is implemented by the local ONNX pipeline
//! (all-MiniLM-L6-v2) and by an Ollama HTTP client. Both must produce
//! L2-normalized vectors of [`EMBEDDING_DIM`] dimensions so they fit the
//! `chunks_vec` table.

pub mod local;
pub mod ollama;

use anyhow::Result;

/// Number of dimensions in the stored chunk vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Create an embedding provider from config.
///
/// `local` requires the model files from `sutta model download`;
/// `ollama` requires a running Ollama server with a 384-dim model such as `all-minilm`.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new(config)?)),
        "ollama" => Ok(Box::new(ollama::OllamaEmbeddingProvider::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, ollama"),
    }
}

/// L2-normalize a vector. A zero vector is returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
