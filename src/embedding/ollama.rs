//! Embedding provider backed by a local Ollama server (`POST /api/embed`).
//!
//! The provider trait is synchronous, so requests are driven on the tokio
//! runtime captured at construction. Call it from `spawn_blocking` like the
//! ONNX provider.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{l2_normalize, EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbeddingProvider {
    base_url: String,
    model: String,
    http: reqwest::Client,
    runtime: tokio::runtime::Handle,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("the Ollama embedding provider must be created inside a tokio runtime")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            http,
            runtime,
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<EmbedResponse> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .with_context(|| format!("Ollama embed request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embed error {status}: {body}");
        }

        response
            .json()
            .await
            .context("failed to parse Ollama embed response")
    }
}

impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("Ollama returned no embeddings")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let body = self.runtime.block_on(self.request(texts))?;
        anyhow::ensure!(
            body.embeddings.len() == texts.len(),
            "Ollama returned {} embeddings for {} inputs",
            body.embeddings.len(),
            texts.len()
        );

        body.embeddings
            .into_iter()
            .map(|v| {
                anyhow::ensure!(
                    v.len() == EMBEDDING_DIM,
                    "model {} produces {}-dim vectors, the index expects {EMBEDDING_DIM}",
                    self.model,
                    v.len()
                );
                Ok(l2_normalize(&v))
            })
            .collect()
    }
}
