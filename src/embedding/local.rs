//! Local ONNX Runtime embedding provider (all-MiniLM-L6-v2 via `ort`).

use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};

use super::{l2_normalize, EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// all-MiniLM-L6-v2 was trained at 256 tokens.
const MAX_SEQ_LEN: usize = 256;

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: the session is only reached through the Mutex; Tokenizer is Send + Sync.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        for (what, path) in [("ONNX model", &model_path), ("tokenizer", &tokenizer_path)] {
            anyhow::ensure!(
                path.exists(),
                "{what} not found at {}. Run `sutta model download` first.",
                path.display()
            );
        }

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(model = %model_path.display(), "embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn encode(&self, texts: &[&str]) -> Result<(Array2<i64>, Array2<i64>)> {
        let encodings: Vec<Encoding> = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;

        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
        let mut ids = Array2::<i64>::zeros((encodings.len(), seq_len));
        let mut mask = Array2::<i64>::zeros((encodings.len(), seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            for (col, (&id, &m)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .enumerate()
            {
                ids[[row, col]] = id as i64;
                mask[[row, col]] = m as i64;
            }
        }
        Ok((ids, mask))
    }
}

fn to_tensor(array: &Array2<i64>) -> Result<Tensor<i64>> {
    let shape = vec![array.nrows() as i64, array.ncols() as i64];
    let data: Vec<i64> = array.iter().copied().collect();
    Ok(Tensor::from_array((shape, data.into_boxed_slice()))?)
}

/// Attention-masked mean over the token axis, one L2-normalized row per input.
fn mean_pool(tokens: ArrayView3<f32>, mask: ArrayView2<i64>) -> Vec<Vec<f32>> {
    tokens
        .axis_iter(Axis(0))
        .zip(mask.axis_iter(Axis(0)))
        .map(|(sequence, row_mask)| {
            let mut sum = vec![0.0f32; sequence.ncols()];
            let mut count = 0.0f32;
            for (token, &m) in sequence.axis_iter(Axis(0)).zip(row_mask.iter()) {
                if m > 0 {
                    for (acc, v) in sum.iter_mut().zip(token.iter()) {
                        *acc += v;
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                sum.iter_mut().for_each(|x| *x /= count);
            }
            l2_normalize(&sum)
        })
        .collect()
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| anyhow!("embedding batch returned no vectors"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let (ids, mask) = self.encode(texts)?;
        let token_types = Array2::<i64>::zeros(ids.raw_dim());

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => to_tensor(&ids)?,
            "attention_mask" => to_tensor(&mask)?,
            "token_type_ids" => to_tensor(&token_types)?,
        })?;

        // Output name differs between ONNX exports.
        let hidden = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract hidden state tensor")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected hidden state shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );
        let tokens = ArrayView3::from_shape(
            (dims[0] as usize, dims[1] as usize, dims[2] as usize),
            data,
        )?;

        Ok(mean_pool(tokens, mask.view()))
    }
}
