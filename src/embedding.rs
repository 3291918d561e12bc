//! Pluggable embedding providers.
//!
//! The vector store accepts precomputed vectors; computing them is this
//! module's job. The default provider is a deterministic hash
//! projection (no model download, no network), which keeps indexing
//! self-contained. The `fastembed-embeddings` feature swaps in a real
//! ONNX model.

use anyhow::Result;

/// Dimension of the hash-projection embedder.
pub const HASH_EMBED_DIM: usize = 256;

/// An embedding provider.
pub trait Embedder: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Output vector dimension.
    fn dim(&self) -> usize;

    /// Embeds each text into a dense vector.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying model fails; the hash
    /// provider is infallible in practice.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic hash-projection embedder.
///
/// Tokenizes on non-alphanumeric boundaries and scatters each token
/// into a fixed-dimension vector at four hashed positions, then
/// l2-normalizes. Similar token bags land near each other; it is a
/// lexical signal dressed as a vector, which is exactly what the
/// ranker needs when no model is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash-projection"
    }

    fn dim(&self) -> usize {
        HASH_EMBED_DIM
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; HASH_EMBED_DIM];
    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 3)
    {
        let lower = token.to_lowercase();
        for seed in 0..4u64 {
            let h = xxhash_rust::xxh3::xxh3_64_with_seed(lower.as_bytes(), seed);
            let idx = (h % HASH_EMBED_DIM as u64) as usize;
            // Alternate sign per seed so common tokens don't all pile
            // into positive mass.
            let sign = if seed % 2 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
    }
    normalize(&mut v);
    v
}

/// L2-normalizes in place; zero vectors stay zero.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v {
            *x /= norm;
        }
    }
}

/// Creates the configured embedder.
///
/// With the `fastembed-embeddings` feature this tries the ONNX model
/// first and falls back to the hash projection on failure; without it
/// the hash projection is returned directly.
///
/// # Errors
///
/// Currently infallible (the fallback always constructs), but kept
/// fallible so callers don't change when a config-selected provider
/// can fail.
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    #[cfg(feature = "fastembed-embeddings")]
    {
        match fast::FastEmbedder::try_new() {
            Ok(embedder) => return Ok(Box::new(embedder)),
            Err(e) => {
                tracing::warn!("fastembed unavailable ({e}), using hash-projection embedder");
            }
        }
    }
    Ok(Box::new(HashEmbedder))
}

#[cfg(feature = "fastembed-embeddings")]
mod fast {
    use std::sync::Mutex;

    use anyhow::{Context, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::Embedder;

    /// ONNX-backed embedder (BGE small), 384 dimensions.
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn try_new() -> Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(false),
            )
            .context("failed to initialize fastembed model")?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn name(&self) -> &'static str {
            "fastembed-bge-small"
        }

        fn dim(&self) -> usize {
            384
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow::anyhow!("embedder mutex poisoned"))?;
            let mut vectors = model.embed(owned, None)?;
            for v in &mut vectors {
                super::normalize(v);
            }
            Ok(vectors)
        }
    }
}
