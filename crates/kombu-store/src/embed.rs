//! Embedding provider interface.
//!
//! The service consumes an opaque text → vector mapping; real providers
//! (hosted embedding APIs) live outside this crate and implement
//! [`EmbeddingProvider`]. Provider failures surface to callers unchanged
//! as `ProviderUnavailable` / `RateLimited`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Provider failure modes, surfaced to the service boundary unchanged.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// Maps text to a fixed-dimension embedding vector.
///
/// Implementations must be safe to call from multiple threads; calls may
/// block on I/O, so the service invokes them outside any library lock.
pub trait EmbeddingProvider: Send + Sync {
    /// The dimension of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts, one vector per input in order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Deterministic embedding provider for tests and local development.
///
/// Hashes the text (together with a seed) into an RNG and draws a unit
/// vector, so equal texts always embed identically and no network is
/// involved. Not a semantic embedding.
pub struct HashEmbedder {
    dimension: usize,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dimension: usize, seed: u64) -> Self {
        Self { dimension, seed }
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        text.hash(&mut hasher);

        let mut rng = StdRng::seed_from_u64(hasher.finish());
        let mut vector: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let norm = kombu_vector::norm(&vector);
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}
