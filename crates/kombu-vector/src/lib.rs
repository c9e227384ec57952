//! Vector similarity search primitives for Kombu.
//!
//! This crate provides the pieces shared by every index family:
//!
//! - **Similarity kernel**: dot product, L2 norm, cosine similarity/distance
//! - **`VectorIndex` trait**: the k-NN contract implemented by all indexes
//! - **`BruteForceIndex`**: exact linear-scan search (baseline and default)
//!
//! # Architecture
//!
//! Kombu stores each library's vectors in exactly one index:
//!
//! ```text
//! BruteForceIndex (kombu-vector)  exact, O(n*d) per query
//! HnswIndex       (kombu-hnsw)    approximate, layered proximity graph
//! LshIndex        (kombu-lsh)     approximate, random hyperplane hashing
//! ```
//!
//! Indexes are plain data structures: callers serialize access through the
//! owning library's reader-writer lock, so no method here takes an interior
//! lock.
//!
//! # Example
//!
//! ```
//! use kombu_vector::{BruteForceIndex, VectorIndex};
//! use uuid::Uuid;
//!
//! let mut index = BruteForceIndex::new(3);
//! let id = Uuid::new_v4();
//! index.insert(id, vec![1.0, 0.0, 0.0]).unwrap();
//!
//! let hits = index.search(&[1.0, 0.0, 0.0], 1, None).unwrap();
//! assert_eq!(hits[0].id, id);
//! ```

mod brute;
pub mod similarity;
mod traits;

pub use brute::BruteForceIndex;
pub use similarity::{cosine_distance, cosine_similarity, dot, dot_unchecked, norm};
pub use traits::{IdFilter, SearchHit, VectorIndex};

/// Error type for vector operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("duplicate id: {0}")]
    Duplicate(uuid::Uuid),

    #[error("invalid vector: {0}")]
    InvalidVector(String),
}

/// Result type for vector operations.
pub type Result<T> = std::result::Result<T, VectorError>;

/// Validates a vector against an expected dimension and rejects
/// non-finite components.
///
/// NaN or infinite components would make similarity scores incomparable,
/// so they are refused at every index boundary.
pub fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }

    for (i, &v) in vector.iter().enumerate() {
        if !v.is_finite() {
            return Err(VectorError::InvalidVector(format!(
                "non-finite value {} at index {}",
                v, i
            )));
        }
    }

    Ok(())
}
