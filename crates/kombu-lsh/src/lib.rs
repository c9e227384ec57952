//! LSH (locality-sensitive hashing) index for Kombu.
//!
//! Random hyperplane hashing for cosine similarity: each of `L` tables
//! hashes a vector to a `k`-bit signature (one sign bit per hyperplane),
//! similar vectors collide with high probability, and a search re-ranks
//! the union of matching buckets by exact cosine similarity.
//!
//! # Parameters
//!
//! - `tables` (L): number of independent hash tables
//! - `hash_bits` (k): hyperplanes (signature bits) per table, at most 64
//! - `probe_depth`: single-bit multi-probe widening applied only when the
//!   bucket union comes back empty; 0 disables it
//! - `seed`: hyperplanes are drawn once from this seed and fixed for the
//!   life of the index
//!
//! # Example
//!
//! ```
//! use kombu_lsh::{LshConfig, LshIndex};
//! use kombu_vector::VectorIndex;
//! use uuid::Uuid;
//!
//! let mut index = LshIndex::new(64, LshConfig::default()).unwrap();
//! let id = Uuid::new_v4();
//! index.insert(id, vec![0.5; 64]).unwrap();
//!
//! let hits = index.search(&[0.5; 64], 5, None).unwrap();
//! assert_eq!(hits[0].id, id);
//! ```

mod index;

pub use index::{LshConfig, LshIndex};

/// Error type for LSH construction.
#[derive(Debug, thiserror::Error)]
pub enum LshError {
    #[error("invalid LSH parameters: {0}")]
    InvalidParams(String),
}
