//! HNSW (Hierarchical Navigable Small World) index for Kombu.
//!
//! Approximate nearest neighbor search over a multi-layer proximity graph:
//!
//! - Higher layers hold exponentially fewer nodes and give coarse,
//!   long-range navigation
//! - Layer 0 holds every point
//! - Search greedily descends from the top layer, then runs a best-first
//!   expansion at layer 0
//!
//! # Parameters
//!
//! - `m`: max neighbors per node per layer (layer 0 uses `m_max0 = 2*m`)
//! - `ef_construction`: dynamic candidate list size while inserting
//! - `ef_search`: dynamic candidate list size while searching
//! - `seed`: RNG seed for level assignment; fixed per index so builds are
//!   reproducible
//!
//! # Example
//!
//! ```
//! use kombu_hnsw::{HnswConfig, HnswIndex};
//! use kombu_vector::VectorIndex;
//! use uuid::Uuid;
//!
//! let mut index = HnswIndex::new(128, HnswConfig::default());
//! index.insert(Uuid::new_v4(), vec![1.0; 128]).unwrap();
//!
//! let hits = index.search(&[1.0; 128], 10, None).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

mod graph;
mod index;
mod layer;

pub use index::{HnswConfig, HnswIndex};
