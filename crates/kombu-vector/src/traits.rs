//! Core traits for vector indexes.
//!
//! The `VectorIndex` trait defines the common k-NN contract implemented by
//! all index families (brute force, HNSW, LSH).

use crate::Result;
use uuid::Uuid;

/// Predicate over chunk ids, applied during or after candidate
/// enumeration. Results contain only accepted ids.
pub type IdFilter<'a> = dyn Fn(&Uuid) -> bool + Sync + 'a;

/// A ranked hit returned from a k-NN search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The chunk id stored in the index.
    pub id: Uuid,
    /// Cosine similarity to the query, in `[-1, 1]`. Higher is better.
    pub score: f32,
}

impl SearchHit {
    /// Create a new hit.
    pub fn new(id: Uuid, score: f32) -> Self {
        Self { id, score }
    }
}

impl Eq for SearchHit {}

impl PartialOrd for SearchHit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchHit {
    /// Ranking order: higher score sorts first, ties break by ascending id
    /// so results are deterministic. `total_cmp` keeps the order total.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Common interface for vector indexes.
///
/// All index implementations store `(chunk id, vector)` entries of a fixed
/// dimension and answer k-nearest-neighbor queries under cosine similarity.
///
/// # Locking
///
/// Indexes are plain mutable data structures. The owning library
/// serializes access through its reader-writer lock, so implementations
/// hold no locks of their own; they only need to be `Send + Sync` so a
/// guarded reference can cross threads.
pub trait VectorIndex: Send + Sync {
    /// Replace the index contents with the given entries.
    ///
    /// Previous contents are discarded even when an entry fails validation.
    ///
    /// # Errors
    ///
    /// Returns an error if any vector has the wrong dimension, contains
    /// non-finite values, or repeats an id.
    fn build(&mut self, entries: Vec<(Uuid, Vec<f32>)>) -> Result<()>;

    /// Insert a vector under an id that is not already present.
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if the id exists, `DimensionMismatch` or
    /// `InvalidVector` if the vector is unacceptable.
    fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> Result<()>;

    /// Delete a vector by id.
    ///
    /// Returns `true` if the id was present, `false` if it was absent
    /// (absence is reported, not an error).
    fn delete(&mut self, id: &Uuid) -> bool;

    /// Search for the k nearest neighbors of `query` under cosine
    /// similarity.
    ///
    /// Returns up to `k` hits ordered by descending score, ties broken by
    /// ascending id. When `filter` is given, every returned id satisfies
    /// it. `k == 0` returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` or `InvalidVector` for an unacceptable
    /// query.
    fn search(&self, query: &[f32], k: usize, filter: Option<&IdFilter>) -> Result<Vec<SearchHit>>;

    /// Number of entries currently in the index.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed dimension of vectors in this index.
    fn dimension(&self) -> usize;

    /// Remove all entries.
    fn clear(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_hit_ordering() {
        let a = SearchHit::new(Uuid::new_v4(), 0.5);
        let b = SearchHit::new(Uuid::new_v4(), 0.9);
        let c = SearchHit::new(Uuid::new_v4(), 0.1);

        let mut hits = vec![a.clone(), b.clone(), c.clone()];
        hits.sort();

        assert_eq!(hits[0], b);
        assert_eq!(hits[1], a);
        assert_eq!(hits[2], c);
    }

    #[test]
    fn test_search_hit_ties_break_by_id() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        let mut hits = vec![SearchHit::new(high, 0.7), SearchHit::new(low, 0.7)];
        hits.sort();

        assert_eq!(hits[0].id, low);
        assert_eq!(hits[1].id, high);
    }
}
