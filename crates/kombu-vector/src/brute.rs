//! Brute force vector index.
//!
//! Exact k-NN by linear scan. O(n*d) per query, deterministic, and the
//! recall baseline the approximate indexes are measured against.

use crate::similarity;
use crate::traits::{IdFilter, SearchHit, VectorIndex};
use crate::{validate_vector, Result, VectorError};
use std::collections::{BinaryHeap, HashMap};
use uuid::Uuid;

/// One stored entry. The norm is cached at insert time; vectors are
/// immutable afterwards so the cache never goes stale.
#[derive(Debug, Clone)]
struct Entry {
    id: Uuid,
    vector: Vec<f32>,
    norm: f32,
}

/// Brute force vector index.
///
/// Entries live in a contiguous table scanned in full on every query; a
/// bounded heap keeps the running top k, so memory per query is O(k).
///
/// # Performance
///
/// - Insert: O(1)
/// - Delete: O(1) (swap-remove)
/// - Search: O(n * d)
///
/// For libraries beyond ~10K chunks, prefer HNSW or LSH.
pub struct BruteForceIndex {
    entries: Vec<Entry>,
    by_id: HashMap<Uuid, usize>,
    dimension: usize,
}

impl BruteForceIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
            dimension,
        }
    }
}

impl VectorIndex for BruteForceIndex {
    fn build(&mut self, entries: Vec<(Uuid, Vec<f32>)>) -> Result<()> {
        self.clear();
        for (id, vector) in entries {
            self.insert(id, vector)?;
        }
        Ok(())
    }

    fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> Result<()> {
        validate_vector(&vector, self.dimension)?;
        if self.by_id.contains_key(&id) {
            return Err(VectorError::Duplicate(id));
        }

        let norm = similarity::norm(&vector);
        self.by_id.insert(id, self.entries.len());
        self.entries.push(Entry { id, vector, norm });
        Ok(())
    }

    fn delete(&mut self, id: &Uuid) -> bool {
        let Some(idx) = self.by_id.remove(id) else {
            return false;
        };

        self.entries.swap_remove(idx);
        // The swapped-in entry changed position; fix its slot.
        if idx < self.entries.len() {
            self.by_id.insert(self.entries[idx].id, idx);
        }
        true
    }

    fn search(&self, query: &[f32], k: usize, filter: Option<&IdFilter>) -> Result<Vec<SearchHit>> {
        validate_vector(query, self.dimension)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = similarity::norm(query);

        // Max-heap in ranking order: the root is the worst of the current
        // top k and is evicted when a better hit arrives.
        let mut top: BinaryHeap<SearchHit> = BinaryHeap::with_capacity(k + 1);

        for entry in &self.entries {
            if let Some(filter) = filter {
                if !filter(&entry.id) {
                    continue;
                }
            }

            let dot = similarity::dot_unchecked(query, &entry.vector);
            let score = similarity::cosine_from_parts(dot, query_norm, entry.norm);

            top.push(SearchHit::new(entry.id, score));
            if top.len() > k {
                top.pop();
            }
        }

        Ok(top.into_sorted_vec())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
    }
}
