//! LSH index implementation.

use crate::LshError;
use kombu_vector::similarity;
use kombu_vector::{validate_vector, IdFilter, Result, SearchHit, VectorError, VectorIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// LSH configuration parameters. Fields omitted from a serialized
/// config fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshConfig {
    /// Number of independent hash tables (L).
    pub tables: usize,

    /// Signature bits per table (k). Packed into a `u64` key, so at
    /// most 64.
    pub hash_bits: usize,

    /// When a query's bucket union is empty, probe neighboring buckets by
    /// flipping this many low-order signature bits, one at a time.
    /// 0 turns multi-probe off.
    pub probe_depth: usize,

    /// Seed for drawing hyperplanes.
    pub seed: u64,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            tables: 10,
            hash_bits: 16,
            probe_depth: 0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct LshEntry {
    vector: Vec<f32>,
    norm: f32,
    /// Bucket key per table; makes delete O(L) without rehashing.
    keys: Vec<u64>,
}

/// Random hyperplane LSH index.
///
/// # Performance
///
/// - Insert / delete: O(L * k * d)
/// - Search: O(L * k * d) hashing + O(candidates * d) re-rank
pub struct LshIndex {
    config: LshConfig,
    dimension: usize,
    /// `hyperplanes[table][bit]` is a unit normal, drawn once at
    /// construction and fixed thereafter.
    hyperplanes: Vec<Vec<Vec<f32>>>,
    /// `buckets[table]: signature -> ids`.
    buckets: Vec<HashMap<u64, Vec<Uuid>>>,
    entries: HashMap<Uuid, LshEntry>,
}

impl LshIndex {
    /// Create an empty index for vectors of the given dimension.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` when `tables == 0`, `hash_bits == 0`, or
    /// `hash_bits > 64`.
    pub fn new(dimension: usize, config: LshConfig) -> std::result::Result<Self, LshError> {
        if config.tables == 0 {
            return Err(LshError::InvalidParams("tables must be >= 1".to_string()));
        }
        if config.hash_bits == 0 || config.hash_bits > 64 {
            return Err(LshError::InvalidParams(format!(
                "hash_bits must be in 1..=64, got {}",
                config.hash_bits
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let hyperplanes = (0..config.tables)
            .map(|_| {
                (0..config.hash_bits)
                    .map(|_| random_unit_normal(&mut rng, dimension))
                    .collect()
            })
            .collect();

        let buckets = (0..config.tables).map(|_| HashMap::new()).collect();

        Ok(Self {
            config,
            dimension,
            hyperplanes,
            buckets,
            entries: HashMap::new(),
        })
    }

    /// Configuration this index was built with.
    pub fn config(&self) -> &LshConfig {
        &self.config
    }

    /// The k-bit signature of a vector in one table: bit `i` is set when
    /// the vector lies on the positive side of hyperplane `i`.
    fn signature(&self, vector: &[f32], table: usize) -> u64 {
        let mut key = 0u64;
        for (bit, hyperplane) in self.hyperplanes[table].iter().enumerate() {
            if similarity::dot_unchecked(vector, hyperplane) >= 0.0 {
                key |= 1 << bit;
            }
        }
        key
    }

    fn signatures(&self, vector: &[f32]) -> Vec<u64> {
        (0..self.config.tables)
            .map(|t| self.signature(vector, t))
            .collect()
    }

    /// Union of the buckets the query hashes into, across all tables.
    /// When empty and multi-probe is enabled, widen one flipped bit at a
    /// time until something turns up or the probe budget runs out.
    fn collect_candidates(&self, keys: &[u64]) -> HashSet<Uuid> {
        let mut candidates: HashSet<Uuid> = HashSet::new();

        for (table, &key) in keys.iter().enumerate() {
            if let Some(bucket) = self.buckets[table].get(&key) {
                candidates.extend(bucket.iter().copied());
            }
        }

        if candidates.is_empty() && self.config.probe_depth > 0 {
            let probes = self.config.probe_depth.min(self.config.hash_bits);
            for bit in 0..probes {
                for (table, &key) in keys.iter().enumerate() {
                    if let Some(bucket) = self.buckets[table].get(&(key ^ (1 << bit))) {
                        candidates.extend(bucket.iter().copied());
                    }
                }
                if !candidates.is_empty() {
                    break;
                }
            }
        }

        candidates
    }
}

impl VectorIndex for LshIndex {
    fn build(&mut self, entries: Vec<(Uuid, Vec<f32>)>) -> Result<()> {
        self.clear();
        for (id, vector) in entries {
            self.insert(id, vector)?;
        }
        Ok(())
    }

    fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> Result<()> {
        validate_vector(&vector, self.dimension)?;
        if self.entries.contains_key(&id) {
            return Err(VectorError::Duplicate(id));
        }

        let keys = self.signatures(&vector);
        for (table, &key) in keys.iter().enumerate() {
            self.buckets[table].entry(key).or_default().push(id);
        }

        let norm = similarity::norm(&vector);
        self.entries.insert(id, LshEntry { vector, norm, keys });
        Ok(())
    }

    fn delete(&mut self, id: &Uuid) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };

        for (table, key) in entry.keys.iter().enumerate() {
            if let Some(bucket) = self.buckets[table].get_mut(key) {
                bucket.retain(|candidate| candidate != id);
                if bucket.is_empty() {
                    self.buckets[table].remove(key);
                }
            }
        }
        true
    }

    fn search(&self, query: &[f32], k: usize, filter: Option<&IdFilter>) -> Result<Vec<SearchHit>> {
        validate_vector(query, self.dimension)?;
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let keys = self.signatures(query);
        let candidates = self.collect_candidates(&keys);
        if candidates.is_empty() {
            // No linear-scan fallback: an empty result is acceptable here.
            return Ok(Vec::new());
        }

        let query_norm = similarity::norm(query);

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|id| filter.map(|f| f(id)).unwrap_or(true))
            .filter_map(|id| {
                let entry = self.entries.get(&id)?;
                let dot = similarity::dot_unchecked(query, &entry.vector);
                let score = similarity::cosine_from_parts(dot, query_norm, entry.norm);
                Some(SearchHit::new(id, score))
            })
            .collect();

        hits.sort();
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn clear(&mut self) {
        // Hyperplanes are structural (seeded at construction) and survive
        // a clear, so rebuilds hash into the same buckets.
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.entries.clear();
    }
}

/// Draw a unit-length normal from the seeded RNG.
///
/// Components come from a Box-Muller transform, so the direction is
/// uniform on the sphere.
fn random_unit_normal(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dimension).map(|_| gaussian(rng)).collect();
    let norm = similarity::norm(&v);
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use kombu_vector::BruteForceIndex;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_invalid_params() {
        assert!(LshIndex::new(8, LshConfig { tables: 0, ..Default::default() }).is_err());
        assert!(LshIndex::new(8, LshConfig { hash_bits: 0, ..Default::default() }).is_err());
        assert!(LshIndex::new(8, LshConfig { hash_bits: 65, ..Default::default() }).is_err());
    }

    #[test]
    fn test_insert_and_search_self() {
        let mut index = LshIndex::new(8, LshConfig::default()).unwrap();
        index.insert(id(1), vec![0.5; 8]).unwrap();
        // Scaled copies share every sign bit, so they always collide.
        index.insert(id(2), vec![1.0; 8]).unwrap();

        let hits = index.search(&[0.5; 8], 5, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_duplicate_insert() {
        let mut index = LshIndex::new(4, LshConfig::default()).unwrap();
        index.insert(id(1), vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let result = index.insert(id(1), vec![0.0, 1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(VectorError::Duplicate(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = LshIndex::new(4, LshConfig::default()).unwrap();
        assert!(index.insert(id(1), vec![1.0, 0.0]).is_err());
        assert!(index.search(&[1.0, 0.0], 1, None).is_err());
    }

    #[test]
    fn test_delete_removes_from_buckets() {
        let mut index = LshIndex::new(8, LshConfig::default()).unwrap();
        index.insert(id(1), vec![0.5; 8]).unwrap();
        index.insert(id(2), vec![1.0; 8]).unwrap();

        assert!(index.delete(&id(1)));
        assert!(!index.delete(&id(1)));
        assert_eq!(index.len(), 1);

        let hits = index.search(&[0.5; 8], 5, None).unwrap();
        assert!(hits.iter().all(|h| h.id != id(1)));
    }

    #[test]
    fn test_opposite_vector_misses_without_probing() {
        let config = LshConfig { tables: 1, hash_bits: 8, probe_depth: 0, seed: 3 };
        let mut index = LshIndex::new(8, config).unwrap();
        index.insert(id(1), vec![0.7; 8]).unwrap();

        // The negated vector flips every signature bit, so its bucket is
        // empty and the base design returns nothing.
        let hits = index.search(&[-0.7; 8], 5, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_multi_probe_widens_single_bits() {
        let config = LshConfig { tables: 1, hash_bits: 1, probe_depth: 1, seed: 3 };
        let mut index = LshIndex::new(8, config).unwrap();
        index.insert(id(1), vec![0.7; 8]).unwrap();

        // One signature bit: the negated query differs in exactly that
        // bit, so a depth-1 probe reaches the occupied bucket.
        let hits = index.search(&[-0.7; 8], 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id(1));
        assert!((hits[0].score + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_filter() {
        let mut index = LshIndex::new(8, LshConfig::default()).unwrap();
        index.insert(id(1), vec![0.5; 8]).unwrap();
        index.insert(id(2), vec![1.0; 8]).unwrap();

        let filter = |candidate: &Uuid| *candidate != id(1);
        let hits = index.search(&[0.5; 8], 5, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id(2));
    }

    #[test]
    fn test_build_replaces_and_rehashes_identically() {
        let mut index = LshIndex::new(8, LshConfig::default()).unwrap();
        index.insert(id(1), vec![0.5; 8]).unwrap();

        let data = vec![(id(2), vec![1.0; 8]), (id(3), vec![0.25; 8])];
        index.build(data).unwrap();

        assert_eq!(index.len(), 2);
        let hits = index.search(&[0.5; 8], 5, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.id != id(1)));
    }

    #[test]
    fn test_recall_against_brute_force() {
        // Wide buckets (few bits, many tables) so the candidate pool is
        // large enough for a strong recall bound on uniform random data.
        let config = LshConfig { tables: 30, hash_bits: 6, probe_depth: 0, seed: 11 };
        let mut rng = StdRng::seed_from_u64(5);
        let n = 2_000;
        let dims = 32;
        let k = 10;

        let data: Vec<(Uuid, Vec<f32>)> = (0..n)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
                (id(i as u128), v)
            })
            .collect();

        let mut exact = BruteForceIndex::new(dims);
        exact.build(data.clone()).unwrap();

        let mut approx = LshIndex::new(dims, config).unwrap();
        approx.build(data).unwrap();

        let mut matched = 0usize;
        let mut total = 0usize;
        for _ in 0..20 {
            let query: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let truth: HashSet<Uuid> = exact
                .search(&query, k, None)
                .unwrap()
                .into_iter()
                .map(|h| h.id)
                .collect();
            let found = approx.search(&query, k, None).unwrap();

            matched += found.iter().filter(|h| truth.contains(&h.id)).count();
            total += k;
        }

        let recall = matched as f64 / total as f64;
        assert!(recall >= 0.9, "recall@{} = {:.3}", k, recall);
    }
}
