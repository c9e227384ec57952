//! Static dispatch over the three index families.

use crate::error::{Error, Result};
use crate::model::{IndexKind, IndexParams};
use kombu_hnsw::HnswIndex;
use kombu_lsh::LshIndex;
use kombu_vector::{BruteForceIndex, IdFilter, SearchHit, VectorIndex};
use uuid::Uuid;

/// The index instance a library owns, as a tagged variant so dispatch is
/// static per library.
pub enum AnyIndex {
    BruteForce(BruteForceIndex),
    Hnsw(HnswIndex),
    Lsh(LshIndex),
}

impl AnyIndex {
    /// Instantiate an index for the given dimension and parameters.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for out-of-range parameters (HNSW `m < 2` or
    /// zero widths, LSH table/bit bounds).
    pub fn create(dimension: usize, params: &IndexParams) -> Result<Self> {
        match params {
            IndexParams::BruteForce => Ok(AnyIndex::BruteForce(BruteForceIndex::new(dimension))),
            IndexParams::Hnsw(config) => {
                if config.m < 2 {
                    return Err(Error::InvalidParameter(format!(
                        "hnsw m must be >= 2, got {}",
                        config.m
                    )));
                }
                if config.m_max0 < config.m {
                    return Err(Error::InvalidParameter(format!(
                        "hnsw m_max0 ({}) must be >= m ({})",
                        config.m_max0, config.m
                    )));
                }
                if config.ef_construction == 0 || config.ef_search == 0 {
                    return Err(Error::InvalidParameter(
                        "hnsw ef_construction and ef_search must be >= 1".to_string(),
                    ));
                }
                if config.max_layers == 0 {
                    return Err(Error::InvalidParameter(
                        "hnsw max_layers must be >= 1".to_string(),
                    ));
                }
                Ok(AnyIndex::Hnsw(HnswIndex::new(dimension, config.clone())))
            }
            IndexParams::Lsh(config) => {
                let index = LshIndex::new(dimension, config.clone())?;
                Ok(AnyIndex::Lsh(index))
            }
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            AnyIndex::BruteForce(_) => IndexKind::BruteForce,
            AnyIndex::Hnsw(_) => IndexKind::Hnsw,
            AnyIndex::Lsh(_) => IndexKind::Lsh,
        }
    }
}

impl VectorIndex for AnyIndex {
    fn build(&mut self, entries: Vec<(Uuid, Vec<f32>)>) -> kombu_vector::Result<()> {
        match self {
            AnyIndex::BruteForce(index) => index.build(entries),
            AnyIndex::Hnsw(index) => index.build(entries),
            AnyIndex::Lsh(index) => index.build(entries),
        }
    }

    fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> kombu_vector::Result<()> {
        match self {
            AnyIndex::BruteForce(index) => index.insert(id, vector),
            AnyIndex::Hnsw(index) => index.insert(id, vector),
            AnyIndex::Lsh(index) => index.insert(id, vector),
        }
    }

    fn delete(&mut self, id: &Uuid) -> bool {
        match self {
            AnyIndex::BruteForce(index) => index.delete(id),
            AnyIndex::Hnsw(index) => index.delete(id),
            AnyIndex::Lsh(index) => index.delete(id),
        }
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&IdFilter>,
    ) -> kombu_vector::Result<Vec<SearchHit>> {
        match self {
            AnyIndex::BruteForce(index) => index.search(query, k, filter),
            AnyIndex::Hnsw(index) => index.search(query, k, filter),
            AnyIndex::Lsh(index) => index.search(query, k, filter),
        }
    }

    fn len(&self) -> usize {
        match self {
            AnyIndex::BruteForce(index) => index.len(),
            AnyIndex::Hnsw(index) => index.len(),
            AnyIndex::Lsh(index) => index.len(),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            AnyIndex::BruteForce(index) => index.dimension(),
            AnyIndex::Hnsw(index) => index.dimension(),
            AnyIndex::Lsh(index) => index.dimension(),
        }
    }

    fn clear(&mut self) {
        match self {
            AnyIndex::BruteForce(index) => index.clear(),
            AnyIndex::Hnsw(index) => index.clear(),
            AnyIndex::Lsh(index) => index.clear(),
        }
    }
}
