//! Store configuration: default index parameters for new libraries.

use crate::error::Result;
use crate::index::AnyIndex;
use crate::model::{IndexKind, IndexParams};
use kombu_hnsw::HnswConfig;
use kombu_lsh::LshConfig;
use serde::{Deserialize, Serialize};

/// Defaults applied when a library is created without explicit index
/// parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default HNSW parameters.
    #[serde(default)]
    pub hnsw: HnswConfig,

    /// Default LSH parameters.
    #[serde(default)]
    pub lsh: LshConfig,
}

impl StoreConfig {
    /// The default parameters for an index of the given kind.
    pub fn default_params(&self, kind: IndexKind) -> IndexParams {
        match kind {
            IndexKind::BruteForce => IndexParams::BruteForce,
            IndexKind::Hnsw => IndexParams::Hnsw(self.hnsw.clone()),
            IndexKind::Lsh => IndexParams::Lsh(self.lsh.clone()),
        }
    }

    /// Validate the configured defaults by instantiating throwaway
    /// indexes with them.
    pub fn validate(&self) -> Result<()> {
        AnyIndex::create(1, &IndexParams::Hnsw(self.hnsw.clone()))?;
        AnyIndex::create(1, &IndexParams::Lsh(self.lsh.clone()))?;
        Ok(())
    }
}

impl StoreConfig {
    pub fn with_hnsw(mut self, hnsw: HnswConfig) -> Self {
        self.hnsw = hnsw;
        self
    }

    pub fn with_lsh(mut self, lsh: LshConfig) -> Self {
        self.lsh = lsh;
        self
    }
}
