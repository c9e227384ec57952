//! Domain models: libraries own documents, documents own chunks, and
//! every cross-entity link is an id.
//!
//! Entities live in id-keyed maps (see `repository`); nothing holds a
//! handle to another entity, which is what lets cascades walk top-down
//! and the index store bare chunk ids.

use kombu_hnsw::HnswConfig;
use kombu_lsh::LshConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub type LibraryId = Uuid;
pub type DocumentId = Uuid;
pub type ChunkId = Uuid;

/// Chunk/document/library metadata: string keys to scalar values.
pub type Metadata = HashMap<String, MetadataValue>;

/// A typed metadata value, used by filtered search.
///
/// Externally tagged (serde default) so the compact snapshot codec can
/// handle it; the HTTP layer converts to and from plain JSON scalars at
/// the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

/// Vector index algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    BruteForce,
    Hnsw,
    Lsh,
}

/// Per-kind index parameters, fixed at library creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexParams {
    BruteForce,
    Hnsw(HnswConfig),
    Lsh(LshConfig),
}

impl IndexParams {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexParams::BruteForce => IndexKind::BruteForce,
            IndexParams::Hnsw(_) => IndexKind::Hnsw,
            IndexParams::Lsh(_) => IndexKind::Lsh,
        }
    }
}

/// A library binds one index instance to an embedding dimension and owns
/// a set of documents. The dimension is fixed at creation; every vector
/// in the library's index has exactly this dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub kind: IndexKind,
    pub dimension: usize,
    pub params: IndexParams,
    pub document_ids: Vec<DocumentId>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Library {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        metadata: Metadata,
        dimension: usize,
        params: IndexParams,
    ) -> Self {
        let now = unix_now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description,
            metadata,
            kind: params.kind(),
            dimension,
            params,
            document_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

/// A named collection of chunks inside one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub library_id: LibraryId,
    pub name: String,
    pub metadata: Metadata,
    pub chunk_ids: Vec<ChunkId>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Document {
    pub fn new(library_id: LibraryId, name: impl Into<String>, metadata: Metadata) -> Self {
        let now = unix_now();
        Self {
            id: Uuid::new_v4(),
            library_id,
            name: name.into(),
            metadata,
            chunk_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

/// The smallest retrievable unit: a piece of text with its embedding.
/// The embedding is computed at creation and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Chunk {
    pub fn new(
        document_id: DocumentId,
        content: impl Into<String>,
        metadata: Metadata,
        embedding: Vec<f32>,
    ) -> Self {
        let now = unix_now();
        Self {
            id: Uuid::new_v4(),
            document_id,
            content: content.into(),
            metadata,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Seconds since the unix epoch; clamps to 0 if the clock is before it.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
