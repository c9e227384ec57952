//! Service-level error types.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// The entity kinds referenced by errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Library,
    Document,
    Chunk,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Library => "library",
            Entity::Document => "document",
            Entity::Chunk => "chunk",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Uuid },

    #[error("duplicate {entity} id {id}")]
    Duplicate { entity: Entity, id: Uuid },

    #[error("{parent} {id} not found for new {child}")]
    ParentMissing {
        parent: Entity,
        id: Uuid,
        child: Entity,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("embedding provider rate limited: {0}")]
    RateLimited(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("no snapshot at {}", path.display())]
    SnapshotMissing { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: Entity, id: Uuid) -> Self {
        Error::NotFound { entity, id }
    }

    pub fn parent_missing(parent: Entity, id: Uuid, child: Entity) -> Self {
        Error::ParentMissing { parent, id, child }
    }
}

impl From<kombu_vector::VectorError> for Error {
    fn from(err: kombu_vector::VectorError) -> Self {
        use kombu_vector::VectorError;
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                Error::DimensionMismatch { expected, actual }
            }
            VectorError::Duplicate(id) => Error::Duplicate {
                entity: Entity::Chunk,
                id,
            },
            VectorError::InvalidVector(msg) => Error::InvalidParameter(msg),
        }
    }
}

impl From<kombu_lsh::LshError> for Error {
    fn from(err: kombu_lsh::LshError) -> Self {
        Error::InvalidParameter(err.to_string())
    }
}

impl From<crate::embed::EmbedError> for Error {
    fn from(err: crate::embed::EmbedError) -> Self {
        use crate::embed::EmbedError;
        match err {
            EmbedError::Unavailable(msg) => Error::ProviderUnavailable(msg),
            EmbedError::RateLimited(msg) => Error::RateLimited(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
