//! Entity storage and the library service for Kombu.
//!
//! This crate holds everything above the raw indexes:
//!
//! - **Models**: `Library` → `Document` → `Chunk`, linked by id only
//! - **Repositories**: plain id-keyed maps, composed under a lock by the
//!   service
//! - **RW lock**: a writer-priority, FIFO-fair reader-writer lock guarding
//!   each library's repositories and index as one unit
//! - **Filter**: conjunction of `key op value` predicates over chunk
//!   metadata
//! - **Embedding provider**: the trait the service consumes to turn text
//!   into vectors, plus a deterministic implementation for tests and dev
//! - **Service**: CRUD with cascades, index rebuild, and the search
//!   pipeline (embed → probe → filter → materialize)
//! - **Snapshots**: portable JSON and compact binary captures of all
//!   entities; indexes are rebuilt on load
//!
//! # Example
//!
//! ```
//! use kombu_store::{
//!     ChunkSpec, HashEmbedder, IndexKind, LibrarySpec, LibraryService, SearchQuery,
//!     StoreConfig,
//! };
//! use std::sync::Arc;
//!
//! let provider = Arc::new(HashEmbedder::new(64, 0));
//! let service = LibraryService::new(provider, StoreConfig::default());
//!
//! let library = service
//!     .create_library(LibrarySpec::new("notes", IndexKind::BruteForce, 64))
//!     .unwrap();
//! let document = service.create_document(library.id, "journal", Default::default()).unwrap();
//! service
//!     .add_chunk(document.id, ChunkSpec::new("the quick brown fox"))
//!     .unwrap();
//!
//! let results = service
//!     .search(library.id, SearchQuery::text("quick fox", 5))
//!     .unwrap();
//! assert_eq!(results.len(), 1);
//! ```

pub mod config;
pub mod embed;
pub mod error;
pub mod filter;
mod index;
pub mod model;
mod repository;
pub mod rwlock;
mod service;
pub mod snapshot;

pub use config::StoreConfig;
pub use embed::{EmbedError, EmbeddingProvider, HashEmbedder};
pub use error::{Entity, Error, Result};
pub use filter::{CompareOp, Filter, FilterParseError, FilterValue, Predicate};
pub use index::AnyIndex;
pub use model::{
    Chunk, ChunkId, Document, DocumentId, IndexKind, IndexParams, Library, LibraryId, Metadata,
    MetadataValue,
};
pub use service::{
    ChunkSpec, DocumentUpdate, LibrarySpec, LibraryService, LibraryStats, LibraryUpdate,
    SearchQuery, SearchResult,
};
pub use snapshot::{Snapshot, SnapshotFormat};
