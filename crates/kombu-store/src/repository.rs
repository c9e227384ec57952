//! In-memory entity repositories.
//!
//! Plain id-keyed maps with no locking of their own; the service composes
//! them (together with the index) under the owning library's RW lock.

use crate::index::AnyIndex;
use crate::model::{Chunk, ChunkId, Document, DocumentId, Library};
use std::collections::HashMap;

/// `document_id -> Document` for one library.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<DocumentId, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn get_mut(&mut self, id: &DocumentId) -> Option<&mut Document> {
        self.docs.get_mut(id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.docs.contains_key(id)
    }

    pub fn insert(&mut self, document: Document) {
        self.docs.insert(document.id, document);
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        self.docs.remove(id)
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.docs.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// `chunk_id -> Chunk` for one library.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkId, Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.id, chunk);
    }

    pub fn remove(&mut self, id: &ChunkId) -> Option<Chunk> {
        self.chunks.remove(id)
    }

    pub fn ids(&self) -> Vec<ChunkId> {
        self.chunks.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Everything one library's RW lock guards: the library record, its
/// document and chunk repositories, and its index.
///
/// Invariant after every committed mutation: the index holds exactly one
/// entry per chunk in `chunks`, and every indexed id resolves here.
pub struct LibraryState {
    pub library: Library,
    pub documents: DocumentStore,
    pub chunks: ChunkStore,
    pub index: AnyIndex,
}

impl LibraryState {
    pub fn new(library: Library, index: AnyIndex) -> Self {
        Self {
            library,
            documents: DocumentStore::new(),
            chunks: ChunkStore::new(),
            index,
        }
    }
}
