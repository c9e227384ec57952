//! The library service: CRUD with cascades, index rebuild, and the
//! search pipeline.
//!
//! Locking layout: a registry map (`library_id -> cell`) and a routing
//! map (`document_id / chunk_id -> library_id`) sit under short-lived
//! `parking_lot` locks; each cell holds the library's repositories and
//! index behind the writer-priority [`RwLock`](crate::rwlock::RwLock).
//! Operations on different libraries proceed independently; writes to one
//! library are serialized and linearizable with respect to its reads.
//!
//! Embedding-provider calls can block on I/O and therefore always happen
//! before any guard is acquired, on both the write path (add chunk) and
//! the read path (search).

use crate::config::StoreConfig;
use crate::embed::EmbeddingProvider;
use crate::error::{Entity, Error, Result};
use crate::filter::Filter;
use crate::index::AnyIndex;
use crate::model::{
    Chunk, ChunkId, Document, DocumentId, IndexKind, IndexParams, Library, LibraryId, Metadata,
};
use crate::repository::LibraryState;
use crate::rwlock::RwLock;
use kombu_vector::{IdFilter, VectorIndex};
use parking_lot::RwLock as MapLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Inputs for creating a library.
#[derive(Debug, Clone)]
pub struct LibrarySpec {
    pub name: String,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub kind: IndexKind,
    pub dimension: usize,
    /// Explicit index parameters; defaults from [`StoreConfig`] when
    /// absent. Must agree with `kind`.
    pub params: Option<IndexParams>,
}

impl LibrarySpec {
    pub fn new(name: impl Into<String>, kind: IndexKind, dimension: usize) -> Self {
        Self {
            name: name.into(),
            description: None,
            metadata: Metadata::new(),
            kind,
            dimension,
            params: None,
        }
    }

    pub fn with_params(mut self, params: IndexParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update for a library. Names are not unique; the id is
/// authoritative.
#[derive(Debug, Clone, Default)]
pub struct LibraryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Partial update for a document.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Inputs for creating a chunk. When `embedding` is absent the provider
/// embeds `content`; when present it is validated against the library
/// dimension and stored as-is.
#[derive(Debug, Clone)]
pub struct ChunkSpec {
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

impl ChunkSpec {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A k-NN query against one library. Exactly one of `text` / `vector`
/// must be set.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub k: usize,
    pub filter: Option<Filter>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: Some(text.into()),
            vector: None,
            k,
            filter: None,
        }
    }

    pub fn vector(vector: Vec<f32>, k: usize) -> Self {
        Self {
            text: None,
            vector: Some(vector),
            k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One ranked search result with the chunk materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Counters for one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryStats {
    pub documents: usize,
    pub chunks: usize,
    pub index_size: usize,
    pub dimension: usize,
    pub kind: IndexKind,
}

struct LibraryCell {
    state: RwLock<LibraryState>,
}

#[derive(Default)]
struct Routes {
    documents: HashMap<DocumentId, LibraryId>,
    chunks: HashMap<ChunkId, LibraryId>,
}

/// Orchestrates all mutating and query paths over libraries, documents,
/// chunks, and their indexes.
pub struct LibraryService {
    provider: Arc<dyn EmbeddingProvider>,
    config: StoreConfig,
    libraries: MapLock<HashMap<LibraryId, Arc<LibraryCell>>>,
    routes: MapLock<Routes>,
}

impl LibraryService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: StoreConfig) -> Self {
        Self {
            provider,
            config,
            libraries: MapLock::new(HashMap::new()),
            routes: MapLock::new(Routes::default()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- libraries ----

    pub fn create_library(&self, spec: LibrarySpec) -> Result<Library> {
        if spec.dimension == 0 {
            return Err(Error::InvalidParameter(
                "dimension must be >= 1".to_string(),
            ));
        }
        if spec.name.is_empty() {
            return Err(Error::InvalidParameter("name must not be empty".to_string()));
        }

        let params = match spec.params {
            Some(params) => {
                if params.kind() != spec.kind {
                    return Err(Error::InvalidParameter(format!(
                        "index params are for {:?}, library kind is {:?}",
                        params.kind(),
                        spec.kind
                    )));
                }
                params
            }
            None => self.config.default_params(spec.kind),
        };

        let index = AnyIndex::create(spec.dimension, &params)?;
        let library = Library::new(
            spec.name,
            spec.description,
            spec.metadata,
            spec.dimension,
            params,
        );

        let cell = Arc::new(LibraryCell {
            state: RwLock::new(LibraryState::new(library.clone(), index)),
        });
        self.libraries.write().insert(library.id, cell);

        tracing::info!(
            library = %library.id,
            kind = ?library.kind,
            dimension = library.dimension,
            "created library"
        );
        Ok(library)
    }

    pub fn get_library(&self, library_id: LibraryId) -> Result<Library> {
        let cell = self.cell(library_id)?;
        let state = cell.state.read();
        Ok(state.library.clone())
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        let cells: Vec<Arc<LibraryCell>> = self.libraries.read().values().cloned().collect();
        let mut libraries: Vec<Library> = cells
            .iter()
            .map(|cell| cell.state.read().library.clone())
            .collect();
        libraries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        libraries
    }

    pub fn update_library(&self, library_id: LibraryId, update: LibraryUpdate) -> Result<Library> {
        let cell = self.cell(library_id)?;
        let mut state = cell.state.write();

        if let Some(name) = update.name {
            if name.is_empty() {
                return Err(Error::InvalidParameter("name must not be empty".to_string()));
            }
            state.library.name = name;
        }
        if let Some(description) = update.description {
            state.library.description = Some(description);
        }
        if let Some(metadata) = update.metadata {
            state.library.metadata = metadata;
        }
        state.library.touch();
        Ok(state.library.clone())
    }

    /// Destroy a library, cascading through its documents and chunks.
    pub fn delete_library(&self, library_id: LibraryId) -> Result<()> {
        // Unregister first so no new operation can resolve the library,
        // then drain it under its own write lock.
        let cell = self
            .libraries
            .write()
            .remove(&library_id)
            .ok_or_else(|| Error::not_found(Entity::Library, library_id))?;

        let mut state = cell.state.write();
        let document_ids = state.documents.ids();
        let chunk_ids = state.chunks.ids();
        state.index.clear();

        let mut routes = self.routes.write();
        for id in &document_ids {
            routes.documents.remove(id);
        }
        for id in &chunk_ids {
            routes.chunks.remove(id);
        }

        tracing::info!(
            library = %library_id,
            documents = document_ids.len(),
            chunks = chunk_ids.len(),
            "deleted library"
        );
        Ok(())
    }

    pub fn library_stats(&self, library_id: LibraryId) -> Result<LibraryStats> {
        let cell = self.cell(library_id)?;
        let state = cell.state.read();
        Ok(LibraryStats {
            documents: state.documents.len(),
            chunks: state.chunks.len(),
            index_size: state.index.len(),
            dimension: state.library.dimension,
            kind: state.library.kind,
        })
    }

    // ---- documents ----

    pub fn create_document(
        &self,
        library_id: LibraryId,
        name: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Document> {
        let cell = self
            .try_cell(library_id)
            .ok_or_else(|| Error::parent_missing(Entity::Library, library_id, Entity::Document))?;

        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidParameter("name must not be empty".to_string()));
        }

        let mut state = cell.state.write();
        let document = Document::new(library_id, name, metadata);
        state.documents.insert(document.clone());
        state.library.document_ids.push(document.id);
        state.library.touch();
        self.routes.write().documents.insert(document.id, library_id);

        tracing::debug!(library = %library_id, document = %document.id, "created document");
        Ok(document)
    }

    pub fn get_document(&self, document_id: DocumentId) -> Result<Document> {
        let library_id = self.route_document(document_id)?;
        let cell = self.cell(library_id)?;
        let state = cell.state.read();
        state
            .documents
            .get(&document_id)
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::Document, document_id))
    }

    pub fn list_documents(&self, library_id: LibraryId) -> Result<Vec<Document>> {
        let cell = self.cell(library_id)?;
        let state = cell.state.read();
        let mut documents: Vec<Document> = state.documents.iter().cloned().collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(documents)
    }

    pub fn update_document(
        &self,
        document_id: DocumentId,
        update: DocumentUpdate,
    ) -> Result<Document> {
        let library_id = self.route_document(document_id)?;
        let cell = self.cell(library_id)?;
        let mut state = cell.state.write();

        let document = state
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| Error::not_found(Entity::Document, document_id))?;

        if let Some(name) = update.name {
            if name.is_empty() {
                return Err(Error::InvalidParameter("name must not be empty".to_string()));
            }
            document.name = name;
        }
        if let Some(metadata) = update.metadata {
            document.metadata = metadata;
        }
        document.touch();
        Ok(document.clone())
    }

    /// Destroy a document and every chunk under it, unindexing each chunk
    /// before its record is dropped.
    pub fn delete_document(&self, document_id: DocumentId) -> Result<()> {
        let library_id = self.route_document(document_id)?;
        let cell = self.cell(library_id)?;
        let mut state = cell.state.write();

        let document = state
            .documents
            .remove(&document_id)
            .ok_or_else(|| Error::not_found(Entity::Document, document_id))?;

        for chunk_id in &document.chunk_ids {
            state.index.delete(chunk_id);
            state.chunks.remove(chunk_id);
        }
        state.library.document_ids.retain(|id| *id != document_id);
        state.library.touch();

        let mut routes = self.routes.write();
        routes.documents.remove(&document_id);
        for chunk_id in &document.chunk_ids {
            routes.chunks.remove(chunk_id);
        }

        tracing::debug!(
            library = %library_id,
            document = %document_id,
            chunks = document.chunk_ids.len(),
            "deleted document"
        );
        Ok(())
    }

    // ---- chunks ----

    pub fn add_chunk(&self, document_id: DocumentId, spec: ChunkSpec) -> Result<Chunk> {
        let library_id = self.route_document_as_parent(document_id)?;
        let cell = self
            .try_cell(library_id)
            .ok_or_else(|| Error::parent_missing(Entity::Document, document_id, Entity::Chunk))?;

        // Embed before taking the write lock; provider calls may block.
        let embedding = match spec.embedding {
            Some(vector) => vector,
            None => self.provider.embed(&spec.content)?,
        };

        let mut state = cell.state.write();
        if !state.documents.contains(&document_id) {
            return Err(Error::parent_missing(
                Entity::Document,
                document_id,
                Entity::Chunk,
            ));
        }

        let chunk = Chunk::new(document_id, spec.content, spec.metadata, embedding);

        // Index first: a dimension mismatch must leave no partial state.
        state.index.insert(chunk.id, chunk.embedding.clone())?;
        state.chunks.insert(chunk.clone());
        if let Some(document) = state.documents.get_mut(&document_id) {
            document.chunk_ids.push(chunk.id);
            document.touch();
        }
        self.routes.write().chunks.insert(chunk.id, library_id);

        tracing::debug!(library = %library_id, chunk = %chunk.id, "added chunk");
        Ok(chunk)
    }

    /// Batch insert: one provider round-trip for all unembedded texts,
    /// one write-lock acquisition, all-or-nothing.
    pub fn add_chunks(&self, document_id: DocumentId, specs: Vec<ChunkSpec>) -> Result<Vec<Chunk>> {
        let library_id = self.route_document_as_parent(document_id)?;
        let cell = self
            .try_cell(library_id)
            .ok_or_else(|| Error::parent_missing(Entity::Document, document_id, Entity::Chunk))?;

        let pending: Vec<String> = specs
            .iter()
            .filter(|spec| spec.embedding.is_none())
            .map(|spec| spec.content.clone())
            .collect();
        let mut computed = if pending.is_empty() {
            Vec::new()
        } else {
            self.provider.embed_batch(&pending)?
        }
        .into_iter();

        let mut chunks: Vec<Chunk> = Vec::with_capacity(specs.len());
        for spec in specs {
            let embedding = match spec.embedding {
                Some(vector) => vector,
                None => computed.next().ok_or_else(|| {
                    Error::Internal("provider returned fewer embeddings than requested".to_string())
                })?,
            };
            chunks.push(Chunk::new(document_id, spec.content, spec.metadata, embedding));
        }

        let mut state = cell.state.write();
        if !state.documents.contains(&document_id) {
            return Err(Error::parent_missing(
                Entity::Document,
                document_id,
                Entity::Chunk,
            ));
        }

        let mut indexed: Vec<ChunkId> = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            if let Err(err) = state.index.insert(chunk.id, chunk.embedding.clone()) {
                // Roll the batch back so the failed insert leaves nothing.
                for id in &indexed {
                    state.index.delete(id);
                }
                return Err(err.into());
            }
            indexed.push(chunk.id);
        }

        for chunk in &chunks {
            state.chunks.insert(chunk.clone());
        }
        if let Some(document) = state.documents.get_mut(&document_id) {
            document.chunk_ids.extend(chunks.iter().map(|c| c.id));
            document.touch();
        }

        let mut routes = self.routes.write();
        for chunk in &chunks {
            routes.chunks.insert(chunk.id, library_id);
        }

        tracing::debug!(library = %library_id, count = chunks.len(), "added chunk batch");
        Ok(chunks)
    }

    pub fn get_chunk(&self, chunk_id: ChunkId) -> Result<Chunk> {
        let library_id = self.route_chunk(chunk_id)?;
        let cell = self.cell(library_id)?;
        let state = cell.state.read();
        state
            .chunks
            .get(&chunk_id)
            .cloned()
            .ok_or_else(|| Error::not_found(Entity::Chunk, chunk_id))
    }

    pub fn list_chunks(&self, document_id: DocumentId) -> Result<Vec<Chunk>> {
        let library_id = self.route_document(document_id)?;
        let cell = self.cell(library_id)?;
        let state = cell.state.read();

        let document = state
            .documents
            .get(&document_id)
            .ok_or_else(|| Error::not_found(Entity::Document, document_id))?;

        Ok(document
            .chunk_ids
            .iter()
            .filter_map(|id| state.chunks.get(id).cloned())
            .collect())
    }

    /// Remove a chunk: index entry first, then the record.
    pub fn delete_chunk(&self, chunk_id: ChunkId) -> Result<()> {
        let library_id = self.route_chunk(chunk_id)?;
        let cell = self.cell(library_id)?;
        let mut state = cell.state.write();

        if !state.chunks.contains(&chunk_id) {
            return Err(Error::not_found(Entity::Chunk, chunk_id));
        }
        if !state.index.delete(&chunk_id) {
            // The chunk record exists but the index never saw it; the
            // invariant is broken and rebuild_index is the recovery path.
            tracing::error!(library = %library_id, chunk = %chunk_id, "index entry missing for stored chunk");
            return Err(Error::Internal(format!(
                "index entry missing for chunk {}",
                chunk_id
            )));
        }

        if let Some(chunk) = state.chunks.remove(&chunk_id) {
            if let Some(document) = state.documents.get_mut(&chunk.document_id) {
                document.chunk_ids.retain(|id| *id != chunk_id);
                document.touch();
            }
        }
        self.routes.write().chunks.remove(&chunk_id);

        tracing::debug!(library = %library_id, chunk = %chunk_id, "deleted chunk");
        Ok(())
    }

    // ---- index ----

    /// Rebuild the library's index from its chunks. Recovery path after
    /// an invariant breach, and the compaction path after many deletes.
    pub fn rebuild_index(&self, library_id: LibraryId) -> Result<()> {
        let cell = self.cell(library_id)?;
        let mut state = cell.state.write();

        let entries: Vec<(Uuid, Vec<f32>)> = state
            .chunks
            .iter()
            .map(|chunk| (chunk.id, chunk.embedding.clone()))
            .collect();
        let count = entries.len();
        state.index.build(entries)?;

        tracing::info!(library = %library_id, chunks = count, "rebuilt index");
        Ok(())
    }

    // ---- search ----

    /// The search pipeline: embed (outside the lock) → probe the index
    /// with the metadata filter lowered to an id predicate → materialize
    /// chunks → ranked results.
    pub fn search(&self, library_id: LibraryId, query: SearchQuery) -> Result<Vec<SearchResult>> {
        if query.k == 0 {
            return Err(Error::InvalidParameter("k must be >= 1".to_string()));
        }

        let cell = self.cell(library_id)?;

        let vector = match (query.text, query.vector) {
            (Some(text), None) => self.provider.embed(&text)?,
            (None, Some(vector)) => vector,
            (Some(_), Some(_)) => {
                return Err(Error::InvalidParameter(
                    "query supplies both text and vector".to_string(),
                ))
            }
            (None, None) => {
                return Err(Error::InvalidParameter(
                    "query supplies neither text nor vector".to_string(),
                ))
            }
        };

        let guard = cell.state.read();
        let state = &*guard;

        if vector.len() != state.library.dimension {
            return Err(Error::DimensionMismatch {
                expected: state.library.dimension,
                actual: vector.len(),
            });
        }

        let hits = match &query.filter {
            Some(filter) if !filter.is_empty() => {
                let accept = |id: &Uuid| {
                    state
                        .chunks
                        .get(id)
                        .map(|chunk| filter.matches(&chunk.metadata))
                        .unwrap_or(false)
                };
                let accept: &IdFilter = &accept;
                state.index.search(&vector, query.k, Some(accept))?
            }
            _ => state.index.search(&vector, query.k, None)?,
        };

        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter_map(|hit| match state.chunks.get(&hit.id) {
                Some(chunk) => Some(SearchResult {
                    chunk_id: chunk.id,
                    document_id: chunk.document_id,
                    content: chunk.content.clone(),
                    metadata: chunk.metadata.clone(),
                    score: hit.score,
                }),
                None => {
                    // Stale-tolerant read: the probe returned an id that no
                    // longer materializes.
                    tracing::warn!(library = %library_id, chunk = %hit.id, "dropping unmaterializable hit");
                    None
                }
            })
            .collect();

        tracing::debug!(
            library = %library_id,
            k = query.k,
            results = results.len(),
            "search complete"
        );
        Ok(results)
    }

    // ---- internals ----

    fn cell(&self, library_id: LibraryId) -> Result<Arc<LibraryCell>> {
        self.try_cell(library_id)
            .ok_or_else(|| Error::not_found(Entity::Library, library_id))
    }

    fn try_cell(&self, library_id: LibraryId) -> Option<Arc<LibraryCell>> {
        self.libraries.read().get(&library_id).cloned()
    }

    fn route_document(&self, document_id: DocumentId) -> Result<LibraryId> {
        self.routes
            .read()
            .documents
            .get(&document_id)
            .copied()
            .ok_or_else(|| Error::not_found(Entity::Document, document_id))
    }

    /// Like [`route_document`](Self::route_document) but reports the miss
    /// as a broken parent link, for chunk creation.
    fn route_document_as_parent(&self, document_id: DocumentId) -> Result<LibraryId> {
        self.routes
            .read()
            .documents
            .get(&document_id)
            .copied()
            .ok_or_else(|| Error::parent_missing(Entity::Document, document_id, Entity::Chunk))
    }

    fn route_chunk(&self, chunk_id: ChunkId) -> Result<LibraryId> {
        self.routes
            .read()
            .chunks
            .get(&chunk_id)
            .copied()
            .ok_or_else(|| Error::not_found(Entity::Chunk, chunk_id))
    }

    /// Install freshly restored library states, replacing all current
    /// contents. Used by snapshot load.
    pub(crate) fn install(
        &self,
        states: Vec<LibraryState>,
    ) {
        let mut libraries = HashMap::new();
        let mut routes = Routes::default();

        for state in states {
            let library_id = state.library.id;
            for document_id in state.documents.ids() {
                routes.documents.insert(document_id, library_id);
            }
            for chunk_id in state.chunks.ids() {
                routes.chunks.insert(chunk_id, library_id);
            }
            libraries.insert(
                library_id,
                Arc::new(LibraryCell {
                    state: RwLock::new(state),
                }),
            );
        }

        *self.libraries.write() = libraries;
        *self.routes.write() = routes;
    }

    /// Clone out every library's state for snapshotting. Each library is
    /// captured under its own read lock; there is no cross-library order.
    pub(crate) fn export(&self) -> Vec<(Library, Vec<Document>, Vec<Chunk>)> {
        let cells: Vec<Arc<LibraryCell>> = self.libraries.read().values().cloned().collect();
        cells
            .iter()
            .map(|cell| {
                let state = cell.state.read();
                (
                    state.library.clone(),
                    state.documents.iter().cloned().collect(),
                    state.chunks.iter().cloned().collect(),
                )
            })
            .collect()
    }
}
