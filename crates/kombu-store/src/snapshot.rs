//! Snapshot persistence.
//!
//! Two on-disk forms, selected by [`SnapshotFormat`]:
//!
//! - **Json**: portable, pretty-printed `serde_json`
//! - **Binary**: compact `bincode` payload behind an 8-byte magic and a
//!   format version byte
//!
//! A snapshot captures every library (kind, dimension, index parameters
//! including seeds) and all documents and chunks with their vectors and
//! metadata. Index graph state is never persisted: loading rebuilds each
//! library's index from its chunks, which also makes a snapshot the
//! recovery path for a corrupted index.

use crate::error::{Error, Result};
use crate::index::AnyIndex;
use crate::model::{Chunk, Document, Library};
use crate::repository::{ChunkStore, DocumentStore, LibraryState};
use crate::service::LibraryService;
use kombu_vector::VectorIndex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Current snapshot container version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic prefix of the binary form.
const MAGIC: &[u8; 8] = b"KOMBUSNP";

/// Snapshot serialization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    Json,
    Binary,
}

impl FromStr for SnapshotFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(SnapshotFormat::Json),
            "binary" => Ok(SnapshotFormat::Binary),
            other => Err(Error::InvalidParameter(format!(
                "unknown snapshot format '{}' (expected json or binary)",
                other
            ))),
        }
    }
}

/// Everything captured for one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub library: Library,
    pub documents: Vec<Document>,
    pub chunks: Vec<Chunk>,
}

/// A full capture of the service's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub libraries: Vec<LibrarySnapshot>,
}

impl Snapshot {
    /// Encode with the given format.
    pub fn encode(&self, format: SnapshotFormat) -> Result<Vec<u8>> {
        match format {
            SnapshotFormat::Json => serde_json::to_vec_pretty(self)
                .map_err(|e| Error::Snapshot(format!("json encode: {}", e))),
            SnapshotFormat::Binary => {
                let payload = bincode::serialize(self)
                    .map_err(|e| Error::Snapshot(format!("binary encode: {}", e)))?;
                let mut out = Vec::with_capacity(MAGIC.len() + 1 + payload.len());
                out.extend_from_slice(MAGIC);
                out.push(1u8);
                out.extend_from_slice(&payload);
                Ok(out)
            }
        }
    }

    /// Decode, sniffing the format from the magic prefix.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = if bytes.starts_with(MAGIC) {
            let rest = &bytes[MAGIC.len()..];
            let (&header_version, payload) = rest
                .split_first()
                .ok_or_else(|| Error::Snapshot("truncated binary snapshot".to_string()))?;
            if header_version != 1 {
                return Err(Error::Snapshot(format!(
                    "unsupported binary snapshot header version {}",
                    header_version
                )));
            }
            bincode::deserialize(payload)
                .map_err(|e| Error::Snapshot(format!("binary decode: {}", e)))?
        } else {
            serde_json::from_slice(bytes)
                .map_err(|e| Error::Snapshot(format!("json decode: {}", e)))?
        };

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

impl LibraryService {
    /// Capture the current contents. Each library is read under its own
    /// lock; there is no cross-library ordering guarantee.
    pub fn snapshot(&self) -> Snapshot {
        let libraries = self
            .export()
            .into_iter()
            .map(|(library, documents, chunks)| LibrarySnapshot {
                library,
                documents,
                chunks,
            })
            .collect();

        Snapshot {
            version: SNAPSHOT_VERSION,
            libraries,
        }
    }

    /// Write a snapshot to `path` in the given format.
    pub fn save_snapshot(&self, path: &Path, format: SnapshotFormat) -> Result<()> {
        let snapshot = self.snapshot();
        let bytes = snapshot.encode(format)?;
        std::fs::write(path, bytes)?;

        tracing::info!(
            path = %path.display(),
            ?format,
            libraries = snapshot.libraries.len(),
            "wrote snapshot"
        );
        Ok(())
    }

    /// Load a snapshot from `path`, replacing all current contents.
    /// The format is sniffed from the file header.
    ///
    /// # Errors
    ///
    /// A missing or empty file is `SnapshotMissing` (nothing was ever
    /// written there); other read failures are `Io`, corrupt payloads
    /// are `Snapshot` errors.
    pub fn load_snapshot(&self, path: &Path) -> Result<()> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SnapshotMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Err(Error::SnapshotMissing {
                path: path.to_path_buf(),
            });
        }

        let snapshot = Snapshot::decode(&bytes)?;
        self.restore(snapshot)
    }

    /// Replace all current contents with a snapshot, rebuilding every
    /// library's index from its chunks.
    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut states = Vec::with_capacity(snapshot.libraries.len());

        for entry in snapshot.libraries {
            let LibrarySnapshot {
                library,
                documents,
                chunks,
            } = entry;

            let mut index = AnyIndex::create(library.dimension, &library.params)?;
            index.build(
                chunks
                    .iter()
                    .map(|chunk| (chunk.id, chunk.embedding.clone()))
                    .collect(),
            )?;

            let mut document_store = DocumentStore::new();
            for document in documents {
                document_store.insert(document);
            }
            let mut chunk_store = ChunkStore::new();
            for chunk in chunks {
                chunk_store.insert(chunk);
            }

            tracing::info!(
                library = %library.id,
                chunks = chunk_store.len(),
                "restored library"
            );

            states.push(LibraryState {
                library,
                documents: document_store,
                chunks: chunk_store,
                index,
            });
        }

        self.install(states);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::model::IndexKind;
    use crate::service::{ChunkSpec, LibrarySpec, SearchQuery};
    use crate::StoreConfig;
    use std::sync::Arc;

    fn populated_service() -> LibraryService {
        let service =
            LibraryService::new(Arc::new(HashEmbedder::new(16, 0)), StoreConfig::default());
        let library = service
            .create_library(LibrarySpec::new("lib", IndexKind::BruteForce, 16))
            .unwrap();
        let document = service
            .create_document(library.id, "doc", Default::default())
            .unwrap();
        for i in 0..10 {
            service
                .add_chunk(document.id, ChunkSpec::new(format!("chunk number {}", i)))
                .unwrap();
        }
        service
    }

    #[test]
    fn test_encode_decode_both_formats() {
        let service = populated_service();
        let snapshot = service.snapshot();

        for format in [SnapshotFormat::Json, SnapshotFormat::Binary] {
            let bytes = snapshot.encode(format).unwrap();
            let decoded = Snapshot::decode(&bytes).unwrap();
            assert_eq!(decoded.version, SNAPSHOT_VERSION);
            assert_eq!(decoded.libraries.len(), 1);
            assert_eq!(decoded.libraries[0].chunks.len(), 10);
        }
    }

    #[test]
    fn test_binary_is_sniffed_by_magic() {
        let service = populated_service();
        let bytes = service.snapshot().encode(SnapshotFormat::Binary).unwrap();
        assert!(bytes.starts_with(b"KOMBUSNP"));
        assert!(Snapshot::decode(&bytes).is_ok());
    }

    #[test]
    fn test_corrupt_payload_is_reported() {
        assert!(matches!(
            Snapshot::decode(b"not a snapshot"),
            Err(Error::Snapshot(_))
        ));
        let mut bytes = b"KOMBUSNP".to_vec();
        bytes.push(9); // bad header version
        assert!(matches!(Snapshot::decode(&bytes), Err(Error::Snapshot(_))));
    }

    #[test]
    fn test_save_load_round_trip_preserves_search() {
        let service = populated_service();
        let library = service.list_libraries().remove(0);

        let before = service
            .search(library.id, SearchQuery::text("chunk number 3", 5))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.bin");
        service.save_snapshot(&path, SnapshotFormat::Binary).unwrap();

        let restored =
            LibraryService::new(Arc::new(HashEmbedder::new(16, 0)), StoreConfig::default());
        restored.load_snapshot(&path).unwrap();

        let after = restored
            .search(library.id, SearchQuery::text("chunk number 3", 5))
            .unwrap();
        assert_eq!(before, after);

        let stats = restored.library_stats(library.id).unwrap();
        assert_eq!(stats.chunks, 10);
        assert_eq!(stats.index_size, 10);
    }

    #[test]
    fn test_missing_file_is_snapshot_missing() {
        let service = populated_service();
        let err = service
            .load_snapshot(Path::new("/nonexistent/kombu.snap"))
            .unwrap_err();
        assert!(matches!(err, Error::SnapshotMissing { .. }));
    }

    #[test]
    fn test_empty_file_is_snapshot_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.snap");
        std::fs::write(&path, b"").unwrap();

        let service = populated_service();
        let err = service.load_snapshot(&path).unwrap_err();
        assert!(matches!(err, Error::SnapshotMissing { .. }));
    }
}
