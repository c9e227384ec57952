//! Concurrency scenarios: readers and writers sharing one library.

use kombu_store::{
    ChunkSpec, EmbeddingProvider, HashEmbedder, IndexKind, LibrarySpec, LibraryService,
    Metadata, SearchQuery, StoreConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Eight reader threads issue searches while one writer inserts 1000
/// chunks. No search may observe a partially-inserted chunk: whenever a
/// query vector is the exact embedding of some content, a near-1.0 top
/// hit must carry exactly that content. Afterwards the index holds all
/// 1000 entries.
#[test]
fn readers_never_observe_partial_inserts() {
    let dim = 32;
    let provider = Arc::new(HashEmbedder::new(dim, 0));
    let service = Arc::new(LibraryService::new(provider.clone(), StoreConfig::default()));

    let library = service
        .create_library(LibrarySpec::new("busy", IndexKind::BruteForce, dim))
        .unwrap();
    let document = service
        .create_document(library.id, "doc", Metadata::new())
        .unwrap();

    let total = 1000usize;
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        let document_id = document.id;
        thread::spawn(move || {
            for i in 0..total {
                service
                    .add_chunk(document_id, ChunkSpec::new(format!("item {}", i)))
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..8)
        .map(|reader_id| {
            let service = Arc::clone(&service);
            let provider = Arc::clone(&provider);
            let done = Arc::clone(&done);
            let library_id = library.id;
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(reader_id as u64);
                while !done.load(Ordering::SeqCst) {
                    let i = rng.gen_range(0..total);
                    let content = format!("item {}", i);
                    let vector = provider.embed(&content).unwrap();

                    let results = service
                        .search(library_id, SearchQuery::vector(vector, 1))
                        .unwrap();

                    // If the chunk is visible at all, its content and its
                    // ranking vector belong together.
                    if let Some(top) = results.first() {
                        if top.score > 0.9999 {
                            assert_eq!(top.content, content);
                        }
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let stats = service.library_stats(library.id).unwrap();
    assert_eq!(stats.chunks, total);
    assert_eq!(stats.index_size, total);
}

/// Concurrent searches always see internally consistent rankings while
/// chunks are being deleted underneath them.
#[test]
fn searches_stay_consistent_under_deletes() {
    let dim = 16;
    let service = Arc::new(LibraryService::new(
        Arc::new(HashEmbedder::new(dim, 0)),
        StoreConfig::default(),
    ));
    let library = service
        .create_library(LibrarySpec::new("shrinking", IndexKind::BruteForce, dim))
        .unwrap();
    let document = service
        .create_document(library.id, "doc", Metadata::new())
        .unwrap();

    let mut ids = Vec::new();
    for i in 0..500 {
        ids.push(
            service
                .add_chunk(document.id, ChunkSpec::new(format!("victim {}", i)))
                .unwrap()
                .id,
        );
    }

    let done = Arc::new(AtomicBool::new(false));
    let deleter = {
        let service = Arc::clone(&service);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for id in ids {
                service.delete_chunk(id).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let done = Arc::clone(&done);
            let library_id = library.id;
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let results = service
                        .search(library_id, SearchQuery::text("victim 250", 10))
                        .unwrap();
                    for pair in results.windows(2) {
                        assert!(pair[0].score >= pair[1].score);
                    }
                }
            })
        })
        .collect();

    deleter.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let stats = service.library_stats(library.id).unwrap();
    assert_eq!(stats.chunks, 0);
    assert_eq!(stats.index_size, 0);
}

/// Independent libraries do not serialize against each other: a long
/// writer in one library never blocks reads of another.
#[test]
fn libraries_are_independent() {
    let dim = 16;
    let service = Arc::new(LibraryService::new(
        Arc::new(HashEmbedder::new(dim, 0)),
        StoreConfig::default(),
    ));

    let lib_a = service
        .create_library(LibrarySpec::new("a", IndexKind::BruteForce, dim))
        .unwrap();
    let doc_a = service
        .create_document(lib_a.id, "doc", Metadata::new())
        .unwrap();
    let lib_b = service
        .create_library(LibrarySpec::new("b", IndexKind::BruteForce, dim))
        .unwrap();
    let doc_b = service
        .create_document(lib_b.id, "doc", Metadata::new())
        .unwrap();
    service
        .add_chunk(doc_b.id, ChunkSpec::new("resident"))
        .unwrap();

    let writer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for i in 0..300 {
                service
                    .add_chunk(doc_a.id, ChunkSpec::new(format!("bulk {}", i)))
                    .unwrap();
            }
        })
    };

    // Reads of library B proceed throughout the write burst on A.
    for _ in 0..50 {
        let results = service
            .search(lib_b.id, SearchQuery::text("resident", 1))
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    writer.join().unwrap();
    assert_eq!(service.library_stats(lib_a.id).unwrap().chunks, 300);
}
