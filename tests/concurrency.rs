//! # Concurrency Tests
//!
//! One writer, many readers, one engine instance shared across threads.
//! Readers must observe whole commits only: counts move forward batch by
//! batch and no query ever sees a torn document.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kitedb::{doc, Engine, Query};
use tempfile::tempdir;

#[test]
fn readers_see_only_committed_batches() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Engine::open(dir.path().join("app.db")).unwrap());

    const BATCHES: usize = 20;
    const BATCH_SIZE: usize = 25;

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        readers.push(std::thread::spawn(move || {
            let mut last_seen = 0usize;
            while !done.load(Ordering::Acquire) {
                let count = db.count("docs", None).unwrap();
                // commits are whole batches and only ever add documents
                assert_eq!(count % BATCH_SIZE, 0, "count {} is not a whole batch", count);
                assert!(count >= last_seen, "count went backwards: {} < {}", count, last_seen);
                last_seen = count;
            }
            last_seen
        }));
    }

    for batch in 0..BATCHES {
        let base = (batch * BATCH_SIZE) as i32;
        db.insert(
            "docs",
            (0..BATCH_SIZE as i32).map(|i| doc! { "_id" => base + i, "batch" => batch as i32 }),
        )
        .unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        let last_seen = reader.join().unwrap();
        assert!(last_seen <= BATCHES * BATCH_SIZE);
    }
    assert_eq!(db.count("docs", None).unwrap(), BATCHES * BATCH_SIZE);
}

#[test]
fn readers_never_observe_partial_documents() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Engine::open(dir.path().join("app.db")).unwrap());

    db.insert("docs", (0..50).map(|i| doc! { "_id" => i, "a" => 0, "b" => 0 }))
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..3 {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        readers.push(std::thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                // every document is updated whole: both fields move in
                // lockstep or not at all
                for d in db.find("docs", &Query::all()).unwrap() {
                    assert_eq!(d.get("a"), d.get("b"), "torn document: {:?}", d);
                }
            }
        }));
    }

    for round in 1..=10i32 {
        let docs: Vec<_> = (0..50)
            .map(|i| doc! { "_id" => i, "a" => round, "b" => round })
            .collect();
        db.update("docs", docs).unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn concurrent_readers_share_the_engine() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Engine::open(dir.path().join("app.db")).unwrap());

    db.insert("docs", (0..200).map(|i| doc! { "_id" => i, "v" => i % 10 }))
        .unwrap();

    let mut handles = Vec::new();
    for reader in 0..8 {
        let db = Arc::clone(&db);
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                let v = reader % 10;
                let found = db.find("docs", &Query::eq("v", v)).unwrap();
                assert_eq!(found.len(), 20);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
