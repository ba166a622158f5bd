//! Integration tests for registry resolution:
//!
//! 1. Concurrent first-time resolution converges on one triple
//! 2. Distinct names get disjoint triples, first registration wins
//! 3. Store creation failure propagates and poisons nothing
//! 4. Coordinators sharing a name share the worker context

use std::sync::Arc;

use tempfile::TempDir;
use trellis_db::{Graph, Registry, StoreError, StoreKind, Tier};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolve_converges_on_one_triple() {
    let temp = TempDir::new().unwrap();
    let registry = Arc::new(Registry::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let location = temp.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            registry
                .resolve("people", StoreKind::Memory, &location)
                .unwrap()
        }));
    }

    let mut triples = Vec::new();
    for handle in handles {
        triples.push(handle.await.unwrap());
    }

    let first = &triples[0];
    for triple in &triples[1..] {
        assert!(first.worker().same(triple.worker()));
        assert!(first.main().same(triple.main()));
        assert!(first.root().same(triple.root()));
    }
}

#[tokio::test]
async fn distinct_names_are_disjoint() {
    let temp = TempDir::new().unwrap();
    let registry = Registry::new();

    let a = registry
        .resolve("left", StoreKind::Memory, temp.path())
        .unwrap();
    let b = registry
        .resolve("right", StoreKind::Memory, temp.path())
        .unwrap();

    assert!(!a.worker().same(b.worker()));
    assert!(!a.main().same(b.main()));
    assert!(!a.root().same(b.root()));
}

#[tokio::test]
async fn first_registration_wins() {
    let temp = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let registry = Registry::new();

    let first = registry
        .resolve("people", StoreKind::Memory, temp.path())
        .unwrap();
    // later parameters are ignored once the name is registered
    let second = registry
        .resolve("people", StoreKind::Disk, other.path())
        .unwrap();

    assert!(first.worker().same(second.worker()));
    assert!(!other.path().join("people").exists());
}

#[tokio::test]
async fn triple_parent_chain_holds() {
    let temp = TempDir::new().unwrap();
    let registry = Registry::new();
    let triple = registry
        .resolve("people", StoreKind::Memory, temp.path())
        .unwrap();

    assert_eq!(triple.worker().tier(), Tier::Worker);
    assert_eq!(triple.main().tier(), Tier::Main);
    assert_eq!(triple.root().tier(), Tier::Root);

    assert!(triple.worker().parent().unwrap().same(triple.main()));
    assert!(triple.main().parent().unwrap().same(triple.root()));
    assert!(triple.root().parent().is_none());
}

#[tokio::test]
async fn store_creation_failure_propagates() {
    let temp = TempDir::new().unwrap();
    // occupy the would-be store directory with a file
    std::fs::write(temp.path().join("blocked"), b"in the way").unwrap();
    let registry = Registry::new();

    let result = registry.resolve("blocked", StoreKind::Disk, temp.path());
    assert!(matches!(result, Err(StoreError::Init { .. })));

    // nothing was inserted for the failed name; a retry with a usable
    // backend succeeds, and other names are unaffected
    let retried = registry
        .resolve("blocked", StoreKind::Memory, temp.path())
        .unwrap();
    assert_eq!(retried.worker().tier(), Tier::Worker);
    registry
        .resolve("people", StoreKind::Memory, temp.path())
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coordinators_share_the_worker_context() {
    let temp = TempDir::new().unwrap();
    let registry = Arc::new(Registry::new());

    let mut handles = Vec::new();
    for _ in 0..2 {
        let registry = registry.clone();
        let location = temp.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            let graph =
                Graph::open_with(&registry, "shared", StoreKind::Memory, &location).unwrap();
            graph.context().clone()
        }));
    }

    let first = handles.pop().unwrap().await.unwrap();
    let second = handles.pop().unwrap().await.unwrap();
    assert!(first.same(&second));
}
