mod helpers;

use std::time::Duration;

use helpers::{FakeStore, Term, GRAPH};

const ASK: &str = "ASK { ?s ?p ?o }";

fn select_all() -> String {
    format!("SELECT ?s ?p ?o WHERE {{ GRAPH <{GRAPH}> {{ ?s ?p ?o }} }}")
}

#[tokio::test]
async fn repeated_query_within_ttl_hits_the_store_once() {
    let store = FakeStore::spawn().await;
    let sparql = store.cached(Duration::from_secs(60), 10);

    let first = sparql.query(ASK).await.unwrap();
    let second = sparql.query(ASK).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.query_count(), 1);
    assert_eq!(sparql.cache_len(), 1);
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let store = FakeStore::spawn().await;
    let sparql = store.cached(Duration::from_millis(1000), 10);

    sparql.query(ASK).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    sparql.query(ASK).await.unwrap();
    assert_eq!(store.query_count(), 1, "still fresh at half the TTL");

    tokio::time::sleep(Duration::from_millis(600)).await;
    sparql.query(ASK).await.unwrap();
    assert_eq!(store.query_count(), 2, "refetched after the TTL");
}

#[tokio::test]
async fn update_invalidates_cached_results() {
    let store = FakeStore::spawn().await;
    let sparql = store.cached(Duration::from_secs(60), 10);

    let before = sparql.query(&select_all()).await.unwrap();
    assert!(before["results"]["bindings"].as_array().unwrap().is_empty());

    sparql
        .update(&format!(
            "INSERT DATA {{ GRAPH <{GRAPH}> {{ <urn:a> <urn:p> \"v\" . }} }}"
        ))
        .await
        .unwrap();
    assert_eq!(sparql.cache_len(), 0);

    let after = sparql.query(&select_all()).await.unwrap();
    assert_eq!(after["results"]["bindings"].as_array().unwrap().len(), 1);
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn failed_update_still_clears_cache() {
    let store = FakeStore::spawn().await;
    let sparql = store.cached(Duration::from_secs(60), 10);

    sparql.query(ASK).await.unwrap();
    store.fail_updates_containing(Some("DROP"));
    assert!(sparql
        .update(&format!("DROP SILENT GRAPH <{GRAPH}>"))
        .await
        .is_err());
    assert_eq!(sparql.cache_len(), 0);
}

#[tokio::test]
async fn rollback_clears_results_read_inside_transaction() {
    let store = FakeStore::spawn().await;
    store.seed(
        GRAPH,
        vec![(
            "urn:a".into(),
            "urn:p".into(),
            Term::Literal {
                value: "kept".into(),
                datatype: None,
            },
        )],
    );
    let mut sparql = store.cached(Duration::from_secs(60), 10);

    sparql.begin_transaction().await.unwrap();
    sparql
        .update(&format!("DROP SILENT GRAPH <{GRAPH}>"))
        .await
        .unwrap();
    let inside = sparql.query(&select_all()).await.unwrap();
    assert!(inside["results"]["bindings"].as_array().unwrap().is_empty());

    sparql.rollback_transaction().await.unwrap();
    let after = sparql.query(&select_all()).await.unwrap();
    assert_eq!(after["results"]["bindings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn transaction_control_clears_cache() {
    let store = FakeStore::spawn().await;
    let mut sparql = store.cached(Duration::from_secs(60), 10);

    sparql.query(ASK).await.unwrap();
    sparql.begin_transaction().await.unwrap();
    assert_eq!(sparql.cache_len(), 0);

    sparql.query(ASK).await.unwrap();
    sparql.commit_transaction().await.unwrap();
    assert_eq!(sparql.cache_len(), 0);
}

#[tokio::test]
async fn errors_are_not_cached() {
    let store = FakeStore::spawn().await;
    let sparql = store.cached(Duration::from_secs(60), 10);

    store.set_fail_all(true);
    assert!(sparql.query(ASK).await.is_err());
    assert_eq!(sparql.cache_len(), 0);

    store.set_fail_all(false);
    sparql.query(ASK).await.unwrap();
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn size_bound_holds_after_insertions() {
    let store = FakeStore::spawn().await;
    let sparql = store.cached(Duration::from_secs(60), 3);

    for n in 0..6 {
        sparql
            .query(&format!("ASK {{ ?s ?p {n} }}"))
            .await
            .unwrap();
    }
    assert!(sparql.cache_len() <= 3);
}

#[tokio::test]
async fn cleanup_task_evicts_expired_entries() {
    let store = FakeStore::spawn().await;
    let mut sparql = store.cached(Duration::from_millis(100), 10);
    sparql.start_cleanup_task(Duration::from_millis(50));
    assert!(sparql.has_cleanup_task());

    sparql.query(ASK).await.unwrap();
    assert_eq!(sparql.cache_len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sparql.cache_len(), 0);

    sparql.close();
    assert!(!sparql.has_cleanup_task());
}

#[tokio::test]
async fn zero_cleanup_interval_starts_no_task() {
    let store = FakeStore::spawn().await;
    let mut sparql = store.cached(Duration::from_secs(60), 10);

    sparql.start_cleanup_task(Duration::from_millis(50));
    sparql.start_cleanup_task(Duration::ZERO);
    assert!(!sparql.has_cleanup_task());

    sparql.query(ASK).await.unwrap();
    assert_eq!(sparql.cache_len(), 1);
}
