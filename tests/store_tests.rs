//! Contract tests for the in-memory store backend: the list, sorted
//! set, TTL, and atomic-composite semantics the broker protocol
//! depends on.

use std::sync::Arc;
use std::time::Duration;

use conveyor::{MemoryStore, Store};

#[tokio::test]
async fn test_list_pops_oldest_first() {
    let store = MemoryStore::new();
    store.list_push("q", "a").await.unwrap();
    store.list_push("q", "b").await.unwrap();
    store.list_push("q", "c").await.unwrap();

    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("a".into()));
    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("b".into()));
    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("c".into()));
    assert_eq!(store.pop_push("q", "p").await.unwrap(), None);
    assert_eq!(store.list_len("p").await.unwrap(), 3);
}

#[tokio::test]
async fn test_blocking_pop_push_times_out() {
    let store = MemoryStore::new();
    let popped = store
        .blocking_pop_push("empty", "p", Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(popped, None);
}

#[tokio::test]
async fn test_blocking_pop_push_wakes_on_push() {
    let store = Arc::new(MemoryStore::new());
    let pusher = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        pusher.list_push("q", "late").await.unwrap();
    });

    let popped = store
        .blocking_pop_push("q", "p", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(popped, Some("late".into()));
    assert_eq!(store.list_len("p").await.unwrap(), 1);
}

#[tokio::test]
async fn test_put_and_push_links_payload_and_queue() {
    let store = MemoryStore::new();
    store.put_and_push("jobs", "q", "id1", b"payload").await.unwrap();

    assert_eq!(
        store.hash_get("jobs", "id1").await.unwrap(),
        Some(b"payload".to_vec())
    );
    assert_eq!(store.list_len("q").await.unwrap(), 1);
}

#[tokio::test]
async fn test_promote_due_moves_in_score_order() {
    let store = MemoryStore::new();
    store.put_and_schedule("jobs", "z", "third", b"3", 30.0).await.unwrap();
    store.put_and_schedule("jobs", "z", "first", b"1", 10.0).await.unwrap();
    store.put_and_schedule("jobs", "z", "second", b"2", 20.0).await.unwrap();
    store.put_and_schedule("jobs", "z", "future", b"4", 99.0).await.unwrap();

    let promoted = store.promote_due("z", "q", 50.0).await.unwrap();
    assert_eq!(promoted, 3);
    assert_eq!(store.sorted_len("z").await.unwrap(), 1);
    assert_eq!(store.sorted_score("z", "future").await.unwrap(), Some(99.0));

    // Drain order matches ascending target time.
    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("first".into()));
    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("second".into()));
    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("third".into()));
}

#[tokio::test]
async fn test_promote_due_with_nothing_due_is_a_noop() {
    let store = MemoryStore::new();
    store.put_and_schedule("jobs", "z", "id", b"p", 100.0).await.unwrap();

    assert_eq!(store.promote_due("z", "q", 50.0).await.unwrap(), 0);
    assert_eq!(store.list_len("q").await.unwrap(), 0);
    assert_eq!(store.sorted_len("z").await.unwrap(), 1);
}

#[tokio::test]
async fn test_remove_and_delete_reports_removals() {
    let store = MemoryStore::new();
    store.put_and_push("jobs", "q", "id1", b"p").await.unwrap();
    store.pop_push("q", "pending").await.unwrap();

    assert_eq!(store.remove_and_delete("pending", "jobs", "id1").await.unwrap(), 1);
    assert_eq!(store.hash_get("jobs", "id1").await.unwrap(), None);
    // Second removal finds nothing and still succeeds.
    assert_eq!(store.remove_and_delete("pending", "jobs", "id1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_remove_and_push_always_pushes() {
    let store = MemoryStore::new();
    store.remove_and_push("pending", "q", "ghost").await.unwrap();
    assert_eq!(store.list_len("q").await.unwrap(), 1);
    assert_eq!(store.pop_push("q", "p").await.unwrap(), Some("ghost".into()));
}

#[tokio::test]
async fn test_ttl_values_expire() {
    let store = MemoryStore::new();
    store
        .put_with_ttl("live", b"x", Duration::from_millis(40))
        .await
        .unwrap();
    assert_eq!(store.get_value("live").await.unwrap(), Some(b"x".to_vec()));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(store.get_value("live").await.unwrap(), None);
}

#[tokio::test]
async fn test_scan_keys_matches_glob() {
    let store = MemoryStore::new();
    store.list_push("ns:w1:pending", "a").await.unwrap();
    store.list_push("ns:w2:pending", "b").await.unwrap();
    store.list_push("ns:w1:other", "c").await.unwrap();
    store.put_with_ttl("ns:w1", b"x", Duration::from_secs(5)).await.unwrap();

    let mut keys = store.scan_keys("ns:*:pending").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["ns:w1:pending", "ns:w2:pending"]);
}
