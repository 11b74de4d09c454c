use std::collections::HashMap;

use bridge_core::ports::{BufferApi, LeaseFilter};
use bridge_core::types::{DataType, NewMessage, Priority, Side, Status};
use bridge_store::{open_pool, SqliteBufferStore};
use chrono::Duration;

async fn new_store(max_size: u64) -> SqliteBufferStore {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bridge.db");
    // leak the tempdir so the file survives for the test's lifetime
    let path = Box::leak(Box::new(path)).to_str().unwrap().to_string();
    let pool = open_pool(&path, true).await.expect("open pool");
    SqliteBufferStore::new(pool, max_size, Duration::minutes(60), HashMap::new())
}

fn msg(priority: Priority) -> NewMessage {
    NewMessage {
        source: Side::Pubsub,
        destination: Side::Variable,
        topic_or_node: "node.a".to_string(),
        mapping_id: "m1".to_string(),
        value: serde_json::json!(23.5),
        data_type: DataType::Float,
        priority,
        max_retries: 3,
        ttl: None,
        metadata: None,
    }
}

#[tokio::test]
async fn s1_single_message_completes() {
    let store = new_store(100).await;
    let id = store.enqueue(msg(Priority::Normal)).await.unwrap().unwrap();

    let leased = store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].id, id);
    assert_eq!(leased[0].status, Status::Processing);

    store.complete(id).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.messages_added, 1);
    assert_eq!(stats.messages_processed, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn s2_lease_orders_by_priority_then_created_at() {
    let store = new_store(100).await;
    store.enqueue(msg(Priority::Low)).await.unwrap();
    store.enqueue(msg(Priority::Critical)).await.unwrap();
    store.enqueue(msg(Priority::Normal)).await.unwrap();

    let leased = store.lease_batch(3, LeaseFilter::default()).await.unwrap();
    let priorities: Vec<Priority> = leased.iter().map(|m| m.priority).collect();
    assert_eq!(priorities, vec![Priority::Critical, Priority::Normal, Priority::Low]);
}

#[tokio::test]
async fn s3_exhausting_retries_writes_one_dead_letter() {
    let store = new_store(100).await;
    let mut m = msg(Priority::Normal);
    m.max_retries = 3;
    let id = store.enqueue(m).await.unwrap().unwrap();

    for _ in 0..3 {
        store.lease_batch(10, LeaseFilter::default()).await.unwrap();
        store.fail(id, "boom").await.unwrap();
    }

    // After 3 fail() calls the message is pending again (not yet dead-lettered).
    let dead_letters = store.export_dead_letters(None).await.unwrap();
    assert_eq!(dead_letters.len(), 0);

    store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    store.fail(id, "boom").await.unwrap();

    let dead_letters = store.export_dead_letters(None).await.unwrap();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].retry_count, 3);
    assert_eq!(dead_letters[0].original_id, id);
}

#[tokio::test]
async fn s4_ttl_expiry_via_sweep_does_not_dead_letter() {
    let store = new_store(100).await;
    let mut m = msg(Priority::Normal);
    m.ttl = Some(Duration::seconds(-1)); // already expired
    store.enqueue(m).await.unwrap().unwrap();

    let report = store.sweep().await.unwrap();
    assert_eq!(report.expired, 1);

    let dead_letters = store.export_dead_letters(None).await.unwrap();
    assert_eq!(dead_letters.len(), 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.messages_expired, 1);
}

#[tokio::test]
async fn s5_reset_processing_reintroduces_in_flight_messages() {
    let store = new_store(100).await;
    let id = store.enqueue(msg(Priority::Normal)).await.unwrap().unwrap();
    store.lease_batch(10, LeaseFilter::default()).await.unwrap();

    let reset_count = store.reset_processing().await.unwrap();
    assert_eq!(reset_count, 1);

    let leased_again = store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    assert_eq!(leased_again[0].id, id);

    store.complete(id).await.unwrap();
    let dead_letters = store.export_dead_letters(None).await.unwrap();
    assert_eq!(dead_letters.len(), 0);
}

#[tokio::test]
async fn s6_completion_preserves_created_at_fifo_within_batch() {
    let store = new_store(1000).await;
    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(store.enqueue(msg(Priority::Normal)).await.unwrap().unwrap());
    }

    let leased = store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    let leased_ids: Vec<i64> = leased.iter().map(|m| m.id).collect();
    assert_eq!(leased_ids, ids[..10]);
}

#[tokio::test]
async fn i4_lease_transitions_exactly_once_to_processing() {
    let store = new_store(100).await;
    store.enqueue(msg(Priority::Normal)).await.unwrap();

    let first = store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    assert_eq!(first.len(), 1);

    let second = store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    assert_eq!(second.len(), 0, "a processing row must not be leased again");
}

#[tokio::test]
async fn i5_json_value_round_trips_through_lease() {
    let store = new_store(100).await;
    let mut m = msg(Priority::Normal);
    m.data_type = DataType::Json;
    m.value = serde_json::json!({"a": 1, "b": [true, false]});
    let original = m.value.clone();
    store.enqueue(m).await.unwrap();

    let leased = store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    assert_eq!(leased[0].value, original);
}

#[tokio::test]
async fn overflow_policy_deletes_completed_before_rejecting_enqueue() {
    let store = new_store(3).await;
    let id1 = store.enqueue(msg(Priority::Normal)).await.unwrap().unwrap();
    store.enqueue(msg(Priority::Normal)).await.unwrap();
    store.enqueue(msg(Priority::Normal)).await.unwrap();

    store.lease_batch(10, LeaseFilter::default()).await.unwrap();
    store.complete(id1).await.unwrap();

    // pending is now 2, below max_size=3, so this should succeed without
    // needing the overflow policy.
    let result = store.enqueue(msg(Priority::Normal)).await.unwrap();
    assert!(result.is_some());
}

#[tokio::test]
async fn priority_soft_limit_rejects_without_touching_overflow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bridge.db");
    let path = Box::leak(Box::new(path)).to_str().unwrap().to_string();
    let pool = open_pool(&path, true).await.expect("open pool");
    let mut limits = HashMap::new();
    limits.insert(Priority::Low, 1u64);
    let store = SqliteBufferStore::new(pool, 100, Duration::minutes(60), limits);

    assert!(store.enqueue(msg(Priority::Low)).await.unwrap().is_some());
    assert!(store.enqueue(msg(Priority::Low)).await.unwrap().is_none());
}

#[tokio::test]
async fn negative_or_unknown_priority_is_rejected_at_the_type_boundary() {
    assert!(Priority::from_i32(-1).is_none());
    assert!(Priority::from_i32(99).is_none());
}
