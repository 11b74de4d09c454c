use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use bridge_core::mapping::MappingRegistry;
use bridge_core::ports::BufferApi;
use bridge_core::transform::Transformer;
use bridge_core::types::{DataType, Direction, MappingEntry, NewMessage, Priority, Side};
use bridge_store::{open_pool, SqliteBufferStore};
use bridge_workers::adapters::InMemoryEgressAdapter;
use bridge_workers::EgressWorker;
use chrono::Duration;

async fn new_store() -> Arc<SqliteBufferStore> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.db");
    let path = Box::leak(Box::new(path)).to_str().unwrap().to_string();
    let pool = open_pool(&path, true).await.unwrap();
    Arc::new(SqliteBufferStore::new(pool, 1000, Duration::minutes(60), HashMap::new()))
}

fn mapping() -> MappingEntry {
    MappingEntry {
        mapping_id: "m1".to_string(),
        source_side: Side::Pubsub,
        source_address: "sensor/temp".to_string(),
        destination_side: Side::Variable,
        destination_address: "ns=2;s=Temp".to_string(),
        data_type: DataType::Float,
        direction: Direction::AToB,
        priority: Priority::Normal,
        transform_ref: None,
        description: None,
    }
}

#[tokio::test]
async fn worker_delivers_and_completes_a_message() {
    let store = new_store().await;
    let mappings = Arc::new(MappingRegistry::load(vec![mapping()]).unwrap());
    let transformer = Arc::new(Transformer::new(None));
    let adapter = Arc::new(InMemoryEgressAdapter::new());

    store
        .enqueue(NewMessage {
            source: Side::Pubsub,
            destination: Side::Variable,
            topic_or_node: "ns=2;s=Temp".to_string(),
            mapping_id: "m1".to_string(),
            value: serde_json::json!(23.5),
            data_type: DataType::Float,
            priority: Priority::Normal,
            max_retries: 3,
            ttl: None,
            metadata: None,
        })
        .await
        .unwrap();

    let (_tx, rx) = tokio::sync::watch::channel(true);
    let mut worker = EgressWorker::new(
        store.clone(),
        adapter.clone(),
        transformer,
        mappings,
        Side::Variable,
        10,
        StdDuration::from_millis(10),
        rx,
    );

    let handle = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    _tx.send(false).unwrap();
    let _ = tokio::time::timeout(StdDuration::from_secs(2), handle).await;

    let applied = adapter.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, "ns=2;s=Temp");

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn worker_routes_adapter_failure_through_buffer_fail() {
    let store = new_store().await;
    let mappings = Arc::new(MappingRegistry::load(vec![mapping()]).unwrap());
    let transformer = Arc::new(Transformer::new(None));
    let adapter = Arc::new(InMemoryEgressAdapter::new());
    adapter.fail_always();

    store
        .enqueue(NewMessage {
            source: Side::Pubsub,
            destination: Side::Variable,
            topic_or_node: "ns=2;s=Temp".to_string(),
            mapping_id: "m1".to_string(),
            value: serde_json::json!(1.0),
            data_type: DataType::Float,
            priority: Priority::Normal,
            max_retries: 3,
            ttl: None,
            metadata: None,
        })
        .await
        .unwrap();

    let (_tx, rx) = tokio::sync::watch::channel(true);
    let mut worker = EgressWorker::new(
        store.clone(),
        adapter.clone(),
        transformer,
        mappings,
        Side::Variable,
        10,
        StdDuration::from_millis(10),
        rx,
    );

    let handle = tokio::spawn(async move { worker.run().await });
    // max_retries is 3, so the message needs 4 failing deliveries (one per
    // lease) before `fail()` dead-letters it; give the worker enough polls.
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    _tx.send(false).unwrap();
    let _ = tokio::time::timeout(StdDuration::from_secs(2), handle).await;

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.failed, 1, "message should be dead-lettered after exhausting retries");
    assert_eq!(stats.completed, 0);

    let dead_letters = store.export_dead_letters(None).await.unwrap();
    assert_eq!(dead_letters.len(), 1);
}
