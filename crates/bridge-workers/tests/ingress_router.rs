use std::collections::HashMap;
use std::sync::Arc;

use bridge_core::mapping::MappingRegistry;
use bridge_core::ports::BufferApi;
use bridge_core::types::{DataType, Direction, MappingEntry, Priority, Side};
use bridge_store::{open_pool, SqliteBufferStore};
use bridge_workers::adapters::InMemoryIngressAdapter;
use bridge_workers::ingress::Observation;
use bridge_workers::IngressRouter;
use chrono::Duration;

async fn new_store() -> Arc<SqliteBufferStore> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bridge.db");
    let path = Box::leak(Box::new(path)).to_str().unwrap().to_string();
    let pool = open_pool(&path, true).await.expect("open pool");
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
async fn observed_value_is_enqueued_for_the_mapped_destination() {
    let store = new_store().await;
    let mappings = Arc::new(MappingRegistry::load(vec![mapping()]).unwrap());
    let router = IngressRouter::new(store.clone(), mappings, 3);

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let adapter = InMemoryIngressAdapter::new(tx);
    adapter.subscribe("sensor/temp").await.unwrap();

    let router_handle = tokio::spawn(async move { router.run(rx).await });

    adapter
        .observe(Observation {
            side: Side::Pubsub,
            address: "sensor/temp".to_string(),
            value: serde_json::json!(23.5),
            hints: None,
        })
        .await
        .unwrap();
    drop(adapter);

    tokio::time::timeout(std::time::Duration::from_secs(2), router_handle)
        .await
        .expect("router task timed out")
        .expect("router task panicked");

    let pending = store.pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source, Side::Pubsub);
    assert_eq!(pending[0].destination, Side::Variable);
    assert_eq!(pending[0].topic_or_node, "ns=2;s=Temp");
    assert_eq!(pending[0].value.as_f64(), Some(23.5));
}

#[tokio::test]
async fn observation_with_no_matching_mapping_is_dropped() {
    let store = new_store().await;
    let mappings = Arc::new(MappingRegistry::load(vec![mapping()]).unwrap());
    let router = IngressRouter::new(store.clone(), mappings, 3);

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let adapter = InMemoryIngressAdapter::new(tx);
    let router_handle = tokio::spawn(async move { router.run(rx).await });

    adapter
        .observe(Observation {
            side: Side::Pubsub,
            address: "sensor/unmapped".to_string(),
            value: serde_json::json!(1.0),
            hints: None,
        })
        .await
        .unwrap();
    drop(adapter);

    tokio::time::timeout(std::time::Duration::from_secs(2), router_handle)
        .await
        .expect("router task timed out")
        .expect("router task panicked");

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.messages_added, 0);
}
