//! Ingress adapter shell — per side, observes external value changes and
//! turns them into `Buffer.enqueue` calls via the mapping registry.
//!
//! Callback-driven adapter APIs are modeled as a capability surface: the
//! adapter publishes observed `(address, value)` pairs into an internal
//! bounded channel; this task drains the channel and calls
//! `Buffer.enqueue` synchronously per matching mapping. The adapter never
//! de-duplicates — repeat values enqueue as distinct messages.

use std::sync::Arc;

use bridge_core::mapping::MappingRegistry;
use bridge_core::ports::BufferApi;
use bridge_core::types::{Direction, NewMessage, Side};
use tokio::sync::mpsc::Receiver;

/// A value observed at `address` on `side`, published by an adapter.
pub struct Observation {
    pub side: Side,
    pub address: String,
    pub value: serde_json::Value,
    /// Extra hints (QoS, origin) merged into the enqueued message's metadata.
    pub hints: Option<serde_json::Value>,
}

pub struct IngressRouter {
    buffer: Arc<dyn BufferApi>,
    mappings: Arc<MappingRegistry>,
    max_retries: u32,
}

impl IngressRouter {
    pub fn new(buffer: Arc<dyn BufferApi>, mappings: Arc<MappingRegistry>, max_retries: u32) -> Self {
        Self {
            buffer,
            mappings,
            max_retries,
        }
    }

    /// Drains `rx` until the channel closes, enqueueing one message per
    /// matching mapping for each observation.
    pub async fn run(&self, mut rx: Receiver<Observation>) {
        while let Some(obs) = rx.recv().await {
            let matches = self.mappings.matching_ingress(obs.side, &obs.address);
            if matches.is_empty() {
                tracing::debug!(side = %obs.side, address = %obs.address, "no mapping for observed address");
                continue;
            }

            for mapping in matches {
                let (destination, destination_address) = if mapping.source_side == obs.side
                    && mapping.source_address == obs.address
                {
                    (mapping.destination_side, mapping.destination_address.clone())
                } else {
                    (mapping.source_side, mapping.source_address.clone())
                };

                if !flow_allowed(mapping.direction, obs.side, destination, mapping) {
                    continue;
                }

                let mut metadata = serde_json::json!({
                    "mapping": mapping.mapping_id,
                    "source_hints": obs.hints,
                });
                if let serde_json::Value::Object(ref mut map) = metadata {
                    map.insert("source_side".to_string(), serde_json::Value::String(obs.side.as_str().to_string()));
                }

                let new_message = NewMessage {
                    source: obs.side,
                    destination,
                    topic_or_node: destination_address,
                    mapping_id: mapping.mapping_id.clone(),
                    value: obs.value.clone(),
                    data_type: mapping.data_type,
                    priority: mapping.priority,
                    max_retries: self.max_retries,
                    ttl: None,
                    metadata: Some(metadata),
                };

                match self.buffer.enqueue(new_message).await {
                    Ok(Some(id)) => tracing::debug!(message_id = id, "ingress enqueued message"),
                    Ok(None) => tracing::warn!(mapping_id = %mapping.mapping_id, "ingress enqueue rejected (buffer full)"),
                    Err(e) => tracing::error!(mapping_id = %mapping.mapping_id, error = %e, "ingress enqueue failed"),
                }
            }
        }
    }
}

fn flow_allowed(direction: Direction, from: Side, to: Side, mapping: &bridge_core::types::MappingEntry) -> bool {
    let forward = mapping.source_side == from && mapping.destination_side == to;
    match direction {
        Direction::Bidirectional => true,
        Direction::AToB => forward,
        Direction::BToA => !forward,
    }
}
