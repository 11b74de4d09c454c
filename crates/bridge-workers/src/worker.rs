//! Egress worker pool — background task that leases batches from the
//! buffer, transforms each message, and hands it to the destination
//! adapter.
//!
//! Grounded on the same lease/transform/apply/complete-or-fail loop shape
//! as an outbox dispatcher: one poll loop per destination, sleeping a
//! fixed back-off when the lease comes back empty, logging a dead-letter
//! line when a failure finally exhausts retries.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::mapping::MappingRegistry;
use bridge_core::ports::{BufferApi, EgressAdapter, LeaseFilter};
use bridge_core::transform::Transformer;
use bridge_core::types::Side;

pub struct EgressWorker {
    buffer: Arc<dyn BufferApi>,
    adapter: Arc<dyn EgressAdapter>,
    transformer: Arc<Transformer>,
    mappings: Arc<MappingRegistry>,
    destination: Side,
    batch_size: u32,
    poll_backoff: Duration,
    running: tokio::sync::watch::Receiver<bool>,
}

impl EgressWorker {
    pub fn new(
        buffer: Arc<dyn BufferApi>,
        adapter: Arc<dyn EgressAdapter>,
        transformer: Arc<Transformer>,
        mappings: Arc<MappingRegistry>,
        destination: Side,
        batch_size: u32,
        poll_backoff: Duration,
        running: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Self {
            buffer,
            adapter,
            transformer,
            mappings,
            destination,
            batch_size,
            poll_backoff,
            running,
        }
    }

    /// Runs until the shared `running` flag flips to false. Finishes the
    /// in-flight message before checking the flag again; never aborts
    /// mid-adapter-call.
    pub async fn run(&mut self) {
        tracing::info!(
            destination = %self.destination,
            batch_size = self.batch_size,
            "egress worker started"
        );

        loop {
            if !*self.running.borrow() {
                tracing::info!(destination = %self.destination, "egress worker stopping");
                return;
            }

            let filter = LeaseFilter {
                source: None,
                destination: Some(self.destination),
            };

            let messages = match self.buffer.lease_batch(self.batch_size, filter).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(destination = %self.destination, error = %e, "lease_batch failed");
                    tokio::time::sleep(self.poll_backoff).await;
                    continue;
                }
            };

            if messages.is_empty() {
                tokio::time::sleep(self.poll_backoff).await;
                continue;
            }

            for m in messages {
                let mapping = self.mappings.by_id(&m.mapping_id);
                let transform_ref = mapping.and_then(|e| e.transform_ref.as_deref());

                let converted = self.transformer.convert(
                    &m.value,
                    m.source,
                    m.destination,
                    m.data_type,
                    &m.mapping_id,
                    transform_ref,
                );

                let outcome = match converted {
                    Ok(value) => self.adapter.apply(&m.topic_or_node, &value).await,
                    Err(e) => Err(anyhow::anyhow!(e)),
                };

                match outcome {
                    Ok(()) => {
                        if let Err(e) = self.buffer.complete(m.id).await {
                            tracing::error!(message_id = m.id, error = %e, "failed to mark message completed");
                        }
                    }
                    Err(e) => {
                        tracing::error!(message_id = m.id, error = %e, "egress delivery failed");
                        if m.retry_count >= m.max_retries {
                            tracing::error!(
                                message_id = m.id,
                                retry_count = m.retry_count,
                                "DEAD LETTER: message exceeded max_retries and will not be retried"
                            );
                        }
                        if let Err(fail_err) = self.buffer.fail(m.id, &e.to_string()).await {
                            tracing::error!(message_id = m.id, error = %fail_err, "failed to record message failure");
                        }
                    }
                }
            }
        }
    }
}
