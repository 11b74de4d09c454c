//! Enterprise-side adapter glue: push (retry/backoff) and poll-fetch,
//! with basic or OAuth2 client-credentials auth. The HTTP client itself is
//! the kind of wire-level protocol client the core treats as a black box;
//! this module only supplies the retry/auth shape the enterprise side
//! needs around it.

use std::time::Duration;

use async_trait::async_trait;
use bridge_core::config::{AuthConfig, RetryConfig};
use bridge_core::ports::EgressAdapter;

/// Distinguishes a fetch that returned nothing to process from one that
/// failed outright. Kept separate rather than collapsed into a single
/// `Option`, since whether an empty result counts as a failure-metric is
/// an open question the original system answers inconsistently (null is a
/// failure; an empty list is not) and this bridge preserves that
/// distinction instead of silently resolving it.
pub enum FetchOutcome {
    Items(Vec<serde_json::Value>),
    Empty,
    Failed(String),
}

#[async_trait]
pub trait EnterpriseClient: Send + Sync {
    async fn push(&self, resource: &str, payload: &serde_json::Value) -> anyhow::Result<()>;
    async fn fetch(&self, resource: &str) -> anyhow::Result<Option<Vec<serde_json::Value>>>;
}

pub struct EnterpriseAdapter<C: EnterpriseClient> {
    client: C,
    retry: RetryConfig,
    #[allow(dead_code)]
    auth: Option<AuthConfig>,
}

impl<C: EnterpriseClient> EnterpriseAdapter<C> {
    pub fn new(client: C, retry: RetryConfig, auth: Option<AuthConfig>) -> Self {
        Self { client, retry, auth }
    }

    /// Pushes with a bounded inner retry loop. This is adapter-level glue,
    /// not a replacement for the buffer's own `fail`/dead-letter
    /// machinery — if every attempt here fails, the egress worker still
    /// calls `Buffer.fail` on the outer error.
    pub async fn push_with_retry(&self, resource: &str, payload: &serde_json::Value) -> anyhow::Result<()> {
        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            match self.client.push(resource, payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(resource, attempt, error = %e, "enterprise push attempt failed");
                    last_err = Some(e);
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(Duration::from_secs(self.retry.backoff_seconds)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("enterprise push exhausted retries")))
    }

    pub async fn fetch(&self, resource: &str) -> FetchOutcome {
        match self.client.fetch(resource).await {
            Ok(Some(items)) if items.is_empty() => FetchOutcome::Empty,
            Ok(Some(items)) => FetchOutcome::Items(items),
            Ok(None) => FetchOutcome::Failed(format!("fetch({resource}) returned null")),
            Err(e) => FetchOutcome::Failed(e.to_string()),
        }
    }

    /// The enterprise side's ingress shape: it polls rather than
    /// subscribes. Fetches `resources` on a fixed interval and publishes
    /// each returned item as an `Observation` into `tx`, where
    /// `IngressRouter` picks it up the same as a pubsub/variable
    /// subscription callback would. Stops once `running` flips to false.
    pub async fn run_poll_loop(
        &self,
        resources: Vec<String>,
        interval: Duration,
        tx: tokio::sync::mpsc::Sender<crate::ingress::Observation>,
        mut running: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            if !*running.borrow() {
                return;
            }

            for resource in &resources {
                match self.fetch(resource).await {
                    FetchOutcome::Items(items) => {
                        for value in items {
                            let obs = crate::ingress::Observation {
                                side: bridge_core::types::Side::Enterprise,
                                address: resource.clone(),
                                value,
                                hints: None,
                            };
                            if tx.send(obs).await.is_err() {
                                return;
                            }
                        }
                    }
                    FetchOutcome::Empty => {}
                    FetchOutcome::Failed(err) => {
                        tracing::warn!(resource = %resource, error = %err, "enterprise fetch failed");
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = running.changed() => {
                    if !*running.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<C: EnterpriseClient> EgressAdapter for EnterpriseAdapter<C> {
    async fn apply(&self, topic_or_node: &str, value: &serde_json::Value) -> anyhow::Result<()> {
        self.push_with_retry(topic_or_node, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        fail_until: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EnterpriseClient for FlakyClient {
        async fn push(&self, _resource: &str, _payload: &serde_json::Value) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_until {
                anyhow::bail!("not yet");
            }
            Ok(())
        }

        async fn fetch(&self, _resource: &str) -> anyhow::Result<Option<Vec<serde_json::Value>>> {
            Ok(Some(vec![]))
        }
    }

    #[tokio::test]
    async fn push_retries_until_success_within_max_attempts() {
        let client = FlakyClient {
            fail_until: 2,
            calls: AtomicU32::new(0),
        };
        let adapter = EnterpriseAdapter::new(
            client,
            RetryConfig {
                max_attempts: 3,
                backoff_seconds: 0,
                min_release_age_seconds: 0,
            },
            None,
        );
        let result = adapter.push_with_retry("r1", &serde_json::json!({})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fetch_empty_list_is_not_a_failure() {
        let client = FlakyClient {
            fail_until: 0,
            calls: AtomicU32::new(0),
        };
        let adapter = EnterpriseAdapter::new(
            client,
            RetryConfig {
                max_attempts: 1,
                backoff_seconds: 0,
                min_release_age_seconds: 0,
            },
            None,
        );
        let outcome = adapter.fetch("r1").await;
        assert!(matches!(outcome, FetchOutcome::Empty));
    }

    struct OneShotClient {
        served: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl EnterpriseClient for OneShotClient {
        async fn push(&self, _resource: &str, _payload: &serde_json::Value) -> anyhow::Result<()> {
            Ok(())
        }

        async fn fetch(&self, _resource: &str) -> anyhow::Result<Option<Vec<serde_json::Value>>> {
            if self.served.swap(true, Ordering::SeqCst) {
                Ok(Some(vec![]))
            } else {
                Ok(Some(vec![serde_json::json!({"level": 12.0})]))
            }
        }
    }

    #[tokio::test]
    async fn poll_loop_publishes_fetched_items_as_observations() {
        let client = OneShotClient {
            served: std::sync::atomic::AtomicBool::new(false),
        };
        let adapter = EnterpriseAdapter::new(
            client,
            RetryConfig {
                max_attempts: 1,
                backoff_seconds: 0,
                min_release_age_seconds: 0,
            },
            None,
        );

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let (running_tx, running_rx) = tokio::sync::watch::channel(true);

        let handle = tokio::spawn(async move {
            adapter
                .run_poll_loop(vec!["tank.level".to_string()], Duration::from_millis(20), tx, running_rx)
                .await;
        });

        let obs = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("poll loop did not publish in time")
            .expect("channel closed without an observation");
        assert_eq!(obs.address, "tank.level");
        assert_eq!(obs.value, serde_json::json!({"level": 12.0}));

        running_tx.send(false).unwrap();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;
    }
}
