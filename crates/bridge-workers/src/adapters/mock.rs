//! In-memory fakes used to drive the worker loop in tests without a real
//! pub/sub broker or variable server. The wire-level protocol clients
//! themselves are out of scope; these stand in for "adapter[D].apply".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bridge_core::ports::{EgressAdapter, IngressAdapter};

#[derive(Default)]
pub struct InMemoryEgressAdapter {
    applied: Mutex<Vec<(String, serde_json::Value)>>,
    fail_next: Mutex<bool>,
    fail_always: AtomicBool,
}

impl InMemoryEgressAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_call(&self) {
        *self.fail_next.lock().expect("lock poisoned") = true;
    }

    /// Makes every future `apply` call fail, unlike `fail_next_call`'s
    /// single-shot failure — for exercising dead-lettering, where the
    /// adapter never recovers within `max_retries`.
    pub fn fail_always(&self) {
        self.fail_always.store(true, Ordering::SeqCst);
    }

    pub fn applied(&self) -> Vec<(String, serde_json::Value)> {
        self.applied.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl EgressAdapter for InMemoryEgressAdapter {
    async fn apply(&self, topic_or_node: &str, value: &serde_json::Value) -> anyhow::Result<()> {
        if self.fail_always.load(Ordering::SeqCst) {
            anyhow::bail!("simulated adapter failure");
        }

        let mut should_fail = self.fail_next.lock().expect("lock poisoned");
        if *should_fail {
            *should_fail = false;
            anyhow::bail!("simulated adapter failure");
        }
        drop(should_fail);

        self.applied
            .lock()
            .expect("lock poisoned")
            .push((topic_or_node.to_string(), value.clone()));
        Ok(())
    }
}

/// A fake ingress source a test can push observations through, standing in
/// for a real subscription callback context. `subscribe` is a no-op here —
/// a real client would register with its upstream broker/server and start
/// publishing into `tx` as values change; this fake lets a caller publish
/// directly via `observe`.
pub struct InMemoryIngressAdapter {
    pub tx: tokio::sync::mpsc::Sender<crate::ingress::Observation>,
}

impl InMemoryIngressAdapter {
    pub fn new(tx: tokio::sync::mpsc::Sender<crate::ingress::Observation>) -> Self {
        Self { tx }
    }

    pub async fn observe(&self, obs: crate::ingress::Observation) -> anyhow::Result<()> {
        self.tx.send(obs).await.map_err(|e| anyhow::anyhow!("observation channel closed: {e}"))
    }
}

#[async_trait]
impl IngressAdapter for InMemoryIngressAdapter {
    async fn subscribe(&self, _address: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Placeholder `EnterpriseClient` that never has anything to push or
/// fetch. Lets the service binary wire up `EnterpriseAdapter`'s
/// push-retry and poll-loop machinery against a real client seam before
/// one exists, the same role `InMemoryEgressAdapter` plays for the
/// subscribe-based sides.
#[derive(Default)]
pub struct NullEnterpriseClient;

#[async_trait]
impl super::enterprise::EnterpriseClient for NullEnterpriseClient {
    async fn push(&self, _resource: &str, _payload: &serde_json::Value) -> anyhow::Result<()> {
        Ok(())
    }

    async fn fetch(&self, _resource: &str) -> anyhow::Result<Option<Vec<serde_json::Value>>> {
        Ok(Some(Vec::new()))
    }
}
