//! Port traits — implemented by bridge-store (durable queue) and by
//! bridge-workers (adapters). Core logic and the worker loop depend only on
//! these traits, never on sqlx or a concrete protocol client directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::types::{DeadLetter, Message, NewMessage, Side};

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Filter applied by `lease_batch`; both fields optional (match-any when None).
#[derive(Debug, Clone, Default)]
pub struct LeaseFilter {
    pub source: Option<Side>,
    pub destination: Option<Side>,
}

/// Counts and timings returned by `BufferApi::stats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BufferStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub expired: i64,
    pub by_route: Vec<RouteCount>,
    pub oldest_pending: Option<DateTime<Utc>>,
    pub messages_added: i64,
    pub messages_processed: i64,
    pub messages_failed: i64,
    pub messages_expired: i64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RouteCount {
    pub source: Side,
    pub destination: Side,
    pub count: i64,
}

/// The single gateway between application logic and the durable Store.
/// Every method must be safe to call concurrently from multiple workers;
/// atomicity is provided by the Store's own transactions, never by a
/// mutex held across adapter I/O.
#[async_trait]
pub trait BufferApi: Send + Sync {
    /// Assigns an id, sets `created_at`/`expire_at` if unset, writes
    /// `status=pending`. Runs the overflow policy and retries once if the
    /// buffer is at `max_size`; returns `Ok(None)` if still full afterward.
    async fn enqueue(&self, msg: NewMessage) -> Result<Option<i64>>;

    /// Atomically selects up to `limit` eligible rows ordered by
    /// `(priority DESC, created_at ASC)` and transitions them to
    /// `processing`.
    async fn lease_batch(&self, limit: u32, filter: LeaseFilter) -> Result<Vec<Message>>;

    /// `processing|pending -> completed`, sets `processed_at = now`.
    async fn complete(&self, id: i64) -> Result<()>;

    /// Increments `retry_count`; re-queues to `pending` if under
    /// `max_retries`, otherwise writes a dead-letter row and sets
    /// `status = failed`.
    async fn fail(&self, id: i64, error: &str) -> Result<()>;

    /// Bulk `processing -> pending`. Called once at startup.
    async fn reset_processing(&self) -> Result<u64>;

    /// Expires overdue rows and deletes old terminal rows. Invoked
    /// periodically by a scheduled task.
    async fn sweep(&self) -> Result<SweepReport>;

    async fn stats(&self) -> Result<BufferStats>;

    /// Streams dead-letter rows to an external sink. Concurrent exports
    /// are forbidden; callers serialize this themselves.
    async fn export_dead_letters(&self, limit: Option<u32>) -> Result<Vec<DeadLetter>>;

    async fn pending(&self, limit: u32) -> Result<Vec<Message>>;

    async fn cleanup(&self, older_than_days: i64) -> Result<CleanupReport>;
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    pub expired: u64,
    pub completed_deleted: u64,
    pub expired_deleted: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CleanupReport {
    pub completed_deleted: u64,
    pub expired_deleted: u64,
    pub failed_deleted: u64,
}

/// A destination-side capability: apply an already-transformed value at an
/// address. The wire-level protocol client itself is out of scope; this is
/// the seam a real pub/sub, variable-server, or enterprise client plugs
/// into.
#[async_trait]
pub trait EgressAdapter: Send + Sync {
    async fn apply(&self, topic_or_node: &str, value: &serde_json::Value) -> anyhow::Result<()>;
}

/// A source-side capability: subscribe for value changes at an address.
/// Real implementations publish into an internal channel that an ingress
/// task drains and turns into `BufferApi::enqueue` calls.
#[async_trait]
pub trait IngressAdapter: Send + Sync {
    async fn subscribe(&self, address: &str) -> anyhow::Result<()>;
}

/// Read-only aggregate queries over the Store, used by the operator
/// surface (performance report, anomaly detector, load prediction). No
/// locks are held beyond each individual read, and nothing here may
/// interfere with lease ordering.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Hourly buckets covering the last `hours` hours, oldest first.
    async fn hourly_buckets(&self, hours: i64) -> Result<Vec<HourlyBucket>>;

    /// Count of rows stuck in `processing` for longer than `minutes`.
    async fn stuck_count(&self, minutes: i64) -> Result<i64>;

    /// Count of non-terminal rows per (source, destination) route.
    async fn route_pending_counts(&self) -> Result<Vec<RouteCount>>;

    /// Count of non-terminal rows with `retry_count >= max_retries - 1`.
    async fn near_retry_exhaustion_count(&self) -> Result<i64>;

    /// 30-day history bucketed by (day_of_week, hour_of_day): created
    /// count per historical day in that bucket, used for mean/stddev.
    async fn load_history(&self, days: i64) -> Result<Vec<LoadSample>>;

    /// The `limit` busiest `topic_or_node` addresses by all-time message
    /// volume, highest first.
    async fn top_addresses(&self, limit: u32) -> Result<Vec<AddressVolume>>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AddressVolume {
    pub topic_or_node: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct HourlyBucket {
    pub hour_start: DateTime<Utc>,
    pub created: i64,
    pub completed: i64,
    pub failed: i64,
    pub avg_processing_secs: Option<f64>,
    pub max_processing_secs: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LoadSample {
    pub day_of_week: u32,
    pub hour_of_day: u32,
    pub count: i64,
}

/// Resolves a symbolic custom-transform name to a conversion function.
/// Default (no match) is identity.
pub trait TransformRegistry: Send + Sync {
    fn resolve(
        &self,
        name: &str,
    ) -> Option<std::sync::Arc<dyn Fn(&serde_json::Value) -> Result<serde_json::Value> + Send + Sync>>;
}
