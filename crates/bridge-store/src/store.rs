//! SQLite-backed implementation of `bridge_core::ports::BufferApi`.
//!
//! All SQL is runtime-checked (`sqlx::query`/`query_as`, never the `query!`
//! macro family) so nothing here requires a live database at build time.
//!
//! SQLite has no `FOR UPDATE SKIP LOCKED` equivalent. `lease_batch` instead
//! runs its select-then-update inside one transaction on a pool sized for a
//! single writer connection; SQLite serializes writers on its own, so the
//! transaction boundary alone gives the same atomicity the reference
//! Postgres adapter gets from `SKIP LOCKED` plus `RETURNING`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bridge_core::error::BridgeError;
use bridge_core::ports::{BufferApi, BufferStats, CleanupReport, LeaseFilter, Result, RouteCount, SweepReport};
use bridge_core::types::{DeadLetter, Message, NewMessage, Priority, Side};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::row::{parse_ts, DeadLetterRow, MessageRow};

/// Overflow policy bounds from the design: delete up to 100 oldest
/// completed rows; if fewer than 50 were deleted, delete up to 100
/// already-expired rows.
const OVERFLOW_COMPLETED_BATCH: i64 = 100;
const OVERFLOW_COMPLETED_MIN: i64 = 50;
const OVERFLOW_EXPIRED_BATCH: i64 = 100;

pub struct SqliteBufferStore {
    pool: SqlitePool,
    max_size: u64,
    default_ttl: Duration,
    priority_limits: HashMap<Priority, u64>,

    messages_added: AtomicI64,
    messages_processed: AtomicI64,
    messages_failed: AtomicI64,
    messages_expired: AtomicI64,
}

impl SqliteBufferStore {
    pub fn new(
        pool: SqlitePool,
        max_size: u64,
        default_ttl: Duration,
        priority_limits: HashMap<Priority, u64>,
    ) -> Self {
        Self {
            pool,
            max_size,
            default_ttl,
            priority_limits,
            messages_added: AtomicI64::new(0),
            messages_processed: AtomicI64::new(0),
            messages_failed: AtomicI64::new(0),
            messages_expired: AtomicI64::new(0),
        }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn count_pending(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?;
        Ok(count)
    }

    async fn count_by_priority(&self, priority: Priority) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE status IN ('pending', 'processing') AND priority = ?",
        )
        .bind(priority.as_i32())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;
        Ok(count)
    }

    /// Delete up to 100 oldest completed rows; if fewer than 50 were
    /// deleted, delete up to 100 already-expired rows too.
    async fn run_overflow_policy(&self) -> Result<()> {
        let deleted_completed = sqlx::query(
            r#"
            DELETE FROM messages WHERE id IN (
                SELECT id FROM messages WHERE status = 'completed'
                ORDER BY created_at ASC LIMIT ?
            )
            "#,
        )
        .bind(OVERFLOW_COMPLETED_BATCH)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?
        .rows_affected() as i64;

        tracing::warn!(deleted_completed, "buffer overflow: deleted oldest completed rows");

        if deleted_completed < OVERFLOW_COMPLETED_MIN {
            let deleted_expired = sqlx::query(
                r#"
                DELETE FROM messages WHERE id IN (
                    SELECT id FROM messages WHERE status = 'expired'
                    ORDER BY expire_at ASC LIMIT ?
                )
                "#,
            )
            .bind(OVERFLOW_EXPIRED_BATCH)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?
            .rows_affected() as i64;

            tracing::warn!(deleted_expired, "buffer overflow: deleted already-expired rows");
        }

        Ok(())
    }
}

#[async_trait]
impl BufferApi for SqliteBufferStore {
    async fn enqueue(&self, msg: NewMessage) -> Result<Option<i64>> {
        if let Some(limit) = self.priority_limits.get(&msg.priority) {
            if *limit > 0 && self.count_by_priority(msg.priority).await? as u64 >= *limit {
                tracing::warn!(priority = msg.priority.as_str(), "enqueue rejected: priority soft limit reached");
                return Ok(None);
            }
        }

        let mut pending = self.count_pending().await?;
        if pending as u64 >= self.max_size {
            self.run_overflow_policy().await?;
            pending = self.count_pending().await?;
            if pending as u64 >= self.max_size {
                tracing::error!(max_size = self.max_size, "enqueue rejected: buffer still full after overflow policy");
                return Ok(None);
            }
        }

        let now = Utc::now();
        let expire_at = now + msg.ttl.unwrap_or(self.default_ttl);
        let value_text = serde_json::to_string(&msg.value)
            .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
        let metadata_text = msg
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;

        let id = sqlx::query(
            r#"
            INSERT INTO messages
                (source, destination, topic_or_node, mapping_id, value, data_type,
                 status, priority, retry_count, max_retries, created_at, expire_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(msg.source.as_str())
        .bind(msg.destination.as_str())
        .bind(&msg.topic_or_node)
        .bind(&msg.mapping_id)
        .bind(&value_text)
        .bind(msg.data_type.as_str())
        .bind(msg.priority.as_i32())
        .bind(msg.max_retries as i64)
        .bind(now.to_rfc3339())
        .bind(expire_at.to_rfc3339())
        .bind(metadata_text)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?
        .last_insert_rowid();

        self.messages_added.fetch_add(1, Ordering::Relaxed);
        Ok(Some(id))
    }

    async fn lease_batch(&self, limit: u32, filter: LeaseFilter) -> Result<Vec<Message>> {
        let mut tx = self.pool.begin().await.map_err(|e| BridgeError::Store(e.into()))?;
        let now = Utc::now().to_rfc3339();

        let mut query = String::from(
            "SELECT id FROM messages WHERE status = 'pending' AND expire_at > ? AND retry_count <= max_retries",
        );
        if filter.source.is_some() {
            query.push_str(" AND source = ?");
        }
        if filter.destination.is_some() {
            query.push_str(" AND destination = ?");
        }
        query.push_str(" ORDER BY priority DESC, created_at ASC LIMIT ?");

        let mut q = sqlx::query_as::<_, (i64,)>(&query).bind(&now);
        if let Some(source) = filter.source {
            q = q.bind(source.as_str());
        }
        if let Some(destination) = filter.destination {
            q = q.bind(destination.as_str());
        }
        q = q.bind(limit as i64);

        let ids: Vec<i64> = q
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?
            .into_iter()
            .map(|(id,)| id)
            .collect();

        if ids.is_empty() {
            tx.commit().await.map_err(|e| BridgeError::Store(e.into()))?;
            return Ok(Vec::new());
        }

        let placeholders = std::iter::repeat("?").take(ids.len()).collect::<Vec<_>>().join(",");
        let update_sql = format!("UPDATE messages SET status = 'processing' WHERE id IN ({placeholders})");
        let mut update = sqlx::query(&update_sql);
        for id in &ids {
            update = update.bind(id);
        }
        update.execute(&mut *tx).await.map_err(|e| BridgeError::Store(e.into()))?;

        let select_sql = format!("SELECT * FROM messages WHERE id IN ({placeholders})");
        let mut select = sqlx::query_as::<_, MessageRow>(&select_sql);
        for id in &ids {
            select = select.bind(id);
        }
        let rows = select.fetch_all(&mut *tx).await.map_err(|e| BridgeError::Store(e.into()))?;

        tx.commit().await.map_err(|e| BridgeError::Store(e.into()))?;

        let mut messages: Vec<Message> = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>>>()?;
        messages.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(messages)
    }

    async fn complete(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE messages SET status = 'completed', processed_at = ? WHERE id = ? AND status IN ('processing', 'pending')",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        if result.rows_affected() > 0 {
            self.messages_processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| BridgeError::Store(e.into()))?;

        let row: Option<(i64, i64, String, String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT retry_count, max_retries, source, destination, topic_or_node, value, metadata FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        let Some((retry_count, max_retries, source, destination, topic_or_node, value, metadata)) = row else {
            tx.commit().await.map_err(|e| BridgeError::Store(e.into()))?;
            return Ok(());
        };

        let new_retry_count = retry_count + 1;
        let now = Utc::now();

        if retry_count >= max_retries {
            sqlx::query(
                "UPDATE messages SET status = 'failed', error_message = ?, processed_at = ? WHERE id = ?",
            )
            .bind(error)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?;

            sqlx::query(
                r#"
                INSERT INTO failed_messages
                    (original_id, source, destination, topic_or_node, value, error_message, failed_at, retry_count, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&source)
            .bind(&destination)
            .bind(&topic_or_node)
            .bind(&value)
            .bind(error)
            .bind(now.to_rfc3339())
            .bind(retry_count)
            .bind(&metadata)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?;

            self.messages_failed.fetch_add(1, Ordering::Relaxed);
        } else {
            sqlx::query("UPDATE messages SET status = 'pending', retry_count = ?, error_message = ? WHERE id = ?")
                .bind(new_retry_count)
                .bind(error)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::Store(e.into()))?;
        }

        tx.commit().await.map_err(|e| BridgeError::Store(e.into()))?;
        Ok(())
    }

    async fn reset_processing(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE messages SET status = 'pending' WHERE status = 'processing'")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?;
        Ok(result.rows_affected())
    }

    async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();

        let expired_result = sqlx::query(
            "UPDATE messages SET status = 'expired' WHERE expire_at <= ? AND status IN ('pending', 'processing')",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;
        let expired = expired_result.rows_affected();
        self.messages_expired.fetch_add(expired as i64, Ordering::Relaxed);

        let completed_cutoff = (now - Duration::hours(24)).to_rfc3339();
        let completed_deleted = sqlx::query("DELETE FROM messages WHERE status = 'completed' AND processed_at < ?")
            .bind(completed_cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?
            .rows_affected();

        let expired_cutoff = (now - Duration::days(7)).to_rfc3339();
        let expired_deleted = sqlx::query("DELETE FROM messages WHERE status = 'expired' AND expire_at < ?")
            .bind(expired_cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?
            .rows_affected();

        Ok(SweepReport {
            expired,
            completed_deleted,
            expired_deleted,
        })
    }

    async fn stats(&self) -> Result<BufferStats> {
        let status_counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM messages GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| BridgeError::Store(e.into()))?;

        let mut pending = 0;
        let mut processing = 0;
        let mut completed = 0;
        let mut failed = 0;
        let mut expired = 0;
        for (status, count) in status_counts {
            match status.as_str() {
                "pending" => pending = count,
                "processing" => processing = count,
                "completed" => completed = count,
                "failed" => failed = count,
                "expired" => expired = count,
                _ => {}
            }
        }

        let route_rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT source, destination, COUNT(*) FROM messages WHERE status IN ('pending', 'processing') GROUP BY source, destination",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        let by_route = route_rows
            .into_iter()
            .filter_map(|(s, d, count)| {
                Some(RouteCount {
                    source: s.parse::<Side>().ok()?,
                    destination: d.parse::<Side>().ok()?,
                    count,
                })
            })
            .collect();

        let oldest_pending: Option<(String,)> =
            sqlx::query_as("SELECT created_at FROM messages WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| BridgeError::Store(e.into()))?;

        let utilization_pct = if self.max_size > 0 {
            (pending as f64 / self.max_size as f64) * 100.0
        } else {
            0.0
        };

        Ok(BufferStats {
            pending,
            processing,
            completed,
            failed,
            expired,
            by_route,
            oldest_pending: oldest_pending.map(|(ts,)| parse_ts(&ts)).transpose()?,
            messages_added: self.messages_added.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            messages_expired: self.messages_expired.load(Ordering::Relaxed),
            utilization_pct,
        })
    }

    async fn export_dead_letters(&self, limit: Option<u32>) -> Result<Vec<DeadLetter>> {
        let rows: Vec<DeadLetterRow> = match limit {
            Some(n) => sqlx::query_as("SELECT * FROM failed_messages ORDER BY failed_at DESC LIMIT ?")
                .bind(n as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| BridgeError::Store(e.into()))?,
            None => sqlx::query_as("SELECT * FROM failed_messages ORDER BY failed_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| BridgeError::Store(e.into()))?,
        };
        rows.into_iter().map(DeadLetter::try_from).collect()
    }

    async fn pending(&self, limit: u32) -> Result<Vec<Message>> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT * FROM messages
            WHERE status = 'pending' AND expire_at > ? AND retry_count <= max_retries
            ORDER BY priority DESC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn cleanup(&self, older_than_days: i64) -> Result<CleanupReport> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).to_rfc3339();

        let completed_deleted =
            sqlx::query("DELETE FROM messages WHERE status = 'completed' AND processed_at < ?")
                .bind(&cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| BridgeError::Store(e.into()))?
                .rows_affected();

        let expired_deleted = sqlx::query("DELETE FROM messages WHERE status = 'expired' AND expire_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?
            .rows_affected();

        let failed_deleted = sqlx::query("DELETE FROM failed_messages WHERE failed_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Store(e.into()))?
            .rows_affected();

        Ok(CleanupReport {
            completed_deleted,
            expired_deleted,
            failed_deleted,
        })
    }
}
