//! Read-only aggregate queries backing the operator surface. Every query
//! here is a plain `SELECT`; nothing holds a lock beyond the read and
//! nothing competes with lease ordering.

use async_trait::async_trait;
use bridge_core::error::BridgeError;
use bridge_core::ports::{AddressVolume, AnalyticsStore, HourlyBucket, LoadSample, Result, RouteCount};
use bridge_core::types::Side;
use chrono::{Duration, Utc};

use crate::row::parse_ts;
use crate::store::SqliteBufferStore;

#[async_trait]
impl AnalyticsStore for SqliteBufferStore {
    async fn hourly_buckets(&self, hours: i64) -> Result<Vec<HourlyBucket>> {
        let since = (Utc::now() - Duration::hours(hours)).to_rfc3339();

        let created_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT strftime('%Y-%m-%dT%H:00:00Z', created_at) AS bucket, COUNT(*)
            FROM messages WHERE created_at >= ?
            GROUP BY bucket ORDER BY bucket ASC
            "#,
        )
        .bind(&since)
        .fetch_all(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        let completed_rows: Vec<(String, i64, Option<f64>, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT
                strftime('%Y-%m-%dT%H:00:00Z', processed_at) AS bucket,
                COUNT(*),
                AVG((julianday(processed_at) - julianday(created_at)) * 86400.0),
                MAX((julianday(processed_at) - julianday(created_at)) * 86400.0)
            FROM messages
            WHERE status = 'completed' AND processed_at >= ?
            GROUP BY bucket
            "#,
        )
        .bind(&since)
        .fetch_all(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        let failed_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT strftime('%Y-%m-%dT%H:00:00Z', failed_at) AS bucket, COUNT(*)
            FROM failed_messages WHERE failed_at >= ?
            GROUP BY bucket
            "#,
        )
        .bind(&since)
        .fetch_all(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        let mut buckets: std::collections::BTreeMap<String, HourlyBucket> = std::collections::BTreeMap::new();

        for (bucket, count) in created_rows {
            let entry = buckets.entry(bucket.clone()).or_insert_with(|| HourlyBucket {
                hour_start: parse_ts(&bucket).unwrap_or_else(|_| Utc::now()),
                created: 0,
                completed: 0,
                failed: 0,
                avg_processing_secs: None,
                max_processing_secs: None,
            });
            entry.created = count;
        }

        for (bucket, count, avg, max) in completed_rows {
            let entry = buckets.entry(bucket.clone()).or_insert_with(|| HourlyBucket {
                hour_start: parse_ts(&bucket).unwrap_or_else(|_| Utc::now()),
                created: 0,
                completed: 0,
                failed: 0,
                avg_processing_secs: None,
                max_processing_secs: None,
            });
            entry.completed = count;
            entry.avg_processing_secs = avg;
            entry.max_processing_secs = max;
        }

        for (bucket, count) in failed_rows {
            let entry = buckets.entry(bucket.clone()).or_insert_with(|| HourlyBucket {
                hour_start: parse_ts(&bucket).unwrap_or_else(|_| Utc::now()),
                created: 0,
                completed: 0,
                failed: 0,
                avg_processing_secs: None,
                max_processing_secs: None,
            });
            entry.failed = count;
        }

        Ok(buckets.into_values().collect())
    }

    async fn stuck_count(&self, minutes: i64) -> Result<i64> {
        let cutoff = (Utc::now() - Duration::minutes(minutes)).to_rfc3339();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE status = 'processing' AND created_at < ?",
        )
        .bind(cutoff)
        .fetch_one(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;
        Ok(count)
    }

    async fn route_pending_counts(&self) -> Result<Vec<RouteCount>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT source, destination, COUNT(*) FROM messages WHERE status IN ('pending','processing') GROUP BY source, destination",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(s, d, count)| {
                Some(RouteCount {
                    source: s.parse::<Side>().ok()?,
                    destination: d.parse::<Side>().ok()?,
                    count,
                })
            })
            .collect())
    }

    async fn near_retry_exhaustion_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE status NOT IN ('completed','failed','expired') AND retry_count >= max_retries - 1",
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;
        Ok(count)
    }

    async fn load_history(&self, days: i64) -> Result<Vec<LoadSample>> {
        let since = (Utc::now() - Duration::days(days)).to_rfc3339();
        // One row per calendar day per hour, not summed across the whole
        // window: the predictor needs one sample per historical occurrence
        // of a (day-of-week, hour-of-day) bucket to compute a stddev, and
        // `date(created_at)` determines `dow` for the whole day, so
        // grouping by (day, hod) is equivalent to grouping by (dow, hod, day).
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT strftime('%w', created_at) AS dow, strftime('%H', created_at) AS hod, COUNT(*)
            FROM messages WHERE created_at >= ?
            GROUP BY date(created_at), hod
            "#,
        )
        .bind(since)
        .fetch_all(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(dow, hod, count)| {
                Some(LoadSample {
                    day_of_week: dow.parse().ok()?,
                    hour_of_day: hod.parse().ok()?,
                    count,
                })
            })
            .collect())
    }

    async fn top_addresses(&self, limit: u32) -> Result<Vec<AddressVolume>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT topic_or_node, COUNT(*) FROM messages GROUP BY topic_or_node ORDER BY COUNT(*) DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| BridgeError::Store(e.into()))?;

        Ok(rows
            .into_iter()
            .map(|(topic_or_node, count)| AddressVolume { topic_or_node, count })
            .collect())
    }
}
