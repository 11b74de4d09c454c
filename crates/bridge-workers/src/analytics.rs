//! Operator Surface (C7): performance report, anomaly detection, and load
//! prediction, built entirely from read-only `AnalyticsStore`/`BufferApi`
//! queries.

use std::sync::Arc;

use bridge_core::config::MonitoringConfig;
use bridge_core::ports::{AnalyticsStore, BufferApi, HourlyBucket, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub buckets: Vec<HourlyBucketView>,
    pub trend: Trend,
    pub success_rate_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucketView {
    pub hour_start: DateTime<Utc>,
    pub created: i64,
    pub completed: i64,
    pub failed: i64,
    pub avg_processing_secs: Option<f64>,
    pub max_processing_secs: Option<f64>,
    pub success_rate_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    StuckMessages,
    HighFailureRate,
    QueueBuildup,
    NearRetryExhaustion,
    RouteCongestion,
    SlowProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadPrediction {
    pub time: DateTime<Utc>,
    pub predicted_count: f64,
    pub range_low: f64,
    pub range_high: f64,
    pub confidence: f64,
    pub recommendation: &'static str,
}

pub struct OperatorSurface {
    buffer: Arc<dyn BufferApi>,
    analytics: Arc<dyn AnalyticsStore>,
    monitoring: MonitoringConfig,
}

impl OperatorSurface {
    pub fn new(buffer: Arc<dyn BufferApi>, analytics: Arc<dyn AnalyticsStore>, monitoring: MonitoringConfig) -> Self {
        Self {
            buffer,
            analytics,
            monitoring,
        }
    }

    pub async fn performance_report(&self, hours: i64) -> Result<PerformanceReport> {
        let mut raw = self.analytics.hourly_buckets(hours).await?;
        raw.sort_by_key(|b| b.hour_start);

        let views: Vec<HourlyBucketView> = raw
            .iter()
            .map(|b| {
                let success_rate_pct = if b.completed + b.failed > 0 {
                    (b.completed as f64 / (b.completed + b.failed) as f64) * 100.0
                } else {
                    100.0
                };
                HourlyBucketView {
                    hour_start: b.hour_start,
                    created: b.created,
                    completed: b.completed,
                    failed: b.failed,
                    avg_processing_secs: b.avg_processing_secs,
                    max_processing_secs: b.max_processing_secs,
                    success_rate_pct,
                }
            })
            .collect();

        let trend = compute_trend(&raw);

        let total_completed: i64 = raw.iter().map(|b| b.completed).sum();
        let total_failed: i64 = raw.iter().map(|b| b.failed).sum();
        let success_rate_pct = if total_completed + total_failed > 0 {
            (total_completed as f64 / (total_completed + total_failed) as f64) * 100.0
        } else {
            100.0
        };

        Ok(PerformanceReport {
            buckets: views,
            trend,
            success_rate_pct,
        })
    }

    /// Runs all six configurable-threshold anomaly checks.
    pub async fn detect_anomalies(&self) -> Result<Vec<Anomaly>> {
        let mut anomalies = Vec::new();
        let m = &self.monitoring;

        let stuck = self.analytics.stuck_count(m.stuck_minutes).await?;
        if stuck > 0 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::StuckMessages,
                severity: Severity::High,
                detail: format!("{stuck} message(s) stuck in processing for over {} minutes", m.stuck_minutes),
            });
        }

        let recent = self.analytics.hourly_buckets(1).await?;
        let (completed, failed): (i64, i64) = recent
            .iter()
            .fold((0, 0), |(c, f), b| (c + b.completed, f + b.failed));
        if completed + failed > 0 {
            let failure_rate = (failed as f64 / (completed + failed) as f64) * 100.0;
            if failure_rate > m.high_failure_rate_pct {
                let severity = if failure_rate > m.critical_failure_rate_pct {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(Anomaly {
                    kind: AnomalyKind::HighFailureRate,
                    severity,
                    detail: format!("failure rate {failure_rate:.1}% in the last hour"),
                });
            }
        }

        let stats = self.buffer.stats().await?;
        if stats.pending > m.queue_buildup_pending {
            let severity = if stats.pending > m.critical_queue_buildup_pending {
                Severity::High
            } else {
                Severity::Medium
            };
            anomalies.push(Anomaly {
                kind: AnomalyKind::QueueBuildup,
                severity,
                detail: format!("{} pending messages", stats.pending),
            });
        }

        let near_exhaustion = self.analytics.near_retry_exhaustion_count().await?;
        if near_exhaustion > 0 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::NearRetryExhaustion,
                severity: Severity::Medium,
                detail: format!("{near_exhaustion} message(s) one failure away from dead-letter"),
            });
        }

        // Route congestion: queried at the lower threshold (matching the
        // original's `HAVING count > 100`), but only surfaced once it
        // crosses the higher reporting threshold — an observed asymmetry
        // kept intentionally rather than "fixed" into reporting every
        // route over the query threshold.
        let routes = self.analytics.route_pending_counts().await?;
        for route in routes {
            if route.count > m.route_congestion_query_threshold && route.count > m.route_congestion_report_threshold {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::RouteCongestion,
                    severity: Severity::High,
                    detail: format!("{} -> {}: {} pending", route.source, route.destination, route.count),
                });
            }
        }

        if let Some(avg) = recent
            .iter()
            .filter_map(|b| b.avg_processing_secs)
            .collect::<Vec<_>>()
            .into_iter()
            .reduce(|a, b| a + b)
        {
            let bucket_count = recent.iter().filter(|b| b.avg_processing_secs.is_some()).count().max(1);
            let overall_avg = avg / bucket_count as f64;
            if overall_avg > m.slow_processing_secs {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::SlowProcessing,
                    severity: Severity::Medium,
                    detail: format!("average processing time {overall_avg:.1}s in the last hour"),
                });
            }
        }

        Ok(anomalies)
    }

    /// Predicts load for the next `next_hours`, bucketed by
    /// (day-of-week, hour-of-day) across 30 days of history, falling back
    /// to a flat 7-day hourly average when a bucket has no history.
    pub async fn predict_load(&self, next_hours: i64) -> Result<Vec<LoadPrediction>> {
        let history = self.analytics.load_history(30).await?;
        let recent = self.analytics.load_history(7).await?;

        let fallback_avg = if !recent.is_empty() {
            let total: i64 = recent.iter().map(|s| s.count).sum();
            let hours = recent.iter().map(|s| (s.day_of_week, s.hour_of_day)).collect::<std::collections::HashSet<_>>().len().max(1);
            total as f64 / hours as f64 / 30.0
        } else {
            0.0
        };

        let mut predictions = Vec::new();
        let now = Utc::now();

        for h in 0..next_hours {
            let target = now + Duration::hours(h + 1);
            let dow = target.format("%w").to_string().parse::<u32>().unwrap_or(0);
            let hod = target.format("%H").to_string().parse::<u32>().unwrap_or(0);

            let samples: Vec<f64> = history
                .iter()
                .filter(|s| s.day_of_week == dow && s.hour_of_day == hod)
                .map(|s| s.count as f64)
                .collect();

            let (mean, stdev, confidence) = if !samples.is_empty() {
                let n = samples.len() as f64;
                let mean = samples.iter().sum::<f64>() / n;
                let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let stdev = variance.sqrt();
                let confidence = (50.0 + 2.0 * n).min(90.0);
                (mean, stdev, confidence)
            } else {
                (fallback_avg, 0.0, 30.0)
            };

            predictions.push(LoadPrediction {
                time: target,
                predicted_count: mean,
                range_low: (mean - stdev).max(0.0),
                range_high: mean + stdev,
                confidence,
                recommendation: load_recommendation(mean),
            });
        }

        Ok(predictions)
    }
}

fn load_recommendation(predicted: f64) -> &'static str {
    if predicted < 1000.0 {
        "normal operation"
    } else if predicted < 5000.0 {
        "monitor closely"
    } else if predicted < 10000.0 {
        "consider scaling egress workers"
    } else {
        "scale egress workers now"
    }
}

fn compute_trend(buckets: &[bridge_core::ports::HourlyBucket]) -> Trend {
    if buckets.len() < 4 {
        return Trend::Stable;
    }

    let split = buckets.len() - 3;
    let recent: Vec<f64> = buckets[split..].iter().map(|b| b.created as f64).collect();
    let earlier: Vec<f64> = buckets[..split].iter().map(|b| b.created as f64).collect();

    if earlier.is_empty() {
        return Trend::Stable;
    }

    let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;
    let earlier_mean = earlier.iter().sum::<f64>() / earlier.len() as f64;

    if earlier_mean == 0.0 {
        return Trend::Stable;
    }

    let ratio = recent_mean / earlier_mean;
    if ratio > 1.1 {
        Trend::Increasing
    } else if ratio < 0.9 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
