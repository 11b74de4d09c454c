//! Nested configuration structure, consumed (not owned) by the bridge.
//! Loaded once at startup from YAML; any validation failure is fatal.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::types::{DataType, Direction, MappingEntry, Priority, Side};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pubsub: PubsubConfig,
    #[serde(default)]
    pub variable: VariableConfig,
    #[serde(default)]
    pub enterprise: EnterpriseConfig,
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PubsubConfig {
    #[serde(default)]
    pub broker_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VariableConfig {
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnterpriseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthConfig {
    Basic { username: String, password: String },
    OAuth2 {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
    /// Minimum age (seconds) before a failed message is eligible for
    /// re-lease. Defaults to zero: the spec preserves "retries may be
    /// attempted immediately" rather than assuming a backoff window.
    #[serde(default)]
    pub min_release_age_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_seconds: default_backoff_seconds(),
            min_release_age_seconds: 0,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_seconds() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    pub mapping_id: String,
    pub source_side: String,
    pub source_address: String,
    pub destination_side: String,
    pub destination_address: String,
    pub data_type: String,
    pub direction: String,
    #[serde(default = "default_priority_str")]
    pub priority: String,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_priority_str() -> String {
    "normal".to_string()
}

impl MappingConfig {
    /// Parses string fields into strict domain types, failing fast on an
    /// unknown data_type, direction, or priority — §4.3's load-time
    /// validation.
    pub fn validate(&self) -> Result<MappingEntry, BridgeError> {
        let source_side: Side = self
            .source_side
            .parse()
            .map_err(|e| BridgeError::Config(format!("mapping {}: {e}", self.mapping_id)))?;
        let destination_side: Side = self
            .destination_side
            .parse()
            .map_err(|e| BridgeError::Config(format!("mapping {}: {e}", self.mapping_id)))?;
        let data_type: DataType = self
            .data_type
            .parse()
            .map_err(|e| BridgeError::Config(format!("mapping {}: {e}", self.mapping_id)))?;
        let direction: Direction = self
            .direction
            .parse()
            .map_err(|e| BridgeError::Config(format!("mapping {}: {e}", self.mapping_id)))?;
        let priority: Priority = self
            .priority
            .parse()
            .map_err(|e| BridgeError::Config(format!("mapping {}: {e}", self.mapping_id)))?;

        Ok(MappingEntry {
            mapping_id: self.mapping_id.clone(),
            source_side,
            source_address: self.source_address.clone(),
            destination_side,
            destination_address: self.destination_address.clone(),
            data_type,
            direction,
            priority,
            transform_ref: self.transform.clone(),
            description: self.description.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: u32,
    #[serde(default = "default_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default)]
    pub priority_weights: HashMap<String, f64>,
    #[serde(default)]
    pub priority_limits: HashMap<String, u64>,
    #[serde(default = "default_true")]
    pub wal_enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> String {
    "bridge.db".to_string()
}

fn default_max_size() -> u64 {
    10_000
}

fn default_ttl_minutes() -> i64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_batch_size() -> u32 {
    10
}

fn default_worker_threads() -> u32 {
    4
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
            max_size: default_max_size(),
            ttl_minutes: default_ttl_minutes(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            batch_size: default_batch_size(),
            worker_threads: default_worker_threads(),
            retry_max_attempts: default_max_attempts(),
            priority_weights: default_priority_weights(),
            priority_limits: default_priority_limits(),
            wal_enabled: true,
        }
    }
}

fn default_priority_weights() -> HashMap<String, f64> {
    [
        ("critical".to_string(), 3.0),
        ("high".to_string(), 1.8),
        ("normal".to_string(), 1.0),
        ("low".to_string(), 0.6),
    ]
    .into_iter()
    .collect()
}

fn default_priority_limits() -> HashMap<String, u64> {
    [
        ("critical".to_string(), 0), // 0 = unbounded
        ("high".to_string(), 5000),
        ("normal".to_string(), 3000),
        ("low".to_string(), 1000),
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OptimizationConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_stuck_minutes")]
    pub stuck_minutes: i64,
    #[serde(default = "default_failure_rate_pct")]
    pub high_failure_rate_pct: f64,
    #[serde(default = "default_critical_failure_rate_pct")]
    pub critical_failure_rate_pct: f64,
    #[serde(default = "default_queue_buildup")]
    pub queue_buildup_pending: i64,
    #[serde(default = "default_critical_queue_buildup")]
    pub critical_queue_buildup_pending: i64,
    #[serde(default = "default_route_congestion_query")]
    pub route_congestion_query_threshold: i64,
    #[serde(default = "default_route_congestion_report")]
    pub route_congestion_report_threshold: i64,
    #[serde(default = "default_slow_processing_secs")]
    pub slow_processing_secs: f64,
}

fn default_stuck_minutes() -> i64 {
    5
}
fn default_failure_rate_pct() -> f64 {
    10.0
}
fn default_critical_failure_rate_pct() -> f64 {
    25.0
}
fn default_queue_buildup() -> i64 {
    1000
}
fn default_critical_queue_buildup() -> i64 {
    5000
}
fn default_route_congestion_query() -> i64 {
    100
}
fn default_route_congestion_report() -> i64 {
    500
}
fn default_slow_processing_secs() -> f64 {
    10.0
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stuck_minutes: default_stuck_minutes(),
            high_failure_rate_pct: default_failure_rate_pct(),
            critical_failure_rate_pct: default_critical_failure_rate_pct(),
            queue_buildup_pending: default_queue_buildup(),
            critical_queue_buildup_pending: default_critical_queue_buildup(),
            route_congestion_query_threshold: default_route_congestion_query(),
            route_congestion_report_threshold: default_route_congestion_report(),
            slow_processing_secs: default_slow_processing_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default = "default_file_retention_days")]
    pub file_retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            module_levels: HashMap::new(),
            file_path: None,
            file_retention_days: default_file_retention_days(),
        }
    }
}

impl LoggingConfig {
    /// Builds the `EnvFilter` directive string combining the global level
    /// with any per-module overrides, the same shape as
    /// `"info,sem_os_server=debug"`.
    pub fn env_filter_directive(&self) -> String {
        let mut directive = self.level.clone();
        for (module, level) in &self.module_levels {
            directive.push(',');
            directive.push_str(module);
            directive.push('=');
            directive.push_str(level);
        }
        directive
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|e| BridgeError::Config(format!("invalid config YAML: {e}")))?;
        config.validate_mappings()?;
        Ok(config)
    }

    fn validate_mappings(&self) -> Result<(), BridgeError> {
        for mapping in &self.mappings {
            mapping.validate()?;
        }
        Ok(())
    }

    pub fn mapping_entries(&self) -> Result<Vec<MappingEntry>, BridgeError> {
        self.mappings.iter().map(|m| m.validate()).collect()
    }
}
