//! Core domain types: the message envelope, its lifecycle, and the addressing
//! vocabulary shared by the store, the workers, and the mapping registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three domains a message can originate from or be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Pubsub,
    Variable,
    Enterprise,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Pubsub => "pubsub",
            Side::Variable => "variable",
            Side::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pubsub" => Ok(Side::Pubsub),
            "variable" => Ok(Side::Variable),
            "enterprise" => Ok(Side::Enterprise),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Lease-order priority. Higher value is leased first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            3 => Some(Priority::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// The value's declared type, carried alongside the JSON payload so decoding
/// never depends on dynamic type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int32,
    Float,
    Double,
    String,
    DateTime,
    Json,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int32 => "int32",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::DateTime => "datetime",
            DataType::Json => "json",
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" => Ok(DataType::Boolean),
            "int32" => Ok(DataType::Int32),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "string" => Ok(DataType::String),
            "datetime" => Ok(DataType::DateTime),
            "json" => Ok(DataType::Json),
            other => Err(format!("unknown data_type: {other}")),
        }
    }
}

/// Direction a mapping entry is allowed to flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    AToB,
    BToA,
    Bidirectional,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a_to_b" | "a->b" => Ok(Direction::AToB),
            "b_to_a" | "b->a" => Ok(Direction::BToA),
            "bidirectional" => Ok(Direction::Bidirectional),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Message lifecycle status. Terminal: Completed, Failed, Expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Expired)
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            "expired" => Ok(Status::Expired),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// The primary unit of work flowing between sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Assigned at enqueue; monotonically increasing.
    pub id: i64,
    pub source: Side,
    pub destination: Side,
    /// Free-form destination-side address (topic name or node id).
    pub topic_or_node: String,
    pub mapping_id: String,
    pub value: serde_json::Value,
    pub data_type: DataType,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: Status,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub expire_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}

/// Input to `BufferApi::enqueue` — everything the caller supplies; the
/// store fills in `id`, `created_at`, `status`, and `expire_at` if unset.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub source: Side,
    pub destination: Side,
    pub topic_or_node: String,
    pub mapping_id: String,
    pub value: serde_json::Value,
    pub data_type: DataType,
    pub priority: Priority,
    pub max_retries: u32,
    pub ttl: Option<chrono::Duration>,
    pub metadata: Option<serde_json::Value>,
}

/// A durable record of a message that exhausted its retries. Written
/// exactly once, when a message transitions to `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub original_id: i64,
    pub source: Side,
    pub destination: Side,
    pub topic_or_node: String,
    pub value: serde_json::Value,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u32,
    pub metadata: Option<serde_json::Value>,
}

/// A static, validated route declared by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub mapping_id: String,
    pub source_side: Side,
    pub source_address: String,
    pub destination_side: Side,
    pub destination_address: String,
    pub data_type: DataType,
    pub direction: Direction,
    pub priority: Priority,
    pub transform_ref: Option<String>,
    pub description: Option<String>,
}
