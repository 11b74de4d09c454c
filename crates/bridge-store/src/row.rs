//! `sqlx::FromRow` row shapes and their conversion into `bridge_core` domain
//! types. Kept separate from `store.rs` the way the reference adapter keeps
//! `sqlx_types.rs` apart from `store.rs`.

use bridge_core::error::BridgeError;
use bridge_core::types::{DataType, Message, Priority, Side, Status};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub source: String,
    pub destination: String,
    pub topic_or_node: String,
    pub mapping_id: String,
    pub value: String,
    pub data_type: String,
    pub status: String,
    pub priority: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub expire_at: String,
    pub error_message: Option<String>,
    pub metadata: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = BridgeError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            source: row
                .source
                .parse::<Side>()
                .map_err(BridgeError::MalformedPayload)?,
            destination: row
                .destination
                .parse::<Side>()
                .map_err(BridgeError::MalformedPayload)?,
            topic_or_node: row.topic_or_node,
            mapping_id: row.mapping_id,
            value: serde_json::from_str(&row.value)
                .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?,
            data_type: row
                .data_type
                .parse::<DataType>()
                .map_err(BridgeError::MalformedPayload)?,
            priority: Priority::from_i32(row.priority as i32)
                .ok_or_else(|| BridgeError::MalformedPayload(format!("bad priority: {}", row.priority)))?,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            status: row
                .status
                .parse::<Status>()
                .map_err(BridgeError::MalformedPayload)?,
            error_message: row.error_message,
            created_at: parse_ts(&row.created_at)?,
            processed_at: row.processed_at.as_deref().map(parse_ts).transpose()?,
            expire_at: parse_ts(&row.expire_at)?,
            metadata: row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e: serde_json::Error| BridgeError::MalformedPayload(e.to_string()))?,
        })
    }
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, BridgeError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BridgeError::MalformedPayload(format!("bad timestamp {s}: {e}")))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetterRow {
    pub id: i64,
    pub original_id: i64,
    pub source: String,
    pub destination: String,
    pub topic_or_node: String,
    pub value: String,
    pub error_message: String,
    pub failed_at: String,
    pub retry_count: i64,
    pub metadata: Option<String>,
}

impl TryFrom<DeadLetterRow> for bridge_core::types::DeadLetter {
    type Error = BridgeError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        Ok(bridge_core::types::DeadLetter {
            id: row.id,
            original_id: row.original_id,
            source: row.source.parse::<Side>().map_err(BridgeError::MalformedPayload)?,
            destination: row
                .destination
                .parse::<Side>()
                .map_err(BridgeError::MalformedPayload)?,
            topic_or_node: row.topic_or_node,
            value: serde_json::from_str(&row.value)
                .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?,
            error_message: row.error_message,
            failed_at: parse_ts(&row.failed_at)?,
            retry_count: row.retry_count as u32,
            metadata: row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e: serde_json::Error| BridgeError::MalformedPayload(e.to_string()))?,
        })
    }
}
