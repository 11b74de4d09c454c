//! Stateless value conversion between side type systems, plus custom
//! transform indirection by symbolic name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::BridgeError;
use crate::ports::{Result, TransformRegistry};
use crate::types::{DataType, Side};

/// Converts values between side type systems and resolves named custom
/// transforms, caching the resolution per `mapping_id` after first lookup.
pub struct Transformer {
    registry: Option<Arc<dyn TransformRegistry>>,
    cache: Mutex<HashMap<String, Option<CachedTransform>>>,
}

type CachedTransform = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

impl Transformer {
    pub fn new(registry: Option<Arc<dyn TransformRegistry>>) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Applies the built-in conversion matrix for `data_type` between
    /// `from_side` and `to_side`, then, if `mapping_id` names a custom
    /// transform, applies that on top of the matrix result.
    pub fn convert(
        &self,
        value: &Value,
        from_side: Side,
        to_side: Side,
        data_type: DataType,
        mapping_id: &str,
        transform_ref: Option<&str>,
    ) -> Result<Value> {
        let converted = Self::apply_matrix(value, from_side, to_side, data_type)?;

        match self.resolve(mapping_id, transform_ref) {
            Some(f) => f(&converted),
            None => Ok(converted),
        }
    }

    fn resolve(
        &self,
        mapping_id: &str,
        transform_ref: Option<&str>,
    ) -> Option<CachedTransform> {
        let name = transform_ref?;

        let mut cache = self.cache.lock().expect("transform cache poisoned");
        if let Some(cached) = cache.get(mapping_id) {
            return cached.clone();
        }

        let resolved = self
            .registry
            .as_ref()
            .and_then(|r| r.resolve(name));
        cache.insert(mapping_id.to_string(), resolved.clone());
        resolved
    }

    /// The built-in conversion matrix, independent of any custom transform:
    /// - Boolean <-> Boolean (identity, coerces truthiness)
    /// - Int32 <-> integer (range-checked)
    /// - Float/Double <-> numeric
    /// - String <-> String
    /// - DateTime <-> ISO-8601 string on the pub/sub side, native timestamp
    ///   (seconds since epoch) on the variable side
    /// - JSON: object/array is serialized to a string on the variable side;
    ///   the inverse deserializes
    fn apply_matrix(value: &Value, from_side: Side, to_side: Side, data_type: DataType) -> Result<Value> {
        match data_type {
            DataType::Boolean => Ok(Value::Bool(truthy(value))),
            DataType::Int32 => {
                let n = value
                    .as_i64()
                    .or_else(|| value.as_f64().map(|f| f as i64))
                    .ok_or_else(|| BridgeError::Transform(format!("not an integer: {value}")))?;
                if n < i32::MIN as i64 || n > i32::MAX as i64 {
                    return Err(BridgeError::Transform(format!("int32 out of range: {n}")));
                }
                Ok(Value::from(n as i32))
            }
            DataType::Float | DataType::Double => {
                let f = value
                    .as_f64()
                    .ok_or_else(|| BridgeError::Transform(format!("not a number: {value}")))?;
                Ok(serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            }
            DataType::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Ok(Value::String(other.to_string())),
            },
            DataType::DateTime => Self::convert_datetime(value, from_side, to_side),
            DataType::Json => Self::convert_json(value, to_side),
        }
    }

    fn convert_datetime(value: &Value, from_side: Side, to_side: Side) -> Result<Value> {
        use chrono::{DateTime, TimeZone, Utc};

        let as_utc: DateTime<Utc> = match from_side {
            Side::Variable => {
                let secs = value
                    .as_f64()
                    .ok_or_else(|| BridgeError::Transform("variable-side datetime must be numeric".into()))?;
                Utc.timestamp_opt(secs as i64, 0)
                    .single()
                    .ok_or_else(|| BridgeError::Transform("invalid epoch timestamp".into()))?
            }
            _ => {
                let s = value
                    .as_str()
                    .ok_or_else(|| BridgeError::Transform("datetime must be an ISO-8601 string".into()))?;
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| BridgeError::Transform(format!("invalid ISO-8601 datetime: {e}")))?
                    .with_timezone(&Utc)
            }
        };

        match to_side {
            Side::Variable => Ok(Value::from(as_utc.timestamp())),
            _ => Ok(Value::String(as_utc.to_rfc3339())),
        }
    }

    fn convert_json(value: &Value, to_side: Side) -> Result<Value> {
        match to_side {
            Side::Variable => Ok(Value::String(value.to_string())),
            _ => match value {
                Value::String(s) => serde_json::from_str(s)
                    .map_err(|e| BridgeError::Transform(format!("invalid JSON payload: {e}"))),
                other => Ok(other.clone()),
            },
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_no_transform_ref() {
        let t = Transformer::new(None);
        let v = Value::from(23.5);
        let out = t
            .convert(&v, Side::Pubsub, Side::Variable, DataType::Float, "m1", None)
            .unwrap();
        assert_eq!(out.as_f64(), Some(23.5));
    }

    #[test]
    fn int32_range_check_rejects_overflow() {
        let t = Transformer::new(None);
        let v = Value::from(i64::MAX);
        let err = t
            .convert(&v, Side::Pubsub, Side::Variable, DataType::Int32, "m1", None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transform(_)));
    }

    #[test]
    fn json_round_trips_through_variable_side_string_encoding() {
        let t = Transformer::new(None);
        let original = serde_json::json!({"a": 1, "b": [1,2,3]});
        let encoded = t
            .convert(&original, Side::Pubsub, Side::Variable, DataType::Json, "m1", None)
            .unwrap();
        assert!(encoded.is_string());
        let decoded = t
            .convert(&encoded, Side::Variable, Side::Pubsub, DataType::Json, "m1", None)
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn datetime_round_trips_between_pubsub_iso_and_variable_epoch() {
        let t = Transformer::new(None);
        let iso = Value::String("2026-01-01T00:00:00Z".to_string());
        let epoch = t
            .convert(&iso, Side::Pubsub, Side::Variable, DataType::DateTime, "m1", None)
            .unwrap();
        assert!(epoch.is_number());
        let back = t
            .convert(&epoch, Side::Variable, Side::Pubsub, DataType::DateTime, "m1", None)
            .unwrap();
        assert_eq!(back.as_str(), Some("2026-01-01T00:00:00+00:00"));
    }
}
