// used for persistence
use rusqlite::types::{Value as SqlValue, ValueRef};

// used for timestamps in the database
use chrono::{DateTime, SecondsFormat, Utc};

// scalar types are part of a serialized schema
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

// used to print out readable forms of a data type
use std::fmt;

use crate::error::{Result, SoftscopeError};

/// The column types an entity field may have.
///
/// Values travel as JSON between callers and the executor. Every scalar type
/// knows its SQLite affinity and how to convert in both directions, so the
/// executor never has to guess at a value's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Int,
    Float,
    String,
    Boolean,
    DateTime,
}

impl ScalarType {
    pub fn affinity(&self) -> &'static str {
        match self {
            ScalarType::Int | ScalarType::Boolean => "integer",
            ScalarType::Float => "real",
            ScalarType::String | ScalarType::DateTime => "text",
        }
    }
    pub fn to_sql(&self, field: &str, value: &Value) -> Result<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        let converted = match self {
            ScalarType::Int => value.as_i64().map(SqlValue::Integer),
            ScalarType::Float => value.as_f64().map(SqlValue::Real),
            ScalarType::String => value.as_str().map(|s| SqlValue::Text(s.to_owned())),
            ScalarType::Boolean => value.as_bool().map(|b| SqlValue::Integer(i64::from(b))),
            ScalarType::DateTime => match value.as_str() {
                Some(s) => Some(SqlValue::Text(normalize_timestamp(field, s)?)),
                None => None,
            },
        };
        converted.ok_or_else(|| {
            SoftscopeError::Execution(format!(
                "Type mismatch: field '{field}' expects {self}, got {value}"
            ))
        })
    }
    pub fn from_sql(&self, field: &str, value: ValueRef) -> Result<Value> {
        let converted = match (self, value) {
            (_, ValueRef::Null) => Some(Value::Null),
            (ScalarType::Int, ValueRef::Integer(i)) => Some(Value::from(i)),
            (ScalarType::Float, ValueRef::Real(f)) => Number::from_f64(f).map(Value::Number),
            (ScalarType::Float, ValueRef::Integer(i)) => Number::from_f64(i as f64).map(Value::Number),
            (ScalarType::Boolean, ValueRef::Integer(i)) => Some(Value::Bool(i != 0)),
            (ScalarType::String | ScalarType::DateTime, ValueRef::Text(bytes)) => {
                Some(Value::String(String::from_utf8_lossy(bytes).into_owned()))
            }
            _ => None,
        };
        converted.ok_or_else(|| {
            SoftscopeError::Persistence(format!(
                "Column '{field}' holds a {} where {self} was expected",
                value.data_type()
            ))
        })
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ScalarType::Int => "Int",
            ScalarType::Float => "Float",
            ScalarType::String => "String",
            ScalarType::Boolean => "Boolean",
            ScalarType::DateTime => "DateTime",
        };
        write!(f, "{name}")
    }
}

// Timestamps are stored with a fixed precision and offset so that text
// comparisons in SQLite agree with chronological order.
pub fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> Value {
    Value::String(timestamp(Utc::now()))
}

fn normalize_timestamp(field: &str, text: &str) -> Result<String> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| timestamp(parsed.with_timezone(&Utc)))
        .map_err(|e| {
            SoftscopeError::Execution(format!(
                "Field '{field}' expects an RFC 3339 timestamp, got '{text}': {e}"
            ))
        })
}
