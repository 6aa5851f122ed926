//! Row mapping traits and utilities

use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use std::sync::Arc;

/// One result row. Column names are shared between rows of the same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Raw value by position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed access, returning `SqlError::Decode` on a missing column or type mismatch.
    pub fn try_get<T: FromValue>(&self, column: &str) -> SqlResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| SqlError::decode(column, "no such column"))?;
        T::from_value(value).map_err(|message| SqlError::decode(column, message))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl serde::Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (c, v) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

/// Trait for converting a database row into a Rust struct.
///
/// # Example
///
/// ```ignore
/// use sqlkit::{FromRow, Row, SqlResult};
///
/// struct User {
///     id: i64,
///     email: Option<String>,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> SqlResult<Self> {
///         Ok(Self {
///             id: row.try_get("id")?,
///             email: row.try_get("email")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> SqlResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(row.clone())
    }
}

/// Conversion from a single column value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, found {}", value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_i64().ok_or_else(|| mismatch("integer", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| format!("{v} out of range for i32"))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let v = i64::from_value(value)?;
        u64::try_from(v).map_err(|_| format!("{v} out of range for u64"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_f64().ok_or_else(|| mismatch("number", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            _ => Err(mismatch("text", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        let s = value.as_str().ok_or_else(|| mismatch("timestamp text", value))?;
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
            .map_err(|e| format!("invalid timestamp '{s}': {e}"))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let cols: Arc<[String]> = vec!["id".to_string(), "email".to_string(), "at".to_string()].into();
        Row::new(
            cols,
            vec![
                Value::Int(7),
                Value::Null,
                Value::Text("2024-01-02 03:04:05".into()),
            ],
        )
    }

    #[test]
    fn typed_access() {
        let r = row();
        assert_eq!(r.try_get::<i64>("id").unwrap(), 7);
        assert_eq!(r.try_get::<Option<String>>("email").unwrap(), None);
        assert!(r.try_get::<chrono::NaiveDateTime>("at").is_ok());
    }

    #[test]
    fn decode_errors_name_the_column() {
        let r = row();
        match r.try_get::<String>("email") {
            Err(SqlError::Decode { column, .. }) => assert_eq!(column, "email"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(r.try_get::<i64>("missing").is_err());
    }

    #[test]
    fn serializes_as_map() {
        let json = serde_json::to_value(row()).unwrap();
        assert_eq!(json["id"], 7);
        assert!(json["email"].is_null());
    }
}
