//! Field data types and cardinality.
//!
//! Each data type decides whether it can be indexed, which index column it
//! writes to, and how a JSON payload value is coerced into that column.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SchemaError;

/// Declared type of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Text,
    Int,
    Float,
    Bool,
    #[serde(rename = "datetime")]
    DateTime,
    /// Free-form object node; children describe its keys.
    Json,
    /// Reference to another document.
    Ref,
    /// Mount point of an embedded component.
    Blueprint,
}

/// Index column a data type writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSlot {
    String,
    Int,
    Float,
    Bool,
    DateTime,
    /// Stored in `doc_ref` instead of `doc_value`.
    Ref,
}

impl IndexSlot {
    /// `doc_value` column for this slot, or `None` for references.
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("value_string"),
            Self::Int => Some("value_int"),
            Self::Float => Some("value_float"),
            Self::Bool => Some("value_bool"),
            Self::DateTime => Some("value_datetime"),
            Self::Ref => None,
        }
    }
}

/// A payload value coerced into its index slot.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexedScalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Ref(Uuid),
}

/// Canonical text form of an indexed timestamp; sorts chronologically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Ref => "ref",
            Self::Blueprint => "blueprint",
        }
    }

    /// Structural nodes hold children instead of values and are never indexed.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Json | Self::Blueprint)
    }

    /// Whether `is_indexed` may be set for this type.
    pub fn is_indexable(&self) -> bool {
        !self.is_structural()
    }

    /// Index column used for values of this type.
    pub fn index_slot(&self) -> Option<IndexSlot> {
        match self {
            Self::String | Self::Text => Some(IndexSlot::String),
            Self::Int => Some(IndexSlot::Int),
            Self::Float => Some(IndexSlot::Float),
            Self::Bool => Some(IndexSlot::Bool),
            Self::DateTime => Some(IndexSlot::DateTime),
            Self::Ref => Some(IndexSlot::Ref),
            Self::Json | Self::Blueprint => None,
        }
    }

    /// Coerce a single JSON value into this type's index slot.
    ///
    /// Returns a human-readable reason on mismatch.
    pub fn coerce(&self, value: &Value) -> Result<IndexedScalar, String> {
        match self {
            Self::String | Self::Text => value
                .as_str()
                .map(|s| IndexedScalar::String(s.to_string()))
                .ok_or_else(|| mismatch("a string", value)),
            Self::Int => value
                .as_i64()
                .map(IndexedScalar::Int)
                .ok_or_else(|| mismatch("an integer", value)),
            Self::Float => value
                .as_f64()
                .map(IndexedScalar::Float)
                .ok_or_else(|| mismatch("a number", value)),
            Self::Bool => value
                .as_bool()
                .map(IndexedScalar::Bool)
                .ok_or_else(|| mismatch("a boolean", value)),
            Self::DateTime => value
                .as_str()
                .and_then(parse_datetime)
                .map(IndexedScalar::DateTime)
                .ok_or_else(|| mismatch("an RFC 3339 timestamp or YYYY-MM-DD date", value)),
            Self::Ref => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(IndexedScalar::Ref)
                .ok_or_else(|| mismatch("a document id", value)),
            Self::Json | Self::Blueprint => Err(format!(
                "{} fields are structural and hold no indexable value",
                self.as_str()
            )),
        }
    }
}

fn mismatch(expected: &str, value: &Value) -> String {
    let found = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    format!("expected {expected}, found {found}")
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data_type = match s.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "text" => Self::Text,
            "int" | "integer" => Self::Int,
            "float" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "datetime" => Self::DateTime,
            "json" => Self::Json,
            "ref" => Self::Ref,
            "blueprint" => Self::Blueprint,
            other => {
                return Err(SchemaError::validation(
                    "data_type",
                    format!("unknown data type '{other}'"),
                ));
            }
        };
        Ok(data_type)
    }
}

/// Number of values a path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::One => "one",
            Self::Many => "many",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinality {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "one" => Ok(Self::One),
            "many" => Ok(Self::Many),
            other => Err(SchemaError::validation(
                "cardinality",
                format!("unknown cardinality '{other}'"),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_names_match_display() {
        assert_eq!(serde_json::to_value(DataType::DateTime).unwrap(), json!("datetime"));
        let parsed: DataType = serde_json::from_value(json!("datetime")).unwrap();
        assert_eq!(parsed, DataType::DateTime);
        assert_eq!(parsed.to_string(), "datetime");
        assert_eq!("datetime".parse::<DataType>().unwrap(), DataType::DateTime);
    }

    #[test]
    fn structural_types_are_not_indexable() {
        assert!(!DataType::Json.is_indexable());
        assert!(!DataType::Blueprint.is_indexable());
        assert!(DataType::Ref.is_indexable());
        assert_eq!(DataType::Json.index_slot(), None);
    }

    #[test]
    fn text_and_string_share_a_column() {
        assert_eq!(DataType::String.index_slot(), Some(IndexSlot::String));
        assert_eq!(DataType::Text.index_slot(), Some(IndexSlot::String));
        assert_eq!(IndexSlot::String.column(), Some("value_string"));
        assert_eq!(IndexSlot::Ref.column(), None);
    }

    #[test]
    fn coerce_int_rejects_fractions() {
        assert_eq!(DataType::Int.coerce(&json!(42)), Ok(IndexedScalar::Int(42)));
        let err = DataType::Int.coerce(&json!(4.5)).unwrap_err();
        assert!(err.contains("expected an integer"));
    }

    #[test]
    fn coerce_float_accepts_integers() {
        assert_eq!(DataType::Float.coerce(&json!(3)), Ok(IndexedScalar::Float(3.0)));
    }

    #[test]
    fn coerce_datetime_normalizes_to_utc() {
        let value = DataType::DateTime
            .coerce(&json!("2024-05-01T12:00:00+02:00"))
            .unwrap();
        let IndexedScalar::DateTime(ts) = value else {
            panic!("expected datetime");
        };
        assert_eq!(format_datetime(&ts), "2024-05-01T10:00:00.000000Z");

        let date = DataType::DateTime.coerce(&json!("2024-05-01")).unwrap();
        let IndexedScalar::DateTime(ts) = date else {
            panic!("expected datetime");
        };
        assert_eq!(format_datetime(&ts), "2024-05-01T00:00:00.000000Z");
    }

    #[test]
    fn coerce_ref_requires_uuid() {
        let id = Uuid::now_v7();
        assert_eq!(
            DataType::Ref.coerce(&json!(id.to_string())),
            Ok(IndexedScalar::Ref(id))
        );
        assert!(DataType::Ref.coerce(&json!("not-an-id")).is_err());
    }

    #[test]
    fn mismatch_names_found_shape() {
        let err = DataType::String.coerce(&json!(["a"])).unwrap_err();
        assert_eq!(err, "expected a string, found an array");
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("Integer".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("DateTime".parse::<DataType>().unwrap(), DataType::DateTime);
        assert!("blob".parse::<DataType>().is_err());
        assert_eq!("MANY".parse::<Cardinality>().unwrap(), Cardinality::Many);
    }
}
