//! Query definitions over the document index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchemaError;
use crate::models::BlueprintId;

/// Filter operator applied to a path's indexed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value in list.
    In,
    /// Substring match (string fields only).
    Contains,
    /// Prefix match (string fields only).
    StartsWith,
    /// Document has at least one value at the path.
    Exists,
    /// Document has no value at the path.
    Missing,
}

impl FilterOp {
    /// Whether the operator compares against a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::Exists | Self::Missing)
    }

    /// Whether the operator only makes sense on ordered columns.
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Exists => "exists",
            Self::Missing => "missing",
        };
        f.write_str(s)
    }
}

impl FromStr for FilterOp {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Self::Eq,
            "!=" | "<>" | "ne" => Self::Ne,
            ">" | "gt" => Self::Gt,
            ">=" | "gte" => Self::Gte,
            "<" | "lt" => Self::Lt,
            "<=" | "lte" => Self::Lte,
            "in" => Self::In,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "exists" => Self::Exists,
            "missing" => Self::Missing,
            other => {
                return Err(SchemaError::validation(
                    "op",
                    format!("unknown filter operator '{other}'"),
                ));
            }
        };
        Ok(op)
    }
}

/// Filter value as supplied by the caller; coerced by the path's data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// List of values (for the In operator).
    List(Vec<FilterValue>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::String(value.to_string())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Predicate on one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathFilter {
    pub full_path: String,
    pub op: FilterOp,
    pub value: Option<FilterValue>,
}

/// Reference predicate: the path points at `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefFilter {
    pub full_path: String,
    pub target: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSort {
    pub full_path: String,
    pub direction: SortDirection,
}

/// Query over the documents indexed against one blueprint.
///
/// Filters are AND-ed. Sorts apply in order and always end with the
/// document id ascending, so results are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub blueprint_id: BlueprintId,
    #[serde(default)]
    pub filters: Vec<PathFilter>,
    #[serde(default)]
    pub refs: Vec<RefFilter>,
    #[serde(default)]
    pub sorts: Vec<PathSort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl DocumentQuery {
    pub fn new(blueprint_id: BlueprintId) -> Self {
        Self {
            blueprint_id,
            filters: Vec::new(),
            refs: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Filter on a path's values.
    pub fn where_path(mut self, full_path: &str, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        self.filters.push(PathFilter {
            full_path: full_path.to_string(),
            op,
            value: op.takes_value().then(|| value.into()),
        });
        self
    }

    /// Keep documents with at least one value at the path.
    pub fn where_exists(mut self, full_path: &str) -> Self {
        self.filters.push(PathFilter {
            full_path: full_path.to_string(),
            op: FilterOp::Exists,
            value: None,
        });
        self
    }

    /// Keep documents with no value at the path.
    pub fn where_missing(mut self, full_path: &str) -> Self {
        self.filters.push(PathFilter {
            full_path: full_path.to_string(),
            op: FilterOp::Missing,
            value: None,
        });
        self
    }

    /// Keep documents whose reference path points at `target`.
    pub fn where_ref(mut self, full_path: &str, target: Uuid) -> Self {
        self.refs.push(RefFilter {
            full_path: full_path.to_string(),
            target,
        });
        self
    }

    pub fn order_by_path(mut self, full_path: &str, direction: SortDirection) -> Self {
        self.sorts.push(PathSort {
            full_path: full_path.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn operators_parse_from_symbols() {
        assert_eq!("=".parse::<FilterOp>().unwrap(), FilterOp::Eq);
        assert_eq!(">=".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        assert_eq!("STARTS_WITH".parse::<FilterOp>().unwrap(), FilterOp::StartsWith);
        assert!("~".parse::<FilterOp>().is_err());
    }

    #[test]
    fn filter_value_deserializes_untagged() {
        let v: FilterValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, FilterValue::Integer(42));
        let v: FilterValue = serde_json::from_str("4.5").unwrap();
        assert_eq!(v, FilterValue::Float(4.5));
        let v: FilterValue = serde_json::from_str(r#"["a", 1]"#).unwrap();
        assert_eq!(
            v,
            FilterValue::List(vec![FilterValue::String("a".into()), FilterValue::Integer(1)])
        );
    }

    #[test]
    fn exists_drops_value() {
        let q = DocumentQuery::new(BlueprintId(1)).where_path("city", FilterOp::Exists, "ignored");
        assert_eq!(q.filters[0].value, None);
    }

    #[test]
    fn builder_collects_clauses() {
        let q = DocumentQuery::new(BlueprintId(1))
            .where_path("city", FilterOp::Eq, "Riga")
            .where_missing("zip")
            .order_by_path("age", SortDirection::Desc)
            .limit(10)
            .offset(20);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.sorts[0].direction, SortDirection::Desc);
        assert_eq!((q.limit, q.offset), (Some(10), Some(20)));
    }
}
