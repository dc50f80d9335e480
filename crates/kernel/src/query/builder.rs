//! SQL generation for document queries using SeaQuery.
//!
//! The universe is `indexed_document` rows of one blueprint. Every path
//! filter becomes an `IN` subquery over `doc_value` (or `doc_ref`), and every
//! sort a correlated subquery picking the document's MIN (ascending) or MAX
//! (descending) value at the path.

use std::sync::Arc;

use sea_query::{
    Alias, Asterisk, Expr, ExprTrait, LikeExpr, Order, Query, SelectStatement, SimpleExpr,
    SqliteQueryBuilder, Value, Values,
};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Arguments, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::types::{DocumentQuery, FilterOp, FilterValue, SortDirection};
use crate::error::{SchemaError, SchemaResult};
use crate::models::{Blueprint, BlueprintId, Path, PathId};
use crate::schema::data_type::{format_datetime, parse_datetime};
use crate::schema::{IndexSlot, PathTree};

const DOCUMENTS: &str = "indexed_document";
const VALUES: &str = "doc_value";
const REFS: &str = "doc_ref";

/// Upper bound used when only an offset is requested; SQLite needs a LIMIT.
const NO_LIMIT: u64 = i64::MAX as u64;

#[derive(Debug, Clone)]
struct ResolvedFilter {
    path_id: PathId,
    slot: IndexSlot,
    op: FilterOp,
    values: Vec<Value>,
}

#[derive(Debug, Clone)]
struct ResolvedSort {
    path_id: PathId,
    slot: IndexSlot,
    direction: SortDirection,
}

/// A document query checked against a blueprint's path tree.
#[derive(Debug, Clone)]
pub struct DocumentQueryBuilder {
    blueprint_id: BlueprintId,
    filters: Vec<ResolvedFilter>,
    refs: Vec<(PathId, Uuid)>,
    sorts: Vec<ResolvedSort>,
    limit: Option<u64>,
    offset: Option<u64>,
}

fn resolve_path<'a>(tree: &'a PathTree, full_path: &str) -> SchemaResult<(&'a Path, IndexSlot)> {
    let path = tree.by_full_path(full_path).ok_or_else(|| {
        SchemaError::validation("full_path", format!("'{full_path}' is not a path of this blueprint"))
    })?;
    let slot = path
        .data_type
        .index_slot()
        .filter(|_| path.is_indexed)
        .ok_or_else(|| SchemaError::validation("full_path", format!("'{full_path}' is not indexed")))?;
    Ok((path, slot))
}

fn invalid_value(path: &Path, value: &FilterValue) -> SchemaError {
    SchemaError::validation(
        "value",
        format!("{value:?} is not a valid {} value for '{}'", path.data_type, path.full_path),
    )
}

/// Coerce a scalar filter value into the slot's column type.
fn coerce_scalar(path: &Path, slot: IndexSlot, value: &FilterValue) -> SchemaResult<Value> {
    let coerced: Option<Value> = match (slot, value) {
        (IndexSlot::String, FilterValue::String(s)) => Some(s.clone().into()),
        (IndexSlot::String, FilterValue::Integer(i)) => Some(i.to_string().into()),
        (IndexSlot::String, FilterValue::Float(f)) => Some(f.to_string().into()),
        (IndexSlot::String, FilterValue::Boolean(b)) => Some(b.to_string().into()),
        (IndexSlot::Int, FilterValue::Integer(i)) => Some((*i).into()),
        (IndexSlot::Int, FilterValue::String(s)) => s.trim().parse::<i64>().ok().map(Into::into),
        (IndexSlot::Float, FilterValue::Integer(i)) => Some((*i as f64).into()),
        (IndexSlot::Float, FilterValue::Float(f)) => Some((*f).into()),
        (IndexSlot::Float, FilterValue::String(s)) => s.trim().parse::<f64>().ok().map(Into::into),
        (IndexSlot::Bool, FilterValue::Boolean(b)) => Some((*b).into()),
        (IndexSlot::Bool, FilterValue::String(s)) => s.trim().parse::<bool>().ok().map(Into::into),
        (IndexSlot::DateTime, FilterValue::String(s)) => {
            parse_datetime(s.trim()).map(|ts| format_datetime(&ts).into())
        }
        (IndexSlot::Ref, FilterValue::String(s)) => Uuid::parse_str(s.trim())
            .ok()
            .map(|id| id.to_string().into()),
        _ => None,
    };
    coerced.ok_or_else(|| invalid_value(path, value))
}

fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_")
}

impl DocumentQueryBuilder {
    /// Resolve every path of `query` against `tree` and coerce the values.
    pub fn new(query: &DocumentQuery, tree: &PathTree) -> SchemaResult<Self> {
        let mut filters = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            let (path, slot) = resolve_path(tree, &filter.full_path)?;

            if matches!(filter.op, FilterOp::Contains | FilterOp::StartsWith) && slot != IndexSlot::String {
                return Err(SchemaError::validation(
                    "op",
                    format!("{} needs a string field, '{}' is {}", filter.op, path.full_path, path.data_type),
                ));
            }
            if filter.op.is_range() && matches!(slot, IndexSlot::Bool | IndexSlot::Ref) {
                return Err(SchemaError::validation(
                    "op",
                    format!("'{}' of type {} cannot be range filtered", path.full_path, path.data_type),
                ));
            }

            let values = match (filter.op, &filter.value) {
                (FilterOp::Exists | FilterOp::Missing, _) => Vec::new(),
                (FilterOp::In, Some(FilterValue::List(items))) => items
                    .iter()
                    .map(|item| coerce_scalar(path, slot, item))
                    .collect::<SchemaResult<_>>()?,
                (FilterOp::In, Some(single)) => vec![coerce_scalar(path, slot, single)?],
                (_, Some(FilterValue::List(_))) => {
                    return Err(SchemaError::validation(
                        "value",
                        format!("{} takes a single value, not a list", filter.op),
                    ));
                }
                (_, Some(value)) => vec![coerce_scalar(path, slot, value)?],
                (_, None) => {
                    return Err(SchemaError::validation(
                        "value",
                        format!("{} needs a value", filter.op),
                    ));
                }
            };

            filters.push(ResolvedFilter {
                path_id: path.id,
                slot,
                op: filter.op,
                values,
            });
        }

        let mut refs = Vec::with_capacity(query.refs.len());
        for reference in &query.refs {
            let (path, slot) = resolve_path(tree, &reference.full_path)?;
            if slot != IndexSlot::Ref {
                return Err(SchemaError::validation(
                    "full_path",
                    format!("'{}' is not a reference field", path.full_path),
                ));
            }
            refs.push((path.id, reference.target));
        }

        let mut sorts = Vec::with_capacity(query.sorts.len());
        for sort in &query.sorts {
            let (path, slot) = resolve_path(tree, &sort.full_path)?;
            if slot == IndexSlot::Ref {
                return Err(SchemaError::validation(
                    "full_path",
                    format!("cannot sort by reference field '{}'", path.full_path),
                ));
            }
            sorts.push(ResolvedSort {
                path_id: path.id,
                slot,
                direction: sort.direction,
            });
        }

        Ok(Self {
            blueprint_id: query.blueprint_id,
            filters,
            refs,
            sorts,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Build the SELECT of matching document ids with bound values.
    pub fn build(&self) -> (String, Values) {
        let mut query = Query::select();
        query
            .column((Alias::new(DOCUMENTS), Alias::new("document_id")))
            .from(Alias::new(DOCUMENTS));
        self.add_conditions(&mut query);
        self.add_sorts(&mut query);

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                query.limit(limit);
                if let Some(offset) = offset {
                    query.offset(offset);
                }
            }
            (None, Some(offset)) => {
                query.limit(NO_LIMIT).offset(offset);
            }
            (None, None) => {}
        }

        query.build(SqliteQueryBuilder)
    }

    /// Build the COUNT of matching documents with bound values.
    pub fn build_count(&self) -> (String, Values) {
        let mut query = Query::select();
        query
            .expr(Expr::col(Asterisk).count())
            .from(Alias::new(DOCUMENTS));
        self.add_conditions(&mut query);
        query.build(SqliteQueryBuilder)
    }

    fn document_id() -> Expr {
        Expr::col((Alias::new(DOCUMENTS), Alias::new("document_id")))
    }

    fn add_conditions(&self, query: &mut SelectStatement) {
        query.and_where(
            Expr::col((Alias::new(DOCUMENTS), Alias::new("blueprint_id"))).eq(self.blueprint_id.0),
        );

        for filter in &self.filters {
            query.and_where(Self::filter_condition(filter));
        }

        for (path_id, target) in &self.refs {
            let mut sub = Query::select();
            sub.column(Alias::new("document_id"))
                .from(Alias::new(REFS))
                .and_where(Expr::col(Alias::new("path_id")).eq(path_id.0))
                .and_where(Expr::col(Alias::new("target_document_id")).eq(target.to_string()));
            query.and_where(Self::document_id().in_subquery(sub));
        }
    }

    fn filter_condition(filter: &ResolvedFilter) -> SimpleExpr {
        let (table, column) = match filter.slot.column() {
            Some(column) => (VALUES, column),
            None => (REFS, "target_document_id"),
        };

        let mut sub = Query::select();
        sub.column(Alias::new("document_id"))
            .from(Alias::new(table))
            .and_where(Expr::col(Alias::new("path_id")).eq(filter.path_id.0));

        let col = Expr::col(Alias::new(column));
        let first = filter.values.first().cloned();
        let value_condition = match (filter.op, first) {
            (FilterOp::Exists | FilterOp::Missing, _) => None,
            (FilterOp::In, _) => Some(col.is_in(filter.values.clone())),
            (FilterOp::Eq, Some(v)) => Some(col.eq(v)),
            (FilterOp::Ne, Some(v)) => Some(col.ne(v)),
            (FilterOp::Gt, Some(v)) => Some(col.gt(v)),
            (FilterOp::Gte, Some(v)) => Some(col.gte(v)),
            (FilterOp::Lt, Some(v)) => Some(col.lt(v)),
            (FilterOp::Lte, Some(v)) => Some(col.lte(v)),
            (FilterOp::Contains, Some(Value::String(Some(s)))) => Some(col.like(
                LikeExpr::new(format!("%{}%", escape_like_wildcards(&s))).escape('!'),
            )),
            (FilterOp::StartsWith, Some(Value::String(Some(s)))) => Some(col.like(
                LikeExpr::new(format!("{}%", escape_like_wildcards(&s))).escape('!'),
            )),
            // Resolution guarantees a value for every other operator.
            _ => Some(Expr::cust("0")),
        };
        if let Some(condition) = value_condition {
            sub.and_where(condition);
        }

        if filter.op == FilterOp::Missing {
            Self::document_id().not_in_subquery(sub)
        } else {
            Self::document_id().in_subquery(sub)
        }
    }

    fn add_sorts(&self, query: &mut SelectStatement) {
        for sort in &self.sorts {
            let Some(column) = sort.slot.column() else {
                continue;
            };
            let (aggregate, order) = match sort.direction {
                SortDirection::Asc => ("MIN", Order::Asc),
                SortDirection::Desc => ("MAX", Order::Desc),
            };
            // SQLite orders NULL first ascending and last descending.
            let expr = Expr::cust(format!(
                r#"(SELECT {aggregate}("{column}") FROM "{VALUES}" WHERE "{VALUES}"."document_id" = "{DOCUMENTS}"."document_id" AND "{VALUES}"."path_id" = {})"#,
                sort.path_id.0
            ));
            query.order_by_expr(expr, order);
        }
        query.order_by((Alias::new(DOCUMENTS), Alias::new("document_id")), Order::Asc);
    }
}

/// Bind SeaQuery values onto sqlx arguments.
fn to_arguments<'q>(values: Values) -> SchemaResult<SqliteArguments<'q>> {
    let mut args = SqliteArguments::default();
    for value in values.0 {
        let added = match value {
            Value::Bool(v) => args.add(v),
            Value::TinyInt(v) => args.add(v.map(i64::from)),
            Value::SmallInt(v) => args.add(v.map(i64::from)),
            Value::Int(v) => args.add(v.map(i64::from)),
            Value::BigInt(v) => args.add(v),
            Value::TinyUnsigned(v) => args.add(v.map(i64::from)),
            Value::SmallUnsigned(v) => args.add(v.map(i64::from)),
            Value::Unsigned(v) => args.add(v.map(i64::from)),
            Value::BigUnsigned(v) => args.add(v.map(|n| i64::try_from(n).unwrap_or(i64::MAX))),
            Value::Float(v) => args.add(v.map(f64::from)),
            Value::Double(v) => args.add(v),
            Value::String(v) => args.add(v.map(|s| *s)),
            other => {
                return Err(SchemaError::Internal(anyhow::anyhow!(
                    "unsupported query value {other:?}"
                )));
            }
        };
        added.map_err(|e| SchemaError::Database(sqlx::Error::Encode(e)))?;
    }
    Ok(args)
}

/// Service executing document queries.
#[derive(Clone)]
pub struct QueryService {
    inner: Arc<QueryServiceInner>,
}

struct QueryServiceInner {
    pool: SqlitePool,
}

impl QueryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(QueryServiceInner { pool }),
        }
    }

    async fn prepare(&self, query: &DocumentQuery) -> SchemaResult<DocumentQueryBuilder> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, query.blueprint_id).await?;
        let tree = PathTree::load(&mut conn, query.blueprint_id).await?;
        DocumentQueryBuilder::new(query, &tree)
    }

    /// Ids of matching documents in query order.
    pub async fn fetch(&self, query: &DocumentQuery) -> SchemaResult<Vec<Uuid>> {
        let builder = self.prepare(query).await?;
        let (sql, values) = builder.build();
        debug!(sql = %sql, "document query");

        let rows: Vec<String> = sqlx::query_scalar_with::<Sqlite, String, _>(&sql, to_arguments(values)?)
            .fetch_all(&self.inner.pool)
            .await?;

        rows.iter()
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|e| SchemaError::Database(sqlx::Error::Decode(Box::new(e))))
            })
            .collect()
    }

    /// Number of matching documents, ignoring limit and offset.
    pub async fn count(&self, query: &DocumentQuery) -> SchemaResult<i64> {
        let builder = self.prepare(query).await?;
        let (sql, values) = builder.build_count();

        let count: i64 = sqlx::query_scalar_with::<Sqlite, i64, _>(&sql, to_arguments(values)?)
            .fetch_one(&self.inner.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, DataType};

    fn path(id: i64, name: &str, data_type: DataType, indexed: bool) -> Path {
        Path {
            id: PathId(id),
            blueprint_id: BlueprintId(7),
            parent_id: None,
            name: name.to_string(),
            full_path: name.to_string(),
            data_type,
            cardinality: Cardinality::One,
            is_indexed: indexed,
            is_required: false,
            validation_rules: serde_json::json!({}),
            sort_order: 0,
            embedded_blueprint_id: None,
            source_component_id: None,
            source_path_id: None,
            embedded_root_path_id: None,
            embed_id: None,
        }
    }

    fn tree() -> PathTree {
        PathTree::from_paths(vec![
            path(1, "city", DataType::String, true),
            path(2, "age", DataType::Int, true),
            path(3, "author", DataType::Ref, true),
            path(4, "notes", DataType::Text, false),
            path(5, "born", DataType::DateTime, true),
        ])
    }

    fn query() -> DocumentQuery {
        DocumentQuery::new(BlueprintId(7))
    }

    #[test]
    fn base_query_scopes_to_blueprint() {
        let (sql, values) = DocumentQueryBuilder::new(&query(), &tree()).unwrap().build();
        assert!(sql.starts_with(r#"SELECT "indexed_document"."document_id" FROM "indexed_document""#));
        assert!(sql.contains(r#""indexed_document"."blueprint_id" = ?"#));
        assert!(sql.ends_with(r#"ORDER BY "indexed_document"."document_id" ASC"#));
        assert_eq!(values.0, vec![Value::BigInt(Some(7))]);
    }

    #[test]
    fn eq_filter_uses_typed_column_subquery() {
        let q = query().where_path("city", FilterOp::Eq, "Riga");
        let (sql, values) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#"IN (SELECT "document_id" FROM "doc_value" WHERE "path_id" = ? AND "value_string" = ?)"#));
        assert_eq!(values.0.len(), 3);
        assert_eq!(values.0[2], Value::String(Some(Box::new("Riga".to_string()))));
    }

    #[test]
    fn string_values_coerce_for_int_paths() {
        let q = query().where_path("age", FilterOp::Gte, "30");
        let (sql, values) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#""value_int" >= ?"#));
        assert_eq!(values.0[2], Value::BigInt(Some(30)));

        let q = query().where_path("age", FilterOp::Eq, "old");
        assert!(DocumentQueryBuilder::new(&q, &tree()).is_err());
    }

    #[test]
    fn datetime_values_are_normalized() {
        let q = query().where_path("born", FilterOp::Lt, "2000-01-01");
        let (_, values) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert_eq!(
            values.0[2],
            Value::String(Some(Box::new("2000-01-01T00:00:00.000000Z".to_string())))
        );
    }

    #[test]
    fn missing_uses_not_in() {
        let q = query().where_missing("city");
        let (sql, _) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#""indexed_document"."document_id" NOT IN (SELECT"#));
    }

    #[test]
    fn in_filter_binds_every_value() {
        let q = query().where_path("age", FilterOp::In, vec![30i64, 40, 50]);
        let (sql, values) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#""value_int" IN (?, ?, ?)"#));
        assert_eq!(values.0.len(), 5);
    }

    #[test]
    fn contains_escapes_wildcards() {
        let q = query().where_path("city", FilterOp::Contains, "50%_off");
        let (sql, values) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains("LIKE"));
        assert!(sql.contains("ESCAPE '!'"));
        let pattern = Value::String(Some(Box::new("%50!%!_off%".to_string())));
        assert!(values.0.contains(&pattern) || sql.contains("%50!%!_off%"));
    }

    #[test]
    fn contains_requires_string_field() {
        let q = query().where_path("age", FilterOp::Contains, "3");
        assert!(matches!(
            DocumentQueryBuilder::new(&q, &tree()),
            Err(SchemaError::Validation { .. })
        ));
    }

    #[test]
    fn ref_filter_reads_doc_ref() {
        let target = Uuid::now_v7();
        let q = query().where_ref("author", target);
        let (sql, values) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#"FROM "doc_ref" WHERE "path_id" = ? AND "target_document_id" = ?"#));
        assert_eq!(values.0[2], Value::String(Some(Box::new(target.to_string()))));
    }

    #[test]
    fn where_ref_on_scalar_path_is_rejected() {
        let q = query().where_ref("city", Uuid::nil());
        assert!(DocumentQueryBuilder::new(&q, &tree()).is_err());
    }

    #[test]
    fn sort_uses_min_or_max_then_document_id() {
        let q = query().order_by_path("age", SortDirection::Desc);
        let (sql, _) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#"(SELECT MAX("value_int") FROM "doc_value""#));
        assert!(sql.contains(r#""doc_value"."path_id" = 2) DESC, "indexed_document"."document_id" ASC"#));

        let q = query().order_by_path("age", SortDirection::Asc);
        let (sql, _) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains(r#"SELECT MIN("value_int")"#));
    }

    #[test]
    fn unindexed_and_unknown_paths_are_rejected() {
        let q = query().where_path("notes", FilterOp::Eq, "x");
        assert!(DocumentQueryBuilder::new(&q, &tree()).is_err());
        let q = query().order_by_path("nope", SortDirection::Asc);
        assert!(DocumentQueryBuilder::new(&q, &tree()).is_err());
    }

    #[test]
    fn pagination_and_count() {
        let q = query().limit(10).offset(20);
        let builder = DocumentQueryBuilder::new(&q, &tree()).unwrap();
        let (sql, _) = builder.build();
        assert!(sql.contains("LIMIT ? OFFSET ?"));

        let (count_sql, _) = builder.build_count();
        assert!(count_sql.contains("COUNT(*)"));
        assert!(!count_sql.contains("LIMIT"));
        assert!(!count_sql.contains("ORDER BY"));
    }

    #[test]
    fn offset_without_limit_still_limits() {
        let q = query().offset(5);
        let (sql, _) = DocumentQueryBuilder::new(&q, &tree()).unwrap().build();
        assert!(sql.contains("LIMIT ? OFFSET ?"));
    }
}
