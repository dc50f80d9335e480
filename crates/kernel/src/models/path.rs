//! Path model and row operations.
//!
//! A Path is one field definition node inside a blueprint's tree. Paths are
//! stored as an adjacency list (`parent_id`) with a denormalized `full_path`.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection};

use super::{BlueprintId, EmbedId, PathId};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::{Cardinality, DataType};

const COLUMNS: &str = "id, blueprint_id, parent_id, name, full_path, data_type, cardinality, \
    is_indexed, is_required, validation_rules, sort_order, embedded_blueprint_id, \
    source_component_id, source_path_id, embedded_root_path_id, embed_id";

/// Path record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: PathId,
    pub blueprint_id: BlueprintId,
    pub parent_id: Option<PathId>,
    pub name: String,

    /// Dot-joined names from the root to this node.
    pub full_path: String,

    pub data_type: DataType,
    pub cardinality: Cardinality,
    pub is_indexed: bool,
    pub is_required: bool,

    /// Opaque validation configuration.
    pub validation_rules: serde_json::Value,

    /// Caller-supplied ordering among siblings.
    pub sort_order: i64,

    /// Component embedded at this node (`data_type = Blueprint` only).
    pub embedded_blueprint_id: Option<BlueprintId>,

    /// Blueprint this copy was materialized from.
    pub source_component_id: Option<BlueprintId>,

    /// Path this copy was materialized from.
    pub source_path_id: Option<PathId>,

    /// Local mount path the copy was grafted under (None for root embeds).
    pub embedded_root_path_id: Option<PathId>,

    /// Embed that owns this copy.
    pub embed_id: Option<EmbedId>,
}

impl<'r> FromRow<'r, SqliteRow> for Path {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let data_type: String = row.try_get("data_type")?;
        let cardinality: String = row.try_get("cardinality")?;
        let rules: String = row.try_get("validation_rules")?;

        Ok(Self {
            id: row.try_get("id")?,
            blueprint_id: row.try_get("blueprint_id")?,
            parent_id: row.try_get("parent_id")?,
            name: row.try_get("name")?,
            full_path: row.try_get("full_path")?,
            data_type: data_type
                .parse()
                .map_err(|e: SchemaError| sqlx::Error::Decode(Box::new(e)))?,
            cardinality: cardinality
                .parse()
                .map_err(|e: SchemaError| sqlx::Error::Decode(Box::new(e)))?,
            is_indexed: row.try_get("is_indexed")?,
            is_required: row.try_get("is_required")?,
            validation_rules: serde_json::from_str(&rules)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            sort_order: row.try_get("sort_order")?,
            embedded_blueprint_id: row.try_get("embedded_blueprint_id")?,
            source_component_id: row.try_get("source_component_id")?,
            source_path_id: row.try_get("source_path_id")?,
            embedded_root_path_id: row.try_get("embedded_root_path_id")?,
            embed_id: row.try_get("embed_id")?,
        })
    }
}

/// Attributes shared between a source path and its materialized copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathAttributes {
    pub name: String,
    pub data_type: DataType,
    pub cardinality: Cardinality,
    pub is_indexed: bool,
    pub is_required: bool,
    pub validation_rules: serde_json::Value,
    pub sort_order: i64,
}

/// Input for creating a new path.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePath {
    pub blueprint_id: BlueprintId,
    pub parent_id: Option<PathId>,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub is_indexed: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default = "empty_rules")]
    pub validation_rules: serde_json::Value,
    #[serde(default)]
    pub sort_order: i64,
    pub embedded_blueprint_id: Option<BlueprintId>,
}

fn empty_rules() -> serde_json::Value {
    serde_json::json!({})
}

impl CreatePath {
    /// Root-level, single-valued, unindexed path.
    pub fn new(blueprint_id: BlueprintId, name: &str, data_type: DataType) -> Self {
        Self {
            blueprint_id,
            parent_id: None,
            name: name.to_string(),
            data_type,
            cardinality: Cardinality::One,
            is_indexed: false,
            is_required: false,
            validation_rules: empty_rules(),
            sort_order: 0,
            embedded_blueprint_id: None,
        }
    }

    /// Place the path under a parent node.
    pub fn under(mut self, parent_id: PathId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Mark the path as multi-valued.
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Mark the path as indexed.
    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    /// Mark the path as required.
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Set the component embedded at a `Blueprint` node.
    pub fn embedding(mut self, component: BlueprintId) -> Self {
        self.embedded_blueprint_id = Some(component);
        self
    }

    pub fn with_rules(mut self, rules: serde_json::Value) -> Self {
        self.validation_rules = rules;
        self
    }

    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub(crate) fn attributes(&self) -> PathAttributes {
        PathAttributes {
            name: self.name.clone(),
            data_type: self.data_type,
            cardinality: self.cardinality,
            is_indexed: self.is_indexed,
            is_required: self.is_required,
            validation_rules: self.validation_rules.clone(),
            sort_order: self.sort_order,
        }
    }
}

/// Input for updating a path. `None` leaves the attribute unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePath {
    pub name: Option<String>,
    pub data_type: Option<DataType>,
    pub cardinality: Option<Cardinality>,
    pub is_indexed: Option<bool>,
    pub is_required: Option<bool>,
    pub validation_rules: Option<serde_json::Value>,
    pub sort_order: Option<i64>,
}

impl UpdatePath {
    /// Merge the update over existing attributes.
    pub fn apply(&self, current: &PathAttributes) -> PathAttributes {
        PathAttributes {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            data_type: self.data_type.unwrap_or(current.data_type),
            cardinality: self.cardinality.unwrap_or(current.cardinality),
            is_indexed: self.is_indexed.unwrap_or(current.is_indexed),
            is_required: self.is_required.unwrap_or(current.is_required),
            validation_rules: self
                .validation_rules
                .clone()
                .unwrap_or_else(|| current.validation_rules.clone()),
            sort_order: self.sort_order.unwrap_or(current.sort_order),
        }
    }
}

/// Row to insert; identity is assigned by the database.
#[derive(Debug, Clone)]
pub(crate) struct NewPath {
    pub blueprint_id: BlueprintId,
    pub parent_id: Option<PathId>,
    pub full_path: String,
    pub attributes: PathAttributes,
    pub embedded_blueprint_id: Option<BlueprintId>,
    pub source_component_id: Option<BlueprintId>,
    pub source_path_id: Option<PathId>,
    pub embedded_root_path_id: Option<PathId>,
    pub embed_id: Option<EmbedId>,
}

impl Path {
    /// Whether this path is a materialized copy of another blueprint's path.
    pub fn is_materialized(&self) -> bool {
        self.source_path_id.is_some()
    }

    pub fn attributes(&self) -> PathAttributes {
        PathAttributes {
            name: self.name.clone(),
            data_type: self.data_type,
            cardinality: self.cardinality,
            is_indexed: self.is_indexed,
            is_required: self.is_required,
            validation_rules: self.validation_rules.clone(),
            sort_order: self.sort_order,
        }
    }

    /// Find a path by ID.
    pub async fn find_by_id(conn: &mut SqliteConnection, id: PathId) -> SchemaResult<Option<Self>> {
        let path =
            sqlx::query_as::<_, Path>(&format!("SELECT {COLUMNS} FROM blueprint_path WHERE id = ?"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(path)
    }

    /// Find a path by ID, failing with NotFound when absent.
    pub async fn get(conn: &mut SqliteConnection, id: PathId) -> SchemaResult<Self> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| SchemaError::not_found("path", id))
    }

    /// List every path of a blueprint in sibling order.
    pub async fn list_for_blueprint(
        conn: &mut SqliteConnection,
        blueprint_id: BlueprintId,
    ) -> SchemaResult<Vec<Self>> {
        let paths = sqlx::query_as::<_, Path>(&format!(
            "SELECT {COLUMNS} FROM blueprint_path WHERE blueprint_id = ? ORDER BY sort_order, id"
        ))
        .bind(blueprint_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(paths)
    }

    /// List every materialized copy of a source path, across all hosts.
    pub async fn list_copies(conn: &mut SqliteConnection, source: PathId) -> SchemaResult<Vec<Self>> {
        let paths = sqlx::query_as::<_, Path>(&format!(
            "SELECT {COLUMNS} FROM blueprint_path WHERE source_path_id = ? ORDER BY id"
        ))
        .bind(source)
        .fetch_all(&mut *conn)
        .await?;

        Ok(paths)
    }

    /// Find the copy of a source path created through a specific embed.
    pub async fn find_copy(
        conn: &mut SqliteConnection,
        source: PathId,
        embed_id: EmbedId,
    ) -> SchemaResult<Option<Self>> {
        let path = sqlx::query_as::<_, Path>(&format!(
            "SELECT {COLUMNS} FROM blueprint_path WHERE source_path_id = ? AND embed_id = ?"
        ))
        .bind(source)
        .bind(embed_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(path)
    }

    /// List every path materialized by an embed.
    pub async fn list_by_embed(
        conn: &mut SqliteConnection,
        embed_id: EmbedId,
    ) -> SchemaResult<Vec<Self>> {
        let paths = sqlx::query_as::<_, Path>(&format!(
            "SELECT {COLUMNS} FROM blueprint_path WHERE embed_id = ? ORDER BY id"
        ))
        .bind(embed_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(paths)
    }

    /// Insert a path row. A duplicate `full_path` surfaces as a conflict.
    pub(crate) async fn insert(conn: &mut SqliteConnection, new: &NewPath) -> SchemaResult<Self> {
        let attrs = &new.attributes;

        let path = sqlx::query_as::<_, Path>(&format!(
            r#"
            INSERT INTO blueprint_path (
                blueprint_id, parent_id, name, full_path, data_type, cardinality,
                is_indexed, is_required, validation_rules, sort_order, embedded_blueprint_id,
                source_component_id, source_path_id, embedded_root_path_id, embed_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.blueprint_id)
        .bind(new.parent_id)
        .bind(&attrs.name)
        .bind(&new.full_path)
        .bind(attrs.data_type.as_str())
        .bind(attrs.cardinality.as_str())
        .bind(attrs.is_indexed)
        .bind(attrs.is_required)
        .bind(attrs.validation_rules.to_string())
        .bind(attrs.sort_order)
        .bind(new.embedded_blueprint_id)
        .bind(new.source_component_id)
        .bind(new.source_path_id)
        .bind(new.embedded_root_path_id)
        .bind(new.embed_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            SchemaError::from_write(e, || {
                format!("path '{}' already exists in blueprint", new.full_path)
            })
        })?;

        Ok(path)
    }

    /// Overwrite the shared attributes of a path.
    pub(crate) async fn update_attributes(
        conn: &mut SqliteConnection,
        id: PathId,
        attrs: &PathAttributes,
    ) -> SchemaResult<()> {
        sqlx::query(
            r#"
            UPDATE blueprint_path SET
                name = ?,
                data_type = ?,
                cardinality = ?,
                is_indexed = ?,
                is_required = ?,
                validation_rules = ?,
                sort_order = ?
            WHERE id = ?
            "#,
        )
        .bind(&attrs.name)
        .bind(attrs.data_type.as_str())
        .bind(attrs.cardinality.as_str())
        .bind(attrs.is_indexed)
        .bind(attrs.is_required)
        .bind(attrs.validation_rules.to_string())
        .bind(attrs.sort_order)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Set the computed full path of a node.
    pub(crate) async fn set_full_path(
        conn: &mut SqliteConnection,
        id: PathId,
        full_path: &str,
    ) -> SchemaResult<()> {
        sqlx::query("UPDATE blueprint_path SET full_path = ? WHERE id = ?")
            .bind(full_path)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                SchemaError::from_write(e, || format!("path '{full_path}' already exists in blueprint"))
            })?;

        Ok(())
    }

    /// Delete path rows by ID.
    pub(crate) async fn delete_many(conn: &mut SqliteConnection, ids: &[PathId]) -> SchemaResult<u64> {
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM blueprint_path WHERE id = ?")
                .bind(*id)
                .execute(&mut *conn)
                .await?;
            deleted += result.rows_affected();
        }

        Ok(deleted)
    }

    /// Delete every path of a blueprint.
    pub(crate) async fn delete_for_blueprint(
        conn: &mut SqliteConnection,
        blueprint_id: BlueprintId,
    ) -> SchemaResult<u64> {
        let result = sqlx::query("DELETE FROM blueprint_path WHERE blueprint_id = ?")
            .bind(blueprint_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
