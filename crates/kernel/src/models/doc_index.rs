//! Typed document index rows.
//!
//! One DocValue row per indexed scalar occurrence and one DocRef row per
//! reference occurrence. Rows are derived state owned by the indexer.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection};
use uuid::Uuid;

use super::{BlueprintId, PathId};
use crate::error::SchemaResult;

fn decode_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Indexed scalar occurrence. Exactly one value slot is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocValue {
    pub document_id: Uuid,
    pub path_id: PathId,

    /// 1-based occurrence for multi-valued lineages.
    pub array_index: Option<i64>,

    pub value_string: Option<String>,
    pub value_int: Option<i64>,
    pub value_float: Option<f64>,
    pub value_bool: Option<bool>,

    /// UTC timestamp, RFC 3339 with microseconds.
    pub value_datetime: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for DocValue {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            document_id: decode_uuid(row, "document_id")?,
            path_id: row.try_get("path_id")?,
            array_index: row.try_get("array_index")?,
            value_string: row.try_get("value_string")?,
            value_int: row.try_get("value_int")?,
            value_float: row.try_get("value_float")?,
            value_bool: row.try_get("value_bool")?,
            value_datetime: row.try_get("value_datetime")?,
        })
    }
}

/// Indexed reference occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    pub document_id: Uuid,
    pub path_id: PathId,
    pub target_document_id: Uuid,
    pub array_index: Option<i64>,
}

impl<'r> FromRow<'r, SqliteRow> for DocRef {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            document_id: decode_uuid(row, "document_id")?,
            path_id: row.try_get("path_id")?,
            target_document_id: decode_uuid(row, "target_document_id")?,
            array_index: row.try_get("array_index")?,
        })
    }
}

impl DocValue {
    /// Insert a value row.
    pub async fn insert(&self, conn: &mut SqliteConnection) -> SchemaResult<()> {
        sqlx::query(
            r#"
            INSERT INTO doc_value (
                document_id, path_id, array_index,
                value_string, value_int, value_float, value_bool, value_datetime
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.document_id.to_string())
        .bind(self.path_id)
        .bind(self.array_index)
        .bind(&self.value_string)
        .bind(self.value_int)
        .bind(self.value_float)
        .bind(self.value_bool)
        .bind(&self.value_datetime)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Value rows of a document ordered by path and position.
    pub async fn list_for_document(
        conn: &mut SqliteConnection,
        document_id: Uuid,
    ) -> SchemaResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, DocValue>(
            r#"
            SELECT document_id, path_id, array_index,
                   value_string, value_int, value_float, value_bool, value_datetime
            FROM doc_value
            WHERE document_id = ?
            ORDER BY path_id, array_index
            "#,
        )
        .bind(document_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}

impl DocRef {
    /// Insert a reference row.
    pub async fn insert(&self, conn: &mut SqliteConnection) -> SchemaResult<()> {
        sqlx::query(
            r#"
            INSERT INTO doc_ref (document_id, path_id, target_document_id, array_index)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(self.document_id.to_string())
        .bind(self.path_id)
        .bind(self.target_document_id.to_string())
        .bind(self.array_index)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Reference rows of a document ordered by path and position.
    pub async fn list_for_document(
        conn: &mut SqliteConnection,
        document_id: Uuid,
    ) -> SchemaResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, DocRef>(
            r#"
            SELECT document_id, path_id, target_document_id, array_index
            FROM doc_ref
            WHERE document_id = ?
            ORDER BY path_id, array_index
            "#,
        )
        .bind(document_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}

/// Remove every index row of a document, including its registration.
pub async fn purge_document(conn: &mut SqliteConnection, document_id: Uuid) -> SchemaResult<()> {
    let id = document_id.to_string();

    sqlx::query("DELETE FROM doc_value WHERE document_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM doc_ref WHERE document_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM indexed_document WHERE document_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Register a document as indexed against a blueprint.
pub async fn register_document(
    conn: &mut SqliteConnection,
    document_id: Uuid,
    blueprint_id: BlueprintId,
) -> SchemaResult<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO indexed_document (document_id, blueprint_id, indexed_at)
        VALUES (?, ?, ?)
        ON CONFLICT (document_id) DO UPDATE SET
            blueprint_id = excluded.blueprint_id,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(document_id.to_string())
    .bind(blueprint_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Remove index rows that describe the given paths.
pub async fn purge_paths(conn: &mut SqliteConnection, path_ids: &[PathId]) -> SchemaResult<()> {
    for path_id in path_ids {
        sqlx::query("DELETE FROM doc_value WHERE path_id = ?")
            .bind(*path_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM doc_ref WHERE path_id = ?")
            .bind(*path_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Remove every document registration of a blueprint.
pub async fn purge_blueprint(
    conn: &mut SqliteConnection,
    blueprint_id: BlueprintId,
) -> SchemaResult<()> {
    sqlx::query("DELETE FROM indexed_document WHERE blueprint_id = ?")
        .bind(blueprint_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
