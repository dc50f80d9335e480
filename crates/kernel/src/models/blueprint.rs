//! Blueprint model and CRUD operations.
//!
//! Blueprints define the shape of content: either a reusable Component or a
//! Full schema bound to one content type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection};

use super::BlueprintId;
use crate::error::{SchemaError, SchemaResult};

const COLUMNS: &str =
    "id, code, name, description, kind, content_type, is_default, created, changed";

/// Blueprint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintKind {
    /// Reusable field group that can be embedded into other blueprints.
    Component,
    /// Schema bound to a content type; documents are indexed against it.
    Full,
}

impl BlueprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for BlueprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlueprintKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "component" => Ok(Self::Component),
            "full" => Ok(Self::Full),
            other => Err(SchemaError::validation(
                "kind",
                format!("unknown blueprint kind '{other}'"),
            )),
        }
    }
}

/// Blueprint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,

    /// Unique machine name (e.g., "address", "person").
    pub code: String,

    /// Human-readable label.
    pub name: String,

    pub description: Option<String>,

    pub kind: BlueprintKind,

    /// Owning content type (Full blueprints only).
    pub content_type: Option<String>,

    /// Default blueprint for its content type.
    pub is_default: bool,

    /// Unix timestamp when created.
    pub created: i64,

    /// Unix timestamp when last changed.
    pub changed: i64,
}

impl<'r> FromRow<'r, SqliteRow> for Blueprint {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            kind: kind
                .parse()
                .map_err(|e: SchemaError| sqlx::Error::Decode(Box::new(e)))?,
            content_type: row.try_get("content_type")?,
            is_default: row.try_get("is_default")?,
            created: row.try_get("created")?,
            changed: row.try_get("changed")?,
        })
    }
}

/// Input for creating a new blueprint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlueprint {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: BlueprintKind,
    pub content_type: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl CreateBlueprint {
    /// Component blueprint with the given code; the name defaults to the code.
    pub fn component(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            kind: BlueprintKind::Component,
            content_type: None,
            is_default: false,
        }
    }

    /// Full blueprint with the given code.
    pub fn full(code: &str) -> Self {
        Self {
            kind: BlueprintKind::Full,
            ..Self::component(code)
        }
    }
}

/// Input for updating a blueprint. `None` leaves the attribute unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlueprint {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub kind: Option<BlueprintKind>,
    pub content_type: Option<Option<String>>,
    pub is_default: Option<bool>,
}

impl Blueprint {
    pub fn is_component(&self) -> bool {
        self.kind == BlueprintKind::Component
    }

    /// Find a blueprint by ID.
    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: BlueprintId,
    ) -> SchemaResult<Option<Self>> {
        let blueprint = sqlx::query_as::<_, Blueprint>(&format!(
            "SELECT {COLUMNS} FROM blueprint WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(blueprint)
    }

    /// Find a blueprint by ID, failing with NotFound when absent.
    pub async fn get(conn: &mut SqliteConnection, id: BlueprintId) -> SchemaResult<Self> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| SchemaError::not_found("blueprint", id))
    }

    /// Find a blueprint by code.
    pub async fn find_by_code(
        conn: &mut SqliteConnection,
        code: &str,
    ) -> SchemaResult<Option<Self>> {
        let blueprint = sqlx::query_as::<_, Blueprint>(&format!(
            "SELECT {COLUMNS} FROM blueprint WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(blueprint)
    }

    /// List all blueprints ordered by code.
    pub async fn list(conn: &mut SqliteConnection) -> SchemaResult<Vec<Self>> {
        let blueprints =
            sqlx::query_as::<_, Blueprint>(&format!("SELECT {COLUMNS} FROM blueprint ORDER BY code"))
                .fetch_all(&mut *conn)
                .await?;

        Ok(blueprints)
    }

    /// List blueprints by IDs, ordered by code.
    pub async fn list_by_ids(
        conn: &mut SqliteConnection,
        ids: &[BlueprintId],
    ) -> SchemaResult<Vec<Self>> {
        let mut blueprints = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(blueprint) = Self::find_by_id(conn, *id).await? {
                blueprints.push(blueprint);
            }
        }
        blueprints.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(blueprints)
    }

    /// Insert a new blueprint.
    pub async fn insert(conn: &mut SqliteConnection, input: &CreateBlueprint) -> SchemaResult<Self> {
        let now = chrono::Utc::now().timestamp();

        let blueprint = sqlx::query_as::<_, Blueprint>(&format!(
            r#"
            INSERT INTO blueprint (code, name, description, kind, content_type, is_default, created, changed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.kind.as_str())
        .bind(&input.content_type)
        .bind(input.is_default)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            SchemaError::from_write(e, || format!("blueprint code '{}' already exists", input.code))
        })?;

        Ok(blueprint)
    }

    /// Persist every mutable attribute of this blueprint.
    pub async fn save(&self, conn: &mut SqliteConnection) -> SchemaResult<Self> {
        let now = chrono::Utc::now().timestamp();

        let blueprint = sqlx::query_as::<_, Blueprint>(&format!(
            r#"
            UPDATE blueprint SET
                code = ?,
                name = ?,
                description = ?,
                kind = ?,
                content_type = ?,
                is_default = ?,
                changed = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&self.code)
        .bind(&self.name)
        .bind(&self.description)
        .bind(self.kind.as_str())
        .bind(&self.content_type)
        .bind(self.is_default)
        .bind(now)
        .bind(self.id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            SchemaError::from_write(e, || format!("blueprint code '{}' already exists", self.code))
        })?;

        Ok(blueprint)
    }

    /// Clear the default flag on other blueprints of the same content type.
    pub async fn clear_default_for(
        conn: &mut SqliteConnection,
        content_type: &str,
        except: BlueprintId,
    ) -> SchemaResult<()> {
        sqlx::query("UPDATE blueprint SET is_default = 0 WHERE content_type = ? AND id <> ?")
            .bind(content_type)
            .bind(except)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Delete a blueprint row. Paths and embeds must be removed first.
    pub async fn delete(conn: &mut SqliteConnection, id: BlueprintId) -> SchemaResult<bool> {
        let result = sqlx::query("DELETE FROM blueprint WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of content types bound to a blueprint.
    pub async fn count_content_types(
        conn: &mut SqliteConnection,
        id: BlueprintId,
    ) -> SchemaResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM content_type_binding WHERE blueprint_id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(count)
    }

    /// Bind a content type to a blueprint, replacing any previous binding.
    pub async fn bind_content_type(
        conn: &mut SqliteConnection,
        content_type: &str,
        id: BlueprintId,
    ) -> SchemaResult<()> {
        sqlx::query(
            r#"
            INSERT INTO content_type_binding (content_type, blueprint_id)
            VALUES (?, ?)
            ON CONFLICT (content_type) DO UPDATE SET blueprint_id = excluded.blueprint_id
            "#,
        )
        .bind(content_type)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Remove a content type binding.
    pub async fn unbind_content_type(
        conn: &mut SqliteConnection,
        content_type: &str,
    ) -> SchemaResult<bool> {
        let result = sqlx::query("DELETE FROM content_type_binding WHERE content_type = ?")
            .bind(content_type)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
