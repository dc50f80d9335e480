//! BlueprintEmbed model: one blueprint grafted into another.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use super::{BlueprintId, EmbedId, PathId};
use crate::error::{SchemaError, SchemaResult};

const COLUMNS: &str = "id, host_blueprint_id, embedded_blueprint_id, mount_path_id, created";

/// Embed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BlueprintEmbed {
    pub id: EmbedId,

    /// Blueprint receiving the copied fields.
    pub host_blueprint_id: BlueprintId,

    /// Component whose fields are copied.
    pub embedded_blueprint_id: BlueprintId,

    /// Host path the fields are grafted under (None = blueprint root).
    pub mount_path_id: Option<PathId>,

    /// Unix timestamp when created.
    pub created: i64,
}

impl BlueprintEmbed {
    /// Find an embed by ID.
    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: EmbedId,
    ) -> SchemaResult<Option<Self>> {
        let embed = sqlx::query_as::<_, BlueprintEmbed>(&format!(
            "SELECT {COLUMNS} FROM blueprint_embed WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(embed)
    }

    /// Find an embed by ID, failing with NotFound when absent.
    pub async fn get(conn: &mut SqliteConnection, id: EmbedId) -> SchemaResult<Self> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| SchemaError::not_found("embed", id))
    }

    /// Find the embed of `embedded` into `host` at a given mount point.
    pub async fn find_exact(
        conn: &mut SqliteConnection,
        host: BlueprintId,
        embedded: BlueprintId,
        mount: Option<PathId>,
    ) -> SchemaResult<Option<Self>> {
        let embed = sqlx::query_as::<_, BlueprintEmbed>(&format!(
            r#"
            SELECT {COLUMNS} FROM blueprint_embed
            WHERE host_blueprint_id = ?
              AND embedded_blueprint_id = ?
              AND COALESCE(mount_path_id, 0) = ?
            "#
        ))
        .bind(host)
        .bind(embedded)
        .bind(mount.map_or(0, |m| m.0))
        .fetch_optional(&mut *conn)
        .await?;

        Ok(embed)
    }

    /// Every embed in the system, used to build the dependency graph.
    pub async fn list_all(conn: &mut SqliteConnection) -> SchemaResult<Vec<Self>> {
        let embeds = sqlx::query_as::<_, BlueprintEmbed>(&format!(
            "SELECT {COLUMNS} FROM blueprint_embed ORDER BY id"
        ))
        .fetch_all(&mut *conn)
        .await?;

        Ok(embeds)
    }

    /// Embeds hosted by a blueprint.
    pub async fn list_for_host(
        conn: &mut SqliteConnection,
        host: BlueprintId,
    ) -> SchemaResult<Vec<Self>> {
        let embeds = sqlx::query_as::<_, BlueprintEmbed>(&format!(
            "SELECT {COLUMNS} FROM blueprint_embed WHERE host_blueprint_id = ? ORDER BY id"
        ))
        .bind(host)
        .fetch_all(&mut *conn)
        .await?;

        Ok(embeds)
    }

    /// Embeds that copy a blueprint into other hosts.
    pub async fn list_for_embedded(
        conn: &mut SqliteConnection,
        embedded: BlueprintId,
    ) -> SchemaResult<Vec<Self>> {
        let embeds = sqlx::query_as::<_, BlueprintEmbed>(&format!(
            "SELECT {COLUMNS} FROM blueprint_embed WHERE embedded_blueprint_id = ? ORDER BY id"
        ))
        .bind(embedded)
        .fetch_all(&mut *conn)
        .await?;

        Ok(embeds)
    }

    /// Embeds mounted at any of the given paths.
    pub async fn list_mounted_at(
        conn: &mut SqliteConnection,
        mounts: &[PathId],
    ) -> SchemaResult<Vec<Self>> {
        let mut embeds = Vec::new();
        for mount in mounts {
            let found = sqlx::query_as::<_, BlueprintEmbed>(&format!(
                "SELECT {COLUMNS} FROM blueprint_embed WHERE mount_path_id = ?"
            ))
            .bind(*mount)
            .fetch_all(&mut *conn)
            .await?;
            embeds.extend(found);
        }

        Ok(embeds)
    }

    /// Number of distinct blueprints embedding `embedded`.
    pub async fn count_hosts(
        conn: &mut SqliteConnection,
        embedded: BlueprintId,
    ) -> SchemaResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT host_blueprint_id) FROM blueprint_embed WHERE embedded_blueprint_id = ?",
        )
        .bind(embedded)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Insert an embed. The storage uniqueness index rejects duplicates.
    pub async fn insert(
        conn: &mut SqliteConnection,
        host: BlueprintId,
        embedded: BlueprintId,
        mount: Option<PathId>,
    ) -> SchemaResult<Self> {
        let now = chrono::Utc::now().timestamp();

        let embed = sqlx::query_as::<_, BlueprintEmbed>(&format!(
            r#"
            INSERT INTO blueprint_embed (host_blueprint_id, embedded_blueprint_id, mount_path_id, created)
            VALUES (?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(host)
        .bind(embedded)
        .bind(mount)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            SchemaError::from_write(e, || {
                format!("blueprint {embedded} is already embedded at this location")
            })
        })?;

        Ok(embed)
    }

    /// Delete an embed row.
    pub async fn delete(conn: &mut SqliteConnection, id: EmbedId) -> SchemaResult<bool> {
        let result = sqlx::query("DELETE FROM blueprint_embed WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
