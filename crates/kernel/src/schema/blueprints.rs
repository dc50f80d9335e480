//! Blueprint graph manager.
//!
//! Registry of blueprints plus the usage checks and graph queries that
//! depend on the embed relation.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::graph::EmbedGraph;
use crate::error::{SchemaError, SchemaResult};
use crate::models::{
    Blueprint, BlueprintEmbed, BlueprintId, BlueprintKind, CreateBlueprint, Path, UpdateBlueprint,
    doc_index,
};

static BLUEPRINT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z][a-z0-9_]*$").expect("blueprint code pattern is valid")
});

/// Validate a blueprint machine name.
pub fn validate_code(code: &str) -> SchemaResult<()> {
    if code.is_empty() || code.len() > 64 {
        return Err(SchemaError::validation(
            "code",
            "must be between 1 and 64 characters",
        ));
    }
    if !BLUEPRINT_CODE.is_match(code) {
        return Err(SchemaError::validation(
            "code",
            format!("'{code}' must start with a lowercase letter and contain only lowercase letters, digits, and underscores"),
        ));
    }
    Ok(())
}

/// Outcome of a deletion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteCheck {
    pub can_delete: bool,
    pub reasons: Vec<String>,
}

/// Direct embed edges around one blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    /// Blueprints embedded into this one.
    pub depends_on: Vec<BlueprintId>,
    /// Blueprints that embed this one.
    pub depended_by: Vec<BlueprintId>,
}

/// Usage counts that block deleting a blueprint.
async fn delete_check(conn: &mut SqliteConnection, id: BlueprintId) -> SchemaResult<DeleteCheck> {
    let content_types = Blueprint::count_content_types(conn, id).await?;
    let hosts = BlueprintEmbed::count_hosts(conn, id).await?;

    let mut reasons = Vec::new();
    if content_types > 0 {
        reasons.push(format!("used by {content_types} content types"));
    }
    if hosts > 0 {
        reasons.push(format!("embedded into {hosts} other blueprints"));
    }

    Ok(DeleteCheck {
        can_delete: reasons.is_empty(),
        reasons,
    })
}

/// Service for blueprint registry operations.
#[derive(Clone)]
pub struct BlueprintGraphManager {
    inner: Arc<GraphManagerInner>,
}

struct GraphManagerInner {
    pool: SqlitePool,
    max_depth: usize,
}

impl BlueprintGraphManager {
    pub fn new(pool: SqlitePool, max_depth: usize) -> Self {
        Self {
            inner: Arc::new(GraphManagerInner { pool, max_depth }),
        }
    }

    /// Create a blueprint.
    pub async fn create_blueprint(&self, input: CreateBlueprint) -> SchemaResult<Blueprint> {
        validate_code(&input.code)?;
        if input.name.trim().is_empty() {
            return Err(SchemaError::validation("name", "must not be empty"));
        }
        if input.kind == BlueprintKind::Component
            && (input.content_type.is_some() || input.is_default)
        {
            return Err(SchemaError::validation(
                "content_type",
                "component blueprints cannot own a content type",
            ));
        }

        let mut tx = self.inner.pool.begin().await?;
        let blueprint = Blueprint::insert(&mut tx, &input).await?;
        if let (true, Some(content_type)) = (blueprint.is_default, &blueprint.content_type) {
            Blueprint::clear_default_for(&mut tx, content_type, blueprint.id).await?;
        }
        tx.commit().await?;

        info!(blueprint = %blueprint.code, kind = %blueprint.kind, "blueprint created");
        Ok(blueprint)
    }

    /// Update blueprint attributes.
    ///
    /// A component can become full only while nothing embeds it; a full
    /// blueprint can become a component only while no content type is bound.
    pub async fn update_blueprint(
        &self,
        id: BlueprintId,
        update: UpdateBlueprint,
    ) -> SchemaResult<Blueprint> {
        let mut tx = self.inner.pool.begin().await?;
        let mut blueprint = Blueprint::get(&mut tx, id).await?;

        if let Some(code) = update.code {
            validate_code(&code)?;
            blueprint.code = code;
        }
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(SchemaError::validation("name", "must not be empty"));
            }
            blueprint.name = name;
        }
        if let Some(description) = update.description {
            blueprint.description = description;
        }
        if let Some(content_type) = update.content_type.clone() {
            blueprint.content_type = content_type;
        }
        if let Some(is_default) = update.is_default {
            blueprint.is_default = is_default;
        }

        if let Some(kind) = update.kind.filter(|k| *k != blueprint.kind) {
            match kind {
                BlueprintKind::Full => {
                    let hosts = BlueprintEmbed::count_hosts(&mut tx, id).await?;
                    if hosts > 0 {
                        return Err(SchemaError::validation(
                            "kind",
                            format!("'{}' is embedded into {hosts} other blueprints", blueprint.code),
                        ));
                    }
                }
                BlueprintKind::Component => {
                    let bound = Blueprint::count_content_types(&mut tx, id).await?;
                    if bound > 0 {
                        return Err(SchemaError::validation(
                            "kind",
                            format!("'{}' is used by {bound} content types", blueprint.code),
                        ));
                    }
                    if update.content_type.is_none() {
                        blueprint.content_type = None;
                    }
                    if update.is_default.is_none() {
                        blueprint.is_default = false;
                    }
                }
            }
            blueprint.kind = kind;
        }

        if blueprint.is_component() && (blueprint.content_type.is_some() || blueprint.is_default) {
            return Err(SchemaError::validation(
                "content_type",
                "component blueprints cannot own a content type",
            ));
        }

        let saved = blueprint.save(&mut tx).await?;
        if let (true, Some(content_type)) = (saved.is_default, &saved.content_type) {
            Blueprint::clear_default_for(&mut tx, content_type, saved.id).await?;
        }
        tx.commit().await?;

        info!(blueprint = %saved.code, kind = %saved.kind, "blueprint updated");
        Ok(saved)
    }

    /// Whether a blueprint can be deleted, with the reasons when it cannot.
    pub async fn can_delete(&self, id: BlueprintId) -> SchemaResult<DeleteCheck> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, id).await?;
        delete_check(&mut conn, id).await
    }

    /// Delete an unused blueprint with its paths, hosted embeds, and index rows.
    pub async fn delete_blueprint(&self, id: BlueprintId) -> SchemaResult<()> {
        let mut tx = self.inner.pool.begin().await?;
        let blueprint = Blueprint::get(&mut tx, id).await?;
        let check = delete_check(&mut tx, id).await?;
        if !check.can_delete {
            warn!(blueprint = %blueprint.code, reasons = ?check.reasons, "blueprint delete refused");
            return Err(SchemaError::Referential {
                code: blueprint.code,
                reasons: check.reasons,
            });
        }

        let path_ids: Vec<_> = Path::list_for_blueprint(&mut tx, id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        doc_index::purge_paths(&mut tx, &path_ids).await?;
        doc_index::purge_blueprint(&mut tx, id).await?;
        Path::delete_for_blueprint(&mut tx, id).await?;

        for embed in BlueprintEmbed::list_for_host(&mut tx, id).await? {
            BlueprintEmbed::delete(&mut tx, embed.id).await?;
        }
        Blueprint::delete(&mut tx, id).await?;
        tx.commit().await?;

        info!(blueprint = %blueprint.code, paths = path_ids.len(), "blueprint deleted");
        Ok(())
    }

    /// Direct dependency edges of a blueprint.
    pub async fn dependency_graph(&self, id: BlueprintId) -> SchemaResult<DependencyGraph> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, id).await?;
        let graph = EmbedGraph::from_embeds(&BlueprintEmbed::list_all(&mut conn).await?);

        Ok(DependencyGraph {
            depends_on: graph.depends_on(id),
            depended_by: graph.depended_by(id),
        })
    }

    /// Components that can be embedded into `id` without creating a cycle.
    pub async fn embeddable_blueprints_for(&self, id: BlueprintId) -> SchemaResult<Vec<Blueprint>> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, id).await?;
        let graph = EmbedGraph::from_embeds(&BlueprintEmbed::list_all(&mut conn).await?);

        let mut candidates = Vec::new();
        for blueprint in Blueprint::list(&mut conn).await? {
            if !blueprint.is_component() || blueprint.id == id {
                continue;
            }
            if !graph.reaches(blueprint.id, id, self.inner.max_depth)? {
                candidates.push(blueprint);
            }
        }

        Ok(candidates)
    }

    pub async fn get(&self, id: BlueprintId) -> SchemaResult<Blueprint> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, id).await
    }

    pub async fn find_by_code(&self, code: &str) -> SchemaResult<Option<Blueprint>> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::find_by_code(&mut conn, code).await
    }

    /// Look up a blueprint by code, failing with NotFound.
    pub async fn get_by_code(&self, code: &str) -> SchemaResult<Blueprint> {
        self.find_by_code(code)
            .await?
            .ok_or_else(|| SchemaError::not_found("blueprint", code))
    }

    pub async fn list(&self) -> SchemaResult<Vec<Blueprint>> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::list(&mut conn).await
    }

    /// Bind a content type to a full blueprint.
    pub async fn bind_content_type(&self, content_type: &str, id: BlueprintId) -> SchemaResult<()> {
        if content_type.trim().is_empty() {
            return Err(SchemaError::validation("content_type", "must not be empty"));
        }

        let mut tx = self.inner.pool.begin().await?;
        let blueprint = Blueprint::get(&mut tx, id).await?;
        if blueprint.is_component() {
            return Err(SchemaError::validation(
                "kind",
                format!("'{}' is a component and cannot back a content type", blueprint.code),
            ));
        }
        Blueprint::bind_content_type(&mut tx, content_type, id).await?;
        tx.commit().await?;

        info!(blueprint = %blueprint.code, content_type, "content type bound");
        Ok(())
    }

    /// Remove a content type binding. Returns whether one existed.
    pub async fn unbind_content_type(&self, content_type: &str) -> SchemaResult<bool> {
        let mut conn = self.inner.pool.acquire().await?;
        let removed = Blueprint::unbind_content_type(&mut conn, content_type).await?;
        if removed {
            info!(content_type, "content type unbound");
        }
        Ok(removed)
    }
}
