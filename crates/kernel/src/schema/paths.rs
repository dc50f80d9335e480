//! Path tree manager.
//!
//! CRUD over a blueprint's field tree. Every mutation runs in one
//! transaction and keeps materialized copies in other blueprints in step
//! with the edited source.

use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::DataType;
use super::embed::{attach, copy_closure, immutable_field, propagate, remove_paths, synchronize_copies};
use super::tree::{PathTree, check_depth, join_path, rebase, validate_name};
use crate::error::{SchemaError, SchemaResult};
use crate::models::doc_index;
use crate::models::path::NewPath;
use crate::models::{Blueprint, BlueprintEmbed, BlueprintId, CreatePath, Path, PathId, UpdatePath};

/// Recompute `full_path` for a node renamed to `new_name` and its subtree.
pub(crate) async fn rename_subtree(
    conn: &mut SqliteConnection,
    path: &Path,
    new_name: &str,
    max_depth: usize,
) -> SchemaResult<()> {
    let parent_full = match path.parent_id {
        Some(parent) => Some(Path::get(conn, parent).await?.full_path),
        None => None,
    };
    let new_root = join_path(parent_full.as_deref(), new_name);
    if new_root == path.full_path {
        return Ok(());
    }

    let tree = PathTree::load(conn, path.blueprint_id).await?;
    let moves: Vec<(PathId, String)> = tree
        .subtree(path.id, max_depth)?
        .into_iter()
        .map(|node| (node.id, rebase(&node.full_path, &path.full_path, &new_root)))
        .collect();

    for (id, full_path) in moves {
        Path::set_full_path(conn, id, &full_path).await?;
    }

    Ok(())
}

fn check_index_flag(data_type: DataType, is_indexed: bool) -> SchemaResult<()> {
    if is_indexed && !data_type.is_indexable() {
        return Err(SchemaError::validation(
            "is_indexed",
            format!("{data_type} fields cannot be indexed"),
        ));
    }
    Ok(())
}

/// Create a path inside an open transaction.
pub(crate) async fn create_path_in(
    conn: &mut SqliteConnection,
    input: &CreatePath,
    max_depth: usize,
) -> SchemaResult<Path> {
    let blueprint = Blueprint::get(conn, input.blueprint_id).await?;
    validate_name(&input.name)?;
    check_index_flag(input.data_type, input.is_indexed)?;

    match (input.data_type, input.embedded_blueprint_id) {
        (DataType::Blueprint, None) => {
            return Err(SchemaError::validation(
                "embedded_blueprint_id",
                "required when data_type is blueprint",
            ));
        }
        (DataType::Blueprint, Some(_)) => {}
        (other, Some(_)) => {
            return Err(SchemaError::validation(
                "embedded_blueprint_id",
                format!("not allowed on {other} fields"),
            ));
        }
        (_, None) => {}
    }

    let parent = match input.parent_id {
        Some(parent_id) => {
            let parent = Path::find_by_id(conn, parent_id).await?.ok_or_else(|| {
                SchemaError::validation("parent_id", format!("path {parent_id} does not exist"))
            })?;
            if parent.blueprint_id != blueprint.id {
                return Err(SchemaError::validation(
                    "parent_id",
                    format!("path '{}' belongs to another blueprint", parent.full_path),
                ));
            }
            if parent.is_materialized() {
                return Err(immutable_field(conn, &parent, max_depth).await?);
            }
            if parent.data_type != DataType::Json {
                return Err(SchemaError::validation(
                    "parent_id",
                    format!(
                        "children can only be added under json fields, '{}' is {}",
                        parent.full_path, parent.data_type
                    ),
                ));
            }
            Some(parent)
        }
        None => None,
    };

    let full_path = join_path(parent.as_ref().map(|p| p.full_path.as_str()), &input.name);
    check_depth(&full_path, max_depth)?;

    let path = Path::insert(
        conn,
        &NewPath {
            blueprint_id: blueprint.id,
            parent_id: input.parent_id,
            full_path,
            attributes: input.attributes(),
            embedded_blueprint_id: input.embedded_blueprint_id,
            source_component_id: None,
            source_path_id: None,
            embedded_root_path_id: None,
            embed_id: None,
        },
    )
    .await?;

    let propagated = propagate(conn, vec![path.clone()], max_depth).await?;

    if let Some(component) = input.embedded_blueprint_id {
        attach(conn, blueprint.id, component, Some(path.id), max_depth).await?;
    }

    info!(
        blueprint = %blueprint.code,
        path = %path.full_path,
        data_type = %path.data_type,
        propagated,
        "path created"
    );

    Ok(path)
}

/// Update a path inside an open transaction.
pub(crate) async fn update_path_in(
    conn: &mut SqliteConnection,
    id: PathId,
    update: &UpdatePath,
    max_depth: usize,
) -> SchemaResult<Path> {
    let path = Path::get(conn, id).await?;
    if path.is_materialized() {
        return Err(immutable_field(conn, &path, max_depth).await?);
    }

    let attrs = update.apply(&path.attributes());

    if attrs.name != path.name {
        validate_name(&attrs.name)?;
    }
    if attrs.data_type != path.data_type {
        if attrs.data_type == DataType::Blueprint || path.data_type == DataType::Blueprint {
            return Err(SchemaError::validation(
                "data_type",
                "blueprint fields cannot change type; delete the embed instead",
            ));
        }
        let tree = PathTree::load(conn, path.blueprint_id).await?;
        if tree.has_children(path.id) {
            return Err(SchemaError::validation(
                "data_type",
                format!("'{}' has children and must stay json", path.full_path),
            ));
        }
    }
    check_index_flag(attrs.data_type, attrs.is_indexed)?;

    if attrs.name != path.name {
        rename_subtree(conn, &path, &attrs.name, max_depth).await?;
    }
    Path::update_attributes(conn, path.id, &attrs).await?;

    if attrs.data_type != path.data_type || (path.is_indexed && !attrs.is_indexed) {
        doc_index::purge_paths(conn, &[path.id]).await?;
    }

    let synchronized = synchronize_copies(conn, path.id, max_depth).await?;
    let updated = Path::get(conn, path.id).await?;

    info!(
        path = %updated.full_path,
        blueprint = %updated.blueprint_id,
        synchronized,
        "path updated"
    );

    Ok(updated)
}

/// Delete a path, its descendants, and every copy of them.
pub(crate) async fn delete_path_in(
    conn: &mut SqliteConnection,
    id: PathId,
    max_depth: usize,
) -> SchemaResult<u64> {
    let path = Path::get(conn, id).await?;
    if path.is_materialized() {
        return Err(immutable_field(conn, &path, max_depth).await?);
    }

    let tree = PathTree::load(conn, path.blueprint_id).await?;
    let subtree: Vec<PathId> = tree
        .subtree(path.id, max_depth)?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let mounted = BlueprintEmbed::list_mounted_at(conn, &subtree).await?;
    if let Some(embed) = mounted.first() {
        let mount = embed
            .mount_path_id
            .and_then(|m| tree.get(m))
            .map_or_else(|| path.full_path.clone(), |m| m.full_path.clone());
        warn!(path = %path.full_path, embed_id = %embed.id, "refused to delete embed mount point");
        return Err(SchemaError::validation(
            "path",
            format!("'{mount}' is the mount point of embed {}; delete the embed instead", embed.id),
        ));
    }

    let mut doomed = subtree.clone();
    doomed.extend(copy_closure(conn, &subtree, max_depth).await?);
    let removed = remove_paths(conn, &doomed).await?;

    info!(path = %path.full_path, blueprint = %path.blueprint_id, removed, "path deleted");

    Ok(removed)
}

/// Service over a blueprint's field tree.
#[derive(Clone)]
pub struct PathTreeManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    pool: SqlitePool,
    max_depth: usize,
}

impl PathTreeManager {
    pub fn new(pool: SqlitePool, max_depth: usize) -> Self {
        Self {
            inner: Arc::new(ManagerInner { pool, max_depth }),
        }
    }

    /// Create a path. A `Blueprint` path is created together with its embed.
    pub async fn create_path(&self, input: CreatePath) -> SchemaResult<Path> {
        let mut tx = self.inner.pool.begin().await?;
        let path = create_path_in(&mut tx, &input, self.inner.max_depth).await?;
        tx.commit().await?;
        Ok(path)
    }

    /// Update a path's mutable attributes and synchronize its copies.
    pub async fn update_path(&self, id: PathId, update: UpdatePath) -> SchemaResult<Path> {
        let mut tx = self.inner.pool.begin().await?;
        let path = update_path_in(&mut tx, id, &update, self.inner.max_depth).await?;
        tx.commit().await?;
        Ok(path)
    }

    /// Delete a path subtree. Returns the number of path rows removed,
    /// copies in other blueprints included.
    pub async fn delete_path(&self, id: PathId) -> SchemaResult<u64> {
        let mut tx = self.inner.pool.begin().await?;
        let removed = delete_path_in(&mut tx, id, self.inner.max_depth).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn get_path(&self, id: PathId) -> SchemaResult<Path> {
        let mut conn = self.inner.pool.acquire().await?;
        Path::get(&mut conn, id).await
    }

    /// Every path of a blueprint in sibling order.
    pub async fn list_paths(&self, blueprint: BlueprintId) -> SchemaResult<Vec<Path>> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, blueprint).await?;
        Path::list_for_blueprint(&mut conn, blueprint).await
    }

    /// The blueprint's path arena.
    pub async fn tree(&self, blueprint: BlueprintId) -> SchemaResult<PathTree> {
        let mut conn = self.inner.pool.acquire().await?;
        Blueprint::get(&mut conn, blueprint).await?;
        PathTree::load(&mut conn, blueprint).await
    }
}
