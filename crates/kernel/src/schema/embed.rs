//! Embedding and materialization engine.
//!
//! Embedding a component into a host copies the component's whole path tree
//! under a mount point of the host. Copies point back at the path they were
//! copied from through `source_path_id`, so edits on the source can be
//! replayed onto every copy and copies of copies.
//!
//! The transaction-level functions here are shared with the path tree
//! manager, which calls them inside its own transactions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::DataType;
use super::graph::EmbedGraph;
use super::paths::rename_subtree;
use super::tree::{PathTree, check_depth, join_path};
use crate::error::{SchemaError, SchemaResult};
use crate::models::doc_index;
use crate::models::path::NewPath;
use crate::models::{Blueprint, BlueprintEmbed, BlueprintId, EmbedId, Path, PathAttributes, PathId};

/// A component path planned for copying into a host.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPath {
    pub source_path_id: PathId,
    pub source_parent_id: Option<PathId>,
    pub full_path: String,
    pub attributes: PathAttributes,
    pub embedded_blueprint_id: Option<BlueprintId>,
}

/// Result of a successful embed.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializedEmbed {
    pub embed: BlueprintEmbed,

    /// Paths created in the host, in pre-order.
    pub paths: Vec<Path>,

    /// Copies created further downstream in hosts of the host.
    pub propagated: usize,
}

/// Attributes a copy receives from its source.
pub(crate) fn copied_attributes(source: &Path) -> PathAttributes {
    let mut attrs = source.attributes();
    if attrs.data_type.is_structural() {
        attrs.is_indexed = false;
    }
    attrs
}

/// Plan the copies of a component tree under an optional mount prefix.
///
/// The plan is in pre-order so parents are always created before children.
pub fn plan_materialization(
    component: &PathTree,
    mount_full_path: Option<&str>,
    max_depth: usize,
) -> SchemaResult<Vec<PlannedPath>> {
    let plan = component
        .descendants(None, max_depth)?
        .into_iter()
        .map(|visit| PlannedPath {
            source_path_id: visit.path.id,
            source_parent_id: visit.path.parent_id,
            full_path: join_path(mount_full_path, &visit.path.full_path),
            attributes: copied_attributes(visit.path),
            embedded_blueprint_id: visit.path.embedded_blueprint_id,
        })
        .collect();

    Ok(plan)
}

/// Build the ImmutableField error for a materialized path.
///
/// The error names the blueprint the copy chain originates from.
pub(crate) async fn immutable_field(
    conn: &mut SqliteConnection,
    path: &Path,
    max_depth: usize,
) -> SchemaResult<SchemaError> {
    let mut current = path.clone();
    let mut hops = 0;

    while let Some(source) = current.source_path_id {
        if hops >= max_depth {
            return Err(SchemaError::DepthLimit { limit: max_depth });
        }
        current = Path::get(conn, source).await?;
        hops += 1;
    }

    let origin = Blueprint::get(conn, current.blueprint_id).await?;
    Ok(SchemaError::ImmutableField {
        path: path.full_path.clone(),
        source_blueprint: origin.code,
    })
}

/// Embed `embedded` into `host` at `mount` and materialize its tree.
pub(crate) async fn attach(
    conn: &mut SqliteConnection,
    host_id: BlueprintId,
    embedded_id: BlueprintId,
    mount_id: Option<PathId>,
    max_depth: usize,
) -> SchemaResult<MaterializedEmbed> {
    let host = Blueprint::get(conn, host_id).await?;
    let embedded = Blueprint::get(conn, embedded_id).await?;

    let graph = EmbedGraph::from_embeds(&BlueprintEmbed::list_all(conn).await?);
    if graph.would_cycle(host.id, embedded.id, max_depth)? {
        return Err(SchemaError::CyclicDependency {
            host: host.code,
            embedded: embedded.code,
        });
    }

    if !embedded.is_component() {
        return Err(SchemaError::validation(
            "embedded_blueprint_id",
            format!("'{}' is not a component blueprint", embedded.code),
        ));
    }

    let mount = match mount_id {
        Some(id) => Some(check_mount(conn, &host, embedded.id, id, max_depth).await?),
        None => None,
    };

    if BlueprintEmbed::find_exact(conn, host.id, embedded.id, mount_id)
        .await?
        .is_some()
    {
        return Err(SchemaError::conflict(format!(
            "'{}' is already embedded into '{}' at this location",
            embedded.code, host.code
        )));
    }

    let component = PathTree::load(conn, embedded.id).await?;
    let host_tree = PathTree::load(conn, host.id).await?;
    let plan = plan_materialization(
        &component,
        mount.as_ref().map(|m| m.full_path.as_str()),
        max_depth,
    )?;

    for planned in &plan {
        check_depth(&planned.full_path, max_depth)?;
    }

    if let Some(clash) = plan.iter().find(|p| host_tree.contains_full_path(&p.full_path)) {
        return Err(SchemaError::conflict(format!(
            "path '{}' already exists in blueprint '{}'",
            clash.full_path, host.code
        )));
    }

    let embed = BlueprintEmbed::insert(conn, host.id, embedded.id, mount_id).await?;

    let mut created: Vec<Path> = Vec::with_capacity(plan.len());
    let mut copy_of: HashMap<PathId, PathId> = HashMap::with_capacity(plan.len());

    for planned in plan {
        let parent_id = match planned.source_parent_id {
            Some(source_parent) => Some(*copy_of.get(&source_parent).ok_or_else(|| {
                anyhow!("parent {source_parent} was not materialized before its child")
            })?),
            None => mount_id,
        };

        let copy = Path::insert(
            conn,
            &NewPath {
                blueprint_id: host.id,
                parent_id,
                full_path: planned.full_path,
                attributes: planned.attributes,
                embedded_blueprint_id: planned.embedded_blueprint_id,
                source_component_id: Some(embedded.id),
                source_path_id: Some(planned.source_path_id),
                embedded_root_path_id: mount_id,
                embed_id: Some(embed.id),
            },
        )
        .await?;

        copy_of.insert(planned.source_path_id, copy.id);
        created.push(copy);
    }

    let propagated = propagate(conn, created.clone(), max_depth).await?;

    info!(
        host = %host.code,
        embedded = %embedded.code,
        embed_id = %embed.id,
        paths = created.len(),
        propagated,
        "component embedded"
    );

    Ok(MaterializedEmbed {
        embed,
        paths: created,
        propagated,
    })
}

async fn check_mount(
    conn: &mut SqliteConnection,
    host: &Blueprint,
    embedded_id: BlueprintId,
    mount_id: PathId,
    max_depth: usize,
) -> SchemaResult<Path> {
    let mount = Path::find_by_id(conn, mount_id).await?.ok_or_else(|| {
        SchemaError::validation("mount_path_id", format!("path {mount_id} does not exist"))
    })?;

    if mount.blueprint_id != host.id {
        return Err(SchemaError::validation(
            "mount_path_id",
            format!("path '{}' does not belong to '{}'", mount.full_path, host.code),
        ));
    }
    if mount.is_materialized() {
        return Err(immutable_field(conn, &mount, max_depth).await?);
    }

    let accepts = match mount.data_type {
        DataType::Json => true,
        DataType::Blueprint => mount.embedded_blueprint_id == Some(embedded_id),
        _ => false,
    };
    if !accepts {
        return Err(SchemaError::validation(
            "mount_path_id",
            format!(
                "path '{}' of type {} cannot hold this component",
                mount.full_path, mount.data_type
            ),
        ));
    }

    Ok(mount)
}

/// Copy newly created paths into every blueprint that embeds their owner,
/// following the embed relation transitively.
///
/// `created` must be in pre-order. Returns the number of copies made.
pub(crate) async fn propagate(
    conn: &mut SqliteConnection,
    created: Vec<Path>,
    max_depth: usize,
) -> SchemaResult<usize> {
    let mut queue: VecDeque<(Path, usize)> = created.into_iter().map(|p| (p, 0)).collect();
    let mut hosts: HashMap<BlueprintId, Vec<BlueprintEmbed>> = HashMap::new();
    let mut copies = 0;

    while let Some((path, depth)) = queue.pop_front() {
        if !hosts.contains_key(&path.blueprint_id) {
            let embeds = BlueprintEmbed::list_for_embedded(conn, path.blueprint_id).await?;
            hosts.insert(path.blueprint_id, embeds);
        }
        let embeds = hosts.get(&path.blueprint_id).cloned().unwrap_or_default();
        if embeds.is_empty() {
            continue;
        }
        if depth >= max_depth {
            return Err(SchemaError::DepthLimit { limit: max_depth });
        }

        for embed in embeds {
            let parent = match path.parent_id {
                Some(parent) => Some(Path::find_copy(conn, parent, embed.id).await?.ok_or_else(
                    || anyhow!("path {parent} has no copy for embed {}", embed.id),
                )?),
                None => match embed.mount_path_id {
                    Some(mount) => Some(Path::get(conn, mount).await?),
                    None => None,
                },
            };

            let full_path = join_path(parent.as_ref().map(|p| p.full_path.as_str()), &path.name);
            check_depth(&full_path, max_depth)?;

            let copy = Path::insert(
                conn,
                &NewPath {
                    blueprint_id: embed.host_blueprint_id,
                    parent_id: parent.as_ref().map(|p| p.id),
                    full_path,
                    attributes: copied_attributes(&path),
                    embedded_blueprint_id: path.embedded_blueprint_id,
                    source_component_id: Some(path.blueprint_id),
                    source_path_id: Some(path.id),
                    embedded_root_path_id: embed.mount_path_id,
                    embed_id: Some(embed.id),
                },
            )
            .await?;

            debug!(
                source = %path.id,
                copy = %copy.id,
                host = %embed.host_blueprint_id,
                full_path = %copy.full_path,
                "propagated path"
            );
            copies += 1;
            queue.push_back((copy, depth + 1));
        }
    }

    Ok(copies)
}

/// Every downstream copy of the given paths, copies of copies included.
pub(crate) async fn copy_closure(
    conn: &mut SqliteConnection,
    roots: &[PathId],
    max_depth: usize,
) -> SchemaResult<Vec<PathId>> {
    let mut seen: HashSet<PathId> = roots.iter().copied().collect();
    let mut out = Vec::new();
    let mut queue: VecDeque<(PathId, usize)> = roots.iter().map(|&id| (id, 0)).collect();

    while let Some((id, depth)) = queue.pop_front() {
        let copies = Path::list_copies(conn, id).await?;
        if copies.is_empty() {
            continue;
        }
        if depth >= max_depth {
            return Err(SchemaError::DepthLimit { limit: max_depth });
        }
        for copy in copies {
            if seen.insert(copy.id) {
                out.push(copy.id);
                queue.push_back((copy.id, depth + 1));
            }
        }
    }

    Ok(out)
}

/// Delete paths together with their index rows.
pub(crate) async fn remove_paths(conn: &mut SqliteConnection, ids: &[PathId]) -> SchemaResult<u64> {
    doc_index::purge_paths(conn, ids).await?;
    Path::delete_many(conn, ids).await
}

/// Delete an embed, its materialized paths, and every downstream copy.
pub(crate) async fn detach(
    conn: &mut SqliteConnection,
    embed_id: EmbedId,
    max_depth: usize,
) -> SchemaResult<u64> {
    let embed = BlueprintEmbed::get(conn, embed_id).await?;

    let owned: Vec<PathId> = Path::list_by_embed(conn, embed.id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let mut doomed = owned.clone();
    doomed.extend(copy_closure(conn, &owned, max_depth).await?);

    let removed = remove_paths(conn, &doomed).await?;
    BlueprintEmbed::delete(conn, embed.id).await?;

    info!(
        embed_id = %embed.id,
        host = %embed.host_blueprint_id,
        embedded = %embed.embedded_blueprint_id,
        removed,
        "embed deleted"
    );

    Ok(removed)
}

/// Replay a source path's attributes onto every copy, transitively.
///
/// Returns the number of copies updated.
pub(crate) async fn synchronize_copies(
    conn: &mut SqliteConnection,
    source_id: PathId,
    max_depth: usize,
) -> SchemaResult<usize> {
    let source = Path::get(conn, source_id).await?;
    let mut queue = VecDeque::from([(source, 0usize)]);
    let mut updated = 0;

    while let Some((source, depth)) = queue.pop_front() {
        let copies = Path::list_copies(conn, source.id).await?;
        if copies.is_empty() {
            continue;
        }
        if depth >= max_depth {
            return Err(SchemaError::DepthLimit { limit: max_depth });
        }

        let attrs = copied_attributes(&source);
        for copy in copies {
            if copy.name != attrs.name {
                rename_subtree(conn, &copy, &attrs.name, max_depth).await?;
            }
            Path::update_attributes(conn, copy.id, &attrs).await?;

            if copy.data_type != attrs.data_type || (copy.is_indexed && !attrs.is_indexed) {
                doc_index::purge_paths(conn, &[copy.id]).await?;
            }

            debug!(source = %source.id, copy = %copy.id, "synchronized copy");
            updated += 1;
            queue.push_back((Path::get(conn, copy.id).await?, depth + 1));
        }
    }

    Ok(updated)
}

/// Service wrapper that runs engine operations in their own transactions.
#[derive(Clone)]
pub struct EmbeddingEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    pool: SqlitePool,
    max_depth: usize,
}

impl EmbeddingEngine {
    pub fn new(pool: SqlitePool, max_depth: usize) -> Self {
        Self {
            inner: Arc::new(EngineInner { pool, max_depth }),
        }
    }

    /// Embed a component into a host, optionally under a mount path.
    pub async fn create_embed(
        &self,
        host: BlueprintId,
        embedded: BlueprintId,
        mount: Option<PathId>,
    ) -> SchemaResult<MaterializedEmbed> {
        let mut tx = self.inner.pool.begin().await?;
        let result = attach(&mut tx, host, embedded, mount, self.inner.max_depth).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Delete an embed and every path it materialized. Returns paths removed.
    pub async fn delete_embed(&self, id: EmbedId) -> SchemaResult<u64> {
        let mut tx = self.inner.pool.begin().await?;
        let removed = detach(&mut tx, id, self.inner.max_depth).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Bring every copy of a source path back in line with it.
    pub async fn synchronize(&self, source: PathId) -> SchemaResult<usize> {
        let mut tx = self.inner.pool.begin().await?;
        let updated = synchronize_copies(&mut tx, source, self.inner.max_depth).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn get_embed(&self, id: EmbedId) -> SchemaResult<BlueprintEmbed> {
        let mut conn = self.inner.pool.acquire().await?;
        BlueprintEmbed::get(&mut conn, id).await
    }

    /// Embeds hosted by a blueprint.
    pub async fn list_embeds(&self, host: BlueprintId) -> SchemaResult<Vec<BlueprintEmbed>> {
        let mut conn = self.inner.pool.acquire().await?;
        BlueprintEmbed::list_for_host(&mut conn, host).await
    }
}
