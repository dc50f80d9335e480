//! In-memory arena over one blueprint's path rows.
//!
//! Nodes are addressed by [`PathId`]; parent and child links are index
//! lookups, so traversals never chase live pointers. Every traversal is
//! bounded by a maximum depth and fails instead of looping on a corrupted
//! parent chain.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use sqlx::SqliteConnection;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{BlueprintId, Path, PathId};

static PATH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("path name pattern is valid")
});

const MAX_NAME_LEN: usize = 64;

/// Validate a path name against the identifier pattern.
pub fn validate_name(name: &str) -> SchemaResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(SchemaError::validation(
            "name",
            format!("must be between 1 and {MAX_NAME_LEN} characters"),
        ));
    }
    if !PATH_NAME.is_match(name) {
        return Err(SchemaError::validation(
            "name",
            format!("'{name}' must start with a letter or underscore and contain only letters, digits, and underscores"),
        ));
    }
    Ok(())
}

/// Join a parent's full path and a child name.
pub fn join_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{name}"),
        _ => name.to_string(),
    }
}

/// Replace the `old_root` prefix of `full_path` with `new_root`.
pub fn rebase(full_path: &str, old_root: &str, new_root: &str) -> String {
    match full_path.strip_prefix(old_root) {
        Some(rest) => format!("{new_root}{rest}"),
        None => full_path.to_string(),
    }
}

/// Nesting depth of a full path; a root-level path has depth 1.
pub fn path_depth(full_path: &str) -> usize {
    full_path.split('.').count()
}

/// Fail when a path at `full_path` would sit deeper than traversals reach.
pub fn check_depth(full_path: &str, max_depth: usize) -> SchemaResult<()> {
    if path_depth(full_path) > max_depth {
        return Err(SchemaError::DepthLimit { limit: max_depth });
    }
    Ok(())
}

/// A node visited by a pre-order traversal, with its depth below the start.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub path: &'a Path,
    pub depth: usize,
}

/// Arena of a blueprint's paths.
#[derive(Debug, Clone, Default)]
pub struct PathTree {
    nodes: Vec<Path>,
    by_id: HashMap<PathId, usize>,
    by_full_path: HashMap<String, usize>,
    children: HashMap<Option<PathId>, Vec<usize>>,
}

impl PathTree {
    /// Build an arena from rows; siblings keep `(sort_order, id)` order.
    pub fn from_paths(mut paths: Vec<Path>) -> Self {
        paths.sort_by_key(|p| (p.sort_order, p.id));

        let mut tree = Self {
            by_id: HashMap::with_capacity(paths.len()),
            by_full_path: HashMap::with_capacity(paths.len()),
            ..Default::default()
        };

        for (idx, path) in paths.iter().enumerate() {
            tree.by_id.insert(path.id, idx);
            tree.by_full_path.insert(path.full_path.clone(), idx);
            tree.children.entry(path.parent_id).or_default().push(idx);
        }
        tree.nodes = paths;
        tree
    }

    /// Load the arena for a blueprint.
    pub async fn load(conn: &mut SqliteConnection, blueprint_id: BlueprintId) -> SchemaResult<Self> {
        let paths = Path::list_for_blueprint(conn, blueprint_id).await?;
        Ok(Self::from_paths(paths))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: PathId) -> Option<&Path> {
        self.by_id.get(&id).map(|&idx| &self.nodes[idx])
    }

    pub fn by_full_path(&self, full_path: &str) -> Option<&Path> {
        self.by_full_path.get(full_path).map(|&idx| &self.nodes[idx])
    }

    pub fn contains_full_path(&self, full_path: &str) -> bool {
        self.by_full_path.contains_key(full_path)
    }

    /// All nodes in sibling order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.nodes.iter()
    }

    /// Direct children of a node (`None` = blueprint root).
    pub fn children(&self, parent: Option<PathId>) -> impl Iterator<Item = &Path> {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .map(|&idx| &self.nodes[idx])
    }

    pub fn has_children(&self, id: PathId) -> bool {
        self.children.get(&Some(id)).is_some_and(|c| !c.is_empty())
    }

    /// Pre-order traversal of the subtree under `start` (excluding `start`).
    ///
    /// `start = None` walks the whole tree. Depth 1 is a direct child.
    pub fn descendants(&self, start: Option<PathId>, max_depth: usize) -> SchemaResult<Vec<Visit<'_>>> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, usize)> = self
            .children
            .get(&start)
            .into_iter()
            .flatten()
            .rev()
            .map(|&idx| (idx, 1))
            .collect();

        while let Some((idx, depth)) = stack.pop() {
            if depth > max_depth {
                return Err(SchemaError::DepthLimit { limit: max_depth });
            }
            let path = &self.nodes[idx];
            out.push(Visit { path, depth });

            if let Some(kids) = self.children.get(&Some(path.id)) {
                stack.extend(kids.iter().rev().map(|&k| (k, depth + 1)));
            }
        }

        Ok(out)
    }

    /// The node itself followed by its descendants, in pre-order.
    pub fn subtree(&self, root: PathId, max_depth: usize) -> SchemaResult<Vec<&Path>> {
        let Some(root_path) = self.get(root) else {
            return Ok(Vec::new());
        };
        let mut out = vec![root_path];
        out.extend(self.descendants(Some(root), max_depth)?.into_iter().map(|v| v.path));
        Ok(out)
    }

    /// Root-to-node chain of a path, the node included.
    pub fn lineage(&self, id: PathId, max_depth: usize) -> SchemaResult<Vec<&Path>> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id);

        while let Some(path) = cursor {
            if chain.len() >= max_depth {
                return Err(SchemaError::DepthLimit { limit: max_depth });
            }
            chain.push(path);
            cursor = path.parent_id.and_then(|parent| self.get(parent));
        }

        chain.reverse();
        Ok(chain)
    }

    /// Paths with `is_indexed` set on an indexable type.
    pub fn indexed_paths(&self) -> impl Iterator<Item = &Path> {
        self.nodes
            .iter()
            .filter(|p| p.is_indexed && p.data_type.is_indexable())
    }
}
