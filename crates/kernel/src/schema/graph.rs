//! Blueprint dependency graph built from embed rows.
//!
//! An edge `host -> embedded` means `host` depends on `embedded`. The graph
//! is rebuilt from storage for every check; it is never cached across
//! transactions.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{SchemaError, SchemaResult};
use crate::models::{BlueprintEmbed, BlueprintId};

/// Adjacency view over the embed relation.
#[derive(Debug, Clone, Default)]
pub struct EmbedGraph {
    forward: HashMap<BlueprintId, BTreeSet<BlueprintId>>,
    reverse: HashMap<BlueprintId, BTreeSet<BlueprintId>>,
}

impl EmbedGraph {
    pub fn from_embeds<'a>(embeds: impl IntoIterator<Item = &'a BlueprintEmbed>) -> Self {
        let mut graph = Self::default();
        for embed in embeds {
            graph.add_edge(embed.host_blueprint_id, embed.embedded_blueprint_id);
        }
        graph
    }

    pub fn add_edge(&mut self, host: BlueprintId, embedded: BlueprintId) {
        self.forward.entry(host).or_default().insert(embedded);
        self.reverse.entry(embedded).or_default().insert(host);
    }

    /// Blueprints directly embedded into `id`.
    pub fn depends_on(&self, id: BlueprintId) -> Vec<BlueprintId> {
        self.forward
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Blueprints that directly embed `id`.
    pub fn depended_by(&self, id: BlueprintId) -> Vec<BlueprintId> {
        self.reverse
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `target` is reachable from `from` over depends-on edges.
    ///
    /// A blueprint trivially reaches itself. Fails with `DepthLimit` when the
    /// BFS frontier goes deeper than `max_depth`.
    pub fn reaches(&self, from: BlueprintId, target: BlueprintId, max_depth: usize) -> SchemaResult<bool> {
        if from == target {
            return Ok(true);
        }

        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([(from, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            for &next in self.forward.get(&current).into_iter().flatten() {
                if next == target {
                    return Ok(true);
                }
                if seen.insert(next) {
                    if depth + 1 > max_depth {
                        return Err(SchemaError::DepthLimit { limit: max_depth });
                    }
                    queue.push_back((next, depth + 1));
                }
            }
        }

        Ok(false)
    }

    /// Whether adding `host -> embedded` would close a cycle.
    pub fn would_cycle(&self, host: BlueprintId, embedded: BlueprintId, max_depth: usize) -> SchemaResult<bool> {
        self.reaches(embedded, host, max_depth)
    }

    /// Every blueprint that transitively embeds `id`, nearest first.
    pub fn transitive_hosts(&self, id: BlueprintId, max_depth: usize) -> SchemaResult<Vec<BlueprintId>> {
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        let mut queue = VecDeque::from([(id, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            for &host in self.reverse.get(&current).into_iter().flatten() {
                if seen.insert(host) {
                    if depth + 1 > max_depth {
                        return Err(SchemaError::DepthLimit { limit: max_depth });
                    }
                    out.push(host);
                    queue.push_back((host, depth + 1));
                }
            }
        }

        Ok(out)
    }
}
