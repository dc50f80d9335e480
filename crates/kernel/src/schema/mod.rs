//! Blueprint schema composition.
//!
//! Blueprints own a tree of paths. Components can be embedded into other
//! blueprints, which copies their tree into the host; the copies stay in
//! sync with the component and are read-only in the host.

pub mod blueprints;
pub mod data_type;
pub mod embed;
pub mod graph;
pub mod paths;
pub mod tree;

pub use blueprints::{BlueprintGraphManager, DeleteCheck, DependencyGraph};
pub use data_type::{Cardinality, DataType, IndexSlot, IndexedScalar};
pub use embed::{EmbeddingEngine, MaterializedEmbed, PlannedPath};
pub use graph::EmbedGraph;
pub use paths::PathTreeManager;
pub use tree::PathTree;
