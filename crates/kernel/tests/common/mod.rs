//! Common test utilities for integration tests.
//!
//! Every test gets its own kernel over a private in-memory database, so
//! tests never see each other's blueprints.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use blueprint_kernel::index::{Document, DocumentEvent};
use blueprint_kernel::models::{Blueprint, BlueprintId, CreateBlueprint, CreatePath, Path};
use blueprint_kernel::schema::DataType;
use blueprint_kernel::{Config, Kernel};
use blueprint_test_utils::TestDocument;
use uuid::Uuid;

/// Spin up a migrated kernel on a fresh in-memory database.
pub async fn test_kernel() -> Kernel {
    Kernel::new(&Config::in_memory())
        .await
        .expect("failed to create in-memory kernel")
}

/// A fresh kernel whose trees and embed chains stop at `max_depth`.
pub async fn test_kernel_with_depth(max_depth: usize) -> Kernel {
    let config = Config {
        max_depth,
        ..Config::in_memory()
    };
    Kernel::new(&config)
        .await
        .expect("failed to create in-memory kernel")
}

pub async fn component(kernel: &Kernel, code: &str) -> Blueprint {
    kernel
        .blueprints()
        .create_blueprint(CreateBlueprint::component(code))
        .await
        .expect("failed to create component")
}

pub async fn full(kernel: &Kernel, code: &str) -> Blueprint {
    kernel
        .blueprints()
        .create_blueprint(CreateBlueprint::full(code))
        .await
        .expect("failed to create full blueprint")
}

/// Create a json path under `parent`, or at the root.
pub async fn json_path(
    kernel: &Kernel,
    blueprint: BlueprintId,
    name: &str,
    parent: Option<&Path>,
) -> Path {
    let mut input = CreatePath::new(blueprint, name, DataType::Json);
    if let Some(parent) = parent {
        input = input.under(parent.id);
    }
    kernel
        .paths()
        .create_path(input)
        .await
        .expect("failed to create json path")
}

/// Create a root-level path.
pub async fn root_path(
    kernel: &Kernel,
    blueprint: BlueprintId,
    name: &str,
    data_type: DataType,
) -> Path {
    kernel
        .paths()
        .create_path(CreatePath::new(blueprint, name, data_type))
        .await
        .expect("failed to create path")
}

/// Create an indexed root-level path.
pub async fn indexed_path(
    kernel: &Kernel,
    blueprint: BlueprintId,
    name: &str,
    data_type: DataType,
) -> Path {
    kernel
        .paths()
        .create_path(CreatePath::new(blueprint, name, data_type).indexed())
        .await
        .expect("failed to create indexed path")
}

/// The `address` component: indexed `city` plus an unindexed `zip`.
pub async fn address_component(kernel: &Kernel) -> Blueprint {
    let address = component(kernel, "address").await;
    indexed_path(kernel, address.id, "city", DataType::String).await;
    root_path(kernel, address.id, "zip", DataType::String).await;
    address
}

/// Full paths of a blueprint's tree, sorted.
pub async fn full_paths(kernel: &Kernel, blueprint: BlueprintId) -> Vec<String> {
    let mut paths: Vec<String> = kernel
        .paths()
        .list_paths(blueprint)
        .await
        .expect("failed to list paths")
        .into_iter()
        .map(|p| p.full_path)
        .collect();
    paths.sort();
    paths
}

/// Look up a path by full path, panicking when it is absent.
pub async fn path_at(kernel: &Kernel, blueprint: BlueprintId, full_path: &str) -> Path {
    kernel
        .paths()
        .list_paths(blueprint)
        .await
        .expect("failed to list paths")
        .into_iter()
        .find(|p| p.full_path == full_path)
        .unwrap_or_else(|| panic!("no path '{full_path}' in blueprint {blueprint}"))
}

/// Index a test document against a blueprint and return its id.
pub async fn index(kernel: &Kernel, blueprint: BlueprintId, doc: TestDocument) -> Uuid {
    kernel
        .indexer()
        .reindex(DocumentEvent::Created(Document {
            id: doc.id,
            blueprint_id: blueprint,
            data: doc.data,
        }))
        .await
        .expect("failed to index document");
    doc.id
}
