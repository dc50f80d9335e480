//! Integration tests for embedding, materialization, and copy synchronization.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use blueprint_kernel::SchemaError;
use blueprint_kernel::models::{CreatePath, UpdatePath};
use blueprint_kernel::schema::DataType;
use blueprint_test_utils::{assert, test_document};

use common::{
    address_component, component, full, full_paths, index, json_path, path_at, root_path, test_kernel,
    test_kernel_with_depth,
};

#[tokio::test]
async fn root_embed_materializes_component_paths() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;

    let result = kernel
        .embeds()
        .create_embed(person.id, address.id, None)
        .await
        .unwrap();

    assert_eq!(result.paths.len(), 2);
    assert_eq!(result.propagated, 0);
    assert_eq!(full_paths(&kernel, person.id).await, vec!["city", "zip"]);

    let city = path_at(&kernel, person.id, "city").await;
    let source = path_at(&kernel, address.id, "city").await;
    assert!(city.is_materialized());
    assert!(city.is_indexed);
    assert_eq!(city.source_path_id, Some(source.id));
    assert_eq!(city.source_component_id, Some(address.id));
    assert_eq!(city.embed_id, Some(result.embed.id));
    assert_eq!(city.embedded_root_path_id, None);
}

#[tokio::test]
async fn materialized_count_matches_component_tree() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let geo = root_path(&kernel, address.id, "geo", DataType::Json).await;
    kernel
        .paths()
        .create_path(CreatePath::new(address.id, "lat", DataType::Float).under(geo.id))
        .await
        .unwrap();
    let component_paths = kernel.paths().list_paths(address.id).await.unwrap().len();

    let person = full(&kernel, "person").await;
    let contact = root_path(&kernel, person.id, "contact", DataType::Json).await;
    let result = kernel
        .embeds()
        .create_embed(person.id, address.id, Some(contact.id))
        .await
        .unwrap();

    assert_eq!(result.paths.len(), component_paths);
    let owned = kernel
        .paths()
        .list_paths(person.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.embed_id == Some(result.embed.id))
        .count();
    assert_eq!(owned, component_paths);

    let lat = path_at(&kernel, person.id, "contact.geo.lat").await;
    assert_eq!(lat.embedded_root_path_id, Some(contact.id));
    let geo_copy = path_at(&kernel, person.id, "contact.geo").await;
    assert_eq!(lat.parent_id, Some(geo_copy.id));
}

#[tokio::test]
async fn blueprint_path_embeds_under_itself() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;

    let home = kernel
        .paths()
        .create_path(CreatePath::new(person.id, "home", DataType::Blueprint).embedding(address.id))
        .await
        .unwrap();

    assert_eq!(
        full_paths(&kernel, person.id).await,
        vec!["home", "home.city", "home.zip"]
    );
    let embeds = kernel.embeds().list_embeds(person.id).await.unwrap();
    assert_eq!(embeds.len(), 1);
    assert_eq!(embeds[0].mount_path_id, Some(home.id));
    assert_eq!(embeds[0].embedded_blueprint_id, address.id);
}

#[tokio::test]
async fn embedding_creates_no_cycles() {
    let kernel = test_kernel().await;
    let a = component(&kernel, "a").await;
    let b = component(&kernel, "b").await;
    let c = component(&kernel, "c").await;

    kernel.embeds().create_embed(a.id, b.id, None).await.unwrap();
    kernel.embeds().create_embed(b.id, c.id, None).await.unwrap();

    let err = kernel.embeds().create_embed(b.id, a.id, None).await.unwrap_err();
    match err {
        SchemaError::CyclicDependency { host, embedded } => {
            assert_eq!(host, "b");
            assert_eq!(embedded, "a");
        }
        other => panic!("expected cyclic dependency, got {other:?}"),
    }

    let err = kernel.embeds().create_embed(c.id, a.id, None).await.unwrap_err();
    assert!(matches!(err, SchemaError::CyclicDependency { .. }));

    let err = kernel.embeds().create_embed(a.id, a.id, None).await.unwrap_err();
    assert!(matches!(err, SchemaError::CyclicDependency { .. }));
}

#[tokio::test]
async fn only_components_can_be_embedded() {
    let kernel = test_kernel().await;
    let person = full(&kernel, "person").await;
    let company = full(&kernel, "company").await;

    let err = kernel
        .embeds()
        .create_embed(company.id, person.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::Validation { .. }), "got {err:?}");
}

#[tokio::test]
async fn colliding_paths_conflict() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;
    root_path(&kernel, person.id, "city", DataType::String).await;

    let err = kernel
        .embeds()
        .create_embed(person.id, address.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::Conflict(_)), "got {err:?}");

    // Nothing was materialized.
    assert_eq!(full_paths(&kernel, person.id).await, vec!["city"]);
    assert!(kernel.embeds().list_embeds(person.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_embed_conflicts() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;
    kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();

    let err = kernel
        .embeds()
        .create_embed(person.id, address.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::Conflict(_)));
}

#[tokio::test]
async fn copies_are_immutable() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;
    kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();
    let city = path_at(&kernel, person.id, "city").await;

    let err = kernel
        .paths()
        .update_path(
            city.id,
            UpdatePath {
                is_required: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    match err {
        SchemaError::ImmutableField { path, source_blueprint } => {
            assert_eq!(path, "city");
            assert_eq!(source_blueprint, "address");
        }
        other => panic!("expected immutable field error, got {other:?}"),
    }

    let err = kernel.paths().delete_path(city.id).await.unwrap_err();
    assert!(matches!(err, SchemaError::ImmutableField { .. }));
}

#[tokio::test]
async fn source_edits_reach_every_copy() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;
    let company = full(&kernel, "company").await;
    kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();
    let office = root_path(&kernel, company.id, "office", DataType::Json).await;
    kernel
        .embeds()
        .create_embed(company.id, address.id, Some(office.id))
        .await
        .unwrap();

    let city = path_at(&kernel, address.id, "city").await;
    kernel
        .paths()
        .update_path(
            city.id,
            UpdatePath {
                name: Some("town".to_string()),
                data_type: Some(DataType::Text),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let person_town = path_at(&kernel, person.id, "town").await;
    assert_eq!(person_town.data_type, DataType::Text);
    assert_eq!(person_town.source_path_id, Some(city.id));

    let company_town = path_at(&kernel, company.id, "office.town").await;
    assert_eq!(company_town.data_type, DataType::Text);
    assert!(company_town.is_indexed);

    // Already in step.
    assert_eq!(kernel.embeds().synchronize(city.id).await.unwrap(), 2);
}

#[tokio::test]
async fn new_component_paths_propagate_transitively() {
    let kernel = test_kernel().await;
    let geo = component(&kernel, "geo").await;
    root_path(&kernel, geo.id, "lat", DataType::Float).await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;

    kernel.embeds().create_embed(address.id, geo.id, None).await.unwrap();
    let result = kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();
    assert_eq!(result.paths.len(), 3);

    root_path(&kernel, geo.id, "lng", DataType::Float).await;

    assert_eq!(full_paths(&kernel, address.id).await, vec!["city", "lat", "lng", "zip"]);
    assert_eq!(full_paths(&kernel, person.id).await, vec!["city", "lat", "lng", "zip"]);

    let lng = path_at(&kernel, person.id, "lng").await;
    let address_lng = path_at(&kernel, address.id, "lng").await;
    assert_eq!(lng.source_path_id, Some(address_lng.id));
    assert_eq!(lng.embed_id, Some(result.embed.id));

    // Copies of copies still name the origin blueprint.
    let err = kernel
        .paths()
        .update_path(
            lng.id,
            UpdatePath {
                sort_order: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, SchemaError::ImmutableField { ref source_blueprint, .. } if source_blueprint == "geo")
    );
}

#[tokio::test]
async fn deleting_a_source_path_deletes_its_copies() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;
    kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();

    let zip = path_at(&kernel, address.id, "zip").await;
    let removed = kernel.paths().delete_path(zip.id).await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(full_paths(&kernel, person.id).await, vec!["city"]);
}

#[tokio::test]
async fn delete_embed_removes_everything_it_materialized() {
    let kernel = test_kernel().await;
    let geo = component(&kernel, "geo").await;
    root_path(&kernel, geo.id, "lat", DataType::Float).await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;

    let geo_embed = kernel.embeds().create_embed(address.id, geo.id, None).await.unwrap();
    let address_embed = kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();

    let removed = kernel.embeds().delete_embed(geo_embed.embed.id).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(full_paths(&kernel, address.id).await, vec!["city", "zip"]);
    assert_eq!(full_paths(&kernel, person.id).await, vec!["city", "zip"]);

    let removed = kernel.embeds().delete_embed(address_embed.embed.id).await.unwrap();
    assert_eq!(removed, 2);
    let leftovers = kernel
        .paths()
        .list_paths(person.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.embed_id == Some(address_embed.embed.id))
        .count();
    assert_eq!(leftovers, 0);
    assert!(matches!(
        kernel.embeds().get_embed(address_embed.embed.id).await,
        Err(SchemaError::NotFound { .. })
    ));
}

#[tokio::test]
async fn mount_points_cannot_be_deleted_directly() {
    let kernel = test_kernel().await;
    let address = address_component(&kernel).await;
    let person = full(&kernel, "person").await;
    let home = kernel
        .paths()
        .create_path(CreatePath::new(person.id, "home", DataType::Blueprint).embedding(address.id))
        .await
        .unwrap();

    let err = kernel.paths().delete_path(home.id).await.unwrap_err();
    assert!(matches!(err, SchemaError::Validation { .. }), "got {err:?}");

    let embed = kernel.embeds().list_embeds(person.id).await.unwrap().remove(0);
    kernel.embeds().delete_embed(embed.id).await.unwrap();
    assert_eq!(full_paths(&kernel, person.id).await, vec!["home"]);
    assert_eq!(kernel.paths().delete_path(home.id).await.unwrap(), 1);
}

#[tokio::test]
async fn dependency_graph_and_embeddable_candidates() {
    let kernel = test_kernel().await;
    let geo = component(&kernel, "geo").await;
    let address = component(&kernel, "address").await;
    component(&kernel, "tags").await;
    let person = full(&kernel, "person").await;

    kernel.embeds().create_embed(address.id, geo.id, None).await.unwrap();
    kernel.embeds().create_embed(person.id, address.id, None).await.unwrap();

    let graph = kernel.blueprints().dependency_graph(address.id).await.unwrap();
    assert_eq!(graph.depends_on, vec![geo.id]);
    assert_eq!(graph.depended_by, vec![person.id]);

    let codes = |list: Vec<blueprint_kernel::models::Blueprint>| -> Vec<String> {
        list.into_iter().map(|b| b.code).collect()
    };

    let for_geo = kernel.blueprints().embeddable_blueprints_for(geo.id).await.unwrap();
    assert_eq!(codes(for_geo), vec!["tags".to_string()]);

    let for_person = kernel.blueprints().embeddable_blueprints_for(person.id).await.unwrap();
    assert::same_items(
        &codes(for_person),
        &["address".to_string(), "geo".to_string(), "tags".to_string()],
    );
}

#[tokio::test]
async fn embed_deeper_than_the_limit_is_refused() {
    let kernel = test_kernel_with_depth(3).await;
    let deep = component(&kernel, "deep").await;
    let a = json_path(&kernel, deep.id, "a", None).await;
    let b = json_path(&kernel, deep.id, "b", Some(&a)).await;
    kernel
        .paths()
        .create_path(CreatePath::new(deep.id, "leaf", DataType::String).under(b.id).indexed())
        .await
        .unwrap();

    let host = full(&kernel, "host").await;
    let m1 = json_path(&kernel, host.id, "m1", None).await;
    let m2 = json_path(&kernel, host.id, "m2", Some(&m1)).await;

    let err = kernel
        .embeds()
        .create_embed(host.id, deep.id, Some(m2.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::DepthLimit { limit: 3 }), "got {err:?}");

    // Nothing was written, so the host stays usable.
    assert!(kernel.embeds().list_embeds(host.id).await.unwrap().is_empty());
    assert_eq!(full_paths(&kernel, host.id).await, vec!["m1", "m1.m2"]);
    index(&kernel, host.id, test_document()).await;
    assert_eq!(kernel.paths().delete_path(m1.id).await.unwrap(), 2);
}

#[tokio::test]
async fn propagation_deeper_than_the_limit_rolls_back() {
    let kernel = test_kernel_with_depth(3).await;
    let inner = component(&kernel, "inner").await;
    let x = json_path(&kernel, inner.id, "x", None).await;
    root_path(&kernel, inner.id, "top", DataType::String).await;
    kernel
        .paths()
        .create_path(CreatePath::new(inner.id, "y", DataType::String).under(x.id))
        .await
        .unwrap();

    let outer = component(&kernel, "outer").await;
    let m = json_path(&kernel, outer.id, "m", None).await;

    let host = full(&kernel, "host").await;
    let h1 = json_path(&kernel, host.id, "h1", None).await;
    kernel.embeds().create_embed(host.id, outer.id, Some(h1.id)).await.unwrap();

    // `outer` would hold m.x.y, but its copy in `host` would be h1.m.x.y.
    let err = kernel
        .embeds()
        .create_embed(outer.id, inner.id, Some(m.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::DepthLimit { limit: 3 }), "got {err:?}");
    assert_eq!(full_paths(&kernel, outer.id).await, vec!["m"]);
    assert_eq!(full_paths(&kernel, host.id).await, vec!["h1", "h1.m"]);

    // The same bound applies to paths added to the component later.
    let z = json_path(&kernel, outer.id, "z", Some(&m)).await;
    assert_eq!(full_paths(&kernel, host.id).await, vec!["h1", "h1.m", "h1.m.z"]);

    let err = kernel
        .paths()
        .create_path(CreatePath::new(outer.id, "w", DataType::String).under(z.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SchemaError::DepthLimit { limit: 3 }), "got {err:?}");
    assert_eq!(full_paths(&kernel, outer.id).await, vec!["m", "m.z"]);
}
