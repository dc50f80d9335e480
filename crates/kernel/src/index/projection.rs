//! Projection of a document payload onto a blueprint's indexed paths.
//!
//! Pure function of the path arena and the payload; the indexer persists
//! what this produces.

use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{Path, PathId};
use crate::schema::{Cardinality, IndexedScalar, PathTree};

/// One indexed occurrence of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub path_id: PathId,

    /// 1-based occurrence when a multi-valued node is on the lineage.
    ///
    /// Counts the values reached at this leaf in document order. A null
    /// element of a multi-valued leaf keeps its slot, but elements of a
    /// multi-valued ancestor that lack the key are skipped, so sibling
    /// leaves of one array element do not share an index.
    pub array_index: Option<i64>,

    pub value: IndexedScalar,
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Project `data` onto every indexed path of `tree`.
pub fn project(tree: &PathTree, data: &Value, max_depth: usize) -> SchemaResult<Vec<IndexEntry>> {
    if !data.is_object() {
        return Err(SchemaError::indexing(
            "",
            format!("document payload must be an object, found {}", shape(data)),
        ));
    }

    let mut entries = Vec::new();
    for path in tree.indexed_paths() {
        let lineage = tree.lineage(path.id, max_depth)?;
        entries.extend(project_path(path, &lineage, data)?);
    }

    Ok(entries)
}

fn project_path(leaf: &Path, lineage: &[&Path], data: &Value) -> SchemaResult<Vec<IndexEntry>> {
    let fans_out = lineage.iter().any(|p| p.cardinality == Cardinality::Many);

    // `None` marks a null array element that still takes up a position.
    let mut items: Vec<Option<&Value>> = vec![Some(data)];

    for node in lineage {
        let mut next = Vec::new();

        for container in items.into_iter().flatten() {
            let object = match container {
                Value::Null => continue,
                Value::Object(map) => map,
                other => {
                    let at = node
                        .full_path
                        .rsplit_once('.')
                        .map_or(node.full_path.as_str(), |(parent, _)| parent);
                    return Err(SchemaError::indexing(
                        at,
                        format!("expected an object, found {}", shape(other)),
                    ));
                }
            };

            let child = match object.get(&node.name) {
                None | Some(Value::Null) => continue,
                Some(child) => child,
            };

            match (node.cardinality, child) {
                (Cardinality::Many, Value::Array(elements)) => {
                    next.extend(elements.iter().map(|e| (!e.is_null()).then_some(e)));
                }
                (Cardinality::Many, other) => {
                    return Err(SchemaError::indexing(
                        &node.full_path,
                        format!("expected an array, found {}", shape(other)),
                    ));
                }
                (Cardinality::One, Value::Array(_)) => {
                    return Err(SchemaError::indexing(
                        &node.full_path,
                        "expected a single value, found an array",
                    ));
                }
                (Cardinality::One, value) => next.push(Some(value)),
            }
        }

        items = next;
    }

    let mut entries = Vec::new();
    for (position, item) in items.into_iter().enumerate() {
        let Some(value) = item else {
            continue;
        };
        let scalar = leaf
            .data_type
            .coerce(value)
            .map_err(|message| SchemaError::indexing(&leaf.full_path, message))?;

        entries.push(IndexEntry {
            path_id: leaf.id,
            array_index: fans_out.then_some(position as i64 + 1),
            value: scalar,
        });
    }

    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::BlueprintId;
    use crate::schema::DataType;
    use serde_json::json;
    use uuid::Uuid;

    struct Node {
        id: i64,
        parent: Option<i64>,
        name: &'static str,
        full_path: &'static str,
        data_type: DataType,
        many: bool,
        indexed: bool,
    }

    fn tree(nodes: &[Node]) -> PathTree {
        PathTree::from_paths(
            nodes
                .iter()
                .map(|n| Path {
                    id: PathId(n.id),
                    blueprint_id: BlueprintId(1),
                    parent_id: n.parent.map(PathId),
                    name: n.name.to_string(),
                    full_path: n.full_path.to_string(),
                    data_type: n.data_type,
                    cardinality: if n.many {
                        Cardinality::Many
                    } else {
                        Cardinality::One
                    },
                    is_indexed: n.indexed,
                    is_required: false,
                    validation_rules: json!({}),
                    sort_order: 0,
                    embedded_blueprint_id: None,
                    source_component_id: None,
                    source_path_id: None,
                    embedded_root_path_id: None,
                    embed_id: None,
                })
                .collect(),
        )
    }

    fn leaf(id: i64, name: &'static str, data_type: DataType) -> Node {
        Node {
            id,
            parent: None,
            name,
            full_path: name,
            data_type,
            many: false,
            indexed: true,
        }
    }

    #[test]
    fn scalar_leaf_has_no_array_index() {
        let t = tree(&[leaf(1, "city", DataType::String)]);
        let entries = project(&t, &json!({"city": "Riga"}), 32).unwrap();
        assert_eq!(
            entries,
            vec![IndexEntry {
                path_id: PathId(1),
                array_index: None,
                value: IndexedScalar::String("Riga".into()),
            }]
        );
    }

    #[test]
    fn many_leaf_indexes_each_element_in_order() {
        let t = tree(&[Node {
            many: true,
            ..leaf(1, "tags", DataType::String)
        }]);
        let entries = project(&t, &json!({"tags": ["a", "b", "c"]}), 32).unwrap();
        let indexes: Vec<_> = entries.iter().map(|e| e.array_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(entries[2].value, IndexedScalar::String("c".into()));
    }

    #[test]
    fn null_elements_keep_their_position() {
        let t = tree(&[Node {
            many: true,
            ..leaf(1, "scores", DataType::Int)
        }]);
        let entries = project(&t, &json!({"scores": [1, null, 3]}), 32).unwrap();
        let indexes: Vec<_> = entries.iter().map(|e| e.array_index).collect();
        assert_eq!(indexes, vec![Some(1), Some(3)]);
    }

    #[test]
    fn missing_and_null_values_produce_nothing() {
        let t = tree(&[leaf(1, "city", DataType::String), leaf(2, "zip", DataType::String)]);
        let entries = project(&t, &json!({"zip": null}), 32).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn many_ancestor_fans_out_nested_leaves() {
        let t = tree(&[
            Node {
                many: true,
                indexed: false,
                ..leaf(1, "addresses", DataType::Json)
            },
            Node {
                parent: Some(1),
                full_path: "addresses.city",
                ..leaf(2, "city", DataType::String)
            },
        ]);
        let data = json!({"addresses": [{"city": "Riga"}, {"zip": "x"}, {"city": "Oslo"}]});
        let entries = project(&t, &data, 32).unwrap();
        let got: Vec<_> = entries
            .iter()
            .map(|e| (e.array_index, e.value.clone()))
            .collect();
        assert_eq!(
            got,
            vec![
                (Some(1), IndexedScalar::String("Riga".into())),
                (Some(2), IndexedScalar::String("Oslo".into())),
            ]
        );
    }

    #[test]
    fn sibling_leaves_count_their_own_occurrences() {
        let t = tree(&[
            Node {
                many: true,
                indexed: false,
                ..leaf(1, "addresses", DataType::Json)
            },
            Node {
                parent: Some(1),
                full_path: "addresses.city",
                ..leaf(2, "city", DataType::String)
            },
            Node {
                parent: Some(1),
                full_path: "addresses.zip",
                ..leaf(3, "zip", DataType::String)
            },
        ]);
        let data = json!({"addresses": [{"city": "Riga"}, {"city": "Oslo", "zip": "0150"}]});
        let entries = project(&t, &data, 32).unwrap();
        let at = |id: i64| -> Vec<_> {
            entries
                .iter()
                .filter(|e| e.path_id == PathId(id))
                .map(|e| e.array_index)
                .collect()
        };
        assert_eq!(at(2), vec![Some(1), Some(2)]);
        assert_eq!(at(3), vec![Some(1)]);
    }

    #[test]
    fn many_node_rejects_scalar() {
        let t = tree(&[Node {
            many: true,
            ..leaf(1, "tags", DataType::String)
        }]);
        let err = project(&t, &json!({"tags": "solo"}), 32).unwrap_err();
        assert!(matches!(err, SchemaError::Indexing { ref path, .. } if path == "tags"));
    }

    #[test]
    fn one_node_rejects_array() {
        let t = tree(&[leaf(1, "city", DataType::String)]);
        let err = project(&t, &json!({"city": ["Riga"]}), 32).unwrap_err();
        assert!(err.to_string().contains("found an array"));
    }

    #[test]
    fn intermediate_scalar_is_rejected() {
        let t = tree(&[
            Node {
                indexed: false,
                ..leaf(1, "address", DataType::Json)
            },
            Node {
                parent: Some(1),
                full_path: "address.city",
                ..leaf(2, "city", DataType::String)
            },
        ]);
        let err = project(&t, &json!({"address": "Riga"}), 32).unwrap_err();
        assert!(matches!(err, SchemaError::Indexing { ref path, .. } if path == "address"));
    }

    #[test]
    fn type_mismatch_names_the_path() {
        let t = tree(&[leaf(1, "age", DataType::Int)]);
        let err = project(&t, &json!({"age": "old"}), 32).unwrap_err();
        assert_eq!(err.to_string(), "cannot index 'age': expected an integer, found a string");
    }

    #[test]
    fn refs_coerce_to_uuid() {
        let target = Uuid::now_v7();
        let t = tree(&[leaf(1, "author", DataType::Ref)]);
        let entries = project(&t, &json!({"author": target.to_string()}), 32).unwrap();
        assert_eq!(entries[0].value, IndexedScalar::Ref(target));
    }

    #[test]
    fn unindexed_paths_are_skipped() {
        let t = tree(&[Node {
            indexed: false,
            ..leaf(1, "city", DataType::String)
        }]);
        assert!(project(&t, &json!({"city": "Riga"}), 32).unwrap().is_empty());
    }

    #[test]
    fn payload_must_be_an_object() {
        let t = tree(&[leaf(1, "city", DataType::String)]);
        assert!(project(&t, &json!(["Riga"]), 32).is_err());
    }
}
