//! Blueprint test utilities.
//!
//! Helpers for integration testing: document payload builders and
//! assertion utilities for schema and index tests.

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Create a test document payload with a fresh ID.
pub fn test_document() -> TestDocument {
    TestDocument {
        id: Uuid::now_v7(),
        data: JsonValue::Object(Map::new()),
    }
}

/// A document payload builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestDocument {
    pub id: Uuid,
    pub data: JsonValue,
}

impl TestDocument {
    /// Set a custom ID.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Replace the whole payload.
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    /// Set a value at a dot-separated path, creating objects along the way.
    ///
    /// Intermediate values that are not objects are replaced.
    pub fn with_path(mut self, full_path: &str, value: JsonValue) -> Self {
        let segments: Vec<&str> = full_path.split('.').collect();
        insert_at(&mut self.data, &segments, value);
        self
    }

    /// Set a string value.
    pub fn with_str(self, full_path: &str, value: &str) -> Self {
        self.with_path(full_path, JsonValue::String(value.to_string()))
    }

    /// Set a list value.
    pub fn with_list<T: Into<JsonValue>>(self, full_path: &str, values: Vec<T>) -> Self {
        self.with_path(
            full_path,
            JsonValue::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Point a reference field at another document.
    pub fn with_ref(self, full_path: &str, target: Uuid) -> Self {
        self.with_path(full_path, JsonValue::String(target.to_string()))
    }
}

fn insert_at(target: &mut JsonValue, segments: &[&str], value: JsonValue) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = target {
        let slot = map.entry(first.to_string()).or_insert(JsonValue::Null);
        insert_at(slot, rest, value);
    }
}

/// Assertion helpers.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that two collections hold the same items, ignoring order.
    pub fn same_items<T: Ord + Clone + std::fmt::Debug>(actual: &[T], expected: &[T]) {
        let mut actual = actual.to_vec();
        let mut expected = expected.to_vec();
        actual.sort();
        expected.sort();
        assert_eq!(actual, expected, "collections differ (order ignored)");
    }

    /// Assert that a list of names has no duplicates.
    pub fn unique<T: Ord + Clone + std::fmt::Debug>(items: &[T]) {
        let mut sorted = items.to_vec();
        sorted.sort();
        let before = sorted.len();
        sorted.dedup();
        assert_eq!(before, sorted.len(), "duplicate entries in {items:?}");
    }
}
