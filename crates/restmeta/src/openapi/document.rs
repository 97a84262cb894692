//! Accessors over a parsed OpenAPI document.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::path;

/// Normalized path template → lowercase HTTP methods it declares.
pub(super) type PathDefinitions = BTreeMap<String, BTreeSet<String>>;

const METHODS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

fn paths(document: &Value) -> Option<&Map<String, Value>> {
    document.get("paths")?.as_object()
}

/// `/` + trimmed key, lexically cleaned.
fn normalize_key(key: &str) -> String {
    path::clean(&format!("/{}", key.trim_matches('/')))
}

/// Every path template declaring at least one supported method.
pub(super) fn path_definitions(document: &Value) -> PathDefinitions {
    let Some(paths) = paths(document) else {
        return PathDefinitions::new();
    };

    let mut definitions = PathDefinitions::new();
    for (key, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let methods: BTreeSet<String> = item
            .keys()
            .map(|method| method.trim().to_ascii_lowercase())
            .filter(|method| METHODS.contains(&method.as_str()))
            .collect();
        if !methods.is_empty() {
            definitions.insert(normalize_key(key), methods);
        }
    }
    definitions
}

/// Path item objects keyed by normalized template.
pub(super) fn path_items(document: &Value) -> BTreeMap<String, &Map<String, Value>> {
    paths(document)
        .into_iter()
        .flatten()
        .filter_map(|(key, item)| Some((normalize_key(key), item.as_object()?)))
        .collect()
}

/// Resolve a local JSON pointer reference (`#/components/schemas/Foo`).
pub(super) fn resolve_ref<'a>(document: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.trim().strip_prefix("#/")?;
    if pointer.trim().is_empty() {
        return Some(document);
    }

    let mut current = document;
    for raw in pointer.split('/') {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        current = current.as_object()?.get(&segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn definitions_skip_items_without_methods() {
        let doc = json!({
            "paths": {
                "/items/": {"get": {}, "POST": {}, "parameters": []},
                "items/{id}": {"delete": {}},
                "/meta": {"summary": "none"},
            }
        });
        let defs = path_definitions(&doc);
        assert_eq!(
            defs.keys().collect::<Vec<_>>(),
            vec!["/items", "/items/{id}"]
        );
        assert_eq!(
            defs["/items"].iter().collect::<Vec<_>>(),
            vec!["get", "post"]
        );
        assert_eq!(path_items(&doc).len(), 3);
        assert!(path_definitions(&json!({"openapi": "3.0.0"})).is_empty());
    }

    #[test]
    fn resolves_escaped_pointers() {
        let doc = json!({"components": {"schemas": {"a/b": {"type": "object"}, "t~x": 1}}});
        assert_eq!(
            resolve_ref(&doc, "#/components/schemas/a~1b"),
            Some(&json!({"type": "object"}))
        );
        assert_eq!(resolve_ref(&doc, "#/components/schemas/t~0x"), Some(&json!(1)));
        assert_eq!(resolve_ref(&doc, "#/"), Some(&doc));
        assert_eq!(resolve_ref(&doc, "#/components/missing"), None);
        assert_eq!(resolve_ref(&doc, "other.yaml#/x"), None);
    }
}
