//! Schema walks: response properties and request-body requirements.
//!
//! Every walk follows `$ref`s with a visited set, gives up past
//! [`MAX_SCHEMA_DEPTH`] and stops expanding after [`MAX_SCHEMA_STEPS`]
//! schema nodes, so cyclic or wide fan-out documents terminate.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::document::resolve_ref;
use super::matching::Candidate;
use super::REQUEST_BODY_SCHEMA_REF;
use crate::model::OperationValidationSpec;

/// Nesting limit for schema and `$ref` recursion.
pub(super) const MAX_SCHEMA_DEPTH: usize = 24;

/// Schema nodes one walk may expand before returning what it has.
pub(super) const MAX_SCHEMA_STEPS: usize = 4096;

const RESPONSE_METHODS: [&str; 4] = ["get", "put", "patch", "post"];
const PREFERRED_STATUSES: [&str; 4] = ["200", "201", "202", "default"];
const COMBINERS: [&str; 3] = ["allOf", "oneOf", "anyOf"];

type PathItems<'a> = BTreeMap<String, &'a Map<String, Value>>;

struct Walk<'a> {
    document: &'a Value,
    visited: BTreeSet<String>,
    steps: usize,
}

/// Property names of the first response body schema that has any.
///
/// Methods are tried in the order get, put, patch, post; statuses 200, 201,
/// 202 and default come before the rest (sorted).
pub(super) fn response_attributes(
    candidate: &Candidate,
    items: &PathItems<'_>,
    document: &Value,
) -> BTreeSet<String> {
    let Some(item) = candidate_item(candidate, items) else {
        return BTreeSet::new();
    };

    let mut walk = Walk::new(document);
    for method in RESPONSE_METHODS {
        if !candidate.has_method(method) {
            continue;
        }
        let Some(operation) = item.get(method).and_then(Value::as_object) else {
            continue;
        };
        let attributes = walk.operation_response(operation, 0);
        if !attributes.is_empty() {
            return attributes;
        }
    }
    BTreeSet::new()
}

/// Required request-body attributes of `method` on the candidate.
///
/// `None` when the operation declares no request body or its schema has no
/// required properties.
pub(super) fn request_validation(
    candidate: &Candidate,
    method: &str,
    items: &PathItems<'_>,
    document: &Value,
) -> Option<OperationValidationSpec> {
    let operation = candidate_item(candidate, items)?
        .get(method)?
        .as_object()?;

    let mut walk = Walk::new(document);
    let body = walk.deref(operation.get("requestBody")?, 0)?;
    let schema = request_body_schema(body.get("content")?.as_object()?)?;

    let required = walk.required(schema, 0);
    if required.is_empty() {
        return None;
    }
    Some(OperationValidationSpec {
        required_attributes: Some(required.into_iter().collect()),
        schema_ref: REQUEST_BODY_SCHEMA_REF.to_string(),
        ..OperationValidationSpec::default()
    })
}

fn candidate_item<'a>(candidate: &Candidate, items: &PathItems<'a>) -> Option<&'a Map<String, Value>> {
    if candidate.is_empty() {
        return None;
    }
    items.get(&candidate.path).copied()
}

/// `application/json` first, then `application/*+json`, then the rest.
fn media_type_priority(media_type: &str) -> u8 {
    let normalized = media_type.trim().to_ascii_lowercase();
    if normalized == "application/json" {
        0
    } else if normalized.starts_with("application/") && normalized.ends_with("+json") {
        1
    } else {
        2
    }
}

fn request_body_schema(content: &Map<String, Value>) -> Option<&Value> {
    let mut media_types: Vec<&String> = content.keys().collect();
    media_types.sort_by_key(|media_type| (media_type_priority(media_type), media_type.as_str()));
    media_types
        .into_iter()
        .find_map(|media_type| content.get(media_type)?.as_object()?.get("schema"))
}

impl<'a> Walk<'a> {
    fn new(document: &'a Value) -> Self {
        Self {
            document,
            visited: BTreeSet::new(),
            steps: 0,
        }
    }

    /// Count one node; `false` once the walk is over budget.
    fn step(&mut self) -> bool {
        if self.steps >= MAX_SCHEMA_STEPS {
            return false;
        }
        self.steps += 1;
        true
    }

    /// Follow `$ref` chains until a non-reference value is reached.
    fn deref(&mut self, value: &'a Value, depth: usize) -> Option<&'a Value> {
        if depth > MAX_SCHEMA_DEPTH || !self.step() {
            return None;
        }
        let Some(reference) = value.get("$ref") else {
            return Some(value);
        };
        let reference = reference.as_str()?.trim().to_string();
        if reference.is_empty() || self.visited.contains(&reference) {
            return None;
        }
        let resolved = resolve_ref(self.document, &reference)?;

        self.visited.insert(reference.clone());
        let result = self.deref(resolved, depth + 1);
        self.visited.remove(&reference);
        result
    }

    fn operation_response(&mut self, operation: &'a Map<String, Value>, depth: usize) -> BTreeSet<String> {
        if depth > MAX_SCHEMA_DEPTH {
            return BTreeSet::new();
        }
        let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
            return BTreeSet::new();
        };

        let preferred = PREFERRED_STATUSES.iter().filter_map(|s| responses.get(*s));
        let mut rest: Vec<(&String, &Value)> = responses
            .iter()
            .filter(|(status, _)| !PREFERRED_STATUSES.contains(&status.as_str()))
            .collect();
        rest.sort_by_key(|(status, _)| status.as_str());

        for entry in preferred.chain(rest.into_iter().map(|(_, v)| v)) {
            let attributes = self.response_entry(entry, depth + 1);
            if !attributes.is_empty() {
                return attributes;
            }
        }
        BTreeSet::new()
    }

    fn response_entry(&mut self, entry: &'a Value, depth: usize) -> BTreeSet<String> {
        if depth > MAX_SCHEMA_DEPTH {
            return BTreeSet::new();
        }
        let Some(content) = entry.get("content").and_then(Value::as_object) else {
            return BTreeSet::new();
        };

        let mut media_types: Vec<&String> = content.keys().collect();
        media_types.sort();
        for media_type in media_types {
            let Some(schema) = content.get(media_type).and_then(|m| m.get("schema")) else {
                continue;
            };
            let attributes = self.properties(schema, depth + 1);
            if !attributes.is_empty() {
                return attributes;
            }
        }
        BTreeSet::new()
    }

    /// Property names of a schema, through refs, combiners and `items`.
    fn properties(&mut self, schema: &'a Value, depth: usize) -> BTreeSet<String> {
        if depth > MAX_SCHEMA_DEPTH || !self.step() {
            return BTreeSet::new();
        }
        let Some(object) = schema.as_object() else {
            return BTreeSet::new();
        };

        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            let reference = reference.trim().to_string();
            if !reference.is_empty() {
                if self.visited.contains(&reference) {
                    return BTreeSet::new();
                }
                if let Some(resolved) = resolve_ref(self.document, &reference) {
                    self.visited.insert(reference.clone());
                    let attributes = self.properties(resolved, depth + 1);
                    self.visited.remove(&reference);
                    if !attributes.is_empty() {
                        return attributes;
                    }
                }
            }
        }

        let mut merged = BTreeSet::new();
        for combiner in COMBINERS {
            for entry in object.get(combiner).and_then(Value::as_array).into_iter().flatten() {
                merged.extend(self.properties(entry, depth + 1));
            }
        }
        if let Some(properties) = object.get("properties").and_then(Value::as_object) {
            merged.extend(
                properties
                    .keys()
                    .map(|key| key.trim())
                    .filter(|key| !key.is_empty())
                    .map(str::to_string),
            );
        }
        if !merged.is_empty() {
            return merged;
        }

        match object.get("items") {
            Some(items) => self.properties(items, depth + 1),
            None => BTreeSet::new(),
        }
    }

    /// `required` names of a schema and its `allOf` members.
    fn required(&mut self, schema: &'a Value, depth: usize) -> BTreeSet<String> {
        let Some(schema) = self.deref(schema, depth) else {
            return BTreeSet::new();
        };
        let Some(object) = schema.as_object() else {
            return BTreeSet::new();
        };

        let mut required: BTreeSet<String> = object
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if depth < MAX_SCHEMA_DEPTH {
            for member in object.get("allOf").and_then(Value::as_array).into_iter().flatten() {
                required.extend(self.required(member, depth + 1));
            }
        }
        required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::openapi::document::{path_definitions, path_items};
    use crate::openapi::matching::select_candidate;

    fn candidate(doc: &Value, path: &str) -> Candidate {
        let segments = crate::path::split_segments(path);
        select_candidate(&segments, segments.len(), &path_definitions(doc))
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn response_properties_through_refs_and_combiners() {
        let doc = json!({
            "paths": {"/users/{id}": {"get": {"responses": {
                "404": {"content": {"application/json": {"schema": {"properties": {"error": {}}}}}},
                "200": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/User"}}}},
            }}}},
            "components": {"schemas": {
                "User": {"allOf": [{"$ref": "#/components/schemas/Base"}, {"properties": {"username": {}}}]},
                "Base": {"properties": {"id": {}, " ": {}}},
            }},
        });
        let found = response_attributes(&candidate(&doc, "/users/{id}"), &path_items(&doc), &doc);
        assert_eq!(found, names(&["id", "username"]));
    }

    #[test]
    fn array_responses_use_items() {
        let doc = json!({
            "paths": {"/users": {"get": {"responses": {
                "default": {"content": {"application/json": {"schema": {
                    "type": "array", "items": {"properties": {"name": {}}}
                }}}},
            }}}},
        });
        let found = response_attributes(&candidate(&doc, "/users"), &path_items(&doc), &doc);
        assert_eq!(found, names(&["name"]));
    }

    #[test]
    fn cyclic_refs_terminate() {
        let doc = json!({
            "paths": {"/nodes": {"get": {"responses": {"200": {"content": {
                "application/json": {"schema": {"$ref": "#/components/schemas/A"}}
            }}}}}},
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"items": {"$ref": "#/components/schemas/A"}},
            }},
        });
        let found = response_attributes(&candidate(&doc, "/nodes"), &path_items(&doc), &doc);
        assert!(found.is_empty());
    }

    /// `S0..S29` each combine the next schema twice, which is 2^30 paths
    /// without a node budget.
    fn fan_out_document() -> Value {
        let mut schemas = Map::new();
        for n in 0..30 {
            let next = json!({"$ref": format!("#/components/schemas/S{}", n + 1)});
            schemas.insert(
                format!("S{n}"),
                json!({
                    "allOf": [next.clone(), next],
                    "properties": {format!("p{n}"): {}},
                    "required": [format!("p{n}")],
                }),
            );
        }
        schemas.insert("S30".into(), json!({"properties": {"leaf": {}}}));
        json!({
            "paths": {"/wide": {
                "get": {"responses": {"200": {"content": {
                    "application/json": {"schema": {"$ref": "#/components/schemas/S0"}}
                }}}},
                "post": {"requestBody": {"content": {
                    "application/json": {"schema": {"$ref": "#/components/schemas/S0"}}
                }}},
            }},
            "components": {"schemas": schemas},
        })
    }

    #[test]
    fn wide_fan_out_stops_at_step_budget() {
        let doc = fan_out_document();
        let items = path_items(&doc);
        let wide = candidate(&doc, "/wide");

        let found = response_attributes(&wide, &items, &doc);
        assert!(found.contains("p0") && found.contains("p1"), "{found:?}");

        let spec = request_validation(&wide, "post", &items, &doc).unwrap();
        let required = spec.required_attributes.unwrap();
        assert!(required.contains(&"p0".to_string()), "{required:?}");

        let mut walk = Walk::new(&doc);
        let _ = walk.properties(&doc["components"]["schemas"]["S0"], 0);
        assert_eq!(walk.steps, MAX_SCHEMA_STEPS);
    }

    #[test]
    fn request_body_required_prefers_json() {
        let doc = json!({
            "paths": {"/users": {"post": {"requestBody": {"$ref": "#/components/requestBodies/NewUser"}}}},
            "components": {
                "requestBodies": {"NewUser": {"content": {
                    "text/plain": {"schema": {"required": ["ignored"]}},
                    "application/vnd.user+json": {"schema": {"required": ["vendor"]}},
                    "application/json": {"schema": {"$ref": "#/components/schemas/NewUser"}},
                }}},
                "schemas": {"NewUser": {
                    "required": ["username", "email"],
                    "allOf": [{"required": ["email", "realm"]}],
                }},
            },
        });
        let spec = request_validation(&candidate(&doc, "/users"), "post", &path_items(&doc), &doc)
            .unwrap();
        assert_eq!(
            spec.required_attributes,
            Some(vec!["email".into(), "realm".into(), "username".into()])
        );
        assert_eq!(spec.schema_ref, REQUEST_BODY_SCHEMA_REF);
        assert_eq!(spec.assertions, None);
    }

    #[test]
    fn request_body_without_required_is_skipped() {
        let doc = json!({
            "paths": {"/users": {
                "post": {"requestBody": {"content": {"application/json": {"schema": {"type": "object"}}}}},
                "get": {},
            }},
        });
        let items = path_items(&doc);
        let users = candidate(&doc, "/users");
        assert_eq!(request_validation(&users, "post", &items, &doc), None);
        assert_eq!(request_validation(&users, "get", &items, &doc), None);
        assert_eq!(request_validation(&Candidate::default(), "post", &items, &doc), None);
    }

    #[test]
    fn media_type_order() {
        assert_eq!(media_type_priority("application/json"), 0);
        assert_eq!(media_type_priority(" Application/Problem+JSON "), 1);
        assert_eq!(media_type_priority("text/json"), 2);
    }
}
