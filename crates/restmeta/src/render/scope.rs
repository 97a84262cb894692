//! Render scope construction.
//!
//! A scope is the JSON object templates are evaluated against: identity keys
//! (`logicalPath`, `collectionPath`, `alias`, `remoteID`, `id`), the payload
//! under `payload`/`value`, the payload's top-level fields, and any
//! `{{.name}}` segments that can be read back from the logical path.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::RenderScope;
use crate::model::ResourceMetadata;
use crate::path;

static PATH_TEMPLATE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*\.([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}$").expect("valid segment regex")
});

static JQ_RESOURCE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"resource\(\s*"((?:[^"\\]|\\.)*)"\s*\)"#).expect("valid jq resource regex")
});

/// Identity and payload of the resource a scope is built for.
#[derive(Debug, Clone, Copy)]
pub struct ResourceContext<'a> {
    /// Logical path of the resource.
    pub logical_path: &'a str,
    /// Collection path; blank means the parent of `logical_path`.
    pub collection_path: &'a str,
    /// Local alias.
    pub alias: &'a str,
    /// Remote identifier.
    pub remote_id: &'a str,
    /// Effective metadata (source of derivable path fields).
    pub metadata: &'a ResourceMetadata,
    /// Resource payload.
    pub payload: &'a Value,
}

/// Scope from identity values and a payload.
///
/// Object payload fields are promoted to the top level and may shadow the
/// identity keys; `payload` and `value` always refer to the payload itself.
#[must_use]
pub fn build_operation_scope(
    logical_path: &str,
    collection_path: &str,
    alias: &str,
    remote_id: &str,
    payload: &Value,
) -> RenderScope {
    let mut scope = RenderScope::new();
    scope.insert("logicalPath".into(), logical_path.into());
    scope.insert("collectionPath".into(), collection_path.into());
    scope.insert("alias".into(), alias.into());
    scope.insert("remoteID".into(), remote_id.into());
    if !remote_id.trim().is_empty() {
        scope.insert("id".into(), remote_id.into());
    }

    if let Value::Object(fields) = payload {
        for (key, item) in fields {
            scope.insert(key.clone(), item.clone());
        }
    }
    scope.insert("payload".into(), payload.clone());
    scope.insert("value".into(), payload.clone());
    scope
}

/// Scope for a resource, enriched with fields derived from its path.
///
/// Derived fields never replace keys already in the scope; they are also
/// added to an object payload.
#[must_use]
pub fn build_resource_scope(resource: &ResourceContext<'_>) -> RenderScope {
    let collection_path = if resource.collection_path.trim().is_empty() {
        path::parent(resource.logical_path)
    } else {
        resource.collection_path.to_string()
    };

    let mut scope = build_operation_scope(
        resource.logical_path,
        &collection_path,
        resource.alias,
        resource.remote_id,
        resource.payload,
    );

    for (key, value) in derive_path_template_fields(resource.logical_path, resource.metadata) {
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() || scope.contains_key(key) {
            continue;
        }
        scope.insert(key.to_string(), value.into());
        for alias in ["payload", "value"] {
            if let Some(Value::Object(fields)) = scope.get_mut(alias) {
                fields.insert(key.to_string(), value.into());
            }
        }
    }

    scope
}

/// Read `{{.name}}` values back from `logical_path`.
///
/// Sources, first value winning: the collection path template (or the
/// parent of `logical_path`), `resource("...")` paths inside the default jq
/// expression, then per operation (sorted by name) its jq expression and its
/// path joined onto the collection template.
#[must_use]
pub fn derive_path_template_fields(
    logical_path: &str,
    metadata: &ResourceMetadata,
) -> BTreeMap<String, String> {
    let mut derived = BTreeMap::new();

    let collection_template = match metadata.collection_path.trim() {
        "" => path::parent(logical_path),
        template => template.to_string(),
    };
    merge_fields(&mut derived, fields_from_path_template(&collection_template, logical_path));
    merge_fields(&mut derived, fields_from_jq(&metadata.jq, logical_path));

    for spec in metadata.operations.iter().flat_map(|ops| ops.values()) {
        merge_fields(&mut derived, fields_from_jq(&spec.jq, logical_path));

        let template = spec.path.trim();
        if template.is_empty() {
            continue;
        }
        let template = if template.starts_with('/') {
            template.to_string()
        } else {
            join_template_paths(&collection_template, template)
        };
        merge_fields(&mut derived, fields_from_path_template(&template, logical_path));
    }

    derived
}

/// Alias and remote id for a resource.
///
/// Both default to the last segment of `logical_path`. With an object
/// payload, `aliasFromAttribute` and `idFromAttribute` (dotted paths to
/// scalar values) override them; without `idFromAttribute` the remote id
/// follows the alias.
#[must_use]
pub fn resolve_alias_and_remote_id(
    logical_path: &str,
    metadata: &ResourceMetadata,
    payload: &Value,
) -> (String, String) {
    let fallback = path::base_name(logical_path);
    let Value::Object(_) = payload else {
        return (fallback.clone(), fallback);
    };

    let alias = lookup_scalar_attribute(payload, &metadata.alias_from_attribute)
        .unwrap_or_else(|| fallback.clone());
    let remote_id = if metadata.id_from_attribute.trim().is_empty() {
        alias.clone()
    } else {
        lookup_scalar_attribute(payload, &metadata.id_from_attribute)
            .unwrap_or_else(|| alias.clone())
    };

    (alias, remote_id)
}

/// Scope seeded only from a value: object fields are promoted, and the value
/// is reachable as `payload` and `value`.
#[must_use]
pub fn scope_from_value(value: &Value) -> RenderScope {
    let mut scope = RenderScope::new();
    if let Value::Object(fields) = value {
        scope.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    scope.insert("payload".into(), value.clone());
    scope.insert("value".into(), value.clone());
    scope
}

/// Follow a dotted attribute path to a non-blank scalar, as a trimmed string.
fn lookup_scalar_attribute(payload: &Value, attribute: &str) -> Option<String> {
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return None;
    }

    let mut current = payload;
    for segment in attribute.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }

    let text = match current {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn fields_from_jq(expression: &str, logical_path: &str) -> BTreeMap<String, String> {
    let expression = expression.trim();
    let mut derived = BTreeMap::new();
    if !expression.contains("{{") || !expression.contains("resource(") {
        return derived;
    }

    for captures in JQ_RESOURCE_PATH.captures_iter(expression) {
        let Some(raw) = captures.get(1) else {
            continue;
        };
        let Ok(template) = serde_json::from_str::<String>(&format!("\"{}\"", raw.as_str())) else {
            continue;
        };
        merge_fields(&mut derived, fields_from_path_template(template.trim(), logical_path));
    }
    derived
}

/// Pair template segments with logical segments left to right.
///
/// Stops at the first literal mismatch; a variable bound to two different
/// values discards the whole match.
fn fields_from_path_template(template: &str, logical_path: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    if !template.contains("{{") {
        return fields;
    }

    let template_segments = path::split_segments(template);
    let logical_segments = path::split_segments(logical_path);

    for (template_segment, logical_segment) in template_segments.iter().zip(&logical_segments) {
        if let Some(captures) = PATH_TEMPLATE_SEGMENT.captures(template_segment) {
            let key = captures[1].to_string();
            match fields.get(&key) {
                Some(existing) if existing != logical_segment => return BTreeMap::new(),
                _ => {
                    fields.insert(key, logical_segment.clone());
                }
            }
            continue;
        }
        if template_segment != logical_segment {
            break;
        }
    }

    fields
}

fn merge_fields(destination: &mut BTreeMap<String, String>, source: BTreeMap<String, String>) {
    for (key, value) in source {
        destination.entry(key).or_insert(value);
    }
}

fn join_template_paths(collection_path: &str, operation_path: &str) -> String {
    let base = match collection_path.trim() {
        "" => "/",
        base => base,
    };
    let relative = operation_path.trim();
    if relative.is_empty() {
        return base.to_string();
    }
    path::normalize_rendered(&format!("{base}/{relative}"))
}
