//! Resource format (`json`/`yaml`) helpers.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::ResourceMetadata;

/// Format used when none is configured.
pub const DEFAULT_RESOURCE_FORMAT: &str = "json";

const SUPPORTED: &[&str] = &["json", "yaml"];

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*resource_format\s+\.\s*\}\}").expect("valid resource_format regex")
});

/// Trim and lowercase; an empty value becomes `json`.
#[must_use]
pub fn normalize_resource_format(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        DEFAULT_RESOURCE_FORMAT.to_string()
    } else {
        normalized
    }
}

/// Normalize and check against the supported formats.
///
/// # Errors
///
/// Returns a validation error for anything but `json` or `yaml`.
pub fn validate_resource_format(value: &str) -> Result<String> {
    let normalized = normalize_resource_format(value);
    if SUPPORTED.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(Error::validation(format!(
            "unsupported resource format {:?}",
            value.trim()
        )))
    }
}

/// `application/<format>` for a supported format.
///
/// # Errors
///
/// Returns a validation error for an unsupported format.
pub fn resource_format_media_type(value: &str) -> Result<String> {
    Ok(format!("application/{}", validate_resource_format(value)?))
}

/// Substitute `{{resource_format .}}` tokens with `format`, leaving every
/// other template untouched.
///
/// Covers the collection path, the default jq expression, and each
/// operation's method, path, media types, jq, query, headers and the string
/// leaves of its body.
///
/// # Errors
///
/// Returns a validation error for an unsupported format.
pub fn resolve_resource_format_templates_in_metadata(
    metadata: &ResourceMetadata,
    format: &str,
) -> Result<ResourceMetadata> {
    let format = validate_resource_format(format)?;
    let mut resolved = metadata.clone();

    replace_tokens(&mut resolved.collection_path, &format);
    replace_tokens(&mut resolved.jq, &format);

    for spec in resolved.operations.iter_mut().flat_map(|ops| ops.values_mut()) {
        for field in [
            &mut spec.method,
            &mut spec.path,
            &mut spec.accept,
            &mut spec.content_type,
            &mut spec.jq,
        ] {
            replace_tokens(field, &format);
        }
        for value in spec
            .query
            .iter_mut()
            .chain(spec.headers.iter_mut())
            .flat_map(|map| map.values_mut())
        {
            replace_tokens(value, &format);
        }
        if let Some(body) = spec.body.as_mut() {
            replace_tokens_in_value(body, &format);
        }
    }

    Ok(resolved)
}

fn replace_tokens(value: &mut String, format: &str) {
    if value.trim().is_empty() || !value.contains("resource_format") {
        return;
    }
    *value = TOKEN.replace_all(value, format).into_owned();
}

fn replace_tokens_in_value(value: &mut Value, format: &str) {
    match value {
        Value::String(s) => replace_tokens(s, format),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| replace_tokens_in_value(item, format)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| replace_tokens_in_value(item, format)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operation, OperationSpec, StringMap};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn normalize_and_validate() {
        assert_eq!(normalize_resource_format("  YAML "), "yaml");
        assert_eq!(normalize_resource_format(""), "json");
        assert_eq!(validate_resource_format("Json").unwrap(), "json");
        let err = validate_resource_format(" xml ").unwrap_err();
        assert_eq!(err.to_string(), "unsupported resource format \"xml\"");
        assert_eq!(resource_format_media_type("yaml").unwrap(), "application/yaml");
    }

    #[test]
    fn replaces_only_resource_format_tokens() {
        let mut metadata = ResourceMetadata {
            collection_path: "/api/{{resource_format .}}/customers".into(),
            ..ResourceMetadata::default()
        };
        metadata.set_operation(
            Operation::Get,
            OperationSpec {
                path: "./{{.id}}".into(),
                accept: "application/{{ resource_format . }}".into(),
                query: Some(StringMap::from([(
                    "format".into(),
                    "{{resource_format .}}".into(),
                )])),
                body: Some(json!({"nested": ["{{resource_format .}}", 1]})),
                ..OperationSpec::default()
            },
        );

        let resolved = resolve_resource_format_templates_in_metadata(&metadata, "yaml").unwrap();
        assert_eq!(resolved.collection_path, "/api/yaml/customers");
        let get = resolved.operation(Operation::Get).unwrap();
        assert_eq!(get.path, "./{{.id}}");
        assert_eq!(get.accept, "application/yaml");
        assert_eq!(get.query.as_ref().unwrap()["format"], "yaml");
        assert_eq!(get.body, Some(json!({"nested": ["yaml", 1]})));

        assert!(resolve_resource_format_templates_in_metadata(&metadata, "xml").is_err());
    }
}
