//! Operation spec resolution.
//!
//! Turns effective [`ResourceMetadata`] plus a render scope into the concrete
//! [`OperationSpec`] of one remote call: operation overrides merged over the
//! metadata defaults, every template field rendered, and the path resolved
//! against the collection path.

mod scope;
mod template;

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_operation_path;
use crate::error::{Error, Result};
use crate::format::normalize_resource_format;
use crate::model::{merge_operation_spec, Operation, OperationSpec, ResourceMetadata};
use crate::path::{self, PathDescriptor};

pub use scope::{
    build_operation_scope, build_resource_scope, derive_path_template_fields,
    resolve_alias_and_remote_id, scope_from_value, ResourceContext,
};

/// Name-to-value mapping templates are evaluated against.
pub type RenderScope = serde_json::Map<String, Value>;

/// Resolve `operation` with a scope seeded from `value` alone.
///
/// An object value has its fields promoted into the scope; the value is also
/// reachable as `payload` and `value`.
///
/// # Errors
///
/// See [`resolve_operation_spec_with_scope`].
pub fn resolve_operation_spec(
    metadata: &ResourceMetadata,
    operation: Operation,
    value: &Value,
) -> Result<OperationSpec> {
    resolve_operation_spec_with_scope(metadata, operation, &scope_from_value(value))
}

/// Resolve `operation` against an already built scope.
///
/// The scope is not modified; the rendered collection path is visible to
/// the operation's templates as `collectionPath`.
///
/// # Errors
///
/// Returns a validation error when a template fails to parse or render,
/// when a relative path has no collection path to join onto, or when the
/// resolved path is empty.
pub fn resolve_operation_spec_with_scope(
    metadata: &ResourceMetadata,
    operation: Operation,
    scope: &RenderScope,
) -> Result<OperationSpec> {
    let mut scope = scope.clone();
    let collection_path = resolve_collection_path(&metadata.collection_path, &scope)?;
    scope.insert("collectionPath".into(), collection_path.clone().into());

    let mut spec = OperationSpec {
        filter: metadata.filter.clone(),
        suppress: metadata.suppress.clone(),
        jq: metadata.jq.clone(),
        payload_transform_order: metadata.payload_transform_order.clone(),
        ..OperationSpec::default()
    };
    if let Some(overlay) = metadata.operation(operation) {
        spec = merge_operation_spec(&spec, overlay);
    }
    if spec.path.trim().is_empty() {
        spec.path = default_operation_path(operation).to_string();
    }

    let root = Value::Object(scope);
    let mut rendered = render_operation_templates(spec, &root)?;
    rendered.path = resolve_rendered_path(&rendered.path, &collection_path)?;
    if rendered.path.trim().is_empty() {
        return Err(Error::validation(format!(
            "metadata operation {:?} path is required",
            operation.as_str()
        )));
    }

    debug!(%operation, method = %rendered.method, path = %rendered.path, "resolved operation spec");
    Ok(rendered)
}

/// Render every operation present in `metadata` for one resource.
///
/// Identity comes from [`resolve_alias_and_remote_id`], the scope from
/// [`build_resource_scope`] with `resourceFormat` set. The returned metadata
/// carries the rendered collection path and operations.
///
/// # Errors
///
/// Returns a validation error for a malformed logical path or any failure of
/// [`resolve_operation_spec_with_scope`].
pub fn render_resource_metadata(
    logical_path: &str,
    metadata: &ResourceMetadata,
    payload: &Value,
    resource_format: &str,
) -> Result<ResourceMetadata> {
    let logical_path = PathDescriptor::parse(logical_path)?.selector;
    let scope = resource_render_scope(&logical_path, metadata, payload, resource_format);

    let collection_path = resolve_collection_path(&metadata.collection_path, &scope)?;
    let mut scope = scope;
    scope.insert("collectionPath".into(), collection_path.clone().into());

    let mut rendered = metadata.clone();
    rendered.collection_path = collection_path;

    if let Some(operations) = &metadata.operations {
        let mut out = std::collections::BTreeMap::new();
        for key in operations.keys() {
            let operation: Operation = key.parse()?;
            out.insert(
                key.clone(),
                resolve_operation_spec_with_scope(metadata, operation, &scope)?,
            );
        }
        rendered.operations = Some(out);
    }

    Ok(rendered)
}

/// Scope for rendering operations of the resource at `logical_path`.
pub(crate) fn resource_render_scope(
    logical_path: &str,
    metadata: &ResourceMetadata,
    payload: &Value,
    resource_format: &str,
) -> RenderScope {
    let (alias, remote_id) = resolve_alias_and_remote_id(logical_path, metadata, payload);
    let mut scope = build_resource_scope(&ResourceContext {
        logical_path,
        collection_path: &path::parent(logical_path),
        alias: &alias,
        remote_id: &remote_id,
        metadata,
        payload,
    });
    scope.insert(
        "resourceFormat".into(),
        normalize_resource_format(resource_format).into(),
    );
    scope
}

/// Render one template string, naming `field` in errors.
///
/// Strings without `{{` are returned unchanged.
pub(crate) fn render_template_string(field: &str, raw: &str, scope: &Value) -> Result<String> {
    if !raw.contains("{{") {
        return Ok(raw.to_string());
    }

    let parsed = template::Template::parse(raw).map_err(|err| {
        Error::validation_with(format!("invalid metadata template for {field}"), err)
    })?;
    parsed.execute(scope).map_err(|err| {
        Error::validation_with(format!("failed to render metadata template for {field}"), err)
    })
}

fn resolve_collection_path(raw: &str, scope: &RenderScope) -> Result<String> {
    let mut candidate = raw.trim();
    if candidate.is_empty() {
        candidate = scope
            .get("collectionPath")
            .and_then(Value::as_str)
            .map_or("", str::trim);
    }
    if candidate.is_empty() {
        return Ok(String::new());
    }

    let root = Value::Object(scope.clone());
    let rendered = render_template_string("collectionPath", candidate, &root)?;
    Ok(path::normalize_rendered(&rendered))
}

fn render_operation_templates(spec: OperationSpec, scope: &Value) -> Result<OperationSpec> {
    let mut rendered = spec;
    rendered.method = render_template_string("method", &rendered.method, scope)?;
    rendered.path = render_template_string("path", &rendered.path, scope)?;
    rendered.accept = render_template_string("accept", &rendered.accept, scope)?;
    rendered.content_type = render_template_string("contentType", &rendered.content_type, scope)?;
    rendered.jq = render_template_string("jq", &rendered.jq, scope)?;

    for (prefix, map) in [("query", &mut rendered.query), ("headers", &mut rendered.headers)] {
        for (key, value) in map.iter_mut().flatten() {
            *value = render_template_string(&format!("{prefix}.{key}"), value, scope)?;
        }
    }

    Ok(rendered)
}

/// Absolute and bare paths are normalized; `.`-relative paths are joined
/// onto the collection path.
fn resolve_rendered_path(raw: &str, collection_path: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.starts_with('/') || !trimmed.starts_with('.') {
        return Ok(path::normalize_rendered(trimmed));
    }

    let base = collection_path.trim();
    if base.is_empty() {
        return Err(Error::validation(
            "relative metadata path requires collectionPath context",
        ));
    }
    Ok(path::normalize_rendered(&format!("{base}/{trimmed}")))
}
