//! Metadata inference from OpenAPI documents.
//!
//! The document is a parsed value tree (`paths`, optionally `components`).
//! Inference starts from fallback metadata derived from the logical path
//! alone and overlays whatever the best-matching path templates declare:
//! operations and their methods, path templates, identity attributes and
//! request-body requirements.

mod document;
mod identity;
mod matching;
mod schema;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{merge_resource_metadata, Operation, OperationSpec, ResourceMetadata};
use crate::path::{self, PathDescriptor};

use document::PathDefinitions;
use matching::Candidate;

/// `schemaRef` of inferred request-body validation.
pub const REQUEST_BODY_SCHEMA_REF: &str = "openapi:request-body";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    selector: String,
    segments: Vec<String>,
    collection: bool,
}

impl Target {
    fn parse(logical_path: &str) -> Result<Self> {
        let descriptor = PathDescriptor::parse(logical_path)?;
        if !descriptor.collection && descriptor.selector == "/" {
            return Err(Error::validation("resource metadata path must not target root"));
        }
        Ok(Self {
            selector: descriptor.selector,
            segments: descriptor.segments,
            collection: descriptor.collection,
        })
    }

    fn promoted(logical_path: &str, definitions: &PathDefinitions) -> Result<Self> {
        Ok(matching::promote_target(Self::parse(logical_path)?, definitions))
    }
}

/// Infer metadata for `logical_path`.
///
/// `openapi` may be [`Value::Null`] (or lack `paths`), in which case only
/// the path-derived fallback is returned. Collection targets also get
/// identity attributes and, for secret-bearing collections,
/// `secretsFromAttributes: [secret]`.
///
/// # Errors
///
/// Returns a validation error for a malformed path or a resource path at
/// the root.
pub fn infer_from_openapi(logical_path: &str, openapi: &Value) -> Result<ResourceMetadata> {
    let definitions = document::path_definitions(openapi);
    let target = Target::promoted(logical_path, &definitions)?;

    let fallback = fallback_metadata(&target);
    let inferred = infer_openapi_metadata(&target, openapi, &definitions);
    let mut metadata = merge_resource_metadata(&fallback, &inferred.metadata);

    if target.collection {
        let (id, alias) = identity::identity_attributes(
            &target,
            inferred.identity.as_deref().unwrap_or_default(),
            &inferred.attributes,
        );
        if !id.trim().is_empty() {
            metadata.id_from_attribute = id;
        }
        if !alias.trim().is_empty() {
            metadata.alias_from_attribute = alias;
        }
        if identity::holds_secrets(&target) {
            metadata.secrets_from_attributes = Some(vec!["secret".to_string()]);
        }
    }

    debug!(
        logical_path,
        selector = %target.selector,
        collection = target.collection,
        id = %metadata.id_from_attribute,
        alias = %metadata.alias_from_attribute,
        "openapi inference done"
    );
    Ok(metadata)
}

/// `true` when some OpenAPI path template matches `logical_path`.
///
/// Collection targets match templates for the collection itself or for
/// its items.
///
/// # Errors
///
/// Same as [`infer_from_openapi`].
pub fn has_openapi_path(logical_path: &str, openapi: &Value) -> Result<bool> {
    let definitions = document::path_definitions(openapi);
    let target = Target::promoted(logical_path, &definitions)?;
    if definitions.is_empty() {
        return Ok(false);
    }

    let depth = target.segments.len();
    if target.collection {
        return Ok(matching::has_path_match(&target.segments, depth, &definitions)
            || matching::has_path_match(&target.segments, depth + 1, &definitions));
    }
    Ok(matching::has_path_match(&target.segments, depth, &definitions))
}

/// Strip from `inferred` everything that inference would produce anyway.
///
/// Operations equal to the recomputed defaults (after trimming) and a
/// collection path equal to the default one are dropped, so only genuine
/// overrides remain. The payload transform order and validation blocks are
/// not compared.
///
/// # Errors
///
/// Same as [`infer_from_openapi`].
pub fn compact_inferred_metadata_defaults(
    logical_path: &str,
    inferred: &ResourceMetadata,
    openapi: &Value,
) -> Result<ResourceMetadata> {
    let definitions = document::path_definitions(openapi);
    let target = Target::promoted(logical_path, &definitions)?;

    let defaults = merge_resource_metadata(
        &fallback_metadata(&target),
        &infer_openapi_metadata(&target, openapi, &definitions).metadata,
    );
    let default_operations = defaults.operations.unwrap_or_default();

    let operations: BTreeMap<String, OperationSpec> = inferred
        .operations
        .iter()
        .flatten()
        .filter(|(key, spec)| {
            default_operations
                .get(*key)
                .is_none_or(|default| !operation_specs_equivalent(spec, default))
        })
        .map(|(key, spec)| (key.clone(), spec.clone()))
        .collect();

    let collection_path = if inferred.collection_path.trim() == defaults.collection_path.trim() {
        String::new()
    } else {
        inferred.collection_path.clone()
    };

    Ok(ResourceMetadata {
        id_from_attribute: inferred.id_from_attribute.clone(),
        alias_from_attribute: inferred.alias_from_attribute.clone(),
        collection_path,
        secrets_from_attributes: inferred.secrets_from_attributes.clone(),
        operations: (!operations.is_empty()).then_some(operations),
        filter: inferred.filter.clone(),
        suppress: inferred.suppress.clone(),
        jq: inferred.jq.clone(),
        payload_transform_order: Vec::new(),
    })
}

/// Metadata derivable from the target alone.
///
/// Resources get literal CRUD paths on their own selector; collections get
/// placeholder-based collection and item templates.
fn fallback_metadata(target: &Target) -> ResourceMetadata {
    let spec = |method: &str, path: &str| OperationSpec {
        method: method.to_string(),
        path: path.to_string(),
        ..OperationSpec::default()
    };

    let mut operations = BTreeMap::new();
    let collection_path = if target.collection {
        let (id, _) = identity::identity_attributes(target, "", &Default::default());
        let Some((collection, resource)) = identity::template_paths(target, &id) else {
            return ResourceMetadata::default();
        };
        for (op, method, path) in [
            (Operation::List, "GET", &collection),
            (Operation::Create, "POST", &collection),
            (Operation::Get, "GET", &resource),
            (Operation::Update, "PUT", &resource),
            (Operation::Delete, "DELETE", &resource),
            (Operation::Compare, "GET", &resource),
        ] {
            operations.insert(op.as_str().to_string(), spec(method, path));
        }
        collection
    } else {
        let collection = path::parent(&target.selector);
        for op in Operation::ALL {
            let path = if op == Operation::List {
                &collection
            } else {
                &target.selector
            };
            let method = crate::defaults::default_operation_method(op);
            operations.insert(op.as_str().to_string(), spec(method, path));
        }
        collection
    };

    ResourceMetadata {
        collection_path,
        operations: Some(operations),
        ..ResourceMetadata::default()
    }
}

struct OpenApiInference {
    metadata: ResourceMetadata,
    identity: Option<String>,
    attributes: std::collections::BTreeSet<String>,
}

fn infer_openapi_metadata(
    target: &Target,
    openapi: &Value,
    definitions: &PathDefinitions,
) -> OpenApiInference {
    let mut inference = OpenApiInference {
        metadata: ResourceMetadata::default(),
        identity: None,
        attributes: Default::default(),
    };
    if definitions.is_empty() {
        return inference;
    }

    let fallback = fallback_metadata(target);
    let fallback_path = |op: Operation| {
        fallback
            .operation(op)
            .map(|spec| spec.path.clone())
            .unwrap_or_default()
    };
    let items = document::path_items(openapi);

    let depth = target.segments.len();
    let (collection, resource) = if target.collection {
        (
            matching::select_candidate(&target.segments, depth, definitions),
            matching::select_candidate(&target.segments, depth + 1, definitions),
        )
    } else {
        (
            matching::select_candidate(
                &path::split_segments(&path::parent(&target.selector)),
                depth.saturating_sub(1),
                definitions,
            ),
            matching::select_candidate(&target.segments, depth, definitions),
        )
    };
    debug!(
        selector = %target.selector,
        collection = %collection.path,
        resource = %resource.path,
        "openapi candidates selected"
    );

    let mut operations = BTreeMap::new();
    let mut collection_path = String::new();
    let mut insert = |op: Operation, method: &str, path: &str, candidate: &Candidate, verb: &str| {
        let validate = matches!(op, Operation::Create | Operation::Update)
            .then(|| schema::request_validation(candidate, verb, &items, openapi))
            .flatten();
        operations.insert(
            op.as_str().to_string(),
            OperationSpec {
                method: method.to_string(),
                path: path.to_string(),
                validate,
                ..OperationSpec::default()
            },
        );
    };

    if !collection.is_empty() {
        collection_path =
            matching::to_metadata_template(&collection.path, &fallback_path(Operation::List));
        if collection.has_method("get") {
            insert(Operation::List, "GET", &collection_path, &collection, "get");
        }
        if collection.has_method("post") {
            insert(Operation::Create, "POST", &collection_path, &collection, "post");
        }
    }

    inference.attributes = schema::response_attributes(&resource, &items, openapi);
    if inference.attributes.is_empty() {
        inference.attributes = schema::response_attributes(&collection, &items, openapi);
    }

    if !resource.is_empty() {
        let resource_path =
            matching::to_metadata_template(&resource.path, &fallback_path(Operation::Get));
        inference.identity = matching::last_template_variable(&resource.segments);

        if resource.has_method("get") {
            insert(Operation::Get, "GET", &resource_path, &resource, "get");
            insert(Operation::Compare, "GET", &resource_path, &resource, "get");
        }
        if resource.has_method("put") {
            insert(Operation::Update, "PUT", &resource_path, &resource, "put");
        } else if resource.has_method("patch") {
            insert(Operation::Update, "PATCH", &resource_path, &resource, "patch");
        }
        if resource.has_method("delete") {
            insert(Operation::Delete, "DELETE", &resource_path, &resource, "delete");
        }
    }

    if !operations.is_empty() {
        inference.metadata = ResourceMetadata {
            collection_path,
            operations: Some(operations),
            ..ResourceMetadata::default()
        };
    }
    inference
}

/// Field-by-field equality after trimming; empty maps and lists count as
/// unset.
fn operation_specs_equivalent(left: &OperationSpec, right: &OperationSpec) -> bool {
    fn normalize(spec: &OperationSpec) -> OperationSpec {
        OperationSpec {
            method: spec.method.trim().to_string(),
            path: spec.path.trim().to_string(),
            query: spec.query.clone().filter(|m| !m.is_empty()),
            headers: spec.headers.clone().filter(|m| !m.is_empty()),
            accept: spec.accept.trim().to_string(),
            content_type: spec.content_type.trim().to_string(),
            body: spec.body.clone(),
            filter: spec.filter.clone().filter(|l| !l.is_empty()),
            suppress: spec.suppress.clone().filter(|l| !l.is_empty()),
            jq: spec.jq.trim().to_string(),
            ..OperationSpec::default()
        }
    }
    normalize(left) == normalize(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn op<'a>(metadata: &'a ResourceMetadata, operation: Operation) -> (&'a str, &'a str) {
        let spec = metadata.operation(operation).unwrap();
        (spec.method.as_str(), spec.path.as_str())
    }

    #[test]
    fn fallback_for_resource() {
        let metadata = infer_from_openapi("/customers/acme", &Value::Null).unwrap();
        assert_eq!(metadata.collection_path, "/customers");
        assert_eq!(op(&metadata, Operation::Get), ("GET", "/customers/acme"));
        assert_eq!(op(&metadata, Operation::Create), ("POST", "/customers/acme"));
        assert_eq!(op(&metadata, Operation::List), ("GET", "/customers"));
        assert_eq!(metadata.id_from_attribute, "");
        assert_eq!(metadata.secrets_from_attributes, None);
    }

    #[test]
    fn fallback_for_collection() {
        let metadata = infer_from_openapi("/admin/realms/_/clients/_", &Value::Null).unwrap();
        assert_eq!(metadata.collection_path, "/admin/realms/{{.realm}}/clients");
        assert_eq!(
            op(&metadata, Operation::Update),
            ("PUT", "/admin/realms/{{.realm}}/clients/{{.id}}")
        );
        assert_eq!(metadata.id_from_attribute, "id");
        assert_eq!(metadata.alias_from_attribute, "clientId");
        assert_eq!(metadata.secrets_from_attributes, Some(vec!["secret".to_string()]));
    }

    #[test]
    fn rejects_root_resource_and_bad_paths() {
        assert!(infer_from_openapi("relative", &Value::Null).is_err());
        assert!(has_openapi_path("", &Value::Null).is_err());
        let metadata = infer_from_openapi("/", &Value::Null).unwrap();
        assert_eq!(metadata.collection_path, "/");
        assert_eq!(op(&metadata, Operation::Get), ("GET", "/{{.id}}"));
    }

    #[test]
    fn openapi_overrides_fallback() {
        let doc = json!({"paths": {
            "/api/items": {"get": {}, "post": {}},
            "/api/items/{itemId}": {"get": {}, "patch": {}},
        }});
        let metadata = infer_from_openapi("/api/items/_", &doc).unwrap();
        assert_eq!(op(&metadata, Operation::List), ("GET", "/api/items"));
        assert_eq!(op(&metadata, Operation::Update), ("PATCH", "/api/items/{{.itemId}}"));
        assert_eq!(op(&metadata, Operation::Delete), ("DELETE", "/api/items/{{.item}}"));
        assert_eq!(metadata.alias_from_attribute, "itemId");
        assert_eq!(metadata.id_from_attribute, "id");
    }

    #[test]
    fn container_resource_is_promoted() {
        let doc = json!({"paths": {
            "/realms": {"get": {}},
            "/realms/{realm}": {"get": {}, "delete": {}},
        }});
        let metadata = infer_from_openapi("/realms", &doc).unwrap();
        assert_eq!(op(&metadata, Operation::Get), ("GET", "/realms/{{.realm}}"));
        assert_eq!(metadata.alias_from_attribute, "realm");
        assert_eq!(metadata.id_from_attribute, "realm");
    }

    #[test]
    fn path_existence() {
        let doc = json!({"paths": {"/realms/{realm}/users": {"get": {}}}});
        assert!(has_openapi_path("/realms/_/users/", &doc).unwrap());
        assert!(has_openapi_path("/realms/r*/users/", &doc).unwrap());
        assert!(!has_openapi_path("/realms/_", &doc).unwrap());
        assert!(has_openapi_path("/realms/acme/users", &doc).unwrap());
        assert!(!has_openapi_path("/realms/acme/groups", &doc).unwrap());
        assert!(!has_openapi_path("/realms/_/users/", &Value::Null).unwrap());
    }

    #[test]
    fn compaction_drops_defaults() {
        let doc = json!({"paths": {"/things": {"get": {}}, "/things/{id}": {"get": {}}}});
        let mut inferred = infer_from_openapi("/things/_", &doc).unwrap();
        let compact = compact_inferred_metadata_defaults("/things/_", &inferred, &doc).unwrap();
        assert_eq!(compact.operations, None);
        assert_eq!(compact.collection_path, "");
        assert_eq!(compact.id_from_attribute, "id");

        let mut get = inferred.operation(Operation::Get).unwrap().clone();
        get.headers = Some([("X-Api".to_string(), "1".to_string())].into());
        inferred.set_operation(Operation::Get, get.clone());
        inferred.collection_path = "/v2/things".into();
        let compact = compact_inferred_metadata_defaults("/things/_", &inferred, &doc).unwrap();
        assert_eq!(compact.operations, Some(BTreeMap::from([("get".to_string(), get)])));
        assert_eq!(compact.collection_path, "/v2/things");
    }

    #[test]
    fn equivalence_ignores_whitespace_and_empty_collections() {
        let left = OperationSpec {
            method: " GET ".into(),
            path: "/a".into(),
            query: Some(Default::default()),
            suppress: Some(vec![]),
            ..OperationSpec::default()
        };
        let right = OperationSpec {
            method: "GET".into(),
            path: "/a ".into(),
            ..OperationSpec::default()
        };
        assert!(operation_specs_equivalent(&left, &right));
        let different = OperationSpec {
            jq: ".".into(),
            ..right.clone()
        };
        assert!(!operation_specs_equivalent(&left, &different));
    }
}
