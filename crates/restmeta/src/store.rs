//! Metadata storage contract, an in-memory store, and the service that ties
//! storage, resolution and rendering together.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_resource_metadata;
use crate::error::{Error, Result};
use crate::format::{normalize_resource_format, validate_resource_format, DEFAULT_RESOURCE_FORMAT};
use crate::model::{
    merge_resource_metadata, validate_resource_metadata, Operation, OperationSpec,
    ResourceMetadata,
};
use crate::path::{self, PathDescriptor, PLACEHOLDER};
use crate::render::{
    build_resource_scope, resolve_operation_spec_with_scope, resource_render_scope,
    ResourceContext,
};
use crate::resolver::{HierarchicalResolver, MetadataKind, MetadataLookup};

/// Persistent metadata keyed by logical metadata path.
///
/// `/customers/_` and `/customers/` address the collection slot of
/// `/customers`; `/customers/acme` addresses a resource slot.
pub trait MetadataStore {
    /// Stored metadata for `logical_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing is stored, or a validation
    /// error for a malformed path.
    fn get(&self, logical_path: &str) -> Result<ResourceMetadata>;

    /// Store `metadata` at `logical_path`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed path or invalid metadata.
    fn set(&mut self, logical_path: &str, metadata: ResourceMetadata) -> Result<()>;

    /// Remove the metadata at `logical_path` (no-op when absent).
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed path.
    fn unset(&mut self, logical_path: &str) -> Result<()>;
}

/// Selector and slot addressed by a logical metadata path.
///
/// # Errors
///
/// Returns a validation error for a malformed path or a resource slot at
/// the root.
pub fn parse_metadata_path(logical_path: &str) -> Result<(String, MetadataKind)> {
    let descriptor = PathDescriptor::parse(logical_path)?;
    let kind = if descriptor.collection {
        MetadataKind::Collection
    } else {
        MetadataKind::Resource
    };
    if kind == MetadataKind::Resource && descriptor.selector == "/" {
        return Err(Error::validation("resource metadata path must not target root"));
    }
    Ok((descriptor.selector, kind))
}

/// In-memory [`MetadataStore`].
///
/// Child enumeration follows a directory layout in which resource metadata
/// for `S` lives in directory `S` and collection metadata in `S/_`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryMetadataStore {
    entries: BTreeMap<(String, MetadataKind), ResourceMetadata>,
}

impl MemoryMetadataStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored `(selector, kind)` keys in order.
    pub fn keys(&self) -> impl Iterator<Item = (&str, MetadataKind)> {
        self.entries.keys().map(|(selector, kind)| (selector.as_str(), *kind))
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, logical_path: &str) -> Result<ResourceMetadata> {
        let (selector, kind) = parse_metadata_path(logical_path)?;
        self.entries
            .get(&(selector, kind))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("metadata {logical_path:?} not found")))
    }

    fn set(&mut self, logical_path: &str, metadata: ResourceMetadata) -> Result<()> {
        validate_resource_metadata(&metadata)?;
        let (selector, kind) = parse_metadata_path(logical_path)?;
        debug!(logical_path, selector = %selector, %kind, "metadata set");
        self.entries.insert((selector, kind), metadata);
        Ok(())
    }

    fn unset(&mut self, logical_path: &str) -> Result<()> {
        let (selector, kind) = parse_metadata_path(logical_path)?;
        if self.entries.remove(&(selector, kind)).is_none() {
            debug!(logical_path, "metadata unset no-op");
        }
        Ok(())
    }
}

impl MetadataLookup for MemoryMetadataStore {
    fn lookup(&self, selector: &str, kind: MetadataKind) -> Result<Option<ResourceMetadata>> {
        Ok(self.entries.get(&(selector.to_string(), kind)).cloned())
    }

    fn children(&self, selector: &str) -> Result<Vec<String>> {
        let depth = path::split_segments(selector).len();
        let mut children = BTreeSet::new();

        for (stored, kind) in self.entries.keys() {
            if stored == selector && *kind == MetadataKind::Collection {
                children.insert(PLACEHOLDER.to_string());
                continue;
            }
            let below = selector == "/" || stored.starts_with(&format!("{selector}/"));
            if !below {
                continue;
            }
            if let Some(next) = path::split_segments(stored).into_iter().nth(depth) {
                children.insert(next);
            }
        }

        Ok(children.into_iter().collect())
    }
}

/// Store + resolver + renderer.
#[derive(Debug, Clone)]
pub struct MetadataService<S> {
    store: S,
    resource_format: String,
}

impl<S> MetadataService<S>
where
    S: MetadataStore + MetadataLookup,
{
    /// Service over `store` rendering with the default resource format.
    pub fn new(store: S) -> Self {
        Self {
            store,
            resource_format: DEFAULT_RESOURCE_FORMAT.to_string(),
        }
    }

    /// Use `format` for `{{resource_format .}}`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unsupported format.
    pub fn with_resource_format(mut self, format: &str) -> Result<Self> {
        self.resource_format = validate_resource_format(format)?;
        Ok(self)
    }

    /// Configured resource format.
    pub fn resource_format(&self) -> &str {
        &self.resource_format
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Effective metadata for `logical_path`.
    ///
    /// # Errors
    ///
    /// See [`HierarchicalResolver::resolve_for_path`].
    pub fn resolve_for_path(&self, logical_path: &str) -> Result<ResourceMetadata> {
        HierarchicalResolver::new(&self.store).resolve_for_path(logical_path)
    }

    /// See [`HierarchicalResolver::collection_children`].
    ///
    /// # Errors
    ///
    /// See [`HierarchicalResolver::resolve_for_path`].
    pub fn collection_children(&self, logical_path: &str) -> Result<Vec<String>> {
        HierarchicalResolver::new(&self.store).collection_children(logical_path)
    }

    /// See [`HierarchicalResolver::has_collection_wildcard_child`].
    ///
    /// # Errors
    ///
    /// See [`HierarchicalResolver::resolve_for_path`].
    pub fn has_collection_wildcard_child(&self, logical_path: &str) -> Result<bool> {
        HierarchicalResolver::new(&self.store).has_collection_wildcard_child(logical_path)
    }

    /// Rendered `operation` for the resource at `logical_path`.
    ///
    /// The effective metadata is layered over
    /// [`default_resource_metadata`]; identity comes from `payload`.
    ///
    /// # Errors
    ///
    /// Propagates resolution and rendering failures.
    pub fn render_operation_spec(
        &self,
        logical_path: &str,
        operation: Operation,
        payload: &Value,
    ) -> Result<OperationSpec> {
        let target = path::normalize_logical_path(logical_path)?;
        let metadata = self.effective_metadata(&target)?;
        let scope = resource_render_scope(&target, &metadata, payload, &self.resource_format);

        let spec = resolve_operation_spec_with_scope(&metadata, operation, &scope)?;
        debug!(logical_path = %target, %operation, path = %spec.path, "metadata render done");
        Ok(spec)
    }

    /// Rendered `operation` for a resource whose identity is already known.
    ///
    /// Blank `resource.metadata` is replaced by the effective metadata of
    /// `resource.logical_path`.
    ///
    /// # Errors
    ///
    /// Propagates resolution and rendering failures.
    pub fn render_operation_spec_for_resource(
        &self,
        resource: &ResourceContext<'_>,
        operation: Operation,
    ) -> Result<OperationSpec> {
        let target = path::normalize_logical_path(resource.logical_path)?;
        let metadata = if resource.metadata.is_empty() {
            self.effective_metadata(&target)?
        } else {
            merge_resource_metadata(&default_resource_metadata(), resource.metadata)
        };

        let mut scope = build_resource_scope(&ResourceContext {
            logical_path: &target,
            metadata: &metadata,
            ..*resource
        });
        scope.insert(
            "resourceFormat".into(),
            normalize_resource_format(&self.resource_format).into(),
        );
        resolve_operation_spec_with_scope(&metadata, operation, &scope)
    }

    fn effective_metadata(&self, target: &str) -> Result<ResourceMetadata> {
        let resolved = self.resolve_for_path(target)?;
        Ok(merge_resource_metadata(&default_resource_metadata(), &resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StringMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn with_path(path: &str) -> ResourceMetadata {
        let mut metadata = ResourceMetadata::default();
        metadata.set_operation(
            Operation::Get,
            OperationSpec {
                path: path.into(),
                ..OperationSpec::default()
            },
        );
        metadata
    }

    #[test]
    fn slots_are_addressed_by_path_shape() {
        let mut store = MemoryMetadataStore::new();
        store.set("/customers/_", with_path("/a")).unwrap();
        store.set("/customers", with_path("/b")).unwrap();

        assert_eq!(store.get("/customers/").unwrap(), with_path("/a"));
        assert_eq!(store.get("/customers").unwrap(), with_path("/b"));
        assert_eq!(store.len(), 2);

        store.unset("/customers/_").unwrap();
        let err = store.get("/customers/_").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "metadata \"/customers/_\" not found");
        store.unset("/customers/_").unwrap();
    }

    #[test]
    fn root_is_a_collection_slot() {
        let mut store = MemoryMetadataStore::new();
        store.set("/", ResourceMetadata::default()).unwrap();
        assert_eq!(
            parse_metadata_path("/").unwrap(),
            ("/".to_string(), MetadataKind::Collection)
        );
        assert!(parse_metadata_path("").is_err());
        assert!(parse_metadata_path("relative").is_err());
    }

    #[test]
    fn set_validates_metadata() {
        let mut store = MemoryMetadataStore::new();
        let bogus = ResourceMetadata {
            operations: Some(BTreeMap::from([("patch".to_string(), OperationSpec::default())])),
            ..ResourceMetadata::default()
        };
        let err = store.set("/customers/_", bogus).unwrap_err();
        assert_eq!(err.to_string(), "unsupported metadata operation \"patch\"");
        assert!(store.is_empty());
    }

    #[test]
    fn children_mirror_directory_layout() {
        let mut store = MemoryMetadataStore::new();
        store.set("/c/_", ResourceMetadata::default()).unwrap();
        store.set("/c/a*/", ResourceMetadata::default()).unwrap();
        store.set("/c/alpha", ResourceMetadata::default()).unwrap();
        store.set("/admin/realms/_/clients/_", ResourceMetadata::default()).unwrap();

        assert_eq!(store.children("/").unwrap(), vec!["admin", "c"]);
        assert_eq!(store.children("/c").unwrap(), vec!["_", "a*", "alpha"]);
        assert_eq!(store.children("/admin/realms").unwrap(), vec!["_"]);
        assert_eq!(store.children("/admin/realms/_/clients").unwrap(), vec!["_"]);
        assert!(store.children("/missing").unwrap().is_empty());
    }

    #[test]
    fn service_renders_with_defaults() {
        let mut store = MemoryMetadataStore::new();
        store
            .set(
                "/customers/_",
                ResourceMetadata {
                    collection_path: "/api/v1/customers".into(),
                    id_from_attribute: "id".into(),
                    ..ResourceMetadata::default()
                },
            )
            .unwrap();
        let mut overlay = ResourceMetadata::default();
        overlay.set_operation(
            Operation::Get,
            OperationSpec {
                headers: Some(StringMap::from([("X-Tenant".into(), "{{.alias}}".into())])),
                ..OperationSpec::default()
            },
        );
        store.set("/customers/acme", overlay).unwrap();

        let service = MetadataService::new(store).with_resource_format("yaml").unwrap();
        let spec = service
            .render_operation_spec("/customers/acme", Operation::Get, &json!({"id": 42}))
            .unwrap();
        assert_eq!(spec.method, "GET");
        assert_eq!(spec.path, "/api/v1/customers/42");
        assert_eq!(spec.accept, "application/yaml");
        assert_eq!(spec.headers.unwrap()["X-Tenant"], "acme");

        let list = service
            .render_operation_spec("/customers/acme", Operation::List, &Value::Null)
            .unwrap();
        assert_eq!(list.path, "/api/v1/customers");
    }

    #[test]
    fn service_renders_for_known_resource() {
        let service = MetadataService::new(MemoryMetadataStore::new());
        let explicit = ResourceMetadata {
            collection_path: "/api/things".into(),
            ..ResourceMetadata::default()
        };
        let payload = json!({});
        let spec = service
            .render_operation_spec_for_resource(
                &ResourceContext {
                    logical_path: "/things/t1",
                    collection_path: "",
                    alias: "t1",
                    remote_id: "remote-1",
                    metadata: &explicit,
                    payload: &payload,
                },
                Operation::Delete,
            )
            .unwrap();
        assert_eq!(spec.method, "DELETE");
        assert_eq!(spec.path, "/api/things/remote-1");
        assert!(service.with_resource_format("xml").is_err());
    }
}
