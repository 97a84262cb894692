#![allow(clippy::doc_markdown)] // README uses "OpenAPI" proper noun throughout
#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! ## API Reference

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod defaults;
mod error;
mod format;
mod glob;
mod model;
mod openapi;
mod path;
mod render;
mod resolver;
mod store;

pub use config::BundleConfig;
pub use defaults::{
    default_operation_method, default_operation_path, default_resource_metadata,
    RESOURCE_MEDIA_TYPE_TEMPLATE,
};
pub use error::{Error, ErrorKind, Result};
pub use format::{
    normalize_resource_format, resolve_resource_format_templates_in_metadata,
    resource_format_media_type, validate_resource_format, DEFAULT_RESOURCE_FORMAT,
};
pub use model::{
    merge_operation_spec, merge_resource_metadata, merge_transform_order,
    validate_resource_metadata, Operation, OperationSpec, OperationValidationSpec,
    ResourceMetadata, StringMap, TransformStep, ValidationAssertion,
};
pub use openapi::{
    compact_inferred_metadata_defaults, has_openapi_path, infer_from_openapi,
    REQUEST_BODY_SCHEMA_REF,
};
pub use path::{normalize_logical_path, PathDescriptor, PLACEHOLDER};
pub use render::{
    build_operation_scope, build_resource_scope, derive_path_template_fields,
    render_resource_metadata, resolve_alias_and_remote_id, resolve_operation_spec,
    resolve_operation_spec_with_scope, scope_from_value, RenderScope, ResourceContext,
};
pub use resolver::{HierarchicalResolver, MetadataKind, MetadataLookup};
pub use store::{parse_metadata_path, MemoryMetadataStore, MetadataService, MetadataStore};

/// Shell-style glob helpers used for selector segments.
///
/// **Not covered by semver guarantees.** Exposed for tooling that needs to
/// validate selector names the same way the resolver does.
#[doc(hidden)]
pub mod internal {
    pub use crate::glob::{has_wildcard, matches, validate, BadPattern};
}
