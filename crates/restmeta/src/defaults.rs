//! Built-in operation defaults.

use std::collections::BTreeMap;

use crate::model::{Operation, OperationSpec, ResourceMetadata, StringMap};

/// Media type template that follows the configured resource format.
pub const RESOURCE_MEDIA_TYPE_TEMPLATE: &str = "application/{{resource_format .}}";

/// HTTP method used when an operation does not set one.
#[must_use]
pub fn default_operation_method(operation: Operation) -> &'static str {
    match operation {
        Operation::Create => "POST",
        Operation::Update => "PUT",
        Operation::Delete => "DELETE",
        Operation::Get | Operation::List | Operation::Compare => "GET",
    }
}

/// Path template used when an operation does not set one.
///
/// Collection-level operations target the collection itself; the others
/// target `{{.id}}` inside it.
#[must_use]
pub fn default_operation_path(operation: Operation) -> &'static str {
    match operation {
        Operation::Create | Operation::List => ".",
        Operation::Get | Operation::Update | Operation::Delete | Operation::Compare => "./{{.id}}",
    }
}

/// Metadata every resolved document is layered on top of.
///
/// Each operation gets its default method and path, an `Accept` header
/// following the resource format, and (for `create`/`update`) a matching
/// `Content-Type`. Suppress lists are explicitly empty.
#[must_use]
pub fn default_resource_metadata() -> ResourceMetadata {
    let operations: BTreeMap<String, OperationSpec> = Operation::ALL
        .into_iter()
        .map(|operation| {
            let content_type = match operation {
                Operation::Create | Operation::Update => RESOURCE_MEDIA_TYPE_TEMPLATE,
                _ => "",
            };
            let spec = OperationSpec {
                method: default_operation_method(operation).to_string(),
                path: default_operation_path(operation).to_string(),
                query: Some(StringMap::new()),
                headers: Some(StringMap::new()),
                accept: RESOURCE_MEDIA_TYPE_TEMPLATE.to_string(),
                content_type: content_type.to_string(),
                suppress: Some(Vec::new()),
                ..OperationSpec::default()
            };
            (operation.as_str().to_string(), spec)
        })
        .collect();

    ResourceMetadata {
        operations: Some(operations),
        suppress: Some(Vec::new()),
        ..ResourceMetadata::default()
    }
}
