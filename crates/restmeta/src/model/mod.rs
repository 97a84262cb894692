//! Metadata value types.
//!
//! [`ResourceMetadata`] is the persisted and merged unit; it carries one
//! [`OperationSpec`] per [`Operation`]. List-valued fields are `Option`s so an
//! explicitly empty list (which clears inherited values when merged) stays
//! distinguishable from an absent one.

mod merge;
mod wire;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use merge::{merge_operation_spec, merge_resource_metadata, merge_transform_order};

/// String-to-string template map (query parameters, headers).
pub type StringMap = BTreeMap<String, String>;

/// Remote operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// Read one resource.
    Get,
    /// Create a resource in its collection.
    Create,
    /// Replace or patch one resource.
    Update,
    /// Delete one resource.
    Delete,
    /// List a collection.
    List,
    /// Read one resource for comparison with its local copy.
    Compare,
}

impl Operation {
    /// All operations, in canonical order.
    pub const ALL: [Operation; 6] = [
        Self::Get,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::List,
        Self::Compare,
    ];

    /// Key used in [`ResourceMetadata::operations`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Compare => "compare",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unsupported metadata operation {s:?}")))
    }
}

/// A payload shaping step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransformStep {
    /// Keep only the listed attributes.
    #[serde(rename = "filterAttributes")]
    Filter,
    /// Drop the listed attributes.
    #[serde(rename = "suppressAttributes")]
    Suppress,
    /// Apply the jq expression.
    #[serde(rename = "jqExpression")]
    Jq,
}

impl TransformStep {
    /// Default application order.
    pub const DEFAULT_ORDER: [TransformStep; 3] = [Self::Filter, Self::Suppress, Self::Jq];

    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filterAttributes",
            Self::Suppress => "suppressAttributes",
            Self::Jq => "jqExpression",
        }
    }

    /// Map a wire key (canonical or alias) to its step.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "filterAttributes" | "filter" => Some(Self::Filter),
            "suppressAttributes" | "suppress" | "ignoreAttributes" => Some(Self::Suppress),
            "jqExpression" | "jq" => Some(Self::Jq),
            _ => None,
        }
    }
}

/// Drop duplicate steps, keeping first occurrences.
pub(crate) fn normalize_transform_order(order: &[TransformStep]) -> Vec<TransformStep> {
    let mut out = Vec::with_capacity(order.len());
    for step in order {
        if !out.contains(step) {
            out.push(*step);
        }
    }
    out
}

/// One message + jq expression pair checked against a request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationAssertion {
    /// Message reported when the assertion fails.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// jq expression that must evaluate truthy.
    #[serde(default, alias = "expression")]
    pub jq: String,
}

/// Request validation attached to an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct OperationValidationSpec {
    /// Attributes that must be present (sorted, deduplicated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_attributes: Option<Vec<String>>,
    /// Assertions, in evaluation order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertions: Option<Vec<ValidationAssertion>>,
    /// Provenance tag (`openapi:request-body`, `openapi:#/...`).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema_ref: String,
}

/// How one operation is issued against the remote API.
///
/// Serializes in a flat, rendered-output shape; metadata documents use the
/// nested wire format of [`ResourceMetadata`] instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
    /// HTTP method template.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Path template: absolute (`/...`), collection-relative (`./...`) or bare.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Query parameter templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<StringMap>,
    /// Header templates (without `Accept`/`Content-Type`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<StringMap>,
    /// `Accept` media type template.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub accept: String,
    /// `Content-Type` media type template.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    /// Request body (not rendered).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Attributes kept in payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,
    /// Attributes removed from payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress: Option<Vec<String>>,
    /// jq expression applied to payloads.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jq: String,
    /// Request validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<OperationValidationSpec>,
    /// Declared order of the payload transform steps.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub payload_transform_order: Vec<TransformStep>,
}

impl OperationSpec {
    /// Enabled payload transform steps in application order.
    ///
    /// Declared steps come first; enabled steps the declaration omits follow
    /// in [`TransformStep::DEFAULT_ORDER`]. Filter and suppress are enabled
    /// when set (even to an empty list), jq when non-blank.
    #[must_use]
    pub fn ordered_transform_steps(&self) -> Vec<TransformStep> {
        let enabled = |step: TransformStep| match step {
            TransformStep::Filter => self.filter.is_some(),
            TransformStep::Suppress => self.suppress.is_some(),
            TransformStep::Jq => !self.jq.trim().is_empty(),
        };

        let mut ordered = Vec::with_capacity(3);
        for step in self
            .payload_transform_order
            .iter()
            .chain(TransformStep::DEFAULT_ORDER.iter())
        {
            if enabled(*step) && !ordered.contains(step) {
                ordered.push(*step);
            }
        }
        ordered
    }
}

/// Declarative description of a remote resource or collection.
///
/// Serializes to and from the nested `resourceInfo`/`operationInfo` document
/// shape (legacy flat documents are accepted on read).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "wire::ResourceMetadataWire", into = "wire::ResourceMetadataWire")]
pub struct ResourceMetadata {
    /// Attribute holding the remote identifier.
    pub id_from_attribute: String,
    /// Attribute holding the human-facing alias.
    pub alias_from_attribute: String,
    /// Remote collection path template.
    pub collection_path: String,
    /// Attributes holding secret material.
    pub secrets_from_attributes: Option<Vec<String>>,
    /// Per-operation specs keyed by [`Operation::as_str`].
    pub operations: Option<BTreeMap<String, OperationSpec>>,
    /// Default attributes kept in payloads.
    pub filter: Option<Vec<String>>,
    /// Default attributes removed from payloads.
    pub suppress: Option<Vec<String>>,
    /// Default jq expression.
    pub jq: String,
    /// Default payload transform order.
    pub payload_transform_order: Vec<TransformStep>,
}

impl ResourceMetadata {
    /// Spec for `operation`, if present.
    #[must_use]
    pub fn operation(&self, operation: Operation) -> Option<&OperationSpec> {
        self.operations.as_ref()?.get(operation.as_str())
    }

    /// Insert or replace the spec for `operation`.
    pub fn set_operation(&mut self, operation: Operation, spec: OperationSpec) {
        self.operations
            .get_or_insert_with(BTreeMap::new)
            .insert(operation.as_str().to_string(), spec);
    }

    /// `true` when no field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_from_attribute.trim().is_empty()
            && self.alias_from_attribute.trim().is_empty()
            && self.collection_path.trim().is_empty()
            && self.secrets_from_attributes.is_none()
            && self.operations.is_none()
            && self.filter.is_none()
            && self.suppress.is_none()
            && self.jq.trim().is_empty()
    }

    /// Decode a JSON metadata document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or unknown fields.
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Decode a YAML metadata document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML or unknown fields.
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(data)?)
    }

    /// Encode as a pretty-printed JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Encode as a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

/// Check a metadata document before it is stored.
///
/// # Errors
///
/// Returns a validation error for unknown operation keys, blank required
/// attributes, assertions without an expression, or an unsupported
/// `schemaRef`.
pub fn validate_resource_metadata(metadata: &ResourceMetadata) -> Result<()> {
    let Some(operations) = &metadata.operations else {
        return Ok(());
    };

    for (key, spec) in operations {
        key.parse::<Operation>()?;

        let Some(validate) = &spec.validate else {
            continue;
        };
        if validate
            .required_attributes
            .iter()
            .flatten()
            .any(|attr| attr.trim().is_empty())
        {
            return Err(Error::validation(format!(
                "metadata operation {key:?} requiredAttributes must not contain blank entries"
            )));
        }
        if validate
            .assertions
            .iter()
            .flatten()
            .any(|assertion| assertion.jq.trim().is_empty())
        {
            return Err(Error::validation(format!(
                "metadata operation {key:?} assertions require a jq expression"
            )));
        }
        let schema_ref = validate.schema_ref.trim();
        if !(schema_ref.is_empty()
            || schema_ref == crate::openapi::REQUEST_BODY_SCHEMA_REF
            || schema_ref.starts_with("openapi:#/"))
        {
            return Err(Error::validation(format!(
                "metadata operation {key:?} schemaRef {schema_ref:?} is not supported"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operation_names() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        let err = "patch".parse::<Operation>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported metadata operation \"patch\"");
    }

    #[test]
    fn transform_steps_follow_declared_order() {
        let spec = OperationSpec {
            filter: Some(vec!["/a".into()]),
            suppress: Some(vec![]),
            jq: ".".into(),
            payload_transform_order: vec![TransformStep::Jq, TransformStep::Filter],
            ..OperationSpec::default()
        };
        assert_eq!(
            spec.ordered_transform_steps(),
            vec![
                TransformStep::Jq,
                TransformStep::Filter,
                TransformStep::Suppress
            ]
        );
    }

    #[test]
    fn transform_steps_skip_disabled() {
        let spec = OperationSpec {
            jq: "  ".into(),
            suppress: Some(vec!["/secret".into()]),
            payload_transform_order: vec![TransformStep::Jq, TransformStep::Filter],
            ..OperationSpec::default()
        };
        assert_eq!(spec.ordered_transform_steps(), vec![TransformStep::Suppress]);
        assert!(OperationSpec::default().ordered_transform_steps().is_empty());
    }

    #[test]
    fn step_aliases() {
        assert_eq!(TransformStep::from_key("filter"), Some(TransformStep::Filter));
        assert_eq!(
            TransformStep::from_key("ignoreAttributes"),
            Some(TransformStep::Suppress)
        );
        assert_eq!(TransformStep::from_key("jq"), Some(TransformStep::Jq));
        assert_eq!(TransformStep::from_key("body"), None);
    }

    #[test]
    fn validation_rejects_unknown_operation() {
        let mut operations = BTreeMap::new();
        operations.insert("patch".to_string(), OperationSpec::default());
        let metadata = ResourceMetadata {
            operations: Some(operations),
            ..ResourceMetadata::default()
        };
        assert!(validate_resource_metadata(&metadata).is_err());
    }

    #[test]
    fn validation_checks_validate_block() {
        let mut metadata = ResourceMetadata::default();
        metadata.set_operation(
            Operation::Create,
            OperationSpec {
                validate: Some(OperationValidationSpec {
                    required_attributes: Some(vec!["name".into()]),
                    assertions: Some(vec![ValidationAssertion {
                        message: "name is required".into(),
                        jq: ".name != null".into(),
                    }]),
                    schema_ref: "openapi:#/components/schemas/Client".into(),
                }),
                ..OperationSpec::default()
            },
        );
        assert!(validate_resource_metadata(&metadata).is_ok());

        let mut blank = metadata.clone();
        if let Some(ops) = blank.operations.as_mut() {
            if let Some(validate) = ops.get_mut("create").and_then(|s| s.validate.as_mut()) {
                validate.schema_ref = "jsonschema:client".into();
            }
        }
        let err = validate_resource_metadata(&blank).unwrap_err();
        assert!(err.to_string().contains("schemaRef"));
    }

    #[test]
    fn empty_detection() {
        assert!(ResourceMetadata::default().is_empty());
        let metadata = ResourceMetadata {
            suppress: Some(vec![]),
            ..ResourceMetadata::default()
        };
        assert!(!metadata.is_empty());
    }
}
