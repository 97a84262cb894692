//! Document shape of [`ResourceMetadata`] (JSON and YAML).
//!
//! ```yaml
//! resourceInfo:
//!   idFromAttribute: id
//!   aliasFromAttribute: clientId
//!   collectionPath: /admin/realms/{{.realm}}/clients
//!   secretInAttributes: [secret]
//! operationInfo:
//!   defaults:
//!     payload:
//!       suppressAttributes: [/id]
//!   getResource:
//!     path: ./{{.id}}
//!     httpHeaders:
//!       - name: Accept
//!         value: application/json
//!   compareResources:
//!     ignoreAttributes: [/createdTimestamp]
//! ```
//!
//! Older flat documents (`idFromAttribute`, `operations: {get: ...}`,
//! `filter`, ...) are still accepted on read; the nested shape wins when both
//! are present. Writing always produces the nested shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::{
    normalize_transform_order, Operation, OperationSpec, OperationValidationSpec,
    ResourceMetadata, StringMap, TransformStep,
};

const ACCEPT: &str = "Accept";
const CONTENT_TYPE: &str = "Content-Type";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct ResourceMetadataWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_info: Option<ResourceInfoWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_info: Option<OperationInfoWire>,

    // Flat legacy fields.
    #[serde(skip_serializing_if = "String::is_empty")]
    id_from_attribute: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    alias_from_attribute: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    collection_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    secrets_from_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_in_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operations: Option<BTreeMap<String, OperationWire>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
    filter: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
    suppress: Option<Vec<String>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    jq: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
struct ResourceInfoWire {
    #[serde(skip_serializing_if = "String::is_empty")]
    id_from_attribute: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    alias_from_attribute: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    collection_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_in_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secrets_from_attributes: Option<Vec<String>>,
}

impl ResourceInfoWire {
    fn is_empty(&self) -> bool {
        self.id_from_attribute.trim().is_empty()
            && self.alias_from_attribute.trim().is_empty()
            && self.collection_path.trim().is_empty()
            && self.secret_in_attributes.is_none()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
struct OperationInfoWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    defaults: Option<DefaultsWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    get_resource: Option<OperationWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    create_resource: Option<OperationWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_resource: Option<OperationWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_resource: Option<OperationWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    list_collection: Option<OperationWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compare_resources: Option<OperationWire>,

    // Legacy operation names.
    #[serde(skip_serializing)]
    get: Option<OperationWire>,
    #[serde(skip_serializing)]
    create: Option<OperationWire>,
    #[serde(skip_serializing)]
    update: Option<OperationWire>,
    #[serde(skip_serializing)]
    delete: Option<OperationWire>,
    #[serde(skip_serializing)]
    list: Option<OperationWire>,
    #[serde(skip_serializing)]
    compare: Option<OperationWire>,
}

impl OperationInfoWire {
    fn slot(&mut self, operation: Operation) -> &mut Option<OperationWire> {
        match operation {
            Operation::Get => &mut self.get_resource,
            Operation::Create => &mut self.create_resource,
            Operation::Update => &mut self.update_resource,
            Operation::Delete => &mut self.delete_resource,
            Operation::List => &mut self.list_collection,
            Operation::Compare => &mut self.compare_resources,
        }
    }

    /// Legacy entries first so canonical names win.
    fn into_entries(self) -> Vec<(Operation, OperationWire)> {
        [
            (Operation::Get, self.get),
            (Operation::Create, self.create),
            (Operation::Update, self.update),
            (Operation::Delete, self.delete),
            (Operation::List, self.list),
            (Operation::Compare, self.compare),
            (Operation::Get, self.get_resource),
            (Operation::Create, self.create_resource),
            (Operation::Update, self.update_resource),
            (Operation::Delete, self.delete_resource),
            (Operation::List, self.list_collection),
            (Operation::Compare, self.compare_resources),
        ]
        .into_iter()
        .filter_map(|(op, wire)| wire.map(|w| (op, w)))
        .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DefaultsWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<PayloadWire>,

    // Legacy transform names.
    #[serde(skip_serializing, deserialize_with = "one_or_many")]
    filter: Option<Vec<String>>,
    #[serde(skip_serializing, deserialize_with = "one_or_many")]
    suppress: Option<Vec<String>>,
    #[serde(skip_serializing)]
    jq: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderWire {
    name: String,
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct UrlWire {
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
struct OperationWire {
    #[serde(skip_serializing_if = "String::is_empty")]
    http_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(skip_serializing)]
    url: Option<UrlWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<StringMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_headers: Option<Vec<HeaderWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<PayloadWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validate: Option<OperationValidationSpec>,

    // Top-level transforms of `compareResources`.
    #[serde(skip_serializing, deserialize_with = "one_or_many")]
    ignore_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
    filter_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "one_or_many")]
    suppress_attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jq_expression: Option<String>,

    // Legacy field names.
    #[serde(skip_serializing)]
    method: String,
    #[serde(skip_serializing)]
    headers: Option<StringMap>,
    #[serde(skip_serializing)]
    accept: String,
    #[serde(skip_serializing)]
    content_type: String,
    #[serde(skip_serializing, deserialize_with = "one_or_many")]
    filter: Option<Vec<String>>,
    #[serde(skip_serializing, deserialize_with = "one_or_many")]
    suppress: Option<Vec<String>>,
    #[serde(skip_serializing)]
    jq: Option<String>,
}

/// Transform block whose key order is significant.
#[derive(Debug, Default)]
struct PayloadWire {
    filter: Option<Vec<String>>,
    suppress: Option<Vec<String>>,
    jq: Option<String>,
    order: Vec<TransformStep>,
}

const PAYLOAD_FIELDS: &[&str] = &[
    "filterAttributes",
    "suppressAttributes",
    "jqExpression",
    "filter",
    "suppress",
    "jq",
];

impl<'de> Deserialize<'de> for PayloadWire {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = PayloadWire;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a payload transform mapping")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PayloadWire, A::Error> {
                let mut canonical = PayloadWire::default();
                let mut legacy = PayloadWire::default();
                let mut order = Vec::new();

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "filterAttributes" => {
                            canonical.filter = map.next_value::<Option<OneOrMany>>()?.map(Into::into);
                        }
                        "suppressAttributes" => {
                            canonical.suppress =
                                map.next_value::<Option<OneOrMany>>()?.map(Into::into);
                        }
                        "jqExpression" => canonical.jq = map.next_value()?,
                        "filter" => {
                            legacy.filter = map.next_value::<Option<OneOrMany>>()?.map(Into::into);
                        }
                        "suppress" => {
                            legacy.suppress = map.next_value::<Option<OneOrMany>>()?.map(Into::into);
                        }
                        "jq" => legacy.jq = map.next_value()?,
                        other => return Err(de::Error::unknown_field(other, PAYLOAD_FIELDS)),
                    }
                    if let Some(step) = TransformStep::from_key(key.trim()) {
                        order.push(step);
                    }
                }

                Ok(PayloadWire {
                    filter: canonical.filter.or(legacy.filter),
                    suppress: canonical.suppress.or(legacy.suppress),
                    jq: canonical.jq.or(legacy.jq),
                    order: normalize_transform_order(&order),
                })
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

impl Serialize for PayloadWire {
    /// Declared steps are written first, in order, even when unset; the
    /// remaining steps follow only when set.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut steps = normalize_transform_order(&self.order);
        let declared = steps.len();
        for step in TransformStep::DEFAULT_ORDER {
            if !steps.contains(&step) && self.is_set(step) {
                steps.push(step);
            }
        }

        let mut map = serializer.serialize_map(Some(steps.len()))?;
        for (idx, step) in steps.into_iter().enumerate() {
            let explicit = idx < declared;
            match step {
                TransformStep::Filter => map.serialize_entry(step.as_str(), &self.filter)?,
                TransformStep::Suppress => map.serialize_entry(step.as_str(), &self.suppress)?,
                TransformStep::Jq if explicit => {
                    map.serialize_entry(step.as_str(), self.jq.as_deref().unwrap_or_default())?;
                }
                TransformStep::Jq => map.serialize_entry(step.as_str(), &self.jq)?,
            }
        }
        map.end()
    }
}

impl PayloadWire {
    fn is_set(&self, step: TransformStep) -> bool {
        match step {
            TransformStep::Filter => self.filter.is_some(),
            TransformStep::Suppress => self.suppress.is_some(),
            TransformStep::Jq => self.jq.as_deref().is_some_and(|jq| !jq.trim().is_empty()),
        }
    }

    fn from_parts(
        filter: Option<&Vec<String>>,
        suppress: Option<&Vec<String>>,
        jq: &str,
        order: &[TransformStep],
    ) -> Option<Self> {
        if filter.is_none() && suppress.is_none() && jq.trim().is_empty() && order.is_empty() {
            return None;
        }
        Some(Self {
            filter: filter.cloned(),
            suppress: suppress.cloned(),
            jq: (!jq.trim().is_empty()).then(|| jq.to_string()),
            order: order.to_vec(),
        })
    }
}

/// A string list that may be written as a single scalar.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(Into::into))
}

// ---------------------------------------------------------------------------
// Wire -> model
// ---------------------------------------------------------------------------

impl From<ResourceMetadataWire> for ResourceMetadata {
    fn from(wire: ResourceMetadataWire) -> Self {
        let mut metadata = ResourceMetadata {
            id_from_attribute: wire.id_from_attribute,
            alias_from_attribute: wire.alias_from_attribute,
            collection_path: wire.collection_path,
            secrets_from_attributes: wire.secret_in_attributes.or(wire.secrets_from_attributes),
            operations: wire.operations.map(|ops| {
                ops.into_iter()
                    .map(|(key, op)| {
                        let compare = key == Operation::Compare.as_str();
                        (key, op.into_spec(compare))
                    })
                    .collect()
            }),
            filter: wire.filter,
            suppress: wire.suppress,
            jq: wire.jq,
            payload_transform_order: Vec::new(),
        };

        if let Some(info) = wire.resource_info {
            if !info.id_from_attribute.is_empty() {
                metadata.id_from_attribute = info.id_from_attribute;
            }
            if !info.alias_from_attribute.is_empty() {
                metadata.alias_from_attribute = info.alias_from_attribute;
            }
            if !info.collection_path.is_empty() {
                metadata.collection_path = info.collection_path;
            }
            if let Some(secrets) = info.secret_in_attributes.or(info.secrets_from_attributes) {
                metadata.secrets_from_attributes = Some(secrets);
            }
        }

        if let Some(mut info) = wire.operation_info {
            let defaults = info.defaults.take();
            let has_defaults = defaults.is_some();
            let entries = info.into_entries();
            let explicit_empty = entries.is_empty();

            if !entries.is_empty() {
                let ops = metadata.operations.get_or_insert_with(BTreeMap::new);
                for (operation, op) in entries {
                    let spec = op.into_spec(operation == Operation::Compare);
                    ops.insert(operation.as_str().to_string(), spec);
                }
            }

            if let Some(defaults) = defaults {
                if let Some(payload) = defaults.payload {
                    metadata.payload_transform_order = payload.order;
                    if payload.filter.is_some() {
                        metadata.filter = payload.filter;
                    }
                    if payload.suppress.is_some() {
                        metadata.suppress = payload.suppress;
                    }
                    if let Some(jq) = payload.jq {
                        metadata.jq = jq;
                    }
                } else {
                    if defaults.filter.is_some() {
                        metadata.filter = defaults.filter;
                    }
                    if defaults.suppress.is_some() {
                        metadata.suppress = defaults.suppress;
                    }
                    if let Some(jq) = defaults.jq {
                        metadata.jq = jq;
                    }
                }
            }

            if metadata.operations.is_none() && !has_defaults && explicit_empty {
                metadata.operations = Some(BTreeMap::new());
            }
        }

        metadata
    }
}

impl OperationWire {
    fn into_spec(self, compare: bool) -> OperationSpec {
        let path = match self.url {
            Some(url) if self.path.trim().is_empty() => url.path,
            _ => self.path,
        };
        let method = if self.http_method.trim().is_empty() {
            self.method
        } else {
            self.http_method
        };

        let (headers, explicit_empty) = match (self.http_headers, self.headers) {
            (Some(list), _) => {
                let empty = list.is_empty();
                let map: StringMap = list.into_iter().map(|h| (h.name, h.value)).collect();
                (Some(map), empty)
            }
            (None, Some(map)) => {
                let empty = map.is_empty();
                (Some(map), empty)
            }
            (None, None) => (None, false),
        };

        let mut spec = OperationSpec {
            method,
            path,
            query: self.query,
            headers,
            accept: self.accept,
            content_type: self.content_type,
            body: self.body,
            validate: self.validate,
            ..OperationSpec::default()
        };
        promote_media_headers(&mut spec, explicit_empty);

        let payload = self.payload;
        if compare {
            let (p_filter, p_suppress, p_jq, p_order) = match payload {
                Some(p) => (p.filter, p.suppress, p.jq, p.order),
                None => (None, None, None, Vec::new()),
            };
            spec.filter = self.filter_attributes.or(p_filter).or(self.filter);
            spec.suppress = self
                .suppress_attributes
                .or(self.ignore_attributes)
                .or(p_suppress)
                .or(self.suppress);
            spec.jq = self.jq_expression.or(p_jq).or(self.jq).unwrap_or_default();
            spec.payload_transform_order = p_order;
        } else if let Some(p) = payload {
            spec.filter = p.filter;
            spec.suppress = p.suppress;
            spec.jq = p.jq.unwrap_or_default();
            spec.payload_transform_order = p.order;
        } else {
            spec.filter = self.filter;
            spec.suppress = self.suppress;
            spec.jq = self.jq.unwrap_or_default();
        }

        spec
    }
}

/// Move `Accept`/`Content-Type` out of the header map into their own fields.
fn promote_media_headers(spec: &mut OperationSpec, keep_explicit_empty: bool) {
    let Some(headers) = spec.headers.as_mut() else {
        return;
    };

    if let Some(value) = take_header(headers, ACCEPT) {
        if spec.accept.trim().is_empty() {
            spec.accept = value;
        }
    }
    if let Some(value) = take_header(headers, CONTENT_TYPE) {
        if spec.content_type.trim().is_empty() {
            spec.content_type = value;
        }
    }

    if headers.is_empty() && !keep_explicit_empty {
        spec.headers = None;
    }
}

fn take_header(headers: &mut StringMap, name: &str) -> Option<String> {
    let key = headers
        .keys()
        .find(|k| k.trim().eq_ignore_ascii_case(name))?
        .clone();
    headers.remove(&key)
}

// ---------------------------------------------------------------------------
// Model -> wire
// ---------------------------------------------------------------------------

impl From<ResourceMetadata> for ResourceMetadataWire {
    fn from(metadata: ResourceMetadata) -> Self {
        let resource_info = ResourceInfoWire {
            id_from_attribute: metadata.id_from_attribute,
            alias_from_attribute: metadata.alias_from_attribute,
            collection_path: metadata.collection_path,
            secret_in_attributes: metadata.secrets_from_attributes,
            secrets_from_attributes: None,
        };

        let mut info = OperationInfoWire {
            defaults: PayloadWire::from_parts(
                metadata.filter.as_ref(),
                metadata.suppress.as_ref(),
                &metadata.jq,
                &metadata.payload_transform_order,
            )
            .map(|payload| DefaultsWire {
                payload: Some(payload),
                ..DefaultsWire::default()
            }),
            ..OperationInfoWire::default()
        };

        let has_operations = metadata.operations.is_some();
        for (key, spec) in metadata.operations.into_iter().flatten() {
            // Unknown keys cannot be expressed in the nested shape.
            let Ok(operation) = key.parse::<Operation>() else {
                continue;
            };
            *info.slot(operation) = Some(OperationWire::from_spec(operation, spec));
        }

        let has_info = has_operations
            || info.defaults.is_some()
            || Operation::ALL.iter().any(|op| info.slot(*op).is_some());

        ResourceMetadataWire {
            resource_info: (!resource_info.is_empty()).then_some(resource_info),
            operation_info: has_info.then_some(info),
            ..ResourceMetadataWire::default()
        }
    }
}

impl OperationWire {
    fn from_spec(operation: Operation, spec: OperationSpec) -> Self {
        let headers = media_headers_to_list(spec.headers, &spec.accept, &spec.content_type);

        let mut wire = OperationWire {
            http_method: spec.method,
            path: spec.path,
            query: spec.query,
            http_headers: headers,
            body: spec.body,
            validate: spec.validate,
            ..OperationWire::default()
        };

        if operation == Operation::Compare {
            if spec.filter.is_some() || spec.suppress.is_some() || !spec.jq.trim().is_empty() {
                wire.filter_attributes = spec.filter;
                wire.suppress_attributes = spec.suppress;
                wire.jq_expression = (!spec.jq.trim().is_empty()).then_some(spec.jq);
            }
        } else {
            wire.payload = PayloadWire::from_parts(
                spec.filter.as_ref(),
                spec.suppress.as_ref(),
                &spec.jq,
                &spec.payload_transform_order,
            );
        }

        wire
    }
}

/// Headers sorted by name with `Accept`/`Content-Type` folded back in.
fn media_headers_to_list(
    headers: Option<StringMap>,
    accept: &str,
    content_type: &str,
) -> Option<Vec<HeaderWire>> {
    let mut headers = headers;
    for (name, value) in [(ACCEPT, accept), (CONTENT_TYPE, content_type)] {
        if value.trim().is_empty() {
            continue;
        }
        let map = headers.get_or_insert_with(StringMap::new);
        map.retain(|key, _| !key.trim().eq_ignore_ascii_case(name));
        map.insert(name.to_string(), value.to_string());
    }

    headers.map(|map| {
        map.into_iter()
            .map(|(name, value)| HeaderWire { name, value })
            .collect()
    })
}
