//! Layered override semantics for metadata values.
//!
//! Scalars take the overlay only when non-empty. Lists are replaced
//! wholesale when the overlay sets them, so an overlay's empty list clears an
//! inherited one. Operation maps merge key by key.

use super::{
    normalize_transform_order, OperationSpec, OperationValidationSpec, ResourceMetadata,
    StringMap, TransformStep,
};

/// Fold `overlay` onto `base`.
#[must_use]
pub fn merge_resource_metadata(
    base: &ResourceMetadata,
    overlay: &ResourceMetadata,
) -> ResourceMetadata {
    let mut merged = base.clone();

    override_str(&mut merged.id_from_attribute, &overlay.id_from_attribute);
    override_str(&mut merged.alias_from_attribute, &overlay.alias_from_attribute);
    override_str(&mut merged.collection_path, &overlay.collection_path);
    override_list(
        &mut merged.secrets_from_attributes,
        &overlay.secrets_from_attributes,
    );

    if let Some(overlay_ops) = &overlay.operations {
        let ops = merged.operations.get_or_insert_with(Default::default);
        for (key, spec) in overlay_ops {
            let combined = match ops.get(key) {
                Some(existing) => merge_operation_spec(existing, spec),
                None => merge_operation_spec(&OperationSpec::default(), spec),
            };
            ops.insert(key.clone(), combined);
        }
    }

    override_list(&mut merged.filter, &overlay.filter);
    override_list(&mut merged.suppress, &overlay.suppress);
    override_str(&mut merged.jq, &overlay.jq);
    merged.payload_transform_order = merge_transform_order(
        &merged.payload_transform_order,
        &overlay.payload_transform_order,
    );

    merged
}

/// Fold one operation spec onto another.
///
/// A present but empty `query`/`headers` overlay clears the base map; a
/// non-empty one merges its keys into it.
#[must_use]
pub fn merge_operation_spec(base: &OperationSpec, overlay: &OperationSpec) -> OperationSpec {
    let mut merged = base.clone();

    override_str(&mut merged.method, &overlay.method);
    override_str(&mut merged.path, &overlay.path);
    merge_string_map(&mut merged.query, overlay.query.as_ref());
    merge_string_map(&mut merged.headers, overlay.headers.as_ref());
    override_str(&mut merged.accept, &overlay.accept);
    override_str(&mut merged.content_type, &overlay.content_type);
    if overlay.body.is_some() {
        merged.body.clone_from(&overlay.body);
    }
    override_list(&mut merged.filter, &overlay.filter);
    override_list(&mut merged.suppress, &overlay.suppress);
    override_str(&mut merged.jq, &overlay.jq);
    merged.validate = merge_validation(merged.validate.as_ref(), overlay.validate.as_ref());
    merged.payload_transform_order = merge_transform_order(
        &merged.payload_transform_order,
        &overlay.payload_transform_order,
    );

    merged
}

/// Merge two declared transform orders.
///
/// Base steps the overlay does not mention keep their relative order; the
/// overlay's steps follow in overlay order.
#[must_use]
pub fn merge_transform_order(
    base: &[TransformStep],
    overlay: &[TransformStep],
) -> Vec<TransformStep> {
    let base = normalize_transform_order(base);
    let overlay = normalize_transform_order(overlay);
    if overlay.is_empty() {
        return base;
    }

    let mut merged: Vec<TransformStep> = base
        .into_iter()
        .filter(|step| !overlay.contains(step))
        .collect();
    merged.extend(overlay);
    merged
}

fn merge_validation(
    base: Option<&OperationValidationSpec>,
    overlay: Option<&OperationValidationSpec>,
) -> Option<OperationValidationSpec> {
    let Some(overlay) = overlay else {
        return base.cloned();
    };

    let mut merged = base.cloned().unwrap_or_default();
    override_list(&mut merged.required_attributes, &overlay.required_attributes);
    if overlay.assertions.is_some() {
        merged.assertions.clone_from(&overlay.assertions);
    }
    override_str(&mut merged.schema_ref, &overlay.schema_ref);
    Some(merged)
}

fn merge_string_map(target: &mut Option<StringMap>, overlay: Option<&StringMap>) {
    let Some(overlay) = overlay else {
        return;
    };
    if overlay.is_empty() {
        *target = Some(StringMap::new());
        return;
    }
    let map = target.get_or_insert_with(StringMap::new);
    for (key, value) in overlay {
        map.insert(key.clone(), value.clone());
    }
}

fn override_str(target: &mut String, overlay: &str) {
    if !overlay.is_empty() {
        overlay.clone_into(target);
    }
}

fn override_list(target: &mut Option<Vec<String>>, overlay: &Option<Vec<String>>) {
    if overlay.is_some() {
        target.clone_from(overlay);
    }
}
