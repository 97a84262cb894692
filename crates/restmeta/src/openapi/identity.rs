//! Naming heuristics: placeholders, identity attributes, secrets.

use std::collections::{BTreeMap, BTreeSet};

use super::Target;
use crate::glob;
use crate::path::PLACEHOLDER;

const ALIAS_CANDIDATES: [&str; 7] = ["clientId", "alias", "name", "id", "key", "uuid", "uid"];

fn is_selector_segment(segment: &str) -> bool {
    segment.is_empty() || segment == PLACEHOLDER || glob::has_wildcard(segment)
}

/// Collection and item path templates for a collection target.
///
/// Every `_` or glob segment becomes `{{.<name>}}` with a name derived from
/// the closest literal segment before it; the item path appends
/// `{{.<identity>}}` (`id` when blank). Resource targets yield `None`.
pub(super) fn template_paths(target: &Target, identity: &str) -> Option<(String, String)> {
    if !target.collection {
        return None;
    }
    let suffix = match identity.trim() {
        "" => "id",
        other => other,
    };

    let mut used = BTreeMap::new();
    let segments: Vec<String> = target
        .segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            if segment == PLACEHOLDER || glob::has_wildcard(segment) {
                format!("{{{{.{}}}}}", placeholder_name(&target.segments, idx, &mut used))
            } else {
                segment.clone()
            }
        })
        .collect();

    let collection = crate::path::join_absolute(&segments);
    let resource = if collection == "/" {
        format!("/{{{{.{suffix}}}}}")
    } else {
        format!("{collection}/{{{{.{suffix}}}}}")
    };
    Some((collection, resource))
}

/// `realm` for `/realms/_`, `segment1` when no literal precedes, with a
/// numeric suffix on reuse (`realm2`).
fn placeholder_name(segments: &[String], idx: usize, used: &mut BTreeMap<String, usize>) -> String {
    let candidate = segments[..idx]
        .iter()
        .rev()
        .map(|s| s.trim())
        .find(|s| !is_selector_segment(s))
        .map(singularize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("segment{}", idx + 1));

    let count = used.entry(candidate.clone()).or_insert(0);
    *count += 1;
    if *count > 1 {
        format!("{candidate}{count}")
    } else {
        candidate
    }
}

/// `(id_attribute, alias_attribute)` for a collection target.
///
/// The alias is the trailing OpenAPI path variable when the response schema
/// confirms it (or there is no schema), else a well-known schema property,
/// else the singular collection name (`client` maps to `clientId`). The id
/// is forced to `id` when the schema exposes `id` or the alias ends in `id`.
pub(super) fn identity_attributes(
    target: &Target,
    openapi_identity: &str,
    schema_attributes: &BTreeSet<String>,
) -> (String, String) {
    let mut alias = String::new();
    let mut alias_from_identity = false;

    let candidate = openapi_identity.trim();
    if !candidate.is_empty()
        && (schema_attributes.is_empty() || contains_attribute(schema_attributes, candidate))
    {
        alias = candidate.to_string();
        alias_from_identity = true;
    }
    if alias.is_empty() {
        alias = ALIAS_CANDIDATES
            .iter()
            .find(|c| contains_attribute(schema_attributes, c))
            .map(|c| (*c).to_string())
            .unwrap_or_default();
    }
    if alias.is_empty() {
        alias = match singularize(&collection_name(target)).as_str() {
            "" => "id".to_string(),
            "client" => "clientId".to_string(),
            other => other.to_string(),
        };
    }

    let lowered = alias.to_ascii_lowercase();
    let id = if (!alias_from_identity && contains_attribute(schema_attributes, "id"))
        || (lowered.ends_with("id") && lowered != "id")
    {
        "id".to_string()
    } else {
        alias.clone()
    };

    (id, alias)
}

/// Exact or case-insensitive membership.
fn contains_attribute(attributes: &BTreeSet<String>, value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && (attributes.contains(value)
            || attributes.iter().any(|a| a.trim().eq_ignore_ascii_case(value)))
}

/// Last literal segment of the target.
pub(super) fn collection_name(target: &Target) -> String {
    target
        .segments
        .iter()
        .rev()
        .map(|s| s.trim())
        .find(|s| !is_selector_segment(s))
        .unwrap_or_default()
        .to_string()
}

/// Collections named `clients`, or containing `secret`/`credential`.
pub(super) fn holds_secrets(target: &Target) -> bool {
    let name = collection_name(target).to_ascii_lowercase();
    !name.is_empty() && (name == "clients" || name.contains("secret") || name.contains("credential"))
}

/// Singular form of the last `-`/`_`/`.` separated word.
pub(super) fn singularize(token: &str) -> String {
    let normalized = token.trim().replace(['-', '.'], "_");
    let last = normalized.rsplit('_').next().unwrap_or_default().trim();
    let lowered = last.to_ascii_lowercase();

    if lowered.ends_with("ies") && last.len() > 3 {
        format!("{}y", &last[..last.len() - 3])
    } else if lowered.ends_with('s') && last.len() > 1 {
        last[..last.len() - 1].to_string()
    } else {
        last.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collection(path: &str) -> Target {
        Target {
            selector: path.to_string(),
            segments: crate::path::split_segments(path),
            collection: true,
        }
    }

    fn attrs(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn singular_forms() {
        assert_eq!(singularize("policies"), "policy");
        assert_eq!(singularize("client-scopes"), "scope");
        assert_eq!(singularize("identity.providers"), "provider");
        assert_eq!(singularize("Users"), "User");
        assert_eq!(singularize("s"), "s");
        assert_eq!(singularize("ies"), "ie");
        assert_eq!(singularize("data"), "data");
        assert_eq!(singularize("  "), "");
    }

    #[test]
    fn placeholder_templates() {
        let (list, item) = template_paths(&collection("/admin/realms/_/clients"), "clientId").unwrap();
        assert_eq!(list, "/admin/realms/{{.realm}}/clients");
        assert_eq!(item, "/admin/realms/{{.realm}}/clients/{{.clientId}}");

        let (list, item) = template_paths(&collection("/_/a/_/b*"), "").unwrap();
        assert_eq!(list, "/{{.segment1}}/a/{{.a}}/{{.a2}}");
        assert_eq!(item, "/{{.segment1}}/a/{{.a}}/{{.a2}}/{{.id}}");

        let (root, item) = template_paths(&collection("/"), "").unwrap();
        assert_eq!((root.as_str(), item.as_str()), ("/", "/{{.id}}"));

        let mut resource = collection("/a");
        resource.collection = false;
        assert_eq!(template_paths(&resource, "id"), None);
    }

    #[test]
    fn identity_from_openapi_variable() {
        let target = collection("/admin/realms");
        assert_eq!(
            identity_attributes(&target, "realm", &attrs(&["id", "realm"])),
            ("realm".into(), "realm".into())
        );
        assert_eq!(
            identity_attributes(&target, "realm", &BTreeSet::new()),
            ("realm".into(), "realm".into())
        );
    }

    #[test]
    fn identity_from_schema() {
        let target = collection("/admin/realms/_/clients");
        assert_eq!(
            identity_attributes(&target, "client-uuid", &attrs(&["id", "clientId"])),
            ("id".into(), "clientId".into())
        );
        assert_eq!(
            identity_attributes(&target, "", &attrs(&["name", "ID"])),
            ("id".into(), "name".into())
        );
        assert_eq!(
            identity_attributes(&target, "", &attrs(&["key"])),
            ("key".into(), "key".into())
        );
    }

    #[test]
    fn identity_from_collection_name() {
        assert_eq!(
            identity_attributes(&collection("/admin/realms/_/clients"), "", &BTreeSet::new()),
            ("id".into(), "clientId".into())
        );
        assert_eq!(
            identity_attributes(&collection("/groups/_"), "", &BTreeSet::new()),
            ("group".into(), "group".into())
        );
        assert_eq!(
            identity_attributes(&collection("/"), "", &BTreeSet::new()),
            ("id".into(), "id".into())
        );
    }

    #[test]
    fn secret_collections() {
        assert!(holds_secrets(&collection("/realms/_/clients")));
        assert!(holds_secrets(&collection("/vault/Secrets")));
        assert!(holds_secrets(&collection("/user-credentials/_")));
        assert!(!holds_secrets(&collection("/client")));
        assert!(!holds_secrets(&collection("/")));
    }
}
