//! Matching targets against OpenAPI path templates.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::document::PathDefinitions;
use super::Target;
use crate::glob;
use crate::path::{self, PLACEHOLDER};

static PATH_PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([^{}]+)\}$").expect("valid path parameter regex"));

static TEMPLATE_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid template identifier regex")
});

/// Best-scoring path template for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Candidate {
    pub(super) path: String,
    pub(super) segments: Vec<String>,
    pub(super) methods: BTreeSet<String>,
    score: usize,
}

impl Candidate {
    pub(super) fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub(super) fn has_method(&self, method: &str) -> bool {
        self.methods.contains(method)
    }
}

/// Flag a resource target as a collection when the document treats it as
/// one: the selector itself accepts GET or POST and a `{var}` child path
/// accepts an item method.
pub(super) fn promote_target(mut target: Target, definitions: &PathDefinitions) -> Target {
    if target.collection {
        return target;
    }
    let Some(methods) = definitions.get(&target.selector) else {
        return target;
    };
    if !methods.contains("get") && !methods.contains("post") {
        return target;
    }

    let promoted = definitions.iter().any(|(key, child_methods)| {
        let segments = path::split_segments(key);
        segments.len() == target.segments.len() + 1
            && segments.starts_with(&target.segments)
            && segments.last().is_some_and(|s| template_variable_name(s).is_some())
            && ["get", "put", "patch", "delete"]
                .iter()
                .any(|m| child_methods.contains(*m))
    });
    if promoted {
        debug!(selector = %target.selector, "openapi target promoted to collection");
        target.collection = true;
    }
    target
}

/// Highest-scoring template with exactly `expected` segments matching
/// `selector`; ties go to the smallest template path.
pub(super) fn select_candidate(
    selector: &[String],
    expected: usize,
    definitions: &PathDefinitions,
) -> Candidate {
    let mut best: Option<Candidate> = None;

    // Keys iterate sorted, so a strictly greater score is needed to replace.
    for (key, methods) in definitions {
        let segments = path::split_segments(key);
        if segments.len() != expected {
            continue;
        }
        let Some(score) = score_template(selector, &segments) else {
            continue;
        };
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(Candidate {
                path: key.clone(),
                segments,
                methods: methods.clone(),
                score,
            });
        }
    }

    best.unwrap_or_default()
}

/// Any template with `expected` segments matching `selector` position by
/// position.
pub(super) fn has_path_match(
    selector: &[String],
    expected: usize,
    definitions: &PathDefinitions,
) -> bool {
    definitions.keys().any(|key| {
        let segments = path::split_segments(key);
        segments.len() == expected && matches_template(selector, &segments)
    })
}

fn score_template(selector: &[String], template: &[String]) -> Option<usize> {
    if template.len() < selector.len() {
        return None;
    }

    let mut score = 0;
    for (segment, template_segment) in selector.iter().zip(template) {
        let variable = path_parameter_name(template_segment).is_some();

        if segment == template_segment {
            score += if variable { 4 } else { 3 };
        } else if segment == PLACEHOLDER || glob::has_wildcard(segment) {
            if variable {
                score += 2;
            } else if segment != PLACEHOLDER {
                if !glob::matches(segment, template_segment).unwrap_or(false) {
                    return None;
                }
                score += 1;
            }
        } else if variable {
            score += 1;
        } else {
            return None;
        }
    }
    Some(score)
}

fn matches_template(selector: &[String], template: &[String]) -> bool {
    selector.len() == template.len()
        && selector.iter().zip(template).all(|(segment, template_segment)| {
            segment == PLACEHOLDER
                || segment == template_segment
                || path_parameter_name(template_segment).is_some()
                || (glob::has_wildcard(segment)
                    && glob::matches(segment, template_segment).unwrap_or(false))
        })
}

/// Convert `/realms/{realm}/clients` into `/realms/{{.realm}}/clients`.
///
/// Parameters that are not template identifiers reuse the placeholder at
/// the same position of `fallback`, else `{{.id}}`.
pub(super) fn to_metadata_template(template: &str, fallback: &str) -> String {
    let segments = path::split_segments(template);
    let fallback = path::split_segments(fallback);

    let converted: Vec<String> = segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| match path_parameter_name(segment) {
            None => segment.clone(),
            Some(name) if is_template_identifier(name) => format!("{{{{.{name}}}}}"),
            Some(_) => fallback
                .get(idx)
                .filter(|s| is_placeholder_segment(s))
                .cloned()
                .unwrap_or_else(|| "{{.id}}".to_string()),
        })
        .collect();
    path::join_absolute(&converted)
}

/// Name of the trailing `{var}` segment, when it is a template identifier.
pub(super) fn last_template_variable(segments: &[String]) -> Option<String> {
    template_variable_name(segments.last()?).map(str::to_string)
}

fn template_variable_name(segment: &str) -> Option<&str> {
    path_parameter_name(segment).filter(|name| is_template_identifier(name))
}

fn path_parameter_name(segment: &str) -> Option<&str> {
    let captures = PATH_PARAMETER.captures(segment.trim())?;
    let name = captures.get(1)?.as_str().trim();
    (!name.is_empty()).then_some(name)
}

fn is_template_identifier(value: &str) -> bool {
    TEMPLATE_IDENTIFIER.is_match(value.trim())
}

fn is_placeholder_segment(segment: &str) -> bool {
    let segment = segment.trim();
    segment.starts_with("{{.") && segment.ends_with("}}")
}
