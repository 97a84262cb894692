//! Logical path parsing and slash-path helpers.
//!
//! A logical path names a remote resource (`/customers/acme`) or a collection
//! selector (`/customers/`, `/customers/_`, `/admin/realms/_/clients/_`,
//! `/customers/a*`). [`PathDescriptor::parse`] turns either into a canonical
//! selector plus flags.

use crate::error::{Error, Result};
use crate::glob;

/// Segment that stands for "any single path segment".
pub const PLACEHOLDER: &str = "_";

/// Parsed form of a logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDescriptor {
    /// Absolute, cleaned selector without a trailing slash (except `/`).
    pub selector: String,
    /// Non-empty path components of [`selector`](Self::selector).
    pub segments: Vec<String>,
    /// The path denotes a collection rather than a single resource.
    pub collection: bool,
    /// The path uses selector syntax (trailing `/`, `_` or a glob).
    ///
    /// Currently always equal to [`collection`](Self::collection).
    pub selector_mode: bool,
}

impl PathDescriptor {
    /// Parse a logical path.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the path is empty, relative, contains
    /// a `..` segment or a malformed glob.
    pub fn parse(logical_path: &str) -> Result<Self> {
        let trimmed = logical_path.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("logical path must not be empty"));
        }

        let normalized = trimmed.replace('\\', "/");
        if !normalized.starts_with('/') {
            return Err(Error::validation("logical path must be absolute"));
        }
        let trailing_marker = normalized.ends_with('/');

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                return Err(Error::validation(
                    "logical path must not contain traversal segments",
                ));
            }
            if glob::has_wildcard(segment) && glob::validate(segment).is_err() {
                return Err(Error::validation_with(
                    "logical path contains invalid wildcard expression",
                    Error::validation(format!("{}: {segment}", glob::BadPattern)),
                ));
            }
            segments.push(segment.to_string());
        }

        let mut collection = trailing_marker;
        if segments.last().is_some_and(|s| s == PLACEHOLDER) {
            collection = true;
            segments.pop();
        }
        if segments
            .iter()
            .any(|s| s == PLACEHOLDER || glob::has_wildcard(s))
        {
            collection = true;
        }

        Ok(Self {
            selector: join_absolute(&segments),
            segments,
            collection,
            selector_mode: collection,
        })
    }

    /// `true` when any segment is the placeholder or a glob.
    #[must_use]
    pub fn has_selector_segments(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s == PLACEHOLDER || glob::has_wildcard(s))
    }
}

/// Normalize a concrete logical path: absolute, cleaned, no trailing slash.
///
/// Unlike [`PathDescriptor::parse`] this rejects the placeholder segment,
/// since concrete paths name real resources.
///
/// # Errors
///
/// Returns a validation error when the path is empty, relative, contains a
/// `..` segment or a `_` segment.
pub fn normalize_logical_path(logical_path: &str) -> Result<String> {
    if logical_path.trim().is_empty() {
        return Err(Error::validation("logical path must not be empty"));
    }

    let normalized = logical_path.replace('\\', "/");
    if !normalized.starts_with('/') {
        return Err(Error::validation("logical path must be absolute"));
    }
    for segment in normalized.split('/') {
        if segment == ".." {
            return Err(Error::validation(
                "logical path must not contain traversal segments",
            ));
        }
        if segment == PLACEHOLDER {
            return Err(Error::validation(
                "logical path must not contain reserved metadata segment \"_\"",
            ));
        }
    }

    Ok(clean(&normalized))
}

/// `/`-join segments into an absolute path (`/` when empty).
pub(crate) fn join_absolute<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment.as_ref());
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Join a child segment onto a selector.
pub(crate) fn join_selector(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Split a slash path into its non-empty outer components.
///
/// Leading and trailing slashes are ignored; inner empty components are kept.
pub(crate) fn split_segments(value: &str) -> Vec<String> {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(str::to_string).collect()
}

/// Lexically clean a slash path: collapse repeated separators, drop `.`
/// and resolve `..` against the preceding component.
///
/// Returns `.` for an empty relative result, like the classic `path.Clean`.
pub(crate) fn clean(value: &str) -> String {
    if value.is_empty() {
        return ".".to_string();
    }

    let rooted = value.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in value.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Parent directory of a slash path (`/` for top-level entries).
pub(crate) fn parent(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_string();
    }
    let cleaned = clean(trimmed);
    match cleaned.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => cleaned[..idx].to_string(),
    }
}

/// Last component of a slash path (`/` for the root).
pub(crate) fn base_name(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

/// Clean a rendered path and force a leading `/` (empty stays empty).
pub(crate) fn normalize_rendered(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let cleaned = clean(trimmed);
    if cleaned.starts_with('/') {
        cleaned
    } else {
        format!("/{cleaned}")
    }
}
