//! Hierarchical resolution of effective metadata.
//!
//! Metadata lives at selectors. Collection metadata at `/customers` applies
//! to every item of `/customers`; selectors may use `_` (any segment) or a
//! glob (`a*`) instead of a literal segment. Resolving `/customers/acme`
//! folds, in order:
//!
//! 1. the root collection layer (`/`);
//! 2. per path segment, every matching wildcard selector (sorted), then every
//!    matching literal selector (sorted);
//! 3. the resource layer of `/customers/acme` itself.
//!
//! Later layers override earlier ones through
//! [`merge_resource_metadata`](crate::merge_resource_metadata).

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::glob;
use crate::model::{merge_resource_metadata, ResourceMetadata};
use crate::path::{self, PLACEHOLDER};

/// Which of the two metadata slots of a selector is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    /// Defaults for every item of the collection at the selector.
    Collection,
    /// Metadata of the single resource at the selector.
    Resource,
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Collection => "collection",
            Self::Resource => "resource",
        })
    }
}

/// Read access to stored metadata, as needed by [`HierarchicalResolver`].
pub trait MetadataLookup {
    /// Metadata stored for `selector`, or `None` when there is none.
    ///
    /// # Errors
    ///
    /// Any error aborts resolution.
    fn lookup(&self, selector: &str, kind: MetadataKind) -> Result<Option<ResourceMetadata>>;

    /// Names of the child entries stored below `selector`: literal segments,
    /// `_`, or glob patterns. Collection metadata stored at `selector` itself
    /// shows up as a `_` child.
    ///
    /// # Errors
    ///
    /// Any error aborts resolution.
    fn children(&self, selector: &str) -> Result<Vec<String>>;
}

impl<T: MetadataLookup + ?Sized> MetadataLookup for &T {
    fn lookup(&self, selector: &str, kind: MetadataKind) -> Result<Option<ResourceMetadata>> {
        (**self).lookup(selector, kind)
    }

    fn children(&self, selector: &str) -> Result<Vec<String>> {
        (**self).children(selector)
    }
}

/// Folds layered metadata into the effective metadata of a path.
#[derive(Debug, Clone)]
pub struct HierarchicalResolver<L> {
    lookup: L,
}

impl<L: MetadataLookup> HierarchicalResolver<L> {
    /// Resolver reading through `lookup`.
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// The underlying lookup.
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Effective metadata for a concrete logical path.
    ///
    /// A trailing `/` requests the collection itself, so the resource layer
    /// is skipped.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed paths or paths containing
    /// glob segments, and propagates lookup failures.
    pub fn resolve_for_path(&self, logical_path: &str) -> Result<ResourceMetadata> {
        let target = normalize_resolve_path(logical_path)?;
        let collection_request = target != "/" && logical_path.trim_end().ends_with('/');
        debug!(logical_path, normalized = %target, "metadata resolve start");

        let mut merged = ResourceMetadata::default();
        self.apply(&mut merged, "/", MetadataKind::Collection)?;

        let mut parents = vec!["/".to_string()];
        for segment in path::split_segments(&target) {
            let mut wildcards = BTreeSet::new();
            let mut literals = BTreeSet::new();
            for parent in &parents {
                let (w, l) = self.matching_candidates(parent, &segment)?;
                wildcards.extend(w);
                literals.extend(l);
            }

            for selector in wildcards.iter().chain(&literals) {
                self.apply(&mut merged, selector, MetadataKind::Collection)?;
            }

            parents = wildcards.union(&literals).cloned().collect();
            trace!(segment = %segment, frontier = ?parents, "metadata resolve frontier");
            if parents.is_empty() {
                break;
            }
        }

        if target != "/" && !collection_request {
            self.apply(&mut merged, &target, MetadataKind::Resource)?;
        }

        debug!(logical_path, normalized = %target, "metadata resolve done");
        Ok(merged)
    }

    /// Literal child selectors reachable below `logical_path`, sorted.
    ///
    /// # Errors
    ///
    /// Same as [`resolve_for_path`](Self::resolve_for_path).
    pub fn collection_children(&self, logical_path: &str) -> Result<Vec<String>> {
        let target = normalize_resolve_path(logical_path)?;
        let mut children = BTreeSet::new();
        for parent in self.matching_parent_selectors(&target)? {
            for child in self.lookup.children(&parent)? {
                let child = child.trim();
                if child.is_empty() || child == PLACEHOLDER || glob::has_wildcard(child) {
                    continue;
                }
                children.insert(child.to_string());
            }
        }
        Ok(children.into_iter().collect())
    }

    /// `true` when any child selector below `logical_path` is `_` or a glob.
    ///
    /// # Errors
    ///
    /// Same as [`resolve_for_path`](Self::resolve_for_path).
    pub fn has_collection_wildcard_child(&self, logical_path: &str) -> Result<bool> {
        let target = normalize_resolve_path(logical_path)?;
        for parent in self.matching_parent_selectors(&target)? {
            for child in self.lookup.children(&parent)? {
                let child = child.trim();
                if child == PLACEHOLDER || glob::has_wildcard(child) {
                    debug!(logical_path, selector = %parent, child, "metadata wildcard child");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn apply(&self, merged: &mut ResourceMetadata, selector: &str, kind: MetadataKind) -> Result<()> {
        match self.lookup.lookup(selector, kind) {
            Ok(Some(layer)) => {
                debug!(selector, %kind, "metadata layer hit");
                *merged = merge_resource_metadata(merged, &layer);
                Ok(())
            }
            Ok(None) => {
                trace!(selector, %kind, "metadata layer miss");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                trace!(selector, %kind, "metadata layer miss");
                Ok(())
            }
            Err(err) => {
                debug!(selector, %kind, error = %err, "metadata layer failed");
                Err(err)
            }
        }
    }

    /// Selectors of the final frontier after walking every segment.
    fn matching_parent_selectors(&self, target: &str) -> Result<Vec<String>> {
        let mut parents = vec!["/".to_string()];
        for segment in path::split_segments(target) {
            let mut next = BTreeSet::new();
            for parent in &parents {
                let (wildcards, literals) = self.matching_candidates(parent, &segment)?;
                next.extend(wildcards);
                next.extend(literals);
            }
            if next.is_empty() {
                return Ok(Vec::new());
            }
            parents = next.into_iter().collect();
        }
        Ok(parents)
    }

    /// Child selectors of `parent` matching `segment`, split into wildcard
    /// and literal matches (each sorted).
    fn matching_candidates(&self, parent: &str, segment: &str) -> Result<(Vec<String>, Vec<String>)> {
        let mut wildcards = Vec::new();
        let mut literals = Vec::new();

        for child in self.lookup.children(parent)? {
            let selector = path::join_selector(parent, &child);
            if child == PLACEHOLDER {
                wildcards.push(selector);
            } else if glob::has_wildcard(&child) {
                let matched = glob::matches(&child, segment).map_err(|err| {
                    Error::validation_with(
                        format!("invalid wildcard selector {selector:?}"),
                        Error::validation(err.to_string()),
                    )
                })?;
                if matched {
                    wildcards.push(selector);
                }
            } else if child == segment {
                literals.push(selector);
            }
        }

        wildcards.sort();
        literals.sort();
        Ok((wildcards, literals))
    }
}

fn normalize_resolve_path(logical_path: &str) -> Result<String> {
    let normalized = path::normalize_logical_path(logical_path)?;
    if path::split_segments(&normalized)
        .iter()
        .any(|segment| glob::has_wildcard(segment))
    {
        return Err(Error::validation(
            "resolve path must not contain wildcard segments",
        ));
    }
    Ok(normalized)
}
