//! Metadata bundles loaded from YAML.
//!
//! A bundle carries a whole metadata tree in one file, keyed by logical
//! metadata path, plus the resource format used for rendering.
//!
//! # File format
//!
//! ```yaml
//! resource_format: yaml
//!
//! metadata:
//!   /admin/realms/_:
//!     resourceInfo:
//!       idFromAttribute: realm
//!       collectionPath: /admin/realms
//!
//!   /admin/realms/_/clients/_:
//!     resourceInfo:
//!       idFromAttribute: id
//!       aliasFromAttribute: clientId
//!     operationInfo:
//!       listCollection:
//!         query: {briefRepresentation: "true"}
//!
//!   /admin/realms/master:
//!     operationInfo:
//!       deleteResource: {httpMethod: POST, path: ./disable}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::format::DEFAULT_RESOURCE_FORMAT;
use crate::model::ResourceMetadata;
use crate::store::{MemoryMetadataStore, MetadataService, MetadataStore};

/// Bundle of metadata documents.
///
/// Loaded via [`BundleConfig::load`], then turned into a store with
/// [`BundleConfig::into_store`] or a ready service with
/// [`BundleConfig::into_service`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    /// Resource format for `{{resource_format .}}` (`json` or `yaml`).
    pub resource_format: String,

    /// Metadata documents keyed by logical metadata path.
    pub metadata: BTreeMap<String, ResourceMetadata>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            resource_format: DEFAULT_RESOURCE_FORMAT.to_string(),
            metadata: BTreeMap::new(),
        }
    }
}

impl BundleConfig {
    /// Load a bundle from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a bundle from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML or unknown fields.
    pub fn from_yaml(content: &str) -> crate::error::Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        Ok(config)
    }

    /// Store holding every document of the bundle.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed path or invalid metadata;
    /// two keys addressing the same slot (`/a/_` and `/a/`) keep the later
    /// one in key order.
    pub fn into_store(self) -> crate::error::Result<MemoryMetadataStore> {
        let mut store = MemoryMetadataStore::new();
        for (logical_path, metadata) in self.metadata {
            store.set(&logical_path, metadata)?;
        }
        Ok(store)
    }

    /// Service over [`into_store`](Self::into_store) using the bundle's
    /// resource format.
    ///
    /// # Errors
    ///
    /// Same as [`into_store`](Self::into_store), plus a validation error for
    /// an unsupported resource format.
    pub fn into_service(self) -> crate::error::Result<MetadataService<MemoryMetadataStore>> {
        let format = self.resource_format.clone();
        MetadataService::new(self.into_store()?).with_resource_format(&format)
    }
}
