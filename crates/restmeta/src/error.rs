//! Typed error enum for the `restmeta` library API.
//!
//! Every failure carries a category ([`ErrorKind`]) so callers can tell a
//! malformed metadata document apart from a missing store entry. The CLI
//! (`main.rs`) converts these to `anyhow::Error` at the binary boundary.

/// Broad failure category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: paths, operations, templates, formats.
    Validation,
    /// A store has no metadata for the requested selector.
    NotFound,
    /// Anything else (I/O, codec failures, broken invariants).
    Internal,
}

/// Errors produced by `restmeta` library operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed logical path, operation, template or metadata document.
    #[error("{message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Underlying cause (for example a template parse failure).
        #[source]
        source: Option<Box<Error>>,
    },

    /// A metadata store has no entry for the requested path.
    #[error("{message}")]
    NotFound {
        /// Human-readable description.
        message: String,
    },

    /// Internal failure that is not caused by the caller's input.
    #[error("{message}")]
    Internal {
        /// Human-readable description.
        message: String,
    },

    /// Template syntax or evaluation failure.
    ///
    /// Only ever surfaced as the `source` of a [`Error::Validation`].
    #[error("{0}")]
    Template(String),

    /// File I/O failure (reading bundles or OpenAPI documents).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error(transparent)]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON parsing or serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Validation error without an underlying cause.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Validation error wrapping `source`.
    pub fn validation_with(message: impl Into<String>, source: Error) -> Self {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::Template(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } | Self::Io(_) | Self::Yaml(_) | Self::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// `true` when this is a [`ErrorKind::NotFound`] error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Convenience alias used throughout the library's public API.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time assertion that `Error` is `Send + Sync`.
    /// Required for use across thread boundaries.
    const _: () = {
        const fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    };

    #[test]
    fn kinds() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(Error::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::internal("x").kind(), ErrorKind::Internal);
        assert!(Error::not_found("missing").is_not_found());
        assert!(!Error::validation("bad").is_not_found());
    }

    #[test]
    fn validation_keeps_source() {
        let err = Error::validation_with(
            "invalid metadata template for path",
            Error::Template("unexpected \"}\" in operand".into()),
        );
        assert_eq!(err.to_string(), "invalid metadata template for path");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("unexpected \"}\" in operand"));
    }
}
