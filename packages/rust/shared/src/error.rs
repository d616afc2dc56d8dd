//! Error types for docweave.
//!
//! Library crates use [`DocweaveError`] via `thiserror`. Every variant is fatal
//! to the operation that produced it; per-topic failures are recorded as
//! [`crate::TopicError`] values instead of being propagated.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docweave operations.
#[derive(Debug, thiserror::Error)]
pub enum DocweaveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// XML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Index build or lookup error.
    #[error("index error: {message}")]
    Index { message: String },

    /// Target dictionary build error.
    #[error("target error: {message}")]
    Targets { message: String },

    /// A component failed during `initialize`, `build_index` or `apply`.
    #[error("component '{component}' failed: {message}")]
    Component { component: String, message: String },

    /// A document id that is not present in an index.
    #[error("document not found: {id}")]
    DocumentNotFound { id: String },

    /// A pipeline operation was called in the wrong lifecycle state.
    #[error("invalid pipeline state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    /// Data validation error (bad manifest, empty pipeline, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocweaveError>;

impl DocweaveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an index error from any displayable message.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index {
            message: msg.into(),
        }
    }

    /// Create a target dictionary error from any displayable message.
    pub fn targets(msg: impl Into<String>) -> Self {
        Self::Targets {
            message: msg.into(),
        }
    }

    /// Create a component error tagged with the component name.
    pub fn component(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
