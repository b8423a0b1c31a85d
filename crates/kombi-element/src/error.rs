//! Error types for kombi-element.

use crate::extractor::VarExtractorError;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, ElementError>;

/// Errors that can occur while classifying, constructing or querying elements.
#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    /// A variable was read that the element does not carry.
    #[error("element {kind} has no variable {name:?}")]
    InvalidVar { kind: String, name: String },

    /// A tag was read that the element does not carry.
    #[error("element {kind} has no tag {name:?}")]
    InvalidTag { kind: String, name: String },

    /// No kind is registered under the name.
    #[error("element kind not found: {0}")]
    KindNotFound(String),

    /// No registered kind accepted the input.
    #[error("no element kind matches {0}")]
    NoMatchingKind(String),

    /// The serialised form of an element is invalid.
    #[error("invalid element json: {0}")]
    InvalidJson(String),

    /// A kind refused to initialise an element.
    #[error("cannot initialise {kind} element: {message}")]
    Init { kind: String, message: String },

    /// Variable extraction from a file name failed.
    #[error(transparent)]
    Extractor(#[from] VarExtractorError),

    /// Path or value error from the common layer.
    #[error(transparent)]
    Common(#[from] kombi_common::Error),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ElementError {
    /// Create an init failure for a kind.
    pub fn init(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Init {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Whether this error comes from resolving a name or pattern rather than
    /// from the registry configuration.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::InvalidVar { .. } | Self::InvalidTag { .. } | Self::Extractor(_)
        )
    }
}
