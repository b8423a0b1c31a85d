//! Error types for kombi-template.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors that can occur while parsing or evaluating a template.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    /// The template text cannot be parsed.
    #[error("malformed template {template:?}: {message}")]
    Malformed { template: String, message: String },

    /// A `{name}` reference has no value in the scope.
    #[error("template variable not found: {name} (in {template:?})")]
    VarNotFound { name: String, template: String },

    /// A `<name>` reference was never bound.
    #[error("template token not found: <{name}> (in {template:?})")]
    TokenNotFound { name: String, template: String },

    /// A `!` path level does not exist.
    #[error("template required path not found: {path}")]
    RequiredPathNotFound { path: String },

    /// No procedure is registered under the name.
    #[error("template procedure not found: {name}")]
    ProcedureNotFound { name: String },

    /// A procedure was called with the wrong number of arguments.
    #[error("procedure {name} expects {expected} arguments, got {given}")]
    InvalidArity {
        name: String,
        expected: String,
        given: usize,
    },

    /// A procedure ran and failed.
    #[error("procedure {name} failed: {message}")]
    Procedure { name: String, message: String },
}

impl TemplateError {
    /// Create a malformed-template error.
    pub fn malformed(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a procedure failure.
    pub fn procedure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Procedure {
            name: name.into(),
            message: message.into(),
        }
    }
}
