//! Error type for the kombi orchestrator.
//!
//! Lower crates' errors are wrapped with `#[from]`. [`Error::category`] groups
//! every failure into the four kinds the runtime reacts to, and
//! [`Error::exit_code`] maps them to CLI exit codes.

use kombi_element::ElementError;
use kombi_template::TemplateError;

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration; surfaces at load time and aborts the run.
    Configuration,
    /// A template or extractor could not be resolved for one element.
    Resolution,
    /// A task, wrapper or dispatcher failed while running.
    Execution,
    /// A domain rule rejected the input.
    Policy,
}

/// Errors raised by tasks, holders, dispatchers, wrappers and the loader.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generic configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A resource file could not be read or interpreted.
    #[error("Cannot load {path}: {message}")]
    Load { path: String, message: String },

    /// Resource files include each other.
    #[error("Include cycle: {0}")]
    IncludeCycle(String),

    /// A declared option value has the wrong type.
    #[error("Option {option} of task {task} expects {expected}, got {given}")]
    InvalidOptionType {
        task: String,
        option: String,
        expected: String,
        given: String,
    },

    /// Template failure.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Element failure.
    #[error(transparent)]
    Element(#[from] ElementError),

    /// No task kind is registered under the name.
    #[error("Task type not found: {0}")]
    TaskTypeNotFound(String),

    /// An option that the task does not declare was read.
    #[error("Task {task} has no option {option:?}")]
    InvalidOption { task: String, option: String },

    /// A task failed while performing.
    #[error("Task {task} failed: {message}")]
    Task { task: String, message: String },

    /// The checksums of source and target differ.
    #[error("Checksum mismatch between {source_path} ({source_digest}) and {target_path} ({target_digest})")]
    ChecksumMatch {
        source_path: String,
        source_digest: String,
        target_path: String,
        target_digest: String,
    },

    /// The archive format cannot be extracted.
    #[error("Unsupported archive type: {0}")]
    UnsupportedArchiveType(String),

    /// No wrapper is registered under the name.
    #[error("Task wrapper not found: {0}")]
    WrapperNotFound(String),

    /// A wrapped child process failed.
    #[error("Wrapper {wrapper} failed (exit code {exit_code:?}): {stderr}")]
    WrapperFailed {
        wrapper: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// No dispatcher is registered under the name.
    #[error("Dispatcher not found: {0}")]
    DispatcherNotFound(String),

    /// A dispatcher could not schedule or collect work.
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    /// JSON (de)serialisation failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path or value error from the common layer.
    #[error(transparent)]
    Common(#[from] kombi_common::Error),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convenience constructor for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Convenience constructor for [`Error::Load`].
    pub fn load(path: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Error::Load {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Task`].
    pub fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Task {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Dispatcher`].
    pub fn dispatcher(message: impl Into<String>) -> Self {
        Error::Dispatcher(message.into())
    }

    /// Which class of failure this is.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::Load { .. }
            | Error::IncludeCycle(_)
            | Error::InvalidOptionType { .. }
            | Error::WrapperNotFound(_)
            | Error::DispatcherNotFound(_) => ErrorCategory::Configuration,
            Error::Template(e) => match e {
                TemplateError::Malformed { .. }
                | TemplateError::ProcedureNotFound { .. }
                | TemplateError::InvalidArity { .. } => ErrorCategory::Configuration,
                _ => ErrorCategory::Resolution,
            },
            Error::Element(e) => match e {
                ElementError::KindNotFound(_) => ErrorCategory::Configuration,
                ElementError::Extractor(x) if x.is_pattern_error() => {
                    ErrorCategory::Configuration
                }
                e if e.is_resolution() => ErrorCategory::Resolution,
                _ => ErrorCategory::Execution,
            },
            Error::UnsupportedArchiveType(_) => ErrorCategory::Policy,
            Error::TaskTypeNotFound(_)
            | Error::InvalidOption { .. }
            | Error::Task { .. }
            | Error::ChecksumMatch { .. }
            | Error::WrapperFailed { .. }
            | Error::Dispatcher(_)
            | Error::Json(_)
            | Error::Common(_)
            | Error::Io(_) => ErrorCategory::Execution,
        }
    }

    /// Whether a dispatcher may skip the offending element and carry on.
    pub fn is_resolution(&self) -> bool {
        self.category() == ErrorCategory::Resolution
    }

    /// CLI exit code: `1` configuration, `3` wrapper failure, `2` otherwise.
    pub fn exit_code(&self) -> i32 {
        match (self, self.category()) {
            (Error::WrapperFailed { .. }, _) => 3,
            (_, ErrorCategory::Configuration) => 1,
            _ => 2,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
