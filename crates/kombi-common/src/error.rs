//! Common error types used throughout kombi.

/// Common error type for kombi.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested path does not exist.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be converted to the requested shape.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new InvalidValue error.
    pub fn invalid_value<S: Into<String>>(msg: S) -> Self {
        Self::InvalidValue(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/tmp/missing");
        assert_eq!(err.to_string(), "Path not found: /tmp/missing");

        let err = Error::invalid_value("nested object");
        assert_eq!(err.to_string(), "Invalid value: nested object");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
