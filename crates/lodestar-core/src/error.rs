//! Error types for Lodestar Core

use thiserror::Error;

/// Result type alias using Lodestar Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Lodestar query compiler
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors while loading configuration files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal consistency check failed. Raised only when an upstream
    /// planning or compilation step handed the code generator something it
    /// must never see; callers are not expected to recover.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A documented input bound was exceeded (e.g. a string literal that does
    /// not fit the 16-bit packed header)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// String dictionary errors
    #[error("Dictionary error: {0}")]
    Dictionary(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kernel dispatch errors
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Type mismatch errors
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },
}

impl Error {
    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a dictionary error
    pub fn dictionary(msg: impl Into<String>) -> Self {
        Self::Dictionary(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Whether this error signals a compiler bug rather than a reportable
    /// failure
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::Dispatch(err.to_string())
    }
}
