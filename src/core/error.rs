//! Error types for Kiln

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// Main error type for Kiln
#[derive(Error, Debug)]
pub enum KilnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("No version of {package} satisfies {range}")]
    VersionNotFound { package: String, range: String },

    #[error("Integrity check failed for {package}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed archive for {package}: {reason}")]
    MalformedArchive { package: String, reason: String },

    #[error("Path traversal attack detected in package {package}: {path}")]
    PathTraversal { package: String, path: String },

    #[error("Script execution failed: {script} in {package}")]
    ScriptFailed { package: String, script: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Project not initialized. Run 'kiln init' first.")]
    NotInitialized,

    #[error("Invalid manifest at {path}: {reason}. Fix it or run 'kiln init' in a fresh directory.")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0} took too long")]
    Timeout(String),

    #[error("User input error: {0}")]
    Dialoguer(String),

    #[error("{0}")]
    Other(String),
}

impl From<dialoguer::Error> for KilnError {
    fn from(err: dialoguer::Error) -> Self {
        KilnError::Dialoguer(err.to_string())
    }
}

impl KilnError {
    /// Create a generic error from a string
    pub fn other<S: Into<String>>(msg: S) -> Self {
        KilnError::Other(msg.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        KilnError::Config(msg.into())
    }

    /// Create a registry error
    pub fn registry<S: Into<String>>(msg: S) -> Self {
        KilnError::Registry(msg.into())
    }

    /// Create a malformed-archive error
    pub fn archive<P: Into<String>, R: Into<String>>(package: P, reason: R) -> Self {
        KilnError::MalformedArchive {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the registry has no such package or version.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KilnError::PackageNotFound(_) | KilnError::VersionNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_names_package() {
        let err = KilnError::archive("left-pad", "bad gzip");
        assert_eq!(err.to_string(), "Malformed archive for left-pad: bad gzip");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(KilnError::PackageNotFound("x".into()).is_not_found());
        assert!(!KilnError::Network("reset".into()).is_not_found());
    }
}
