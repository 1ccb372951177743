//! Error types for crunner
//!
//! Centralized error handling using thiserror. Compile failures and nonzero
//! program exits are ordinary data and never appear here; these variants are
//! reserved for caller mistakes and infrastructure failures.

use thiserror::Error;

/// All error types that can occur in crunner
#[derive(Debug, Error)]
pub enum CrunnerError {
    /// Request was missing a field or carried a malformed one
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No compiled artifact exists for the job
    #[error("Artifact not found for job {0}; compile first")]
    ArtifactNotFound(String),

    /// No job record exists (never started, or already reclaimed)
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The artifact could not be launched at all
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Scratch workspace could not be prepared or written
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// IPC communication error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrunnerError {
    /// Whether the error was caused by the caller rather than the daemon
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::ArtifactNotFound(_) | Self::JobNotFound(_)
        )
    }
}

/// Result type alias for crunner operations
pub type Result<T> = std::result::Result<T, CrunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_error() {
        let err = CrunnerError::InvalidInput("missing 'source'".to_string());
        assert_eq!(err.to_string(), "Invalid input: missing 'source'");
    }

    #[test]
    fn test_artifact_not_found_mentions_compile() {
        let err = CrunnerError::ArtifactNotFound("1738300800123-a1b2c3d4".to_string());
        assert!(err.to_string().contains("1738300800123-a1b2c3d4"));
        assert!(err.to_string().contains("compile first"));
    }

    #[test]
    fn test_job_not_found_error() {
        let err = CrunnerError::JobNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Job not found: abc");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(CrunnerError::InvalidInput("x".into()).is_client_error());
        assert!(CrunnerError::ArtifactNotFound("x".into()).is_client_error());
        assert!(CrunnerError::JobNotFound("x".into()).is_client_error());
        assert!(!CrunnerError::Spawn("x".into()).is_client_error());
        assert!(!CrunnerError::Workspace("x".into()).is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CrunnerError = io_err.into();
        assert!(matches!(err, CrunnerError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: CrunnerError = json_err.into();
        assert!(matches!(err, CrunnerError::Json(_)));
    }
}
