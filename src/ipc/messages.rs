//! IPC message types for client ↔ daemon communication.
//!
//! Uses JSON Lines (newline-delimited JSON) over Unix stream socket.
//! Message schema uses familiar field names (id, method, params, result, error)
//! but does NOT implement JSON-RPC 2.0 specification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CrunnerError;

/// Request sent from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    /// Unique request ID for correlating responses.
    pub id: u64,
    /// Method name (e.g., "compile", "run.poll").
    pub method: String,
    /// Method parameters as JSON value.
    #[serde(default)]
    pub params: Value,
}

impl DaemonRequest {
    /// Create a new request with the given method and params.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a request with no parameters.
    pub fn no_params(id: u64, method: impl Into<String>) -> Self {
        Self::new(id, method, Value::Object(Default::default()))
    }
}

/// Response sent from the daemon to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    /// Request ID this response corresponds to.
    pub id: u64,
    /// Result value on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error details on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DaemonError>,
}

impl DaemonResponse {
    /// Create a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: u64, error: DaemonError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Check if this response indicates success.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Error details in a daemon response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonError {
    /// Error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DaemonError {
    /// Create a new error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with additional data.
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// Method not found error (-32601).
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Unknown method: {}", method.into()),
        )
    }

    /// Invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// Job not found error (1001).
    pub fn job_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::with_data(
            ErrorCode::JOB_NOT_FOUND,
            format!("Job not found: {}", id),
            serde_json::json!({ "jobId": id }),
        )
    }

    /// Artifact not found error (1002).
    pub fn artifact_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::with_data(
            ErrorCode::ARTIFACT_NOT_FOUND,
            format!("Executable for job {} does not exist. Compile first.", id),
            serde_json::json!({ "jobId": id }),
        )
    }

    /// Whether the code denotes a missing job or artifact (404-equivalent).
    pub fn is_not_found(&self) -> bool {
        matches!(self.code, ErrorCode::JOB_NOT_FOUND | ErrorCode::ARTIFACT_NOT_FOUND)
    }
}

impl From<&CrunnerError> for DaemonError {
    /// Client errors carry their message; infrastructure errors get a generic
    /// one so host details stay in the daemon log.
    fn from(err: &CrunnerError) -> Self {
        match err {
            CrunnerError::InvalidInput(msg) => Self::invalid_params(msg.clone()),
            CrunnerError::ArtifactNotFound(id) => Self::artifact_not_found(id.clone()),
            CrunnerError::JobNotFound(id) => Self::job_not_found(id.clone()),
            CrunnerError::Spawn(_) => Self::internal_error("Failed to start the program"),
            _ => Self::internal_error("Internal server error"),
        }
    }
}

/// Standard error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal daemon error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Job was never started or has been reclaimed.
    pub const JOB_NOT_FOUND: i32 = 1001;
    /// No compiled artifact for the job.
    pub const ARTIFACT_NOT_FOUND: i32 = 1002;
}

/// Known method names as constants.
pub struct Methods;

impl Methods {
    pub const PING: &'static str = "ping";
    pub const COMPILE: &'static str = "compile";
    pub const RUN_START: &'static str = "run.start";
    pub const RUN_POLL: &'static str = "run.poll";
}
