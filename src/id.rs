//! Job identifier generation and validation
//!
//! Identifiers double as file stems inside the workspace, so anything that
//! arrives from a caller is validated before a path is built from it.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CrunnerError, Result};

/// Longest identifier accepted from a caller
pub const MAX_JOB_ID_LEN: usize = 64;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Opaque token naming one compiled artifact and at most one run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a fresh identifier
    ///
    /// Format: `{timestamp_ms}-{random_hex}`
    /// Example: `1738300800123-9f3ab2c4`
    pub fn generate() -> Self {
        let random: u32 = rand::rng().random();
        Self(format!("{}-{:08x}", now_ms(), random))
    }

    /// Validate an identifier supplied by a caller
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(CrunnerError::InvalidInput("job id is empty".to_string()));
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(CrunnerError::InvalidInput(format!(
                "job id longer than {} characters",
                MAX_JOB_ID_LEN
            )));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(CrunnerError::InvalidInput(format!("malformed job id: {}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_format() {
        let id = JobId::generate();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_same_millisecond_differs() {
        let ids: std::collections::HashSet<JobId> = (0..64).map(|_| JobId::generate()).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn test_generated_id_parses() {
        let id = JobId::generate();
        assert_eq!(JobId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_path_traversal() {
        assert!(JobId::parse("../etc/passwd").is_err());
        assert!(JobId::parse("a/b").is_err());
        assert!(JobId::parse("a.out").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_and_long() {
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse(&"a".repeat(MAX_JOB_ID_LEN + 1)).is_err());
        assert!(JobId::parse(&"a".repeat(MAX_JOB_ID_LEN)).is_ok());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = JobId::parse("1700000000000-deadbeef").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1700000000000-deadbeef\"");
    }
}
