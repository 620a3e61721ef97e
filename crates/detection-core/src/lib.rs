//! Detection Core - rule loading, credential resolution, and error taxonomy
//!
//! This crate holds everything that happens before the remote call: reading
//! and validating the detection rule document, resolving the API key, and the
//! error type every stage reports through.
//!
//! # Modules
//!
//! - [`models`] - The validated detection rule
//! - [`loader`] - Safe YAML loading with schema checks
//! - [`credential`] - API key resolution and shape validation
//! - [`redaction`] - Secret scrubbing for logs and rendered errors

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod credential;
pub mod loader;
pub mod models;
pub mod redaction;

pub use credential::*;
pub use loader::*;
pub use models::*;
pub use redaction::*;

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the pipeline can report
///
/// Variants are mutually exclusive. None of them carries the API key or a raw
/// response body from the remote service, so the `Display` output is always
/// safe to show to the user.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// The detection file does not exist or cannot be read
    #[error("detection file not found or not readable: {}", path.display())]
    FileNotFound {
        /// Path as given by the caller
        path: PathBuf,
    },

    /// The detection file is not a well-formed YAML mapping
    #[error("could not parse detection file {}: {reason}", path.display())]
    Parse {
        /// Path as given by the caller
        path: PathBuf,
        /// Parser diagnostic
        reason: String,
    },

    /// One or more required fields are absent, empty, or not text
    #[error("detection file has invalid required fields: {}", describe_issues(.issues))]
    Schema {
        /// Every offending field, in declaration order
        issues: Vec<FieldIssue>,
    },

    /// The requested model id is not a plain identifier
    #[error("invalid model name '{0}'")]
    InvalidModel(String),

    /// The API endpoint override is unusable
    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(String),

    /// No source yielded an API key
    #[error("no API key found")]
    MissingCredential,

    /// The resolved API key does not have the expected shape
    #[error("API key format is invalid: {0}")]
    InvalidCredentialFormat(KeyShapeViolation),

    /// The remote service rejected the credential
    #[error("authentication failed: the API key was rejected by the remote service")]
    Authentication,

    /// The remote service is throttling requests
    #[error("rate limit exceeded{}", retry_hint(.retry_after_secs))]
    RateLimited {
        /// Seconds the service asked us to wait, when it said so
        retry_after_secs: Option<u64>,
    },

    /// The connection could not be established or timed out
    #[error("network error: {0}")]
    Network(String),

    /// Any other failure on the remote side
    #[error("remote service error ({}): {detail}", status_label(.status))]
    RemoteService {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Short, non-sensitive description
        detail: String,
    },
}

/// Coarse grouping of errors, one exit code per group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The detection document or command-line settings are wrong
    Configuration,
    /// The API key is missing or malformed
    Credential,
    /// The remote call failed
    Remote,
}

impl ErrorCategory {
    /// Process exit code for this category
    ///
    /// `2` is left to the argument parser for usage errors.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCategory::Configuration => 3,
            ErrorCategory::Credential => 4,
            ErrorCategory::Remote => 5,
        }
    }
}

impl DetectionError {
    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            DetectionError::FileNotFound { .. }
            | DetectionError::Parse { .. }
            | DetectionError::Schema { .. }
            | DetectionError::InvalidModel(_)
            | DetectionError::InvalidEndpoint(_) => ErrorCategory::Configuration,
            DetectionError::MissingCredential | DetectionError::InvalidCredentialFormat(_) => {
                ErrorCategory::Credential
            }
            DetectionError::Authentication
            | DetectionError::RateLimited { .. }
            | DetectionError::Network(_)
            | DetectionError::RemoteService { .. } => ErrorCategory::Remote,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        self.category().exit_code()
    }
}

fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(": try again in {secs} seconds"),
        None => ": try again later".to_string(),
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no status".to_string(),
    }
}

/// Result type alias using [`DetectionError`]
pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_distinct_exit_codes() {
        let config = DetectionError::FileNotFound {
            path: PathBuf::from("missing.yml"),
        };
        let credential = DetectionError::MissingCredential;
        let remote = DetectionError::Authentication;

        assert_eq!(config.exit_code(), 3);
        assert_eq!(credential.exit_code(), 4);
        assert_eq!(remote.exit_code(), 5);
    }

    #[test]
    fn schema_error_names_every_field() {
        let err = DetectionError::Schema {
            issues: vec![
                FieldIssue::new("title", FieldProblem::Missing),
                FieldIssue::new("sql_search", FieldProblem::Empty),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("title (missing)"));
        assert!(msg.contains("sql_search (empty)"));
    }

    #[test]
    fn rate_limit_message_suggests_retry() {
        let err = DetectionError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "rate limit exceeded: try again in 30 seconds");

        let err = DetectionError::RateLimited {
            retry_after_secs: None,
        };
        assert!(err.to_string().ends_with("try again later"));
    }

    #[test]
    fn remote_service_message_shows_status() {
        let err = DetectionError::RemoteService {
            status: Some(503),
            detail: "Service Unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "remote service error (HTTP 503): Service Unavailable"
        );
    }
}
