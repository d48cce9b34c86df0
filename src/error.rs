//! Error types for the FlashSystem exporter
//!
//! Provides structured error types for the array session layer, record
//! ingestion, the registry reconciler and the status sinks.

use thiserror::Error;

/// Unified error type for the exporter
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Secret {secret} unusable: {reason}")]
    SecretInvalid { secret: String, reason: String },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Array Transport / Auth Errors
    // =========================================================================
    #[error("Array connection error: {0}")]
    ArrayConnection(#[from] reqwest::Error),

    #[error("Authentication to array {array} failed: {reason}")]
    AuthenticationFailed { array: String, reason: String },

    #[error("Array {array} request {command} failed with HTTP status {status:?}: {reason}")]
    RequestFailed {
        array: String,
        command: String,
        status: Option<u16>,
        reason: String,
    },

    // =========================================================================
    // Protocol / Parse Errors
    // =========================================================================
    #[error("Array response for {command} malformed: {reason}")]
    MalformedResponse { command: String, reason: String },

    #[error("Field {field} missing from {record} record")]
    MissingField { record: String, field: String },

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // Policy Errors
    // =========================================================================
    #[error("Array code level {found} below minimum {minimum}")]
    UnsupportedVersion { found: String, minimum: String },

    #[error("Array user role insufficient: {role}")]
    InsufficientRole { role: String },

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the poll cycle does with an error, one arm per error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Transport/auth: the session already retried once, surface for this poll
    RetryOnce,
    /// Protocol/parse: drop the affected value, keep the rest of the poll
    SkipMetric,
    /// Configuration: leave the array out of this poll's working set
    ExcludeArray,
    /// Policy: report a readiness failure and wait for the next poll
    ReportReadiness,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::ArrayConnection(_)
            | Error::AuthenticationFailed { .. }
            | Error::RequestFailed { .. }
            | Error::Kube(_)
            | Error::Io(_) => ErrorAction::RetryOnce,

            Error::MalformedResponse { .. }
            | Error::MissingField { .. }
            | Error::CapacityParse(_)
            | Error::JsonParse(_) => ErrorAction::SkipMetric,

            Error::Configuration(_)
            | Error::SecretInvalid { .. }
            | Error::YamlParse(_)
            | Error::ResourceNotFound { .. } => ErrorAction::ExcludeArray,

            Error::UnsupportedVersion { .. } | Error::InsufficientRole { .. } => {
                ErrorAction::ReportReadiness
            }

            Error::Internal(_) => ErrorAction::RetryOnce,
        }
    }

    /// HTTP status carried by a failed array request, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::RequestFailed { status, .. } => *status,
            Error::ArrayConnection(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for the exporter
pub type Result<T> = std::result::Result<T, Error>;
