//! Error types for Foundry operations

use thiserror::Error;

/// Main error type for Foundry operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Caller lacks permission for the requested scope.
    ///
    /// The message never distinguishes "project doesn't exist" from "project
    /// exists but is forbidden" - the response must not leak which projects
    /// are present in the cluster.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Referenced job or build process is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Kubernetes API error
    #[error("cluster error: {0}")]
    Cluster(#[from] kube::Error),

    /// Build reached the terminal `error` state
    #[error("build failed: {message}")]
    BuildFailed {
        /// Description of what failed
        message: String,
        /// Tail of the captured build log, when log surfacing was requested
        log_tail: Option<String>,
    },

    /// Run pod exited with a failure phase
    #[error("run failed: {0}")]
    RunFailed(String),

    /// Structurally malformed filter or build options
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistent job/run store error
    #[error("store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an access-denied error with the given message
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a build-failed error without a captured log
    pub fn build_failed(msg: impl Into<String>) -> Self {
        Self::BuildFailed {
            message: msg.into(),
            log_tail: None,
        }
    }

    /// Create a build-failed error carrying the captured build log tail
    pub fn build_failed_with_log(msg: impl Into<String>, log_tail: impl Into<String>) -> Self {
        Self::BuildFailed {
            message: msg.into(),
            log_tail: Some(log_tail.into()),
        }
    }

    /// Create a run-failed error with the given message
    pub fn run_failed(msg: impl Into<String>) -> Self {
        Self::RunFailed(msg.into())
    }

    /// Create an invalid-request error with the given message
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a store error with the given message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Permission and structural errors require a caller fix and must not be
    /// retried. Cluster errors are retryable unless the API server rejected
    /// the request outright (4xx). Terminal build/run failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Cluster(source) => {
                // Retry on transient faults (connection, timeout, 5xx).
                // Don't retry on 4xx (bad selector, not found, forbidden).
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Store(_) => true,
            Error::AccessDenied(_)
            | Error::NotFound(_)
            | Error::BuildFailed { .. }
            | Error::RunFailed(_)
            | Error::InvalidRequest(_)
            | Error::Serialization(_) => false,
        }
    }
}
