//! Error types for pool operations
use std::time::Duration;

use thiserror::Error;

use crate::managed::InstanceId;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pool construction, acquire, release and shutdown.
///
/// Pool-level failures (timeout, misuse, bad settings) are distinct variants
/// so callers can branch on them. `Initialization`, `HealthCheck` and
/// `Cleanup` are meant for [`Resource`](crate::Resource) implementors; the
/// pool hands them back unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool settings are invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// Creating a resource instance failed
    #[error("Initialization failed for resource '{resource_id}': {reason}")]
    Initialization {
        /// The resource identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validating a resource instance failed to produce an answer
    #[error("Health check failed for resource '{resource_id}': {reason}")]
    HealthCheck {
        /// The resource identifier
        resource_id: String,
        /// The health check failure reason
        reason: String,
    },

    /// Tearing down a resource instance failed
    #[error("Cleanup failed for resource '{resource_id}': {reason}")]
    Cleanup {
        /// The resource identifier
        resource_id: String,
        /// The cleanup failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Every instance stayed checked out for the whole wait budget
    #[error(
        "Unable to acquire '{resource_id}' within {timeout:?}: all {max_size} instances are busy. \
         Hint: try increasing acquire_timeout"
    )]
    AcquireTimeout {
        /// The resource identifier
        resource_id: String,
        /// How long the caller waited
        timeout: Duration,
        /// Maximum pool size
        max_size: usize,
    },

    /// A released instance is not checked out from this pool
    #[error("Instance {instance_id} is not checked out from pool '{resource_id}'")]
    InvalidRelease {
        /// The resource identifier
        resource_id: String,
        /// The offending instance
        instance_id: InstanceId,
    },

    /// The pool has been shut down
    #[error("Pool '{resource_id}' is closed")]
    PoolClosed {
        /// The resource identifier
        resource_id: String,
    },

    /// Acquire kept losing candidates to validation failures or races
    #[error("Gave up acquiring '{resource_id}' after {attempts} attempts")]
    RetriesExhausted {
        /// The resource identifier
        resource_id: String,
        /// Number of attempts made
        attempts: usize,
    },

    /// Shutdown attempted every teardown but some of them failed
    #[error(
        "Shutdown of pool '{resource_id}' incomplete: {} of {attempted} cleanups failed",
        .failures.len()
    )]
    ShutdownIncomplete {
        /// The resource identifier
        resource_id: String,
        /// Number of instances whose teardown was attempted
        attempted: usize,
        /// The individual teardown failures
        failures: Vec<Error>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an initialization error without an underlying source
    pub fn initialization(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialization {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a health check error
    pub fn health_check(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HealthCheck {
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a cleanup error without an underlying source
    pub fn cleanup(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cleanup {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn closed(resource_id: &str) -> Self {
        Self::PoolClosed {
            resource_id: resource_id.to_string(),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AcquireTimeout { .. } | Self::RetriesExhausted { .. }
        )
    }

    /// Get the resource ID associated with this error (if any)
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::Initialization { resource_id, .. }
            | Self::HealthCheck { resource_id, .. }
            | Self::Cleanup { resource_id, .. }
            | Self::AcquireTimeout { resource_id, .. }
            | Self::InvalidRelease { resource_id, .. }
            | Self::PoolClosed { resource_id }
            | Self::RetriesExhausted { resource_id, .. }
            | Self::ShutdownIncomplete { resource_id, .. } => Some(resource_id),
        }
    }
}
