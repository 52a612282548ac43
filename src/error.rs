//! Error types for the load-testing deployment planner.
//!
//! Every stage of a run has its own error enum: configuration, state
//! management, platform (GKE and Kubernetes) calls and planning. They are all
//! folded into [`DeployError`].

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the deployment planner.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Platform API errors.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Unknown built-in scenario name.
    #[error("Unknown scenario: {name} (expected 'autoscaled' or 'fixed')")]
    UnknownScenario {
        /// The requested scenario name.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State belongs to a different project or scenario.
    #[error("State mismatch: expected {expected}, found {found}")]
    Mismatch {
        /// What the current configuration expects.
        expected: String,
        /// What the stored state records.
        found: String,
    },
}

/// Errors returned by the cloud provider or the Kubernetes API.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Authentication failed or no credentials could be obtained.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The caller lacks permission for the request.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Message returned by the API.
        message: String,
    },

    /// A quota would be exceeded.
    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        /// Message returned by the API.
        message: String,
    },

    /// A resource with the same name already exists.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// The requested resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid API response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A long-running provider operation failed.
    #[error("Operation {operation} failed: {message}")]
    OperationFailed {
        /// Operation name.
        operation: String,
        /// Status message reported by the provider.
        message: String,
    },

    /// The load balancer has not reported any ingress point yet.
    #[error("External address not yet assigned for service '{service}'")]
    AddressNotAssigned {
        /// Service whose address is missing.
        service: String,
    },

    /// The credential helper command could not produce a token.
    #[error("Credential helper '{command}' failed: {message}")]
    CredentialHelper {
        /// Helper command path.
        command: String,
        /// Failure description.
        message: String,
    },
    /// A field that can only be set at creation differs from the live resource.
    #[error("{kind} '{name}' cannot change {field} in place; destroy and apply again")]
    ImmutableFieldChanged {
        /// Resource type.
        kind: String,
        /// Resource name.
        name: String,
        /// Field that differs.
        field: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected among: {nodes}")]
    DependencyCycle {
        /// Names of the nodes left unordered.
        nodes: String,
    },

    /// An edge refers to a node that is not in the graph.
    #[error("Unknown resource node: {id}")]
    UnknownNode {
        /// The offending node index.
        id: usize,
    },

    /// A node depends on a value that has not been resolved.
    #[error("Unresolved dependency for '{resource}': {missing}")]
    UnresolvedDependency {
        /// Resource being applied.
        resource: String,
        /// The missing input.
        missing: String,
    },

}

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Platform(
                PlatformError::RateLimited { .. } | PlatformError::NetworkError { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Platform(PlatformError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Platform(PlatformError::NetworkError { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }

    /// Returns true if the error reports a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Platform(PlatformError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl PlatformError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let rate_limited = DeployError::Platform(PlatformError::RateLimited {
            retry_after_secs: 30,
        });
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_delay_secs(), Some(30));

        let network = DeployError::Platform(PlatformError::network("connection reset"));
        assert!(network.is_retryable());
        assert_eq!(network.retry_delay_secs(), Some(5));

        let denied = DeployError::Platform(PlatformError::PermissionDenied {
            message: String::from("no access"),
        });
        assert!(!denied.is_retryable());
        assert_eq!(denied.retry_delay_secs(), None);
    }

    #[test]
    fn test_address_not_assigned_message() {
        let err = DeployError::Platform(PlatformError::AddressNotAssigned {
            service: String::from("app-service"),
        });
        assert_eq!(
            err.to_string(),
            "Platform error: External address not yet assigned for service 'app-service'"
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert!(DeployError::from(PlatformError::not_found("Namespace", "ns")).is_not_found());
        assert!(!DeployError::internal("boom").is_not_found());
    }
}
