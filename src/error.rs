/// Unified error handling for dbroute
///
/// Routing failures are always surfaced to the caller as a typed `RouterError`.
/// Probe failures stay inside the health subsystem and are never returned from
/// `Router::route`.

use std::fmt;
use thiserror::Error;

/// Main error type for routing operations
#[derive(Debug, Error)]
pub enum RouterError {
    /// The writer endpoint is marked unhealthy; writes cannot be served
    #[error("No writer available: endpoint {writer} is not healthy")]
    NoWriterAvailable { writer: String },

    /// Neither a healthy reader nor a healthy writer exists
    #[error("No endpoint available for {intent} traffic")]
    NoEndpointAvailable { intent: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection acquisition errors from a per-endpoint pool
    #[error("Connection error on {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Health probe failures, recovered locally by the health monitor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("endpoint unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("probe timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("probe rejected: {reason}")]
    Rejected { reason: String },
}

/// Result type alias for routing operations
pub type RouterResult<T> = Result<T, RouterError>;

impl RouterError {
    /// Create a writer-unavailable error
    pub fn no_writer<S: Into<String>>(writer: S) -> Self {
        RouterError::NoWriterAvailable {
            writer: writer.into(),
        }
    }

    /// Create a no-endpoint error for the given intent
    pub fn no_endpoint<S: Into<String>>(intent: S) -> Self {
        RouterError::NoEndpointAvailable {
            intent: intent.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>, M: Into<String>>(endpoint: S, message: M) -> Self {
        RouterError::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        RouterError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        RouterError::Internal {
            message: message.into(),
        }
    }

    /// Check if the caller may retry the operation later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RouterError::NoWriterAvailable { .. }
                | RouterError::NoEndpointAvailable { .. }
                | RouterError::Connection { .. }
                | RouterError::Timeout { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RouterError::Config(_) => ErrorSeverity::Critical,
            RouterError::Internal { .. } => ErrorSeverity::Critical,
            RouterError::NoEndpointAvailable { .. } => ErrorSeverity::Error,
            RouterError::NoWriterAvailable { .. } => ErrorSeverity::Error,
            RouterError::Connection { .. } => ErrorSeverity::Warning,
            RouterError::Timeout { .. } => ErrorSeverity::Warning,
        }
    }
}

impl ProbeFailure {
    pub fn unreachable<S: Into<String>>(reason: S) -> Self {
        ProbeFailure::Unreachable {
            reason: reason.into(),
        }
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        ProbeFailure::Rejected {
            reason: reason.into(),
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = RouterError::no_writer("writer-1");
        assert!(matches!(error, RouterError::NoWriterAvailable { .. }));
        assert_eq!(
            error.to_string(),
            "No writer available: endpoint writer-1 is not healthy"
        );
    }

    #[test]
    fn test_error_severity() {
        let config_error = RouterError::Config(ConfigError::ValidationError("test".to_string()));
        assert_eq!(config_error.severity(), ErrorSeverity::Critical);

        assert_eq!(
            RouterError::connection("reader-1", "refused").severity(),
            ErrorSeverity::Warning
        );

        assert_eq!(
            RouterError::no_endpoint("read").severity(),
            ErrorSeverity::Error
        );
    }

    #[test]
    fn test_error_recoverability() {
        assert!(RouterError::no_writer("w").is_recoverable());
        assert!(RouterError::timeout("acquire").is_recoverable());

        let config_error = RouterError::Config(ConfigError::ValidationError("test".to_string()));
        assert!(!config_error.is_recoverable());
        assert!(!RouterError::internal("bug").is_recoverable());
    }

    #[test]
    fn test_probe_failure_display() {
        assert_eq!(
            ProbeFailure::Timeout { millis: 250 }.to_string(),
            "probe timed out after 250ms"
        );
        assert_eq!(
            ProbeFailure::unreachable("refused").to_string(),
            "endpoint unreachable: refused"
        );
    }
}
