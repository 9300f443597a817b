//! Error types for the connection resilience layer.
//!
//! `ResilienceError` is what callers of the guard, the channel manager and the
//! orchestrator see. `BackendError` is what the external seams (probe, session
//! API, liveness query, realtime transport) report back into the layer.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResilienceError {
    /// Pre-flight probe failed definitively
    #[error("Connection unhealthy: {reason}")]
    ConnectionUnhealthy { reason: String },

    /// Dependent channels did not reach a ready state within the bound
    #[error("Connection not ready: channels {pending:?} not joined within {waited:?}")]
    ConnectionNotReady {
        pending: Vec<String>,
        waited: Duration,
    },

    /// Wrapped operation exceeded its time box
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    OperationTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Fast-fail while the breaker is cooling down
    #[error("Circuit breaker open for '{operation}', retry in {}s", remaining.as_secs().max(1))]
    CircuitBreakerOpen {
        operation: String,
        remaining: Duration,
    },

    #[error("Subscription for channel '{channel_id}' timed out after {timeout:?}")]
    SubscriptionTimeout {
        channel_id: String,
        timeout: Duration,
    },

    #[error("Channel '{channel_id}' exceeded retry limit ({retry_limit}) and was evicted")]
    ChannelRetryExceeded {
        channel_id: String,
        retry_limit: u32,
    },

    #[error("Channel '{channel_id}' is not registered")]
    ChannelNotFound { channel_id: String },

    /// Wrapped operation returned an error on every attempt
    #[error("Operation '{operation}' failed after {attempts} attempt(s): {reason}")]
    OperationFailed {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ResilienceError {
    /// Stable machine-readable code surfaced to UI banners and logs
    pub fn code(&self) -> &'static str {
        match self {
            ResilienceError::ConnectionUnhealthy { .. } => "CONNECTION_UNHEALTHY",
            ResilienceError::ConnectionNotReady { .. } => "CONNECTION_NOT_READY",
            ResilienceError::OperationTimeout { .. } => "OPERATION_TIMEOUT",
            ResilienceError::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            ResilienceError::SubscriptionTimeout { .. } => "SUBSCRIPTION_TIMEOUT",
            ResilienceError::ChannelRetryExceeded { .. } => "CHANNEL_RETRY_EXCEEDED",
            ResilienceError::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            ResilienceError::OperationFailed { .. } => "OPERATION_FAILED",
            ResilienceError::Backend(_) => "BACKEND_ERROR",
            ResilienceError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the outcome of the failed call is unknown rather than a definite failure
    pub fn is_uncertain(&self) -> bool {
        matches!(
            self,
            ResilienceError::OperationTimeout { .. } | ResilienceError::SubscriptionTimeout { .. }
        )
    }
}

impl From<ConfigurationError> for ResilienceError {
    fn from(error: ConfigurationError) -> Self {
        ResilienceError::Configuration(error.to_string())
    }
}

/// Failures reported by the external backend seams
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),
    #[error("Session error: {0}")]
    Session(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Realtime transport error: {0}")]
    Realtime(String),
}

pub type Result<T> = std::result::Result<T, ResilienceError>;
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = ResilienceError::CircuitBreakerOpen {
            operation: "approve_rate".to_string(),
            remaining: Duration::from_secs(12),
        };
        assert_eq!(err.code(), "CIRCUIT_BREAKER_OPEN");
        assert_eq!(
            err.to_string(),
            "Circuit breaker open for 'approve_rate', retry in 12s"
        );

        let err = ResilienceError::ChannelRetryExceeded {
            channel_id: "rooms".to_string(),
            retry_limit: 10,
        };
        assert_eq!(err.code(), "CHANNEL_RETRY_EXCEEDED");
    }

    #[test]
    fn test_sub_second_cooldown_rounds_up() {
        let err = ResilienceError::CircuitBreakerOpen {
            operation: "checkout".to_string(),
            remaining: Duration::from_millis(300),
        };
        assert!(err.to_string().ends_with("retry in 1s"));
    }

    #[test]
    fn test_timeouts_are_uncertain() {
        let timeout = ResilienceError::OperationTimeout {
            operation: "op".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_uncertain());

        let unhealthy = ResilienceError::ConnectionUnhealthy {
            reason: "unreachable".to_string(),
        };
        assert!(!unhealthy.is_uncertain());
    }

    #[test]
    fn test_backend_error_converts() {
        let err: ResilienceError = BackendError::HttpStatus(503).into();
        assert_eq!(err.code(), "BACKEND_ERROR");
        assert!(err.to_string().contains("503"));
    }
}
