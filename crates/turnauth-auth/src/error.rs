//! Authorization error types.
//!
//! This module defines the errors raised by the authorization engine. Protocol
//! failures (misdirected exchange payloads, wrong codes, cancelled sign-ins)
//! are never errors: handlers report them as `Rejected`. Transient token
//! service failures are absorbed into an empty token. What remains are
//! configuration problems, infrastructure failures, and invariant violations.

use std::fmt;

use turnauth_core::CoreError;
use turnauth_storage::StorageError;

use crate::config::ConfigError;

/// Errors that can occur while processing authorization for a turn.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A required setting is missing or a runtime input does not match the
    /// configuration (e.g. a token that cannot be exchanged on-behalf-of).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The inbound request lacks data the handler needs.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// An error occurred while storing or retrieving session data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The token service or a token provider failed.
    #[error("Token service error: {message}")]
    TokenService {
        /// Description of the failure.
        message: String,
    },

    /// Sending to the channel failed.
    #[error("Channel error: {message}")]
    Channel {
        /// Description of the channel error.
        message: String,
    },

    /// A handler id was requested that is not registered.
    #[error("Authorization handler '{handler_id}' is not registered")]
    HandlerNotFound {
        /// The unknown handler id.
        handler_id: String,
    },

    /// Two handlers were registered with the same id.
    #[error("Authorization handler '{handler_id}' is registered more than once")]
    DuplicateHandler {
        /// The duplicated handler id.
        handler_id: String,
    },

    /// Handlers kept asking for revalidation past the allowed number of passes.
    #[error("Authorization did not settle after {passes} revalidation passes (last handler: '{handler_id}')")]
    RevalidationLimitExceeded {
        /// Number of passes performed.
        passes: usize,
        /// Handler that requested the last revalidation.
        handler_id: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `TokenService` error.
    #[must_use]
    pub fn token_service(message: impl Into<String>) -> Self {
        Self::TokenService {
            message: message.into(),
        }
    }

    /// Creates a new `Channel` error.
    #[must_use]
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Creates a new `HandlerNotFound` error.
    #[must_use]
    pub fn handler_not_found(handler_id: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            handler_id: handler_id.into(),
        }
    }

    /// Creates a new `DuplicateHandler` error.
    #[must_use]
    pub fn duplicate_handler(handler_id: impl Into<String>) -> Self {
        Self::DuplicateHandler {
            handler_id: handler_id.into(),
        }
    }

    /// Creates a new `RevalidationLimitExceeded` error.
    #[must_use]
    pub fn revalidation_limit(passes: usize, handler_id: impl Into<String>) -> Self {
        Self::RevalidationLimitExceeded {
            passes,
            handler_id: handler_id.into(),
        }
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if a handler or the registry broke an engine invariant.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotFound { .. }
                | Self::DuplicateHandler { .. }
                | Self::RevalidationLimitExceeded { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::TokenService { .. } => ErrorCategory::Infrastructure,
            Self::Channel { .. } => ErrorCategory::Infrastructure,
            Self::HandlerNotFound { .. } => ErrorCategory::Invariant,
            Self::DuplicateHandler { .. } => ErrorCategory::Invariant,
            Self::RevalidationLimitExceeded { .. } => ErrorCategory::Invariant,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<CoreError> for AuthError {
    fn from(err: CoreError) -> Self {
        Self::channel(err.to_string())
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Categories of authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration errors.
    Configuration,
    /// Request validation errors.
    Validation,
    /// Infrastructure errors (storage, token service, channel).
    Infrastructure,
    /// Engine invariant violations.
    Invariant,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Invariant => write!(f, "invariant"),
        }
    }
}
