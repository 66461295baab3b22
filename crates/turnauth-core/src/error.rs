use thiserror::Error;

/// Core error types for turn handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to send to channel: {message}")]
    Send { message: String },

    #[error("Invalid activity: {message}")]
    InvalidActivity { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new Send error
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    /// Create a new InvalidActivity error
    pub fn invalid_activity(message: impl Into<String>) -> Self {
        Self::InvalidActivity {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
