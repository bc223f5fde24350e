use thiserror::Error;

/// Canonical error type for configuration and action handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Action name did not match any supported action.
    #[error("unknown action `{name}`")]
    UnknownAction {
        /// Name as supplied by the caller.
        name: String,
    },

    /// Configuration was loaded but failed validation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable explanation of the problem.
        message: String,
    },

    /// Layered configuration could not be built or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error occurred while reading a local file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),
}

impl CoreError {
    /// Creates an `UnknownAction` variant.
    #[must_use]
    pub fn unknown_action(name: impl Into<String>) -> Self {
        Self::UnknownAction { name: name.into() }
    }

    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::DeserializationError(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
