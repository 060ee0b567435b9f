use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashgenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cannot connect to Ollama at {0}. Please make sure Ollama is running on your machine.")]
    ConnectivityError(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("HTTP error! status: {status}: {message}")]
    ProtocolError { status: u16, message: String },

    #[error("Response body ended without any generation record")]
    EmptyResponse,

    #[error("Model server error: {0}")]
    ServerError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl FlashgenError {
    /// Cancellation is an expected exit, callers should not report it as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlashgenError::Cancelled)
    }
}

impl From<std::io::Error> for FlashgenError {
    fn from(e: std::io::Error) -> Self {
        FlashgenError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for FlashgenError {
    fn from(e: serde_json::Error) -> Self {
        FlashgenError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FlashgenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_not_a_failure() {
        assert!(FlashgenError::Cancelled.is_cancelled());
        assert!(!FlashgenError::EmptyResponse.is_cancelled());
    }

    #[test]
    fn test_protocol_error_message() {
        let err = FlashgenError::ProtocolError {
            status: 404,
            message: "model 'x' not found".into(),
        };
        assert_eq!(err.to_string(), "HTTP error! status: 404: model 'x' not found");
    }
}
