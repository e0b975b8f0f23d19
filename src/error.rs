use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RelayError {
    // Connection errors
    ConnectionClosed,

    // Channel errors
    InvalidChannel(String),

    // Message errors
    MessageParseError(String),
    SerializationError(String),

    // Configuration errors
    ConfigError(String),

    // System errors
    SystemError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "Connection is closed"),
            Self::InvalidChannel(msg) => write!(f, "Invalid channel: {}", msg),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::SerializationError(err.to_string())
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;
