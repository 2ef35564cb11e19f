//! Error handling for the chat relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay server error types
#[derive(Debug, Clone)]
pub enum RelayError {
    /// Network-related errors (bind, accept, socket I/O)
    Network(String),
    /// Wire protocol violations
    Protocol(String),
    /// Registration handshake failures
    Registration(String),
    /// Name or argument validation failures
    Validation(String),
    /// Capacity limits reached (directory, registry, room, queue)
    Capacity(String),
    /// Target session or room not found
    NotFound(String),
    /// Server internal error
    Internal(String),
    /// Configuration error
    Config(String),
}

impl RelayError {
    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            RelayError::Network(msg) => msg,
            RelayError::Protocol(msg) => msg,
            RelayError::Registration(msg) => msg,
            RelayError::Validation(msg) => msg,
            RelayError::Capacity(msg) => msg,
            RelayError::NotFound(msg) => msg,
            RelayError::Internal(msg) => msg,
            RelayError::Config(msg) => msg,
        }
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        RelayError::Network(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        RelayError::Protocol(msg.into())
    }

    /// Create a registration error
    pub fn registration<T: Into<String>>(msg: T) -> Self {
        RelayError::Registration(msg.into())
    }

    /// Create a validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        RelayError::Validation(msg.into())
    }

    /// Create a capacity error
    pub fn capacity<T: Into<String>>(msg: T) -> Self {
        RelayError::Capacity(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        RelayError::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        RelayError::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        RelayError::Config(msg.into())
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Network(msg) => write!(f, "Network error: {}", msg),
            RelayError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            RelayError::Registration(msg) => write!(f, "Registration error: {}", msg),
            RelayError::Validation(msg) => write!(f, "Validation error: {}", msg),
            RelayError::Capacity(msg) => write!(f, "Capacity limit: {}", msg),
            RelayError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RelayError::Internal(msg) => write!(f, "Internal error: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Network(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accessor() {
        let err = RelayError::capacity("Room is full");
        assert_eq!(err.message(), "Room is full");
    }

    #[test]
    fn test_display() {
        let err = RelayError::not_found("user carol");
        assert_eq!(err.to_string(), "Not found: user carol");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Network(_)));
    }
}
