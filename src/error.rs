// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EslError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Invalid greeting from FreeSWITCH: {0}")]
    InvalidGreeting(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("No data received for {0} seconds")]
    IdleTimeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

impl EslError {
    /// Whether the connection that produced this error can no longer be used.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, EslError::MalformedEvent(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EslError::Io(_) => "io_error",
            EslError::ConnectTimeout(_) => "connect_timeout",
            EslError::InvalidGreeting(_) => "invalid_greeting",
            EslError::AuthFailed(_) => "auth_failed",
            EslError::CommandFailed(_) => "command_failed",
            EslError::NotConnected => "not_connected",
            EslError::ConnectionClosed => "connection_closed",
            EslError::IdleTimeout(_) => "idle_timeout",
            EslError::Protocol(_) => "protocol_error",
            EslError::MalformedEvent(_) => "malformed_event",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("Log setup failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_connection_errors_are_fatal() {
        let broken_pipe = EslError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(broken_pipe.is_connection_fatal());
        assert!(EslError::NotConnected.is_connection_fatal());
        assert!(EslError::ConnectionClosed.is_connection_fatal());
        assert!(EslError::Protocol("bad length".to_string()).is_connection_fatal());
    }

    #[test]
    fn test_malformed_event_is_not_fatal() {
        let err = EslError::MalformedEvent("missing Event-Name".to_string());
        assert!(!err.is_connection_fatal());
        assert_eq!(err.error_code(), "malformed_event");
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::Invalid {
            key: "FS_PORT".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for FS_PORT: \"abc\"");
    }
}
