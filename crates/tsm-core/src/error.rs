//! Error types for session orchestration

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while deriving, dispatching or joining a session
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input (bad base64, missing field)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Node misconfiguration or a request this node's role may not serve
    #[error("Configuration fault: {0}")]
    ConfigurationFault(String),

    /// The signing engine rejected or failed the call
    #[error("Signing engine failure: {0}")]
    EngineFailure(String),

    /// A peer node could not be reached
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// No record for the requested session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level error classification carried in the `text` field of error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    ConfigurationFault,
    EngineFailure,
    TransportFailure,
    SessionNotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::ConfigurationFault => "CONFIGURATION_FAULT",
            ErrorKind::EngineFailure => "ENGINE_FAILURE",
            ErrorKind::TransportFailure => "TRANSPORT_FAILURE",
            ErrorKind::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Only malformed input is attributable to the caller.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, ErrorKind::InvalidInput)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationFault(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::EngineFailure(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFailure(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::ConfigurationFault(_) => ErrorKind::ConfigurationFault,
            Error::EngineFailure(_) => ErrorKind::EngineFailure,
            Error::TransportFailure(_) => ErrorKind::TransportFailure,
            Error::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message without the variant prefix, as sent to clients.
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidInput(msg)
            | Error::ConfigurationFault(msg)
            | Error::EngineFailure(msg)
            | Error::TransportFailure(msg)
            | Error::SessionNotFound(msg)
            | Error::Serialization(msg)
            | Error::Internal(msg) => msg,
        }
    }

    /// Rebuild an error from a remote error body.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidInput => Error::InvalidInput(message),
            ErrorKind::ConfigurationFault => Error::ConfigurationFault(message),
            ErrorKind::EngineFailure => Error::EngineFailure(message),
            ErrorKind::TransportFailure => Error::TransportFailure(message),
            ErrorKind::SessionNotFound => Error::SessionNotFound(message),
            ErrorKind::Internal => Error::Internal(message),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
