//! Error types for actor-postgres.

use std::collections::HashMap;

use thiserror::Error;

/// Result type for actor-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A server-reported error or notice.
///
/// PostgreSQL delivers these as a map from single-byte field codes to
/// UTF-8 strings; the raw map is kept so callers can inspect every field
/// the server sent.
#[derive(Debug, Clone, Default)]
pub struct ServerError {
    fields: HashMap<u8, String>,
}

impl ServerError {
    /// Wrap a parsed field map.
    pub fn new(fields: HashMap<u8, String>) -> Self {
        Self { fields }
    }

    /// The raw field-code → value map.
    pub fn fields(&self) -> &HashMap<u8, String> {
        &self.fields
    }

    /// Look up a field by its code byte.
    pub fn get(&self, code: u8) -> Option<&str> {
        self.fields.get(&code).map(String::as_str)
    }

    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, ...
    pub fn severity(&self) -> Option<&str> {
        self.get(b'S')
    }

    /// SQLSTATE error code (5 characters).
    pub fn code(&self) -> Option<&str> {
        self.get(b'C')
    }

    /// Primary error message.
    pub fn message(&self) -> Option<&str> {
        self.get(b'M')
    }

    /// Detailed error explanation.
    pub fn detail(&self) -> Option<&str> {
        self.get(b'D')
    }

    /// Suggestion for fixing the error.
    pub fn hint(&self) -> Option<&str> {
        self.get(b'H')
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = self.severity() {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = self.message() {
            write!(f, "{}", message)?;
        }
        if let Some(code) = self.code() {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for actor-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ServerError),

    /// Protocol error (malformed message, unexpected message for phase, ...)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A parameter value could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// A result field could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The session actor is gone or the socket was closed
    #[error("Connection closed")]
    Disconnected,

    /// Invalid usage (e.g., request outside the ready phase)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl From<std::convert::Infallible> for Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}

impl Error {
    /// Returns true if the session cannot continue after this error.
    ///
    /// Server errors and encode/decode failures leave the session able to
    /// re-enter the ready phase; transport and protocol errors do not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::Io(_) | Error::Auth(_) | Error::Disconnected
        )
    }

    /// Get the server field map if this is a server error.
    pub fn postgres(&self) -> Option<&ServerError> {
        match self {
            Error::Server(fields) => Some(fields),
            _ => None,
        }
    }
}
