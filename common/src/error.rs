use thiserror::Error;

/// Errors produced at the codec boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    /// Size, separator-count or trailing-escape validation failed.
    #[error("message failed validation")]
    Malformed,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("{field} field exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("invalid username: {0}")]
    InvalidUsername(String),
}
