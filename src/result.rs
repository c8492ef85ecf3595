//! Uniform result type for store and pipeline operations.
//!
//! Every action returns `Result<T, ActionError>` instead of throwing across
//! module boundaries. The error carries a machine-readable [`ErrorKind`] and a
//! stable human-readable message; the HTTP layer maps kinds to status codes.

use std::fmt;

/// Classification of an action failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No resolved identity, or an invalid/expired credential.
    Unauthorized,
    /// Record absent, or present but not owned by the caller.
    NotFound,
    /// Malformed input: bad id format, missing field, unsupported file.
    Validation,
    /// An external collaborator (embedding, completion, vector index,
    /// database) call failed.
    Collaborator,
}

impl ErrorKind {
    /// Stable wire code used in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Collaborator => "collaborator_failure",
        }
    }
}

/// A failed action: what kind of failure, and a message fit for display.
#[derive(Debug, Clone)]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn collaborator(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Collaborator,
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for ActionError {}

/// Database errors surface as collaborator failures at the action boundary.
impl From<sqlx::Error> for ActionError {
    fn from(e: sqlx::Error) -> Self {
        ActionError::collaborator(format!("database error: {}", e))
    }
}

/// Collaborator client errors (embedding, completion, vector index) are
/// reported with their underlying message; callers do not retry.
impl From<anyhow::Error> for ActionError {
    fn from(e: anyhow::Error) -> Self {
        ActionError::collaborator(e.to_string())
    }
}

/// Result alias used by every store and pipeline operation.
pub type ActionResult<T> = Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::Unauthorized.code(), "unauthorized");
        assert_eq!(ErrorKind::NotFound.code(), "not_found");
        assert_eq!(ErrorKind::Validation.code(), "validation_error");
        assert_eq!(ErrorKind::Collaborator.code(), "collaborator_failure");
    }

    #[test]
    fn sqlx_error_maps_to_collaborator() {
        let err: ActionError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind, ErrorKind::Collaborator);
        assert!(err.message.contains("database error"));
    }
}
