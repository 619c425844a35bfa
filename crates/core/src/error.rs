//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// The variants are the error kinds a client must be able to tell apart:
/// bad input, missing record, forbidden, not logged in. Storage and transport
/// failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (non-positive amount, empty title, password mismatch).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The referenced user, fee or document does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A stale write (optimistic concurrency) or uniqueness clash.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is authenticated but a policy check refused the action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No credential, or the credential did not resolve to a user.
    #[error("unauthenticated")]
    Unauthenticated,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn not_found(what: &'static str) -> Self {
        Self::NotFound(what)
    }

    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::PermissionDenied(_) => "permission_denied",
            DomainError::Unauthenticated => "unauthenticated",
        }
    }
}
