use thiserror::Error;

use registrar_auth::TokenError;
use registrar_core::DomainError;
use registrar_policy::Denial;

use crate::content::ContentError;
use crate::store::StoreError;

/// Error returned by the ledger, registry and identity services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A policy check refused the action.
    #[error(transparent)]
    Denied(#[from] Denial),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(what) => ServiceError::Domain(DomainError::NotFound(what)),
            StoreError::Conflict(msg) => ServiceError::Domain(DomainError::Conflict(msg)),
            StoreError::Rejected(msg) => ServiceError::Domain(DomainError::Validation(msg)),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn not_found(what: &'static str) -> Self {
        ServiceError::Domain(DomainError::not_found(what))
    }

    /// Whether the failure is the caller's fault (as opposed to the backend's).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::Domain(DomainError::InvariantViolation(_)) => false,
            ServiceError::Domain(_) | ServiceError::Denied(_) | ServiceError::Token(_) => true,
            ServiceError::Content(ContentError::InvalidKey(_)) => true,
            ServiceError::Store(_) | ServiceError::Content(_) => false,
        }
    }
}
