use serde::Serialize;
use thiserror::Error;

use registrar_core::{DomainError, UserId};
use registrar_documents::Document;
use registrar_fees::Fee;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// The action needs the ADMIN role.
    AdminRequired,
    /// The requester neither owns the resource nor is an admin.
    NotOwner,
    /// An ALUMNI owner still has unpaid fees.
    OutstandingFees,
}

/// A refused access decision.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct Denial {
    pub kind: DenialKind,
    pub message: String,
}

impl Denial {
    pub fn new(kind: DenialKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn admin_required(action: &str) -> Self {
        Self::new(
            DenialKind::AdminRequired,
            format!("only administrators can {action}"),
        )
    }

    pub fn not_owner() -> Self {
        Self::new(
            DenialKind::NotOwner,
            "you do not have permission to access this resource",
        )
    }

    pub fn outstanding_fees() -> Self {
        Self::new(
            DenialKind::OutstandingFees,
            "you have outstanding fees; settle them before downloading documents",
        )
    }
}

impl From<Denial> for DomainError {
    fn from(denial: Denial) -> Self {
        DomainError::PermissionDenied(denial.message)
    }
}

/// Resources that belong to exactly one user.
pub trait Owned {
    /// Owning user. `None` only for an aggregate that was never created.
    fn owner_id(&self) -> Option<UserId>;
}

impl Owned for Fee {
    fn owner_id(&self) -> Option<UserId> {
        self.owner()
    }
}

impl Owned for Document {
    fn owner_id(&self) -> Option<UserId> {
        self.owner()
    }
}
