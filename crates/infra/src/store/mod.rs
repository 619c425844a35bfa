//! Record storage boundary for users, fees and documents.
//!
//! Stores hold current state. Every fee write re-derives the owner's cached
//! `owes_fees` flag inside the same atomic unit as the write itself, so the
//! flag can never be observed out of step with a committed fee.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use registrar_auth::User;
use registrar_core::{DocumentId, ExpectedVersion, FeeId, Money, UserId};
use registrar_documents::{Document, DocumentRecord};
use registrar_fees::Fee;

pub use in_memory::InMemoryRecordStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRecordStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Version mismatch or uniqueness clash.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced record does not exist.
    #[error("{0} not found")]
    Missing(&'static str),

    /// The write would push a stored total out of range.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Connection, serialization or lock failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Owner debt state as committed together with a fee write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtSnapshot {
    pub owner: UserId,
    pub total_debt: Money,
    pub owes_fees: bool,
}

/// Keyed storage for the three record kinds.
///
/// Writes that carry an `ExpectedVersion` compare it with the stored
/// record's version before replacing it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── users ────────────────────────────────────────────────────────────────

    /// Insert a new user. A taken username is a `Conflict`.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Persist profile or role changes. The debt flag is never taken from
    /// `user`; only fee writes move it.
    async fn save_user(&self, user: &User, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Remove a user with everything they own.
    ///
    /// Fees they created lose their `created_by`; documents they verified go
    /// back to unverified. Returns the removed documents so their content
    /// can be dropped.
    async fn delete_user(&self, id: UserId) -> Result<Vec<DocumentRecord>, StoreError>;

    // ── fees ─────────────────────────────────────────────────────────────────

    /// Insert a fee and recompute its owner's debt flag atomically.
    async fn insert_fee(&self, fee: &Fee) -> Result<DebtSnapshot, StoreError>;

    /// Replace a fee and recompute its owner's debt flag atomically.
    async fn save_fee(&self, fee: &Fee, expected: ExpectedVersion)
    -> Result<DebtSnapshot, StoreError>;

    /// Delete a fee and recompute its owner's debt flag atomically.
    async fn delete_fee(&self, id: FeeId) -> Result<DebtSnapshot, StoreError>;

    async fn get_fee(&self, id: FeeId) -> Result<Option<Fee>, StoreError>;

    async fn list_fees_for_owner(&self, owner: UserId) -> Result<Vec<Fee>, StoreError>;

    async fn list_fees(&self) -> Result<Vec<Fee>, StoreError>;

    /// Live sum of unpaid amounts owned by `owner`.
    async fn total_debt(&self, owner: UserId) -> Result<Money, StoreError>;

    // ── documents ────────────────────────────────────────────────────────────

    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    async fn save_document(
        &self,
        document: &Document,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn delete_document(&self, id: DocumentId) -> Result<DocumentRecord, StoreError>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;

    async fn list_documents_for_owner(&self, owner: UserId) -> Result<Vec<Document>, StoreError>;

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;
}
