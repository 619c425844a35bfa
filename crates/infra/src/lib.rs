//! Infrastructure layer: record and content storage, configuration, and the
//! services that tie the domain crates to them.
//!
//! Every service method takes the acting [`registrar_auth::User`], asks the
//! policy crate for a decision, and only then touches storage.

pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod registry;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, RegistrarConfig};
pub use content::{ContentError, ContentStore, FsContentStore, InMemoryContentStore};
pub use error::ServiceError;
pub use identity::{BootstrapAdmin, IdentityService, LoginOutcome, ProfileChanges};
pub use ledger::{FeeChanges, FeeLedger, NewFee};
pub use registry::{DocumentChanges, DocumentDownload, DocumentRegistry, NewDocument};
pub use store::{DebtSnapshot, InMemoryRecordStore, RecordStore, StoreError};

#[cfg(feature = "postgres")]
pub use store::PostgresRecordStore;
