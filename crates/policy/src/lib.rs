//! `registrar-policy`: access decisions.
//!
//! Pure functions over already-loaded users, fees and documents. No IO: the
//! caller loads the target and the requester's live debt, asks here, then
//! acts or rejects.

pub mod decision;
pub mod rules;

pub use decision::{Denial, DenialKind, Owned};
pub use rules::{
    can_change_role, can_download, can_manage_fees, can_verify_documents, can_view_user,
    owns_or_admin,
};
