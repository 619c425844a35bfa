//! Fee ledger domain (pure).
//!
//! Fees are administrative debts owed by a user. This crate holds the fee
//! state machine and the debt aggregation over a user's fees; persistence
//! and the owner's cached debt flag are handled by the infrastructure layer.

pub mod debt;
pub mod fee;

pub use debt::{DebtSummary, has_outstanding_debt, total_debt};
pub use fee::{
    CreateFee, EditFee, Fee, FeeCommand, FeeCreated, FeeEdited, FeeEvent, FeePaid, FeeRecord,
    FeeUnpaid, MarkPaid, MarkUnpaid,
};
