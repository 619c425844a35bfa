//! Domain events describing committed state transitions.

use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate when a command succeeds.
///
/// Records are persisted as current state; events are returned to the
/// service layer, which logs them and hands them back to callers.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "fees.fee.paid").
    fn event_type(&self) -> &'static str;

    /// When the transition happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
