use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use registrar_core::{UserId, ValueObject};

/// Verification sub-state of a document.
///
/// `verified_by` and `verified_at` exist only inside `Verified`, so a
/// half-verified document cannot be represented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    #[default]
    Unverified,
    Verified {
        by: UserId,
        at: DateTime<Utc>,
    },
}

impl ValueObject for Verification {}

impl Verification {
    /// Snapshot after an admin attests the document.
    ///
    /// Re-verifying replaces the verifier. The timestamp never moves
    /// backwards.
    pub fn verify(self, by: UserId, at: DateTime<Utc>) -> Self {
        let at = match self {
            Verification::Verified { at: previous, .. } => previous.max(at),
            Verification::Unverified => at,
        };
        Verification::Verified { by, at }
    }

    pub fn cleared() -> Self {
        Verification::Unverified
    }

    /// Rebuild from the flat storage columns.
    ///
    /// Returns `None` when the columns disagree (one set, the other null).
    pub fn from_parts(
        is_verified: bool,
        by: Option<UserId>,
        at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        match (is_verified, by, at) {
            (true, Some(by), Some(at)) => Some(Verification::Verified { by, at }),
            (false, None, None) => Some(Verification::Unverified),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }

    pub fn verified_by(&self) -> Option<UserId> {
        match self {
            Verification::Verified { by, .. } => Some(*by),
            Verification::Unverified => None,
        }
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Verification::Verified { at, .. } => Some(*at),
            Verification::Unverified => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn flat_fields_move_together() {
        let v = Verification::cleared();
        assert!(!v.is_verified());
        assert_eq!(v.verified_by(), None);
        assert_eq!(v.verified_at(), None);

        let admin = UserId::new();
        let now = Utc::now();
        let v = v.verify(admin, now);
        assert!(v.is_verified());
        assert_eq!(v.verified_by(), Some(admin));
        assert_eq!(v.verified_at(), Some(now));
    }

    #[test]
    fn reverify_overwrites_verifier() {
        let first = UserId::new();
        let second = UserId::new();
        let now = Utc::now();
        let v = Verification::cleared()
            .verify(first, now)
            .verify(second, now + Duration::seconds(5));
        assert_eq!(v.verified_by(), Some(second));
        assert_eq!(v.verified_at(), Some(now + Duration::seconds(5)));
    }

    #[test]
    fn reverify_with_earlier_clock_keeps_later_timestamp() {
        let admin = UserId::new();
        let now = Utc::now();
        let v = Verification::cleared()
            .verify(admin, now)
            .verify(admin, now - Duration::minutes(1));
        assert_eq!(v.verified_at(), Some(now));
    }

    #[test]
    fn from_parts_rejects_mixed_columns() {
        let admin = UserId::new();
        assert_eq!(Verification::from_parts(true, Some(admin), None), None);
        assert_eq!(Verification::from_parts(false, Some(admin), None), None);
        assert_eq!(
            Verification::from_parts(false, None, None),
            Some(Verification::Unverified)
        );
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(Verification::cleared()).unwrap();
        assert_eq!(json["status"], "unverified");
    }

    proptest! {
        #[test]
        fn verified_at_is_monotonic(offsets in proptest::collection::vec(-10_000i64..10_000, 1..16)) {
            let admin = UserId::new();
            let base = Utc::now();
            let mut v = Verification::cleared();
            let mut last = None;
            for off in offsets {
                v = v.verify(admin, base + Duration::seconds(off));
                let at = v.verified_at().unwrap();
                if let Some(prev) = last {
                    prop_assert!(at >= prev);
                }
                last = Some(at);
            }
        }
    }
}
