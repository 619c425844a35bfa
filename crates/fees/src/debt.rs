//! Debt aggregation over a user's fees.

use serde::Serialize;

use registrar_core::{DomainError, Money, UserId};

use crate::fee::Fee;

/// Sum of unpaid amounts over the fees owned by `owner`.
///
/// Fees belonging to other users are ignored, so callers may pass any slice.
pub fn total_debt<'a, I>(fees: I, owner: UserId) -> Result<Money, DomainError>
where
    I: IntoIterator<Item = &'a Fee>,
{
    Money::checked_sum(
        fees.into_iter()
            .filter(|f| f.owner() == Some(owner))
            .map(Fee::outstanding),
    )
}

pub fn has_outstanding_debt<'a, I>(fees: I, owner: UserId) -> Result<bool, DomainError>
where
    I: IntoIterator<Item = &'a Fee>,
{
    Ok(!total_debt(fees, owner)?.is_zero())
}

/// Debt view for one user, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtSummary {
    pub owner: UserId,
    pub total_debt: Money,
    pub unpaid_count: usize,
}

impl DebtSummary {
    pub fn compute<'a, I>(fees: I, owner: UserId) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = &'a Fee>,
    {
        let unpaid: Vec<&Fee> = fees
            .into_iter()
            .filter(|f| f.owner() == Some(owner) && !f.is_paid())
            .collect();

        Ok(Self {
            owner,
            total_debt: total_debt(unpaid.iter().copied(), owner)?,
            unpaid_count: unpaid.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use registrar_core::{Aggregate, FeeId};

    use crate::fee::{CreateFee, FeeCommand, MarkPaid};

    fn fee_for(owner: UserId, cents: u64, paid: bool) -> Fee {
        let fee_id = FeeId::new();
        let mut fee = Fee::empty(fee_id);
        fee.execute(&FeeCommand::Create(CreateFee {
            fee_id,
            owner,
            description: "Tuition".to_string(),
            amount: Money::from_cents(cents),
            due_date: None,
            created_by: None,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        if paid {
            fee.execute(&FeeCommand::MarkPaid(MarkPaid {
                fee_id,
                paid_on: Utc::now().date_naive(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        }
        fee
    }

    #[test]
    fn no_fees_means_zero_debt() {
        let owner = UserId::new();
        let fees: Vec<Fee> = vec![];
        assert_eq!(total_debt(&fees, owner).unwrap(), Money::ZERO);
        assert!(!has_outstanding_debt(&fees, owner).unwrap());
    }

    #[test]
    fn only_unpaid_fees_of_owner_count() {
        let owner = UserId::new();
        let other = UserId::new();
        let fees = vec![
            fee_for(owner, 5000, false),
            fee_for(owner, 2500, true),
            fee_for(owner, 100, false),
            fee_for(other, 9999, false),
        ];

        assert_eq!(total_debt(&fees, owner).unwrap(), Money::from_cents(5100));
        assert!(has_outstanding_debt(&fees, owner).unwrap());

        let summary = DebtSummary::compute(&fees, owner).unwrap();
        assert_eq!(summary.unpaid_count, 2);
        assert_eq!(summary.total_debt, Money::from_cents(5100));
    }

    #[test]
    fn all_paid_means_no_debt() {
        let owner = UserId::new();
        let fees = vec![fee_for(owner, 5000, true), fee_for(owner, 1, true)];
        assert!(!has_outstanding_debt(&fees, owner).unwrap());
        assert_eq!(DebtSummary::compute(&fees, owner).unwrap().unpaid_count, 0);
    }

    proptest! {
        #[test]
        fn total_equals_sum_of_unpaid(entries in proptest::collection::vec((1u64..1_000_000, any::<bool>()), 0..20)) {
            let owner = UserId::new();
            let fees: Vec<Fee> = entries.iter().map(|(c, p)| fee_for(owner, *c, *p)).collect();
            let expected: u64 = entries.iter().filter(|(_, p)| !p).map(|(c, _)| *c).sum();

            let total = total_debt(&fees, owner).unwrap();
            prop_assert_eq!(total.cents(), expected);
            prop_assert_eq!(has_outstanding_debt(&fees, owner).unwrap(), expected > 0);
        }
    }
}
