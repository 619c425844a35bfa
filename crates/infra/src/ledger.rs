use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use registrar_auth::User;
use registrar_core::{Aggregate, AggregateRoot, Event, ExpectedVersion, FeeId, Money, UserId};
use registrar_fees::{
    CreateFee, DebtSummary, EditFee, Fee, FeeCommand, FeeEvent, MarkPaid, MarkUnpaid,
};
use registrar_policy::{can_manage_fees, can_view_user, owns_or_admin};

use crate::error::ServiceError;
use crate::store::{DebtSnapshot, RecordStore};

/// Input for a new fee.
#[derive(Debug, Clone)]
pub struct NewFee {
    pub owner: UserId,
    pub description: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
}

/// Partial fee edit. `due_date: Some(None)` clears the date.
#[derive(Debug, Clone, Default)]
pub struct FeeChanges {
    pub description: Option<String>,
    pub amount: Option<Money>,
    pub due_date: Option<Option<NaiveDate>>,
}

/// Fee ledger service.
///
/// Every committed fee write returns with the owner's `owes_fees` already
/// re-derived by the store.
pub struct FeeLedger {
    store: Arc<dyn RecordStore>,
}

impl FeeLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn load(&self, id: FeeId) -> Result<Fee, ServiceError> {
        self.store
            .get_fee(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("fee"))
    }

    /// Apply `command` to a stored fee and persist the result.
    ///
    /// Commands that emit nothing (already paid, already unpaid, empty edit)
    /// leave the store untouched.
    async fn transition(&self, id: FeeId, command: FeeCommand) -> Result<Fee, ServiceError> {
        let mut fee = self.load(id).await?;
        let expected = ExpectedVersion::Exact(fee.version());

        let events = fee.execute(&command)?;
        if events.is_empty() {
            return Ok(fee);
        }

        let snapshot = self.store.save_fee(&fee, expected).await?;
        log_events(&events, &fee, &snapshot);
        Ok(fee)
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.id, owner = %input.owner), err)]
    pub async fn create_fee(&self, actor: &User, input: NewFee) -> Result<Fee, ServiceError> {
        can_manage_fees(actor)?;

        let fee_id = FeeId::new();
        let mut fee = Fee::empty(fee_id);
        let events = fee.execute(&FeeCommand::Create(CreateFee {
            fee_id,
            owner: input.owner,
            description: input.description,
            amount: input.amount,
            due_date: input.due_date,
            created_by: Some(actor.id),
            occurred_at: Utc::now(),
        }))?;

        let snapshot = self.store.insert_fee(&fee).await?;
        log_events(&events, &fee, &snapshot);
        Ok(fee)
    }

    /// Mark a fee paid with today's date. Already-paid fees are unchanged.
    #[instrument(skip(self, actor), fields(actor = %actor.id), err)]
    pub async fn mark_paid(&self, actor: &User, id: FeeId) -> Result<Fee, ServiceError> {
        can_manage_fees(actor)?;
        let now = Utc::now();
        self.transition(
            id,
            FeeCommand::MarkPaid(MarkPaid {
                fee_id: id,
                paid_on: now.date_naive(),
                occurred_at: now,
            }),
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id), err)]
    pub async fn mark_unpaid(&self, actor: &User, id: FeeId) -> Result<Fee, ServiceError> {
        can_manage_fees(actor)?;
        self.transition(
            id,
            FeeCommand::MarkUnpaid(MarkUnpaid {
                fee_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    /// Move a fee to paid or unpaid.
    pub async fn set_paid(&self, actor: &User, id: FeeId, paid: bool) -> Result<Fee, ServiceError> {
        if paid {
            self.mark_paid(actor, id).await
        } else {
            self.mark_unpaid(actor, id).await
        }
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.id), err)]
    pub async fn edit_fee(
        &self,
        actor: &User,
        id: FeeId,
        changes: FeeChanges,
    ) -> Result<Fee, ServiceError> {
        can_manage_fees(actor)?;
        self.transition(
            id,
            FeeCommand::Edit(EditFee {
                fee_id: id,
                description: changes.description,
                amount: changes.amount,
                due_date: changes.due_date,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id), err)]
    pub async fn delete_fee(&self, actor: &User, id: FeeId) -> Result<(), ServiceError> {
        can_manage_fees(actor)?;
        let snapshot = self.store.delete_fee(id).await?;
        info!(
            fee_id = %id,
            owner = %snapshot.owner,
            total_debt = %snapshot.total_debt,
            owes_fees = snapshot.owes_fees,
            "fee deleted"
        );
        Ok(())
    }

    pub async fn get(&self, actor: &User, id: FeeId) -> Result<Fee, ServiceError> {
        let fee = self.load(id).await?;
        owns_or_admin(actor, &fee)?;
        Ok(fee)
    }

    /// Admins see every fee; anyone else sees their own.
    pub async fn list(&self, actor: &User) -> Result<Vec<Fee>, ServiceError> {
        if actor.role.is_admin() {
            return Ok(self.store.list_fees().await?);
        }
        Ok(self.store.list_fees_for_owner(actor.id).await?)
    }

    pub async fn list_for_owner(&self, actor: &User, owner: UserId) -> Result<Vec<Fee>, ServiceError> {
        let target = self
            .store
            .get_user(owner)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))?;
        can_view_user(actor, &target)?;
        Ok(self.store.list_fees_for_owner(owner).await?)
    }

    /// Live unpaid total for `owner`.
    pub async fn total_debt(&self, owner: UserId) -> Result<Money, ServiceError> {
        Ok(self.store.total_debt(owner).await?)
    }

    pub async fn has_outstanding_debt(&self, owner: UserId) -> Result<bool, ServiceError> {
        Ok(!self.total_debt(owner).await?.is_zero())
    }

    pub async fn debt_summary(&self, actor: &User, owner: UserId) -> Result<DebtSummary, ServiceError> {
        let fees = self.list_for_owner(actor, owner).await?;
        Ok(DebtSummary::compute(&fees, owner)?)
    }
}

fn log_events(events: &[FeeEvent], fee: &Fee, snapshot: &DebtSnapshot) {
    for event in events {
        info!(
            event_type = event.event_type(),
            fee_id = %fee.id_typed(),
            owner = %snapshot.owner,
            amount = %fee.amount(),
            debt_changed = event.changes_debt(fee.is_paid()),
            total_debt = %snapshot.total_debt,
            owes_fees = snapshot.owes_fees,
            "fee committed"
        );
    }
}
