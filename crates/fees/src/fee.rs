use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use registrar_core::{Aggregate, AggregateRoot, DomainError, Event, FeeId, Money, UserId};

/// Persisted shape of a fee (one row per fee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: FeeId,
    pub owner: UserId,
    pub description: String,
    pub amount: Money,
    pub is_paid: bool,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: Fee.
///
/// Payment state machine:
///
/// ```text
/// UNPAID --mark_paid(date)--> PAID
/// PAID   --mark_unpaid------> UNPAID
/// ```
///
/// Marking a fee with the state it already has emits nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fee {
    id: FeeId,
    owner: Option<UserId>,
    description: String,
    amount: Money,
    is_paid: bool,
    due_date: Option<NaiveDate>,
    paid_date: Option<NaiveDate>,
    created_by: Option<UserId>,
    created_at: DateTime<Utc>,
    version: u64,
    created: bool,
}

impl Fee {
    /// Create an empty, not-yet-created instance.
    pub fn empty(id: FeeId) -> Self {
        Self {
            id,
            owner: None,
            description: String::new(),
            amount: Money::ZERO,
            is_paid: false,
            due_date: None,
            paid_date: None,
            created_by: None,
            created_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild from a stored record.
    pub fn restore(record: FeeRecord) -> Self {
        Self {
            id: record.id,
            owner: Some(record.owner),
            description: record.description,
            amount: record.amount,
            is_paid: record.is_paid,
            due_date: record.due_date,
            paid_date: if record.is_paid { record.paid_date } else { None },
            created_by: record.created_by,
            created_at: record.created_at,
            version: record.version,
            created: true,
        }
    }

    /// Snapshot for persistence. `None` until the fee has been created.
    pub fn to_record(&self) -> Option<FeeRecord> {
        let owner = self.owner?;
        Some(FeeRecord {
            id: self.id,
            owner,
            description: self.description.clone(),
            amount: self.amount,
            is_paid: self.is_paid,
            due_date: self.due_date,
            paid_date: self.paid_date,
            created_by: self.created_by,
            created_at: self.created_at,
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> FeeId {
        self.id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn paid_date(&self) -> Option<NaiveDate> {
        self.paid_date
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Amount this fee contributes to its owner's debt.
    pub fn outstanding(&self) -> Money {
        if self.is_paid { Money::ZERO } else { self.amount }
    }

    /// Null the creator back-reference when that account is deleted.
    pub fn detach_creator(&mut self, user_id: UserId) -> bool {
        if self.created_by == Some(user_id) {
            self.created_by = None;
            self.version += 1;
            return true;
        }
        false
    }
}

impl AggregateRoot for Fee {
    type Id = FeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFee {
    pub fee_id: FeeId,
    pub owner: UserId,
    pub description: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkPaid {
    pub fee_id: FeeId,
    /// Calendar date recorded as the payment date ("today" for the caller).
    pub paid_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkUnpaid {
    pub fee_id: FeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Partial edit; `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFee {
    pub fee_id: FeeId,
    pub description: Option<String>,
    pub amount: Option<Money>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<NaiveDate>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeCommand {
    Create(CreateFee),
    MarkPaid(MarkPaid),
    MarkUnpaid(MarkUnpaid),
    Edit(EditFee),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCreated {
    pub fee_id: FeeId,
    pub owner: UserId,
    pub description: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePaid {
    pub fee_id: FeeId,
    pub paid_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeUnpaid {
    pub fee_id: FeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEdited {
    pub fee_id: FeeId,
    pub description: String,
    pub amount: Money,
    pub previous_amount: Money,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeEvent {
    Created(FeeCreated),
    Paid(FeePaid),
    Unpaid(FeeUnpaid),
    Edited(FeeEdited),
}

impl FeeEvent {
    /// Whether the owner's unpaid total may have changed.
    ///
    /// An edit only matters while the fee is unpaid; the caller passes the
    /// post-event paid state.
    pub fn changes_debt(&self, is_paid: bool) -> bool {
        match self {
            FeeEvent::Created(_) | FeeEvent::Paid(_) | FeeEvent::Unpaid(_) => true,
            FeeEvent::Edited(e) => !is_paid && e.amount != e.previous_amount,
        }
    }
}

impl Event for FeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FeeEvent::Created(_) => "fees.fee.created",
            FeeEvent::Paid(_) => "fees.fee.paid",
            FeeEvent::Unpaid(_) => "fees.fee.unpaid",
            FeeEvent::Edited(_) => "fees.fee.edited",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FeeEvent::Created(e) => e.occurred_at,
            FeeEvent::Paid(e) => e.occurred_at,
            FeeEvent::Unpaid(e) => e.occurred_at,
            FeeEvent::Edited(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Fee {
    type Command = FeeCommand;
    type Event = FeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FeeEvent::Created(e) => {
                self.id = e.fee_id;
                self.owner = Some(e.owner);
                self.description = e.description.clone();
                self.amount = e.amount;
                self.is_paid = false;
                self.due_date = e.due_date;
                self.paid_date = None;
                self.created_by = e.created_by;
                self.created_at = e.occurred_at;
                self.created = true;
            }
            FeeEvent::Paid(e) => {
                self.is_paid = true;
                self.paid_date = Some(e.paid_date);
            }
            FeeEvent::Unpaid(_) => {
                self.is_paid = false;
                self.paid_date = None;
            }
            FeeEvent::Edited(e) => {
                self.description = e.description.clone();
                self.amount = e.amount;
                self.due_date = e.due_date;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FeeCommand::Create(cmd) => self.handle_create(cmd),
            FeeCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            FeeCommand::MarkUnpaid(cmd) => self.handle_mark_unpaid(cmd),
            FeeCommand::Edit(cmd) => self.handle_edit(cmd),
        }
    }
}

fn validate_amount(amount: Money) -> Result<(), DomainError> {
    if amount < Money::MIN_CHARGE {
        return Err(DomainError::validation(format!(
            "amount must be at least {}",
            Money::MIN_CHARGE
        )));
    }
    if amount > Money::MAX_CHARGE {
        return Err(DomainError::validation(format!(
            "amount must be at most {}",
            Money::MAX_CHARGE
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), DomainError> {
    if description.trim().is_empty() {
        return Err(DomainError::validation("description cannot be empty"));
    }
    Ok(())
}

impl Fee {
    fn ensure_fee_id(&self, fee_id: FeeId) -> Result<(), DomainError> {
        if self.id != fee_id {
            return Err(DomainError::invariant("fee_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, fee_id: FeeId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("fee"));
        }
        self.ensure_fee_id(fee_id)
    }

    fn handle_create(&self, cmd: &CreateFee) -> Result<Vec<FeeEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("fee already exists"));
        }
        validate_description(&cmd.description)?;
        validate_amount(cmd.amount)?;

        Ok(vec![FeeEvent::Created(FeeCreated {
            fee_id: cmd.fee_id,
            owner: cmd.owner,
            description: cmd.description.trim().to_string(),
            amount: cmd.amount,
            due_date: cmd.due_date,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<FeeEvent>, DomainError> {
        self.ensure_created(cmd.fee_id)?;

        if self.is_paid {
            return Ok(vec![]);
        }

        Ok(vec![FeeEvent::Paid(FeePaid {
            fee_id: cmd.fee_id,
            paid_date: cmd.paid_on,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_unpaid(&self, cmd: &MarkUnpaid) -> Result<Vec<FeeEvent>, DomainError> {
        self.ensure_created(cmd.fee_id)?;

        if !self.is_paid {
            return Ok(vec![]);
        }

        Ok(vec![FeeEvent::Unpaid(FeeUnpaid {
            fee_id: cmd.fee_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditFee) -> Result<Vec<FeeEvent>, DomainError> {
        self.ensure_created(cmd.fee_id)?;

        let description = match &cmd.description {
            Some(d) => {
                validate_description(d)?;
                d.trim().to_string()
            }
            None => self.description.clone(),
        };
        let amount = match cmd.amount {
            Some(a) => {
                validate_amount(a)?;
                a
            }
            None => self.amount,
        };
        let due_date = cmd.due_date.unwrap_or(self.due_date);

        if description == self.description && amount == self.amount && due_date == self.due_date {
            return Ok(vec![]);
        }

        Ok(vec![FeeEvent::Edited(FeeEdited {
            fee_id: cmd.fee_id,
            description,
            amount,
            previous_amount: self.amount,
            due_date,
            occurred_at: cmd.occurred_at,
        })])
    }
}
