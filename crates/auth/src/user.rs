//! User aggregate for identity management.
//!
//! Besides the account data, a user carries `owes_fees`: a cached projection
//! of the fee ledger that only [`User::recompute_debt_flag`] may change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use registrar_core::{Aggregate, AggregateRoot, DomainError, Event, Money, UserId};

use crate::Role;

pub const MIN_PASSWORD_LEN: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// User aggregate.
///
/// # Invariants
/// - `username` is non-empty and stored trimmed.
/// - `owes_fees == (total_debt > 0)` after every fee mutation committed by
///   the store; it is never set from outside `recompute_debt_flag`.
/// - Only an admin actor may change a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    owes_fees: bool,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            email: String::new(),
            display_name: None,
            role: Role::default(),
            owes_fees: false,
            password_hash: String::new(),
            created_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild a user from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: UserId,
        username: String,
        email: String,
        display_name: Option<String>,
        role: Role,
        owes_fees: bool,
        password_hash: String,
        created_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id,
            username,
            email,
            display_name,
            role,
            owes_fees,
            password_hash,
            created_at,
            version,
            created: true,
        }
    }

    /// Cached debt flag. Authoritative value: the ledger's unpaid total.
    pub fn owes_fees(&self) -> bool {
        self.owes_fees
    }

    /// Re-derive the cached debt flag from the owner's unpaid total.
    ///
    /// Returns `true` when the flag changed. Stores call this inside the same
    /// atomic unit that persisted the fee change.
    pub fn recompute_debt_flag(&mut self, total_debt: Money) -> bool {
        let owes = !total_debt.is_zero();
        if owes == self.owes_fees {
            return false;
        }
        self.owes_fees = owes;
        self.version += 1;
        true
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("user"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration input
// ─────────────────────────────────────────────────────────────────────────────

/// Raw registration form, validated before the password is hashed.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl RegistrationForm {
    /// Check everything that does not need the store (uniqueness is checked
    /// by the identity service).
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.password != self.password_confirm {
            return Err(DomainError::validation("passwords do not match"));
        }
        if !self.role.is_self_assignable() {
            return Err(DomainError::validation(format!(
                "role {} cannot be chosen at registration",
                self.role
            )));
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<(), DomainError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username cannot be empty"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("username cannot contain whitespace"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DomainError::validation("invalid email format")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpdateProfile {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChangeRole {
    pub user_id: UserId,
    pub role: Role,
    /// Role of the account performing the change (escalation check).
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum UserCommand {
    Register(RegisterUser),
    UpdateProfile(UpdateProfile),
    ChangeRole(ChangeRole),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdated {
    pub user_id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChanged {
    pub user_id: UserId,
    pub from: Role,
    pub to: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UserEvent {
    Registered(UserRegistered),
    ProfileUpdated(ProfileUpdated),
    RoleChanged(RoleChanged),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered(_) => "auth.user.registered",
            UserEvent::ProfileUpdated(_) => "auth.user.profile_updated",
            UserEvent::RoleChanged(_) => "auth.user.role_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Registered(e) => e.occurred_at,
            UserEvent::ProfileUpdated(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Registered(e) => {
                self.id = e.user_id;
                self.username = e.username.clone();
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.role = e.role;
                self.password_hash = e.password_hash.clone();
                self.owes_fees = false;
                self.created_at = e.occurred_at;
                self.created = true;
            }
            UserEvent::ProfileUpdated(e) => {
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
            }
            UserEvent::RoleChanged(e) => {
                self.role = e.to;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Register(cmd) => self.handle_register(cmd),
            UserCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            UserCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
        }
    }
}

impl User {
    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        validate_username(&cmd.username)?;
        validate_email(&cmd.email)?;
        if cmd.password_hash.is_empty() {
            return Err(DomainError::invariant("password hash missing"));
        }

        Ok(vec![UserEvent::Registered(UserRegistered {
            user_id: cmd.user_id,
            username: cmd.username.trim().to_string(),
            email: cmd.email.trim().to_lowercase(),
            display_name: normalize_display_name(cmd.display_name.as_deref()),
            role: cmd.role,
            password_hash: cmd.password_hash.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;

        let email = match &cmd.email {
            Some(email) => {
                validate_email(email)?;
                email.trim().to_lowercase()
            }
            None => self.email.clone(),
        };
        let display_name = match &cmd.display_name {
            Some(name) => normalize_display_name(Some(name)),
            None => self.display_name.clone(),
        };

        if email == self.email && display_name == self.display_name {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::ProfileUpdated(ProfileUpdated {
            user_id: self.id,
            email,
            display_name,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;

        if !cmd.actor_role.is_admin() {
            return Err(DomainError::permission_denied("only admins can change roles"));
        }
        if cmd.role == self.role {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RoleChanged(RoleChanged {
            user_id: self.id,
            from: self.role,
            to: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalize_display_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
