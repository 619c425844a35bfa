use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use registrar_auth::{
    ChangeRole, JwtValidator, PasswordHasher, RegisterUser, RegistrationForm, Role,
    Sha256PasswordHasher, TokenIssuer, UpdateProfile, User, UserCommand,
};
use registrar_core::{Aggregate, AggregateRoot, DomainError, Event, ExpectedVersion, UserId};
use registrar_policy::{can_change_role, can_view_user};

use crate::content::ContentStore;
use crate::error::ServiceError;
use crate::store::RecordStore;

/// First administrator, created at startup when configured.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
}

/// Self-service profile edit.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Accounts: registration, login, profile, roles, removal.
pub struct IdentityService {
    store: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
    hasher: Arc<dyn PasswordHasher>,
    issuer: Arc<dyn TokenIssuer>,
    validator: Arc<dyn JwtValidator>,
}

impl IdentityService {
    pub fn new<T>(store: Arc<dyn RecordStore>, content: Arc<dyn ContentStore>, tokens: Arc<T>) -> Self
    where
        T: TokenIssuer + JwtValidator + 'static,
    {
        Self {
            store,
            content,
            hasher: Arc::new(Sha256PasswordHasher::default()),
            issuer: tokens.clone(),
            validator: tokens,
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    async fn load(&self, id: UserId) -> Result<User, ServiceError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))
    }

    async fn create(
        &self,
        username: &str,
        email: &str,
        display_name: Option<String>,
        role: Role,
        password: &str,
    ) -> Result<User, ServiceError> {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        let events = user.execute(&UserCommand::Register(RegisterUser {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            display_name,
            role,
            password_hash: self.hasher.hash(password),
            occurred_at: Utc::now(),
        }))?;

        self.store.insert_user(&user).await?;
        for event in &events {
            info!(event_type = event.event_type(), user_id = %user.id, role = %user.role, "user registered");
        }
        Ok(user)
    }

    /// Self-registration. Only STUDENT and ALUMNI may be chosen.
    #[instrument(skip(self, form), fields(username = %form.username), err)]
    pub async fn register(&self, form: RegistrationForm) -> Result<User, ServiceError> {
        form.validate()?;
        self.create(
            &form.username,
            &form.email,
            form.display_name.clone(),
            form.role,
            &form.password,
        )
        .await
    }

    /// Create the configured administrator unless the username is taken.
    #[instrument(skip(self, admin), fields(username = %admin.username), err)]
    pub async fn ensure_bootstrap_admin(&self, admin: &BootstrapAdmin) -> Result<User, ServiceError> {
        if let Some(existing) = self.store.find_user_by_username(admin.username.trim()).await? {
            if !existing.role.is_admin() {
                warn!(user_id = %existing.id, "bootstrap admin username belongs to a non-admin account");
            }
            return Ok(existing);
        }
        self.create(&admin.username, &admin.email, None, Role::Admin, &admin.password)
            .await
    }

    #[instrument(skip(self, password), err)]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ServiceError> {
        let user = self
            .store
            .find_user_by_username(username.trim())
            .await?
            .filter(|u| self.hasher.verify(password, &u.password_hash))
            .ok_or(DomainError::Unauthenticated)?;

        let token = self.issue_token(&user)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(LoginOutcome { user, token })
    }

    pub fn issue_token(&self, user: &User) -> Result<String, ServiceError> {
        Ok(self.issuer.issue(user.id, user.role, Utc::now())?)
    }

    /// Resolve a bearer token to the current stored user.
    ///
    /// Role and debt state come from the store, not from the token.
    pub async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        let claims = self.validator.validate(token, Utc::now())?;
        self.store
            .get_user(claims.sub)
            .await?
            .ok_or(ServiceError::Domain(DomainError::Unauthenticated))
    }

    pub async fn get(&self, actor: &User, id: UserId) -> Result<User, ServiceError> {
        let target = self.load(id).await?;
        can_view_user(actor, &target)?;
        Ok(target)
    }

    /// Admins see everyone; anyone else sees only themselves.
    pub async fn list(&self, actor: &User) -> Result<Vec<User>, ServiceError> {
        if actor.role.is_admin() {
            return Ok(self.store.list_users().await?);
        }
        Ok(vec![self.load(actor.id).await?])
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.id, target = %id), err)]
    pub async fn update_profile(
        &self,
        actor: &User,
        id: UserId,
        changes: ProfileChanges,
    ) -> Result<User, ServiceError> {
        let mut target = self.load(id).await?;
        can_view_user(actor, &target)?;

        let expected = ExpectedVersion::Exact(target.version());
        let events = target.execute(&UserCommand::UpdateProfile(UpdateProfile {
            user_id: id,
            email: changes.email,
            display_name: changes.display_name,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(target);
        }

        self.store.save_user(&target, expected).await?;
        info!(event_type = "auth.user.profile_updated", user_id = %id, "profile updated");
        self.load(id).await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id, target = %id), err)]
    pub async fn change_role(&self, actor: &User, id: UserId, role: Role) -> Result<User, ServiceError> {
        can_change_role(actor)?;
        let mut target = self.load(id).await?;

        let expected = ExpectedVersion::Exact(target.version());
        let events = target.execute(&UserCommand::ChangeRole(ChangeRole {
            user_id: id,
            role,
            actor_role: actor.role,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(target);
        }

        self.store.save_user(&target, expected).await?;
        info!(event_type = "auth.user.role_changed", user_id = %id, role = %role, "role changed");
        self.load(id).await
    }

    /// Remove an account with its fees, documents and stored content.
    #[instrument(skip(self, actor), fields(actor = %actor.id, target = %id), err)]
    pub async fn delete_user(&self, actor: &User, id: UserId) -> Result<(), ServiceError> {
        let target = self.load(id).await?;
        can_view_user(actor, &target)?;

        let removed = self.store.delete_user(id).await?;
        for doc in &removed {
            if let Err(e) = self.content.delete(&doc.content.key).await {
                warn!(document_id = %doc.id, error = %e, "failed to remove document content");
            }
        }
        info!(user_id = %id, documents = removed.len(), "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registrar_auth::Hs256JwtValidator;

    use crate::content::InMemoryContentStore;
    use crate::store::InMemoryRecordStore;

    fn service() -> IdentityService {
        IdentityService::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryContentStore::new()),
            Arc::new(Hs256JwtValidator::new(b"test-secret".to_vec())),
        )
        .with_hasher(Arc::new(Sha256PasswordHasher::with_rounds(16)))
    }

    fn form(username: &str, role: Role) -> RegistrationForm {
        RegistrationForm {
            username: username.to_string(),
            email: format!("{username}@example.edu"),
            password: "correct horse".to_string(),
            password_confirm: "correct horse".to_string(),
            display_name: None,
            role,
        }
    }

    #[tokio::test]
    async fn register_then_login_then_authenticate() {
        let svc = service();
        let user = svc.register(form("alice", Role::Alumni)).await.unwrap();
        assert!(!user.owes_fees());

        let outcome = svc.login("alice", "correct horse").await.unwrap();
        assert_eq!(outcome.user.id, user.id);

        let resolved = svc.authenticate(&outcome.token).await.unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.role, Role::Alumni);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let svc = service();
        svc.register(form("alice", Role::Student)).await.unwrap();
        let err = svc.login("alice", "wrong password").await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Unauthenticated)));
        let err = svc.login("nobody", "correct horse").await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Unauthenticated)));
    }

    #[tokio::test]
    async fn admin_cannot_self_register_and_duplicates_conflict() {
        let svc = service();
        let err = svc.register(form("root", Role::Admin)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        svc.register(form("alice", Role::Student)).await.unwrap();
        let err = svc.register(form("alice", Role::Student)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_idempotent() {
        let svc = service();
        let admin = BootstrapAdmin {
            username: "root".to_string(),
            email: "root@example.edu".to_string(),
            password: "changeme123".to_string(),
        };
        let first = svc.ensure_bootstrap_admin(&admin).await.unwrap();
        let second = svc.ensure_bootstrap_admin(&admin).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.role.is_admin());
    }

    #[tokio::test]
    async fn only_admin_changes_roles() {
        let svc = service();
        let admin = svc
            .ensure_bootstrap_admin(&BootstrapAdmin {
                username: "root".to_string(),
                email: "root@example.edu".to_string(),
                password: "changeme123".to_string(),
            })
            .await
            .unwrap();
        let bob = svc.register(form("bob", Role::Student)).await.unwrap();

        let err = svc.change_role(&bob, bob.id, Role::Admin).await.unwrap_err();
        assert!(matches!(err, ServiceError::Denied(_)));

        let bob = svc.change_role(&admin, bob.id, Role::Alumni).await.unwrap();
        assert_eq!(bob.role, Role::Alumni);
    }

    #[tokio::test]
    async fn users_see_only_themselves() {
        let svc = service();
        let alice = svc.register(form("alice", Role::Alumni)).await.unwrap();
        let bob = svc.register(form("bob", Role::Student)).await.unwrap();

        let listed = svc.list(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, alice.id);
        assert!(matches!(
            svc.get(&alice, bob.id).await.unwrap_err(),
            ServiceError::Denied(_)
        ));
    }

    #[tokio::test]
    async fn update_profile_changes_email() {
        let svc = service();
        let alice = svc.register(form("alice", Role::Alumni)).await.unwrap();
        let updated = svc
            .update_profile(
                &alice,
                alice.id,
                ProfileChanges {
                    email: Some("Alice@New.example".to_string()),
                    display_name: Some("Alice A.".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "alice@new.example");
        assert_eq!(updated.display_name.as_deref(), Some("Alice A."));
    }

    #[tokio::test]
    async fn deleted_user_token_no_longer_authenticates() {
        let svc = service();
        svc.register(form("alice", Role::Alumni)).await.unwrap();
        let outcome = svc.login("alice", "correct horse").await.unwrap();

        svc.delete_user(&outcome.user, outcome.user.id).await.unwrap();
        let err = svc.authenticate(&outcome.token).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Unauthenticated)));
    }
}
