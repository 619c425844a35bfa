use registrar_auth::{Role, User};
use registrar_core::UserId;

/// Authenticated caller for a request.
///
/// Holds the user as stored at the start of the request, so role and
/// `owes_fees` reflect the latest committed state rather than the token.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    user: User,
}

impl PrincipalContext {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}
