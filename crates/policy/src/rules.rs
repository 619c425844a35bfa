use registrar_auth::{Role, User};
use registrar_core::Money;
use registrar_documents::Document;

use crate::decision::{Denial, Owned};

fn require_admin(requester: &User, action: &str) -> Result<(), Denial> {
    match requester.role {
        Role::Admin => Ok(()),
        Role::Student | Role::Alumni => Err(Denial::admin_required(action)),
    }
}

/// Create, edit, delete and settle fees.
pub fn can_manage_fees(requester: &User) -> Result<(), Denial> {
    require_admin(requester, "manage fees")
}

/// Verify and unverify documents.
pub fn can_verify_documents(requester: &User) -> Result<(), Denial> {
    require_admin(requester, "verify documents")
}

pub fn can_change_role(requester: &User) -> Result<(), Denial> {
    require_admin(requester, "change user roles")
}

pub fn can_view_user(requester: &User, target: &User) -> Result<(), Denial> {
    match requester.role {
        Role::Admin => Ok(()),
        Role::Student | Role::Alumni if requester.id == target.id => Ok(()),
        Role::Student | Role::Alumni => Err(Denial::not_owner()),
    }
}

pub fn owns_or_admin<R: Owned + ?Sized>(requester: &User, resource: &R) -> Result<(), Denial> {
    match requester.role {
        Role::Admin => Ok(()),
        Role::Student | Role::Alumni if resource.owner_id() == Some(requester.id) => Ok(()),
        Role::Student | Role::Alumni => Err(Denial::not_owner()),
    }
}

/// Download gate, evaluated in order:
///
/// 1. admins always pass;
/// 2. anyone else must own the document;
/// 3. an ALUMNI owner is refused while either the cached `owes_fees` flag or
///    the live unpaid total (`live_debt`) says they owe money;
/// 4. otherwise allowed.
///
/// Students are not debt-gated.
pub fn can_download(requester: &User, document: &Document, live_debt: Money) -> Result<(), Denial> {
    if requester.role.is_admin() {
        return Ok(());
    }

    if document.owner_id() != Some(requester.id) {
        return Err(Denial::not_owner());
    }

    match requester.role {
        Role::Alumni if requester.owes_fees() || !live_debt.is_zero() => {
            Err(Denial::outstanding_fees())
        }
        Role::Alumni | Role::Student | Role::Admin => Ok(()),
    }
}
