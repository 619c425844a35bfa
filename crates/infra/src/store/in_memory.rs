use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use registrar_auth::User;
use registrar_core::{
    AggregateRoot, DocumentId, DomainError, ExpectedVersion, FeeId, Money, UserId,
};
use registrar_documents::{Document, DocumentRecord};
use registrar_fees::{Fee, total_debt};

use super::{DebtSnapshot, RecordStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    fees: BTreeMap<FeeId, Fee>,
    documents: BTreeMap<DocumentId, Document>,
}

impl Tables {
    /// Owner's unpaid total as it will be once `changed` is replaced by
    /// `next` (or removed when `next` is `None`).
    fn projected_debt(
        &self,
        owner: UserId,
        changed: FeeId,
        next: Option<&Fee>,
    ) -> Result<Money, StoreError> {
        let others = self.fees.values().filter(|f| f.id_typed() != changed);
        total_debt(others.chain(next), owner).map_err(|e| match e {
            DomainError::Validation(msg) => StoreError::Rejected(msg),
            other => StoreError::Backend(other.to_string()),
        })
    }

    fn recompute_owner(&mut self, owner: UserId, total: Money) -> Result<DebtSnapshot, StoreError> {
        let user = self
            .users
            .get_mut(&owner)
            .ok_or(StoreError::Missing("user"))?;
        user.recompute_debt_flag(total);
        Ok(DebtSnapshot {
            owner,
            total_debt: total,
            owes_fees: user.owes_fees(),
        })
    }
}

/// In-memory record store for tests and single-process development.
///
/// One lock guards all three tables, which makes every fee write plus its
/// owner recompute a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("record store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("record store lock poisoned".to_string()))
    }
}

fn check_version(expected: ExpectedVersion, stored: u64) -> Result<(), StoreError> {
    if !expected.matches(stored) {
        return Err(StoreError::Conflict(format!(
            "stale record (expected: {expected:?}, stored: {stored})"
        )));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Conflict("user already exists".to_string()));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn save_user(&self, user: &User, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let stored = tables
            .users
            .get(&user.id)
            .ok_or(StoreError::Missing("user"))?;
        check_version(expected, stored.version())?;

        let total = total_debt(tables.fees.values(), user.id)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut next = user.clone();
        next.recompute_debt_flag(total);
        tables.users.insert(user.id, next);
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut tables = self.write()?;
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::Missing("user"));
        }

        tables.fees.retain(|_, f| f.owner() != Some(id));
        for fee in tables.fees.values_mut() {
            fee.detach_creator(id);
        }

        let mut removed = Vec::new();
        tables.documents.retain(|_, d| {
            if d.owner() == Some(id) {
                removed.extend(d.to_record());
                false
            } else {
                true
            }
        });
        for doc in tables.documents.values_mut() {
            doc.revoke_verifier(id);
        }

        Ok(removed)
    }

    async fn insert_fee(&self, fee: &Fee) -> Result<DebtSnapshot, StoreError> {
        let owner = fee.owner().ok_or(StoreError::Missing("fee"))?;
        let mut tables = self.write()?;
        if !tables.users.contains_key(&owner) {
            return Err(StoreError::Missing("user"));
        }
        if tables.fees.contains_key(&fee.id_typed()) {
            return Err(StoreError::Conflict("fee already exists".to_string()));
        }

        let total = tables.projected_debt(owner, fee.id_typed(), Some(fee))?;
        tables.fees.insert(fee.id_typed(), fee.clone());
        tables.recompute_owner(owner, total)
    }

    async fn save_fee(
        &self,
        fee: &Fee,
        expected: ExpectedVersion,
    ) -> Result<DebtSnapshot, StoreError> {
        let owner = fee.owner().ok_or(StoreError::Missing("fee"))?;
        let mut tables = self.write()?;
        let stored = tables
            .fees
            .get(&fee.id_typed())
            .ok_or(StoreError::Missing("fee"))?;
        check_version(expected, stored.version())?;

        let total = tables.projected_debt(owner, fee.id_typed(), Some(fee))?;
        tables.fees.insert(fee.id_typed(), fee.clone());
        tables.recompute_owner(owner, total)
    }

    async fn delete_fee(&self, id: FeeId) -> Result<DebtSnapshot, StoreError> {
        let mut tables = self.write()?;
        let owner = tables
            .fees
            .get(&id)
            .and_then(Fee::owner)
            .ok_or(StoreError::Missing("fee"))?;

        let total = tables.projected_debt(owner, id, None)?;
        tables.fees.remove(&id);
        tables.recompute_owner(owner, total)
    }

    async fn get_fee(&self, id: FeeId) -> Result<Option<Fee>, StoreError> {
        Ok(self.read()?.fees.get(&id).cloned())
    }

    async fn list_fees_for_owner(&self, owner: UserId) -> Result<Vec<Fee>, StoreError> {
        Ok(self
            .read()?
            .fees
            .values()
            .filter(|f| f.owner() == Some(owner))
            .cloned()
            .collect())
    }

    async fn list_fees(&self) -> Result<Vec<Fee>, StoreError> {
        Ok(self.read()?.fees.values().cloned().collect())
    }

    async fn total_debt(&self, owner: UserId) -> Result<Money, StoreError> {
        let tables = self.read()?;
        total_debt(tables.fees.values(), owner).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let owner = document.owner().ok_or(StoreError::Missing("document"))?;
        let mut tables = self.write()?;
        if !tables.users.contains_key(&owner) {
            return Err(StoreError::Missing("user"));
        }
        if tables.documents.contains_key(&document.id_typed()) {
            return Err(StoreError::Conflict("document already exists".to_string()));
        }
        tables.documents.insert(document.id_typed(), document.clone());
        Ok(())
    }

    async fn save_document(
        &self,
        document: &Document,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let stored = tables
            .documents
            .get(&document.id_typed())
            .ok_or(StoreError::Missing("document"))?;
        check_version(expected, stored.version())?;
        tables.documents.insert(document.id_typed(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<DocumentRecord, StoreError> {
        let mut tables = self.write()?;
        tables
            .documents
            .remove(&id)
            .and_then(|d| d.to_record())
            .ok_or(StoreError::Missing("document"))
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    async fn list_documents_for_owner(&self, owner: UserId) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|d| d.owner() == Some(owner))
            .cloned()
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.read()?.documents.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use registrar_auth::Role;
    use registrar_core::Aggregate;
    use registrar_fees::{CreateFee, FeeCommand, MarkPaid};

    fn user(name: &str) -> User {
        User::restore(
            UserId::new(),
            name.to_string(),
            format!("{name}@example.edu"),
            None,
            Role::Alumni,
            false,
            "sha256$00$00".to_string(),
            Utc::now(),
            1,
        )
    }

    fn fee(owner: UserId, cents: u64) -> Fee {
        let id = FeeId::new();
        let mut fee = Fee::empty(id);
        fee.execute(&FeeCommand::Create(CreateFee {
            fee_id: id,
            owner,
            description: "Dues".to_string(),
            amount: Money::from_cents(cents),
            due_date: None,
            created_by: None,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        fee
    }

    #[tokio::test]
    async fn fee_writes_keep_owner_flag_in_step() {
        let store = InMemoryRecordStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();

        let mut f = fee(alice.id, 5000);
        let snap = store.insert_fee(&f).await.unwrap();
        assert!(snap.owes_fees);
        assert_eq!(snap.total_debt, Money::from_cents(5000));
        assert!(store.get_user(alice.id).await.unwrap().unwrap().owes_fees());

        let before = f.version();
        f.execute(&FeeCommand::MarkPaid(MarkPaid {
            fee_id: f.id_typed(),
            paid_on: Utc::now().date_naive(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        let snap = store.save_fee(&f, ExpectedVersion::Exact(before)).await.unwrap();
        assert!(!snap.owes_fees);
        assert!(!store.get_user(alice.id).await.unwrap().unwrap().owes_fees());
    }

    #[tokio::test]
    async fn stale_fee_write_is_conflict() {
        let store = InMemoryRecordStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();
        let f = fee(alice.id, 100);
        store.insert_fee(&f).await.unwrap();

        let err = store
            .save_fee(&f, ExpectedVersion::Exact(f.version() + 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn fee_for_unknown_owner_is_missing_user() {
        let store = InMemoryRecordStore::new();
        let err = store.insert_fee(&fee(UserId::new(), 100)).await.unwrap_err();
        assert_eq!(err, StoreError::Missing("user"));
    }

    #[tokio::test]
    async fn deleting_last_unpaid_fee_clears_flag() {
        let store = InMemoryRecordStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();
        let f = fee(alice.id, 100);
        store.insert_fee(&f).await.unwrap();

        let snap = store.delete_fee(f.id_typed()).await.unwrap();
        assert!(!snap.owes_fees);
        assert_eq!(store.total_debt(alice.id).await.unwrap(), Money::ZERO);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store = InMemoryRecordStore::new();
        store.insert_user(&user("alice")).await.unwrap();
        let err = store.insert_user(&user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_user_cascades_owned_fees() {
        let store = InMemoryRecordStore::new();
        let alice = user("alice");
        store.insert_user(&alice).await.unwrap();
        store.insert_fee(&fee(alice.id, 100)).await.unwrap();

        store.delete_user(alice.id).await.unwrap();
        assert!(store.list_fees().await.unwrap().is_empty());
        assert_eq!(
            store.delete_user(alice.id).await.unwrap_err(),
            StoreError::Missing("user")
        );
    }
}
