//! Postgres-backed record store.
//!
//! ## Error Mapping
//!
//! | SQLx error                         | StoreError |
//! |------------------------------------|------------|
//! | Database, unique violation `23505` | `Conflict` |
//! | Database, out of range `22003`     | `Rejected` |
//! | Database, anything else            | `Backend`  |
//! | Decode / pool / IO                 | `Backend`  |
//!
//! ## Debt flag
//!
//! Fee writes lock the owner's `users` row (`SELECT … FOR UPDATE`), apply the
//! fee change, re-sum the unpaid amounts and update `owes_fees`, all in one
//! transaction. Writers for different owners never contend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use registrar_auth::{Role, User};
use registrar_core::{AggregateRoot, DocumentId, ExpectedVersion, FeeId, Money, UserId};
use registrar_documents::{ContentRef, Document, DocumentRecord, DocumentType, Verification};
use registrar_fees::{Fee, FeeRecord};

use super::{DebtSnapshot, RecordStore, StoreError};

const SCHEMA: &str = include_str!("schema.sql");

const USER_COLUMNS: &str =
    "id, username, email, display_name, role, owes_fees, password_hash, created_at, version";

const FEE_COLUMNS: &str = "id, owner_id, description, amount_cents, is_paid, due_date, paid_date, \
                           created_by, created_at, version";

const DOCUMENT_COLUMNS: &str = "id, owner_id, title, document_type, content_key, filename, \
                                file_size, is_verified, verified_by, verified_at, uploaded_at, \
                                version";

#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Lock the owner row for the rest of the transaction.
async fn lock_user(
    tx: &mut Transaction<'_, Postgres>,
    id: UserId,
) -> Result<User, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_user", e))?
    .ok_or(StoreError::Missing("user"))?;
    user_from_row(&row)
}

async fn unpaid_total(
    tx: &mut Transaction<'_, Postgres>,
    owner: UserId,
) -> Result<Money, StoreError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM fees WHERE owner_id = $1 AND NOT is_paid",
    )
    .bind(owner.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("unpaid_total", e))?;
    Ok(Money::from_cents(to_u64(total)?))
}

/// Re-derive `owes_fees` for a locked owner row.
async fn recompute_debt_flag(
    tx: &mut Transaction<'_, Postgres>,
    mut owner: User,
) -> Result<DebtSnapshot, StoreError> {
    let total = unpaid_total(tx, owner.id).await?;
    if owner.recompute_debt_flag(total) {
        sqlx::query("UPDATE users SET owes_fees = $2, version = $3 WHERE id = $1")
            .bind(owner.id.as_uuid())
            .bind(owner.owes_fees())
            .bind(to_i64(owner.version())?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("recompute_debt_flag", e))?;
    }
    Ok(DebtSnapshot {
        owner: owner.id,
        total_debt: total,
        owes_fees: owner.owes_fees(),
    })
}

async fn locked_version(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    what: &'static str,
    id: Uuid,
) -> Result<u64, StoreError> {
    let version: i64 = sqlx::query_scalar(&format!(
        "SELECT version FROM {table} WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("locked_version", e))?
    .ok_or(StoreError::Missing(what))?;
    to_u64(version)
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
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.owes_fees())
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(to_i64(user.version())?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, expected = ?expected), err)]
    async fn save_user(&self, user: &User, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let stored = lock_user(&mut tx, user.id).await?;
        check_version(expected, stored.version())?;

        let mut next = user.clone();
        next.recompute_debt_flag(unpaid_total(&mut tx, user.id).await?);

        sqlx::query(
            "UPDATE users SET email = $2, display_name = $3, role = $4, owes_fees = $5, version = $6 \
             WHERE id = $1",
        )
        .bind(next.id.as_uuid())
        .bind(&next.email)
        .bind(&next.display_name)
        .bind(next.role.as_str())
        .bind(next.owes_fees())
        .bind(to_i64(next.version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_user", e))?;

        commit(tx).await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_user(&self, id: UserId) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut tx = self.begin().await?;
        lock_user(&mut tx, id).await?;

        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_user", e))?;
        let removed = rows
            .iter()
            .map(document_record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        sqlx::query("SELECT id FROM documents WHERE verified_by = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        sqlx::query(
            "UPDATE documents SET is_verified = FALSE, verified_by = NULL, verified_at = NULL, \
             version = version + 1 WHERE verified_by = $1",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_user", e))?;

        // Owned fees and documents cascade; `fees.created_by` is set null.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;

        commit(tx).await?;
        Ok(removed)
    }

    #[instrument(skip(self, fee), fields(fee_id = %fee.id_typed()), err)]
    async fn insert_fee(&self, fee: &Fee) -> Result<DebtSnapshot, StoreError> {
        let record = fee.to_record().ok_or(StoreError::Missing("fee"))?;
        let mut tx = self.begin().await?;
        let owner = lock_user(&mut tx, record.owner).await?;

        sqlx::query(&format!(
            "INSERT INTO fees ({FEE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(record.id.as_uuid())
        .bind(record.owner.as_uuid())
        .bind(&record.description)
        .bind(to_i64(record.amount.cents())?)
        .bind(record.is_paid)
        .bind(record.due_date)
        .bind(record.paid_date)
        .bind(record.created_by.map(Uuid::from))
        .bind(record.created_at)
        .bind(to_i64(record.version)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_fee", e))?;

        let snapshot = recompute_debt_flag(&mut tx, owner).await?;
        commit(tx).await?;
        Ok(snapshot)
    }

    #[instrument(skip(self, fee), fields(fee_id = %fee.id_typed(), expected = ?expected), err)]
    async fn save_fee(
        &self,
        fee: &Fee,
        expected: ExpectedVersion,
    ) -> Result<DebtSnapshot, StoreError> {
        let record = fee.to_record().ok_or(StoreError::Missing("fee"))?;
        let mut tx = self.begin().await?;
        let owner = lock_user(&mut tx, record.owner).await?;
        let stored = locked_version(&mut tx, "fees", "fee", *record.id.as_uuid()).await?;
        check_version(expected, stored)?;

        sqlx::query(
            "UPDATE fees SET description = $2, amount_cents = $3, is_paid = $4, due_date = $5, \
             paid_date = $6, created_by = $7, version = $8 WHERE id = $1",
        )
        .bind(record.id.as_uuid())
        .bind(&record.description)
        .bind(to_i64(record.amount.cents())?)
        .bind(record.is_paid)
        .bind(record.due_date)
        .bind(record.paid_date)
        .bind(record.created_by.map(Uuid::from))
        .bind(to_i64(record.version)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_fee", e))?;

        let snapshot = recompute_debt_flag(&mut tx, owner).await?;
        commit(tx).await?;
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(fee_id = %id), err)]
    async fn delete_fee(&self, id: FeeId) -> Result<DebtSnapshot, StoreError> {
        let mut tx = self.begin().await?;
        let owner_id: Uuid = sqlx::query_scalar("SELECT owner_id FROM fees WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_fee", e))?
            .ok_or(StoreError::Missing("fee"))?;
        let owner = lock_user(&mut tx, UserId::from_uuid(owner_id)).await?;

        let deleted = sqlx::query("DELETE FROM fees WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_fee", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::Missing("fee"));
        }

        let snapshot = recompute_debt_flag(&mut tx, owner).await?;
        commit(tx).await?;
        Ok(snapshot)
    }

    async fn get_fee(&self, id: FeeId) -> Result<Option<Fee>, StoreError> {
        let row = sqlx::query(&format!("SELECT {FEE_COLUMNS} FROM fees WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_fee", e))?;
        row.as_ref().map(fee_from_row).transpose()
    }

    async fn list_fees_for_owner(&self, owner: UserId) -> Result<Vec<Fee>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {FEE_COLUMNS} FROM fees WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_fees_for_owner", e))?;
        rows.iter().map(fee_from_row).collect()
    }

    async fn list_fees(&self) -> Result<Vec<Fee>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {FEE_COLUMNS} FROM fees ORDER BY id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_fees", e))?;
        rows.iter().map(fee_from_row).collect()
    }

    async fn total_debt(&self, owner: UserId) -> Result<Money, StoreError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM fees WHERE owner_id = $1 AND NOT is_paid",
        )
        .bind(owner.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("total_debt", e))?;
        Ok(Money::from_cents(to_u64(total)?))
    }

    #[instrument(skip(self, document), fields(document_id = %document.id_typed()), err)]
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let record = document.to_record().ok_or(StoreError::Missing("document"))?;
        let v = record.verification;
        sqlx::query(&format!(
            "INSERT INTO documents ({DOCUMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(record.id.as_uuid())
        .bind(record.owner.as_uuid())
        .bind(&record.title)
        .bind(record.document_type.as_str())
        .bind(&record.content.key)
        .bind(&record.content.filename)
        .bind(to_i64(record.file_size)?)
        .bind(v.is_verified())
        .bind(v.verified_by().map(Uuid::from))
        .bind(v.verified_at())
        .bind(record.uploaded_at)
        .bind(to_i64(record.version)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_document", e))?;
        Ok(())
    }

    #[instrument(skip(self, document), fields(document_id = %document.id_typed(), expected = ?expected), err)]
    async fn save_document(
        &self,
        document: &Document,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let record = document.to_record().ok_or(StoreError::Missing("document"))?;
        let mut tx = self.begin().await?;
        let stored = locked_version(&mut tx, "documents", "document", *record.id.as_uuid()).await?;
        check_version(expected, stored)?;

        // The three verification columns are written in one statement.
        let v = record.verification;
        sqlx::query(
            "UPDATE documents SET title = $2, document_type = $3, is_verified = $4, \
             verified_by = $5, verified_at = $6, version = $7 WHERE id = $1",
        )
        .bind(record.id.as_uuid())
        .bind(&record.title)
        .bind(record.document_type.as_str())
        .bind(v.is_verified())
        .bind(v.verified_by().map(Uuid::from))
        .bind(v.verified_at())
        .bind(to_i64(record.version)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_document", e))?;

        commit(tx).await
    }

    #[instrument(skip(self), fields(document_id = %id), err)]
    async fn delete_document(&self, id: DocumentId) -> Result<DocumentRecord, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM documents WHERE id = $1 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_document", e))?
        .ok_or(StoreError::Missing("document"))?;
        document_record_from_row(&row)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_document", e))?;
        row.as_ref()
            .map(|r| document_record_from_row(r).map(Document::restore))
            .transpose()
    }

    async fn list_documents_for_owner(&self, owner: UserId) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_documents_for_owner", e))?;
        rows.iter()
            .map(|r| document_record_from_row(r).map(Document::restore))
            .collect()
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_documents", e))?;
        rows.iter()
            .map(|r| document_record_from_row(r).map(Document::restore))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = get(row, "role")?;
    let role: Role = role
        .parse()
        .map_err(|e| StoreError::Backend(format!("bad role column: {e}")))?;
    Ok(User::restore(
        UserId::from_uuid(get(row, "id")?),
        get(row, "username")?,
        get(row, "email")?,
        get(row, "display_name")?,
        role,
        get(row, "owes_fees")?,
        get(row, "password_hash")?,
        get(row, "created_at")?,
        to_u64(get(row, "version")?)?,
    ))
}

fn fee_from_row(row: &PgRow) -> Result<Fee, StoreError> {
    let created_by: Option<Uuid> = get(row, "created_by")?;
    let due_date: Option<NaiveDate> = get(row, "due_date")?;
    let paid_date: Option<NaiveDate> = get(row, "paid_date")?;
    Ok(Fee::restore(FeeRecord {
        id: FeeId::from_uuid(get(row, "id")?),
        owner: UserId::from_uuid(get(row, "owner_id")?),
        description: get(row, "description")?,
        amount: Money::from_cents(to_u64(get(row, "amount_cents")?)?),
        is_paid: get(row, "is_paid")?,
        due_date,
        paid_date,
        created_by: created_by.map(UserId::from_uuid),
        created_at: get(row, "created_at")?,
        version: to_u64(get(row, "version")?)?,
    }))
}

fn document_record_from_row(row: &PgRow) -> Result<DocumentRecord, StoreError> {
    let document_type: String = get(row, "document_type")?;
    let document_type: DocumentType = document_type
        .parse()
        .map_err(|e| StoreError::Backend(format!("bad document_type column: {e}")))?;

    let verified_by: Option<Uuid> = get(row, "verified_by")?;
    let verified_at: Option<DateTime<Utc>> = get(row, "verified_at")?;
    let verification = Verification::from_parts(
        get(row, "is_verified")?,
        verified_by.map(UserId::from_uuid),
        verified_at,
    )
    .ok_or_else(|| StoreError::Backend("inconsistent verification columns".to_string()))?;

    Ok(DocumentRecord {
        id: DocumentId::from_uuid(get(row, "id")?),
        owner: UserId::from_uuid(get(row, "owner_id")?),
        title: get(row, "title")?,
        document_type,
        content: ContentRef {
            key: get(row, "content_key")?,
            filename: get(row, "filename")?,
        },
        file_size: to_u64(get(row, "file_size")?)?,
        verification,
        uploaded_at: get(row, "uploaded_at")?,
        version: to_u64(get(row, "version")?)?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Rejected(format!("value {value} out of range")))
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Backend(format!("negative value {value}")))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("22003") => StoreError::Rejected(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
