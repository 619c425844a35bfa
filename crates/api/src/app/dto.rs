use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use registrar_auth::{Role, User};
use registrar_core::{DocumentId, FeeId, Money, UserId};
use registrar_documents::{Document, DocumentType};
use registrar_fees::Fee;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeeRequest {
    pub owner: Uuid,
    pub description: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
}

/// Partial fee edit. An explicit `"due_date": null` clears the date; an
/// absent key leaves it alone.
#[derive(Debug, Deserialize)]
pub struct UpdateFeeRequest {
    pub description: Option<String>,
    pub amount: Option<Money>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub document_type: DocumentType,
    pub filename: String,
    /// Standard base64 of the file bytes.
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub document_type: Option<DocumentType>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        STANDARD
            .decode(raw.trim())
            .map_err(|e| serde::de::Error::custom(format!("content is not valid base64: {e}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub owes_fees: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_debt: Option<Money>,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            owes_fees: user.owes_fees(),
            created_at: user.created_at,
            total_debt: None,
        }
    }

    pub fn with_total_debt(mut self, total_debt: Money) -> Self {
        self.total_debt = Some(total_debt);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct FeeResponse {
    pub id: FeeId,
    pub owner: Option<UserId>,
    pub description: String,
    pub amount: Money,
    pub is_paid: bool,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl From<&Fee> for FeeResponse {
    fn from(fee: &Fee) -> Self {
        Self {
            id: fee.id_typed(),
            owner: fee.owner(),
            description: fee.description().to_string(),
            amount: fee.amount(),
            is_paid: fee.is_paid(),
            due_date: fee.due_date(),
            paid_date: fee.paid_date(),
            created_by: fee.created_by(),
            created_at: fee.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: DocumentId,
    pub owner: Option<UserId>,
    pub title: String,
    pub document_type: DocumentType,
    pub filename: Option<String>,
    pub file_size: u64,
    pub is_verified: bool,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Document> for DocumentResponse {
    fn from(doc: &Document) -> Self {
        let verification = doc.verification();
        Self {
            id: doc.id_typed(),
            owner: doc.owner(),
            title: doc.title().to_string(),
            document_type: doc.document_type(),
            filename: doc.content().map(|c| c.filename.clone()),
            file_size: doc.file_size(),
            is_verified: verification.is_verified(),
            verified_by: verification.verified_by(),
            verified_at: verification.verified_at(),
            uploaded_at: doc.uploaded_at(),
        }
    }
}
