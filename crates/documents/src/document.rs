use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use registrar_core::{Aggregate, AggregateRoot, DocumentId, DomainError, Event, UserId};

use crate::verification::Verification;

/// Closed set of document kinds accepted at upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Transcript,
    Certificate,
    Diploma,
    #[default]
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Transcript,
        DocumentType::Certificate,
        DocumentType::Diploma,
        DocumentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Transcript => "TRANSCRIPT",
            DocumentType::Certificate => "CERTIFICATE",
            DocumentType::Diploma => "DIPLOMA",
            DocumentType::Other => "OTHER",
        }
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown document type '{s}'")))
    }
}

/// Where the uploaded bytes live in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    /// Opaque storage key.
    pub key: String,
    /// Client-supplied file name, kept for the download response.
    pub filename: String,
}

/// Persisted shape of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub document_type: DocumentType,
    pub content: ContentRef,
    pub file_size: u64,
    pub verification: Verification,
    pub uploaded_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: Document.
///
/// ```text
/// UNVERIFIED --verify(admin, t)--> VERIFIED
/// VERIFIED   --verify(admin, t)--> VERIFIED   (verifier replaced)
/// VERIFIED   --unverify---------> UNVERIFIED
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    owner: Option<UserId>,
    title: String,
    document_type: DocumentType,
    content: Option<ContentRef>,
    file_size: u64,
    verification: Verification,
    uploaded_at: DateTime<Utc>,
    version: u64,
    created: bool,
}

impl Document {
    pub fn empty(id: DocumentId) -> Self {
        Self {
            id,
            owner: None,
            title: String::new(),
            document_type: DocumentType::Other,
            content: None,
            file_size: 0,
            verification: Verification::Unverified,
            uploaded_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    pub fn restore(record: DocumentRecord) -> Self {
        Self {
            id: record.id,
            owner: Some(record.owner),
            title: record.title,
            document_type: record.document_type,
            content: Some(record.content),
            file_size: record.file_size,
            verification: record.verification,
            uploaded_at: record.uploaded_at,
            version: record.version,
            created: true,
        }
    }

    pub fn to_record(&self) -> Option<DocumentRecord> {
        Some(DocumentRecord {
            id: self.id,
            owner: self.owner?,
            title: self.title.clone(),
            document_type: self.document_type,
            content: self.content.clone()?,
            file_size: self.file_size,
            verification: self.verification,
            uploaded_at: self.uploaded_at,
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> DocumentId {
        self.id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn content(&self) -> Option<&ContentRef> {
        self.content.as_ref()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn verification(&self) -> Verification {
        self.verification
    }

    pub fn is_verified(&self) -> bool {
        self.verification.is_verified()
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    /// Drop verifications made by a deleted admin account.
    pub fn revoke_verifier(&mut self, user_id: UserId) -> bool {
        if self.verification.verified_by() == Some(user_id) {
            self.verification = Verification::cleared();
            self.version += 1;
            return true;
        }
        false
    }
}

impl AggregateRoot for Document {
    type Id = DocumentId;

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
pub struct UploadDocument {
    pub document_id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub document_type: DocumentType,
    pub content: ContentRef,
    /// Length of the stored bytes, measured once here.
    pub file_size: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyDocument {
    pub document_id: DocumentId,
    pub verified_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifyDocument {
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetitleDocument {
    pub document_id: DocumentId,
    pub title: Option<String>,
    pub document_type: Option<DocumentType>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentCommand {
    Upload(UploadDocument),
    Verify(VerifyDocument),
    Unverify(UnverifyDocument),
    Retitle(RetitleDocument),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUploaded {
    pub document_id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub document_type: DocumentType,
    pub content: ContentRef,
    pub file_size: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full next verification snapshot, not individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVerified {
    pub document_id: DocumentId,
    pub verification: Verification,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUnverified {
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRetitled {
    pub document_id: DocumentId,
    pub title: String,
    pub document_type: DocumentType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    Uploaded(DocumentUploaded),
    Verified(DocumentVerified),
    Unverified(DocumentUnverified),
    Retitled(DocumentRetitled),
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::Uploaded(_) => "documents.document.uploaded",
            DocumentEvent::Verified(_) => "documents.document.verified",
            DocumentEvent::Unverified(_) => "documents.document.unverified",
            DocumentEvent::Retitled(_) => "documents.document.retitled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::Uploaded(e) => e.occurred_at,
            DocumentEvent::Verified(e) => e.occurred_at,
            DocumentEvent::Unverified(e) => e.occurred_at,
            DocumentEvent::Retitled(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Document {
    type Command = DocumentCommand;
    type Event = DocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DocumentEvent::Uploaded(e) => {
                self.id = e.document_id;
                self.owner = Some(e.owner);
                self.title = e.title.clone();
                self.document_type = e.document_type;
                self.content = Some(e.content.clone());
                self.file_size = e.file_size;
                self.verification = Verification::Unverified;
                self.uploaded_at = e.occurred_at;
                self.created = true;
            }
            DocumentEvent::Verified(e) => {
                self.verification = e.verification;
            }
            DocumentEvent::Unverified(_) => {
                self.verification = Verification::cleared();
            }
            DocumentEvent::Retitled(e) => {
                self.title = e.title.clone();
                self.document_type = e.document_type;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DocumentCommand::Upload(cmd) => self.handle_upload(cmd),
            DocumentCommand::Verify(cmd) => self.handle_verify(cmd),
            DocumentCommand::Unverify(cmd) => self.handle_unverify(cmd),
            DocumentCommand::Retitle(cmd) => self.handle_retitle(cmd),
        }
    }
}

fn validate_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title cannot be empty"));
    }
    Ok(title.to_string())
}

impl Document {
    fn ensure_created(&self, document_id: DocumentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("document"));
        }
        if self.id != document_id {
            return Err(DomainError::invariant("document_id mismatch"));
        }
        Ok(())
    }

    fn handle_upload(&self, cmd: &UploadDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("document already exists"));
        }
        let title = validate_title(&cmd.title)?;
        if cmd.content.filename.trim().is_empty() {
            return Err(DomainError::validation("file is required"));
        }

        Ok(vec![DocumentEvent::Uploaded(DocumentUploaded {
            document_id: cmd.document_id,
            owner: cmd.owner,
            title,
            document_type: cmd.document_type,
            content: cmd.content.clone(),
            file_size: cmd.file_size,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_created(cmd.document_id)?;

        // Re-verification always emits: the verifier is overwritten.
        Ok(vec![DocumentEvent::Verified(DocumentVerified {
            document_id: cmd.document_id,
            verification: self.verification.verify(cmd.verified_by, cmd.occurred_at),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unverify(&self, cmd: &UnverifyDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_created(cmd.document_id)?;

        if !self.verification.is_verified() {
            return Ok(vec![]);
        }

        Ok(vec![DocumentEvent::Unverified(DocumentUnverified {
            document_id: cmd.document_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retitle(&self, cmd: &RetitleDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_created(cmd.document_id)?;

        let title = match &cmd.title {
            Some(t) => validate_title(t)?,
            None => self.title.clone(),
        };
        let document_type = cmd.document_type.unwrap_or(self.document_type);

        if title == self.title && document_type == self.document_type {
            return Ok(vec![]);
        }

        Ok(vec![DocumentEvent::Retitled(DocumentRetitled {
            document_id: cmd.document_id,
            title,
            document_type,
            occurred_at: cmd.occurred_at,
        })])
    }
}
