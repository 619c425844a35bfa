use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use registrar_auth::User;
use registrar_core::{Aggregate, AggregateRoot, DocumentId, Event, ExpectedVersion, UserId};
use registrar_documents::{
    ContentRef, Document, DocumentCommand, DocumentType, RetitleDocument, UnverifyDocument,
    UploadDocument, VerifyDocument,
};
use registrar_policy::{can_download, can_verify_documents, can_view_user, owns_or_admin};

use crate::content::ContentStore;
use crate::error::ServiceError;
use crate::store::RecordStore;

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub document_type: DocumentType,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub document_type: Option<DocumentType>,
}

/// Bytes released by a permitted download.
#[derive(Debug, Clone)]
pub struct DocumentDownload {
    pub document: Document,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Document registry service: uploads, verification and gated downloads.
pub struct DocumentRegistry {
    store: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
}

/// Storage key for a document: its id plus a short, plain extension taken
/// from the client's file name.
fn content_key(id: DocumentId, filename: &str) -> String {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.bytes().all(|b| b.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => format!("{id}.{}", ext.to_ascii_lowercase()),
        None => id.to_string(),
    }
}

impl DocumentRegistry {
    pub fn new(store: Arc<dyn RecordStore>, content: Arc<dyn ContentStore>) -> Self {
        Self { store, content }
    }

    async fn load(&self, id: DocumentId) -> Result<Document, ServiceError> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("document"))
    }

    async fn transition(
        &self,
        mut document: Document,
        command: DocumentCommand,
    ) -> Result<Document, ServiceError> {
        let expected = ExpectedVersion::Exact(document.version());
        let events = document.execute(&command)?;
        if events.is_empty() {
            return Ok(document);
        }

        self.store.save_document(&document, expected).await?;
        for event in &events {
            info!(
                event_type = event.event_type(),
                document_id = %document.id_typed(),
                is_verified = document.is_verified(),
                "document committed"
            );
        }
        Ok(document)
    }

    /// Store a new document owned by `actor`. `file_size` is measured here,
    /// once.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id, filename = %input.filename), err)]
    pub async fn upload(&self, actor: &User, input: NewDocument) -> Result<Document, ServiceError> {
        let document_id = DocumentId::new();
        let content = ContentRef {
            key: content_key(document_id, &input.filename),
            filename: input.filename.trim().to_string(),
        };

        let mut document = Document::empty(document_id);
        let command = DocumentCommand::Upload(UploadDocument {
            document_id,
            owner: actor.id,
            title: input.title,
            document_type: input.document_type,
            content: content.clone(),
            file_size: input.bytes.len() as u64,
            occurred_at: Utc::now(),
        });

        // Decide before writing bytes so a rejected upload leaves nothing behind.
        let events = document.handle(&command)?;
        self.content.put(&content.key, input.bytes).await?;
        for event in &events {
            document.apply(event);
        }

        if let Err(e) = self.store.insert_document(&document).await {
            if let Err(cleanup) = self.content.delete(&content.key).await {
                warn!(key = %content.key, error = %cleanup, "failed to remove orphaned content");
            }
            return Err(e.into());
        }

        info!(
            event_type = "documents.document.uploaded",
            document_id = %document_id,
            file_size = document.file_size(),
            "document uploaded"
        );
        Ok(document)
    }

    /// Attest a document. Re-verifying replaces the verifier; the timestamp
    /// never moves backwards.
    #[instrument(skip(self, actor), fields(actor = %actor.id), err)]
    pub async fn verify(&self, actor: &User, id: DocumentId) -> Result<Document, ServiceError> {
        can_verify_documents(actor)?;
        let document = self.load(id).await?;
        self.transition(
            document,
            DocumentCommand::Verify(VerifyDocument {
                document_id: id,
                verified_by: actor.id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id), err)]
    pub async fn unverify(&self, actor: &User, id: DocumentId) -> Result<Document, ServiceError> {
        can_verify_documents(actor)?;
        let document = self.load(id).await?;
        self.transition(
            document,
            DocumentCommand::Unverify(UnverifyDocument {
                document_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.id), err)]
    pub async fn retitle(
        &self,
        actor: &User,
        id: DocumentId,
        changes: DocumentChanges,
    ) -> Result<Document, ServiceError> {
        let document = self.load(id).await?;
        owns_or_admin(actor, &document)?;
        self.transition(
            document,
            DocumentCommand::Retitle(RetitleDocument {
                document_id: id,
                title: changes.title,
                document_type: changes.document_type,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id), err)]
    pub async fn delete(&self, actor: &User, id: DocumentId) -> Result<(), ServiceError> {
        let document = self.load(id).await?;
        owns_or_admin(actor, &document)?;

        let record = self.store.delete_document(id).await?;
        if let Err(e) = self.content.delete(&record.content.key).await {
            warn!(document_id = %id, error = %e, "failed to remove document content");
        }
        info!(document_id = %id, "document deleted");
        Ok(())
    }

    /// Release a document's bytes if the download gate allows it.
    ///
    /// The requester's live unpaid total is read from the store on every
    /// call and checked together with the cached flag.
    #[instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role), err)]
    pub async fn download(&self, actor: &User, id: DocumentId) -> Result<DocumentDownload, ServiceError> {
        let document = self.load(id).await?;
        let live_debt = self.store.total_debt(actor.id).await?;
        if let Err(denial) = can_download(actor, &document, live_debt) {
            info!(document_id = %id, reason = ?denial.kind, "download refused");
            return Err(denial.into());
        }
        self.open_content(document).await
    }

    /// Read the stored bytes. No policy check: callers decide first.
    pub async fn open_content(&self, document: Document) -> Result<DocumentDownload, ServiceError> {
        let content = document
            .content()
            .cloned()
            .ok_or_else(|| ServiceError::not_found("document"))?;
        let bytes = self.content.get(&content.key).await?;
        Ok(DocumentDownload {
            document,
            filename: content.filename,
            bytes,
        })
    }

    pub async fn get(&self, actor: &User, id: DocumentId) -> Result<Document, ServiceError> {
        let document = self.load(id).await?;
        owns_or_admin(actor, &document)?;
        Ok(document)
    }

    /// Admins see every document; anyone else sees their own.
    pub async fn list(&self, actor: &User) -> Result<Vec<Document>, ServiceError> {
        if actor.role.is_admin() {
            return Ok(self.store.list_documents().await?);
        }
        Ok(self.store.list_documents_for_owner(actor.id).await?)
    }

    pub async fn list_for_owner(
        &self,
        actor: &User,
        owner: UserId,
    ) -> Result<Vec<Document>, ServiceError> {
        let target = self
            .store
            .get_user(owner)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))?;
        can_view_user(actor, &target)?;
        Ok(self.store.list_documents_for_owner(owner).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_keeps_plain_extensions_only() {
        let id = DocumentId::new();
        assert_eq!(content_key(id, "Transcript.PDF"), format!("{id}.pdf"));
        assert_eq!(content_key(id, "noext"), id.to_string());
        assert_eq!(content_key(id, "evil.p/df"), id.to_string());
        assert_eq!(content_key(id, "archive."), id.to_string());
    }
}
