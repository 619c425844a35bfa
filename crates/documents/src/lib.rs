//! Document registry domain (pure).
//!
//! An uploaded document carries a verification sub-state that only admins
//! move. The three verification fields live in one value object so they
//! always change together.

pub mod document;
pub mod verification;

pub use document::{
    ContentRef, Document, DocumentCommand, DocumentEvent, DocumentRecord, DocumentRetitled,
    DocumentType, DocumentUnverified, DocumentUploaded, DocumentVerified, RetitleDocument,
    UnverifyDocument, UploadDocument, VerifyDocument,
};
pub use verification::Verification;
