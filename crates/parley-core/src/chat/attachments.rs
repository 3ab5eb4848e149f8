//! Attachment store port.
//!
//! The core only reads attachments to fold them into a provider message.
//! Ingestion and storage live elsewhere.

use parley_types::attachment::Attachment;
use parley_types::error::AttachmentError;

pub trait AttachmentStore: Send + Sync {
    /// Load an uploaded file owned by `user_id`.
    fn load(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> impl std::future::Future<Output = Result<Attachment, AttachmentError>> + Send;
}
