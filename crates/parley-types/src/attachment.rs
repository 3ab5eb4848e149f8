//! Resolved file attachments, ready to be folded into a provider message.

use serde::{Deserialize, Serialize};

use crate::llm::ContentPart;

/// The usable body of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentBody {
    /// Base64-encoded image bytes.
    Image { media_type: String, data: String },
    /// Extracted text of a document.
    Document { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub filename: String,
    pub body: AttachmentBody,
}

impl Attachment {
    pub fn into_content_part(self) -> ContentPart {
        match self.body {
            AttachmentBody::Image { media_type, data } => ContentPart::Image { media_type, data },
            AttachmentBody::Document { text } => ContentPart::Text {
                text: format!("[{}]\n{}", self.filename, text),
            },
        }
    }
}
