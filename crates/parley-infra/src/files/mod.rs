//! Local filesystem attachment store.
//!
//! Uploaded files live at `{base_dir}/files/{user_id}/{file_id}/{filename}`,
//! one file per id directory. Images are read as base64, text documents as
//! UTF-8. Anything else is unsupported.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parley_core::chat::attachments::AttachmentStore;
use parley_types::attachment::{Attachment, AttachmentBody};
use parley_types::error::AttachmentError;
use tracing::debug;

/// Largest file folded into a prompt.
pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// `AttachmentStore` over a directory tree.
pub struct FilesystemAttachmentStore {
    base_dir: PathBuf,
}

impl FilesystemAttachmentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn file_dir(&self, user_id: &str, file_id: &str) -> Option<PathBuf> {
        if !is_safe_segment(user_id) || !is_safe_segment(file_id) {
            return None;
        }
        Some(self.base_dir.join("files").join(user_id).join(file_id))
    }
}

/// A single path component with no traversal.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

enum Kind {
    Image(&'static str),
    Document,
}

fn classify(path: &Path) -> Option<Kind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let kind = match ext.as_str() {
        "png" => Kind::Image("image/png"),
        "jpg" | "jpeg" => Kind::Image("image/jpeg"),
        "gif" => Kind::Image("image/gif"),
        "webp" => Kind::Image("image/webp"),
        "txt" | "md" | "markdown" | "csv" | "json" | "yaml" | "yml" | "toml" | "xml" | "html"
        | "log" | "rs" | "py" | "js" | "ts" | "go" | "java" | "c" | "h" | "cpp" | "sh" | "sql" => {
            Kind::Document
        }
        _ => return None,
    };
    Some(kind)
}

impl AttachmentStore for FilesystemAttachmentStore {
    async fn load(&self, user_id: &str, file_id: &str) -> Result<Attachment, AttachmentError> {
        let dir = self
            .file_dir(user_id, file_id)
            .ok_or_else(|| AttachmentError::NotFound(file_id.to_string()))?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AttachmentError::NotFound(file_id.to_string()));
            }
            Err(e) => return Err(AttachmentError::Io(e.to_string())),
        };
        let mut path = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AttachmentError::Io(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| AttachmentError::Io(e.to_string()))?;
            if file_type.is_file() {
                path = Some(entry.path());
                break;
            }
        }
        let path = path.ok_or_else(|| AttachmentError::NotFound(file_id.to_string()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_id)
            .to_string();

        let kind = classify(&path).ok_or_else(|| AttachmentError::Unsupported(filename.clone()))?;

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| AttachmentError::Io(e.to_string()))?
            .len();
        if size > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::Unsupported(format!(
                "{filename} exceeds {MAX_ATTACHMENT_BYTES} bytes"
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AttachmentError::Io(e.to_string()))?;
        debug!(%file_id, %filename, size, "attachment loaded");

        let body = match kind {
            Kind::Image(media_type) => AttachmentBody::Image {
                media_type: media_type.to_string(),
                data: STANDARD.encode(&bytes),
            },
            Kind::Document => AttachmentBody::Document {
                text: String::from_utf8(bytes)
                    .map_err(|_| AttachmentError::Unsupported(format!("{filename} is not UTF-8 text")))?,
            },
        };

        Ok(Attachment {
            file_id: file_id.to_string(),
            filename,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_file(base: &Path, user: &str, file_id: &str, name: &str, bytes: &[u8]) {
        let dir = base.join("files").join(user).join(file_id);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(name), bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_loads_image_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "u1", "f1", "cat.PNG", &[0x89, b'P', b'N', b'G']).await;
        let store = FilesystemAttachmentStore::new(dir.path());

        let attachment = store.load("u1", "f1").await.unwrap();
        assert_eq!(attachment.filename, "cat.PNG");
        assert_eq!(
            attachment.body,
            AttachmentBody::Image {
                media_type: "image/png".into(),
                data: STANDARD.encode([0x89, b'P', b'N', b'G']),
            }
        );
    }

    #[tokio::test]
    async fn test_loads_text_document() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "u1", "f2", "notes.md", b"# Notes").await;
        let store = FilesystemAttachmentStore::new(dir.path());

        let attachment = store.load("u1", "f2").await.unwrap();
        assert_eq!(
            attachment.body,
            AttachmentBody::Document {
                text: "# Notes".into()
            }
        );
    }

    #[tokio::test]
    async fn test_files_are_scoped_to_user() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "u1", "f1", "notes.txt", b"hi").await;
        let store = FilesystemAttachmentStore::new(dir.path());

        let err = store.load("u2", "f1").await.unwrap_err();
        assert!(matches!(err, AttachmentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_traversal_and_unknown_types() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "u1", "f3", "archive.zip", b"PK").await;
        let store = FilesystemAttachmentStore::new(dir.path());

        let err = store.load("u1", "../u1").await.unwrap_err();
        assert!(matches!(err, AttachmentError::NotFound(_)));
        let err = store.load("u1", "f3").await.unwrap_err();
        assert!(matches!(err, AttachmentError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_non_utf8_document_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "u1", "f4", "data.txt", &[0xff, 0xfe, 0x00]).await;
        let store = FilesystemAttachmentStore::new(dir.path());

        let err = store.load("u1", "f4").await.unwrap_err();
        assert!(matches!(err, AttachmentError::Unsupported(_)));
    }
}
