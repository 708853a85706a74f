//! Files staged for submission

use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fallback content type when magic bytes are not recognized
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A user-selected sample image awaiting submission
///
/// Cheap to clone: the bytes are shared.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Identity of this staging; re-selecting the same path yields a new id
    pub id: Uuid,
    /// Original file name, sent as the multipart file name
    pub name: String,
    /// File contents
    pub bytes: Arc<Vec<u8>>,
    /// Sniffed MIME type
    pub content_type: String,
}

impl StagedFile {
    /// Stage in-memory bytes under a file name
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content_type = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            bytes: Arc::new(bytes),
            content_type,
        }
    }

    /// Read a file from disk and stage it
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))?;

        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(name, bytes))
    }

    /// True when the content was recognized as an image
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
