//! Media file and job types.
//!
//! A [`Job`] is built once per enhancement attempt and never mutated
//! afterwards; the coordinator shares it behind an `Arc`.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::types::{JobId, Timestamp};

/// Fallback mime type when the extension is unknown.
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A binary media blob with its name and mime type.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub mime_type: String,
    bytes: Arc<[u8]>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its mime type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let mime_type = mime_type_for(path);
        Ok(Self::new(name, mime_type, bytes))
    }

    /// Length of the file in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap shared handle to the file contents.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// Guess an audio mime type from a file extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" | "mp4" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "aac" => "audio/aac",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// One enhancement attempt.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub file: MediaFile,
    pub title: String,
    /// Relay session id captured at submission; the correlation key.
    pub session_id: String,
    pub submitted_at: Timestamp,
}

impl Job {
    pub fn new(file: MediaFile, title: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            file,
            title: title.into(),
            session_id: session_id.into(),
            submitted_at: Utc::now(),
        }
    }
}
