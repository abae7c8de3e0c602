//! Completion payload decoding.
//!
//! The relay hands over the first argument of the completion event as
//! JSON plus any binary attachments that accompanied it. The finished
//! audio sits under `audioFile` in one of three encodings:
//!
//! * a binary attachment placeholder `{"_placeholder": true, "num": N}`
//! * a Node `Buffer` serialized as `{"type": "Buffer", "data": [..]}`
//! * a bare array of byte values
//!
//! [`decode_artifact`] turns any of them into an in-memory [`ArtifactRef`].

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Timestamp;
use crate::wire::{ARTIFACT_MIME_TYPE, FIELD_AUDIO_FILE, FIELD_PRODUCTION, FIELD_PUBLISHER};

/// A completion event as delivered by the relay, not yet decoded.
#[derive(Debug, Clone, Default)]
pub struct RawCompletion {
    /// First event argument (normally a JSON object).
    pub data: Value,
    /// Binary attachments referenced by placeholders in `data`.
    pub attachments: Vec<Vec<u8>>,
}

impl RawCompletion {
    pub fn new(data: Value, attachments: Vec<Vec<u8>>) -> Self {
        Self { data, attachments }
    }

    /// Session id the job was submitted with, if the relay echoed it.
    pub fn publisher(&self) -> Option<&str> {
        self.data.get(FIELD_PUBLISHER).and_then(Value::as_str)
    }

    /// Provider production uuid, if present.
    pub fn production(&self) -> Option<&str> {
        self.data.get(FIELD_PRODUCTION).and_then(Value::as_str)
    }
}

/// Locally addressable handle to a finished artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRef {
    pub id: uuid::Uuid,
    pub mime_type: String,
    #[serde(skip)]
    bytes: Arc<[u8]>,
    pub created_at: Timestamp,
}

impl ArtifactRef {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            mime_type: ARTIFACT_MIME_TYPE.to_string(),
            bytes: bytes.into(),
            created_at: Utc::now(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the artifact to disk.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        tokio::fs::write(path, &self.bytes[..]).await
    }
}

impl PartialEq for ArtifactRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Decode a completion event into an artifact handle.
pub fn decode_artifact(raw: &RawCompletion) -> Result<ArtifactRef, CoreError> {
    let field = raw
        .data
        .get(FIELD_AUDIO_FILE)
        .ok_or_else(|| CoreError::Decode(format!("missing `{FIELD_AUDIO_FILE}` field")))?;

    let bytes = decode_bytes(field, &raw.attachments)?;
    if bytes.is_empty() {
        return Err(CoreError::Decode("audio payload is empty".into()));
    }

    Ok(ArtifactRef::new(bytes))
}

fn decode_bytes(value: &Value, attachments: &[Vec<u8>]) -> Result<Vec<u8>, CoreError> {
    match value {
        Value::Object(map) if map.get("_placeholder").and_then(Value::as_bool) == Some(true) => {
            let num = map
                .get("num")
                .and_then(Value::as_u64)
                .ok_or_else(|| CoreError::Decode("placeholder without `num`".into()))?;
            attachments
                .get(num as usize)
                .cloned()
                .ok_or_else(|| CoreError::Decode(format!("attachment {num} was not received")))
        }
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Buffer") => {
            let data = map
                .get("data")
                .ok_or_else(|| CoreError::Decode("Buffer without `data`".into()))?;
            byte_array(data)
        }
        Value::Array(_) => byte_array(value),
        other => Err(CoreError::Decode(format!(
            "unsupported audio encoding: {}",
            json_kind(other)
        ))),
    }
}

fn byte_array(value: &Value) -> Result<Vec<u8>, CoreError> {
    let items = value
        .as_array()
        .ok_or_else(|| CoreError::Decode("expected an array of bytes".into()))?;
    items
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| CoreError::Decode(format!("invalid byte value {v}")))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
