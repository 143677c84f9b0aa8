//! Attachment encoding for multimodal messages
//!
//! Converts user-selected files into the base64 payloads the Gemini API
//! accepts as `inlineData` parts.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A file attached to a user message
///
/// `data` is the raw base64 payload, without a `data:<mime>;base64,` prefix.
/// Immutable once created; owned by the message it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

/// Encode raw bytes into an attachment
pub fn encode_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Attachment {
    Attachment {
        mime_type: mime_type.into(),
        data: BASE64.encode(bytes),
    }
}

/// Encode a single file, resolving its MIME type from the extension
pub async fn encode_file(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path).await?;
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();
    Ok(encode_bytes(mime_type, &bytes))
}

/// Encode a batch of files
///
/// A file whose read fails is logged and dropped; the rest of the batch
/// still succeeds.
pub async fn encode_batch(paths: &[PathBuf]) -> Vec<Attachment> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        match encode_file(path).await {
            Ok(attachment) => attachments.push(attachment),
            Err(e) => tracing::warn!("failed to read {}, dropping from batch: {}", path.display(), e),
        }
    }
    attachments
}
