use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::FALLBACK_MIME_TYPE;

/// A document selected on the device, pending upload.
///
/// The pipeline only reads these; it never mutates one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAsset {
    pub id: String,
    pub uri: String,
    pub file_name: String,
    pub mime_type: String,
    /// Size in bytes; 0 when unknown until read.
    #[serde(default)]
    pub file_size: u64,
    pub timestamp: DateTime<Utc>,
}

impl DocumentAsset {
    /// Creates a document with a freshly generated id and the current time.
    pub fn new(
        uri: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        file_size: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            uri: uri.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            file_size,
            timestamp: Utc::now(),
        }
    }

    /// Builds a document from a local file path.
    ///
    /// The MIME type is guessed from the extension; content is not inspected.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = detect_mime_type(&file_name);
        Ok(Self::new(
            path.to_string_lossy().into_owned(),
            file_name,
            mime_type,
            metadata.len(),
        ))
    }
}

/// Guesses a MIME type from a file name's extension.
pub fn detect_mime_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("heic") => "image/heic",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => FALLBACK_MIME_TYPE,
    }
}

/// Server-side state of a confirmed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    #[default]
    Uploaded,
    Failed,
}

impl DocumentStatus {
    /// Parses the loosely typed status strings the backend reports.
    ///
    /// Absent or unrecognized values mean the document is already stored.
    pub fn from_server(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("pending" | "in_progress" | "uploading") => Self::Pending,
            Some("failed" | "error") => Self::Failed,
            _ => Self::Uploaded,
        }
    }
}

/// A document the server has confirmed for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingDocumentAsset {
    pub id: String,
    pub doc_id: String,
    pub uri: String,
    pub file_name: String,
    pub mime_type: String,
    #[serde(default)]
    pub file_size: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: DocumentStatus,
}

/// Progress of a single transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// 0–100, clamped.
    pub percent: u8,
    pub loaded: u64,
    pub total: u64,
    /// Average bytes per second since the first progress report.
    pub speed: f64,
}

impl UploadProgress {
    /// Builds a progress value, deriving the rounded, clamped percentage.
    pub fn from_bytes(loaded: u64, total: u64, speed: f64) -> Self {
        Self {
            percent: percent_of(loaded, total),
            loaded,
            total,
            speed,
        }
    }

    /// Progress forced to completion.
    pub fn complete(total: u64, speed: f64) -> Self {
        Self {
            percent: 100,
            loaded: total,
            total,
            speed,
        }
    }

    /// Bytes still to send.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.loaded)
    }
}

fn percent_of(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (loaded as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// A short-lived signed URL granting access to one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SasToken {
    pub sas_url: String,
}

/// Strips the query string (the signature) from a signed URL for logging.
pub fn redact_sas_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
