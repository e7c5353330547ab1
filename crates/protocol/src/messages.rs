use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::FALLBACK_MIME_TYPE;
use crate::types::{DocumentStatus, ExistingDocumentAsset, SasToken};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Requests a signed upload URL for a new document on a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTokenRequest {
    pub doc_type: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Authoritative document count for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCountResponse {
    pub count: usize,
}

/// A signed URL issued by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SasTokenResponse {
    pub sas_url: String,
}

impl From<SasTokenResponse> for SasToken {
    fn from(resp: SasTokenResponse) -> Self {
        SasToken {
            sas_url: resp.sas_url,
        }
    }
}

/// The lead's document list as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentListResponse {
    #[serde(default)]
    pub documents: Vec<ServerDocument>,
}

impl DocumentListResponse {
    /// Converts every entry into the client-side representation.
    pub fn into_existing(self) -> Vec<ExistingDocumentAsset> {
        self.documents
            .into_iter()
            .map(ServerDocument::into_existing)
            .collect()
    }
}

/// One raw document entry from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDocument {
    pub doc_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ServerDocument {
    /// Transforms a server entry into an [`ExistingDocumentAsset`].
    ///
    /// Missing optional fields fall back to neutral values; the server id
    /// doubles as the local id so refreshed lists compare stably.
    pub fn into_existing(self) -> ExistingDocumentAsset {
        let mime_type = self
            .mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());
        ExistingDocumentAsset {
            id: self.doc_id.clone(),
            doc_id: self.doc_id,
            uri: self.url.unwrap_or_default(),
            file_name: self.file_name,
            mime_type,
            file_size: self.file_size.unwrap_or(0),
            timestamp: self.created_at.unwrap_or_else(Utc::now),
            status: DocumentStatus::from_server(self.status.as_deref()),
        }
    }
}
