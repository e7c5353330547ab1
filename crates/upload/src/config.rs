//! Pipeline tunables.

use std::time::Duration;

use leaddocs_protocol::constants::{
    BODY_CHUNK_SIZE, DEFAULT_BLOB_TYPE, DEFAULT_DOCUMENT_TYPE, MAX_DOCUMENTS_PER_LEAD,
    MAX_RETRY_ATTEMPTS, PROGRESS_INTERVAL, UPLOAD_TIMEOUT,
};
use leaddocs_transfer::{HttpTransport, TransferError};
use serde::{Deserialize, Serialize};

/// Settings for one pipeline instance. Every field has a default, so a
/// partial TOML/JSON table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum documents a lead may hold.
    pub max_documents_per_lead: usize,
    /// Failures accepted per document before attempts are refused.
    pub max_retry_attempts: u32,
    /// Per-transfer timeout in milliseconds.
    pub upload_timeout_ms: u64,
    /// Minimum spacing between progress events in milliseconds.
    pub progress_interval_ms: u64,
    /// Tag sent with every upload-token request.
    pub document_type: String,
    /// Value of the blob-type header.
    pub blob_type: String,
    /// Body streaming granularity in bytes.
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_documents_per_lead: MAX_DOCUMENTS_PER_LEAD,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            upload_timeout_ms: UPLOAD_TIMEOUT.as_millis() as u64,
            progress_interval_ms: PROGRESS_INTERVAL.as_millis() as u64,
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            blob_type: DEFAULT_BLOB_TYPE.to_string(),
            chunk_size: BODY_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Builds the reqwest-backed transport these settings describe.
    pub fn http_transport(&self) -> Result<HttpTransport, TransferError> {
        Ok(HttpTransport::new(self.upload_timeout())?
            .with_blob_type(self.blob_type.clone())
            .with_chunk_size(self.chunk_size))
    }
}
