//! Fresh-read quota gate run before every batch.

use std::sync::Arc;

use tracing::{info, warn};

use crate::collaborators::DocumentRegistry;
use crate::error::PipelineError;

/// Result of a passed quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub server_count: usize,
    pub pending: usize,
    pub max: usize,
}

impl QuotaCheck {
    /// Slots left after the batch lands.
    pub fn remaining_after(&self) -> usize {
        self.max.saturating_sub(self.server_count + self.pending)
    }
}

/// Rejects a batch that would push a lead past its document limit.
///
/// The count is read from the registry on every call. There is no lock:
/// two clients can both pass and jointly exceed the limit.
pub struct QuotaVerifier {
    registry: Arc<dyn DocumentRegistry>,
    max_documents: usize,
}

impl QuotaVerifier {
    pub fn new(registry: Arc<dyn DocumentRegistry>, max_documents: usize) -> Self {
        Self {
            registry,
            max_documents,
        }
    }

    pub fn max_documents(&self) -> usize {
        self.max_documents
    }

    /// Checks `server_count + pending <= max` against a fresh count.
    pub async fn verify(&self, lead_id: &str, pending: usize) -> Result<QuotaCheck, PipelineError> {
        let server_count = self
            .registry
            .document_count(lead_id)
            .await
            .map_err(|e| {
                warn!(lead = %lead_id, error = %e, "document count unavailable");
                PipelineError::VerificationFailed(e.to_string())
            })?;

        if server_count + pending > self.max_documents {
            warn!(
                lead = %lead_id,
                server_count,
                pending,
                max = self.max_documents,
                "quota exceeded"
            );
            return Err(PipelineError::QuotaExceeded {
                lead_id: lead_id.to_string(),
                server_count,
                pending,
                max: self.max_documents,
            });
        }

        info!(lead = %lead_id, server_count, pending, "quota verified");
        Ok(QuotaCheck {
            server_count,
            pending,
            max: self.max_documents,
        })
    }
}
