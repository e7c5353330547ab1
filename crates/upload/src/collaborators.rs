//! Services the pipeline consumes.
//!
//! The host application implements these on top of its HTTP client and
//! platform APIs. Keeping them as traits decouples the pipeline from the
//! backend and makes it testable with mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use leaddocs_protocol::{ExistingDocumentAsset, SasToken};

use crate::error::PipelineError;

pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'a>>;

/// Issues signed URLs for document storage.
pub trait TokenBroker: Send + Sync {
    /// Returns a fresh signed upload URL for a new document on `lead_id`.
    fn issue_upload_token<'a>(
        &'a self,
        lead_id: &'a str,
        doc_type: &'a str,
    ) -> ServiceFuture<'a, SasToken>;

    /// Returns a signed read URL for an existing document.
    fn issue_view_token<'a>(&'a self, doc_id: &'a str) -> ServiceFuture<'a, SasToken>;
}

/// The server's record of which documents a lead holds.
pub trait DocumentRegistry: Send + Sync {
    /// Authoritative document count, read fresh on every call.
    fn document_count<'a>(&'a self, lead_id: &'a str) -> ServiceFuture<'a, usize>;

    fn list_documents<'a>(
        &'a self,
        lead_id: &'a str,
    ) -> ServiceFuture<'a, Vec<ExistingDocumentAsset>>;

    /// Best-effort server-side cancellation of an in-flight upload.
    fn cancel_upload<'a>(&'a self, document_id: &'a str) -> ServiceFuture<'a, ()>;
}

/// Reports whether the device currently has connectivity.
pub trait ConnectivityOracle: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag set by the host (or by tests).
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl ConnectivityOracle for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_connectivity_toggles() {
        let c = StaticConnectivity::new(true);
        assert!(c.is_online());
        c.set_online(false);
        assert!(!c.is_online());
    }
}
