//! Registry of transfers that can be cancelled by document id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Document id → cancellation token of its running transfer.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InflightUploads {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl InflightUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token for `document_id`, cancelling any previous one.
    pub fn register(&self, document_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = map.insert(document_id.to_string(), token.clone()) {
            old.cancel();
        }
        token
    }

    pub fn remove(&self, document_id: &str) -> Option<CancellationToken> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(document_id)
    }

    /// Cancels the transfer for `document_id`. Returns whether one was running.
    pub fn cancel(&self, document_id: &str) -> bool {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match map.get(document_id) {
            Some(token) => {
                debug!(document = %document_id, "cancelling in-flight upload");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for token in map.values() {
            token.cancel();
        }
        map.len()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
