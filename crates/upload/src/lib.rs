//! Lead document upload pipeline.
//!
//! This crate holds the **business logic** for moving user-selected
//! documents into blob storage on behalf of a lead. It has no UI or
//! backend dependencies; the host provides [`TokenBroker`],
//! [`DocumentRegistry`] and [`ConnectivityOracle`] implementations.
//!
//! # Pipeline
//!
//! 1. **Verify**: re-read the lead's document count and reject the batch
//!    if it would exceed the limit
//! 2. **Token**: request a fresh signed upload URL per document
//! 3. **Upload**: read the file and PUT it, with throttled progress and
//!    cancellation
//! 4. **Account**: charge failures to the retry governor, remove uploaded
//!    documents from the pending set, stop at the first failure
//! 5. **Reconcile**: re-read the lead's documents from the server

pub mod batch;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod inflight;
pub mod pending;
pub mod quota;
pub mod retry;
pub mod session;
pub mod types;

// Re-export primary types for convenience.
pub use batch::{BatchOrchestrator, Collaborators};
pub use collaborators::{
    ConnectivityOracle, DocumentRegistry, ServiceFuture, StaticConnectivity, TokenBroker,
};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError};
pub use inflight::InflightUploads;
pub use pending::PendingDocuments;
pub use quota::{QuotaCheck, QuotaVerifier};
pub use retry::{RetryGovernor, RetryState};
pub use session::UploadSession;
pub use types::{
    BatchReport, DocumentOutcome, DocumentResult, Reconciliation, SessionPhase, UploadEvent,
    UploadState,
};
