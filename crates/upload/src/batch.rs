//! Batch orchestrator for a lead's pending documents.
//!
//! Verifies the quota once, then uploads documents one at a time, each with
//! its own freshly issued token. The first document that does not upload
//! stops the batch. After any success the lead's server state is re-read.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use leaddocs_protocol::DocumentAsset;
use leaddocs_transfer::{BinaryReader, BlobTransport};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::collaborators::{ConnectivityOracle, DocumentRegistry, TokenBroker};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::inflight::InflightUploads;
use crate::pending::PendingDocuments;
use crate::quota::QuotaVerifier;
use crate::retry::{RetryGovernor, RetryState};
use crate::session::UploadSession;
use crate::types::{BatchReport, DocumentOutcome, DocumentResult, Reconciliation, UploadEvent};

const EVENT_BUFFER: usize = 256;

/// Services an orchestrator is built from.
pub struct Collaborators {
    pub tokens: Arc<dyn TokenBroker>,
    pub registry: Arc<dyn DocumentRegistry>,
    pub connectivity: Arc<dyn ConnectivityOracle>,
    pub transport: Arc<dyn BlobTransport>,
    pub reader: BinaryReader,
}

/// Uploads batches of pending documents for leads.
pub struct BatchOrchestrator {
    tokens: Arc<dyn TokenBroker>,
    registry: Arc<dyn DocumentRegistry>,
    connectivity: Arc<dyn ConnectivityOracle>,
    verifier: QuotaVerifier,
    session: UploadSession,
    retry: Arc<RetryGovernor>,
    inflight: InflightUploads,
    config: PipelineConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    running: AtomicBool,
}

impl BatchOrchestrator {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let retry = Arc::new(RetryGovernor::new(config.max_retry_attempts));
        let inflight = InflightUploads::new();

        let session = UploadSession::new(
            collaborators.reader,
            collaborators.transport,
            Arc::clone(&collaborators.registry),
            Arc::clone(&retry),
        )
        .with_events(events_tx.clone())
        .with_inflight(inflight.clone())
        .with_progress_interval(config.progress_interval());

        Self {
            verifier: QuotaVerifier::new(
                Arc::clone(&collaborators.registry),
                config.max_documents_per_lead,
            ),
            tokens: collaborators.tokens,
            registry: collaborators.registry,
            connectivity: collaborators.connectivity,
            session,
            retry,
            inflight,
            config,
            events_tx,
            events_rx: Some(events_rx),
            running: AtomicBool::new(false),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The session documents are uploaded through, for polling its state.
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn retry_state(&self, document_id: &str) -> RetryState {
        self.retry.state(document_id)
    }

    /// Uploads every pending document of `lead_id`, in order.
    ///
    /// Quota, connectivity and concurrency problems reject the whole batch
    /// with `Err` before anything is uploaded. Per-document outcomes are in
    /// the report; uploaded documents are removed from `pending`.
    pub async fn upload_batch(
        &self,
        lead_id: &str,
        pending: &mut PendingDocuments,
    ) -> Result<BatchReport, PipelineError> {
        let docs: Vec<DocumentAsset> = pending.iter().cloned().collect();
        self.run_batch(lead_id, pending, docs).await
    }

    /// Like [`upload_batch`](Self::upload_batch), restricted to `ids`.
    pub async fn upload_selected(
        &self,
        lead_id: &str,
        pending: &mut PendingDocuments,
        ids: &[String],
    ) -> Result<BatchReport, PipelineError> {
        let docs = pending.select(ids);
        self.run_batch(lead_id, pending, docs).await
    }

    async fn run_batch(
        &self,
        lead_id: &str,
        pending: &mut PendingDocuments,
        docs: Vec<DocumentAsset>,
    ) -> Result<BatchReport, PipelineError> {
        if docs.is_empty() {
            debug!(lead = %lead_id, "nothing to upload");
            return Ok(BatchReport::empty(lead_id));
        }

        let _guard = RunningGuard::acquire(&self.running)?;

        if !self.connectivity.is_online() {
            warn!(lead = %lead_id, "batch rejected, device offline");
            return Err(PipelineError::Offline);
        }

        self.verifier.verify(lead_id, docs.len()).await?;
        info!(lead = %lead_id, documents = docs.len(), "batch upload started");

        let mut report = BatchReport::empty(lead_id);
        let mut remaining = docs.into_iter();
        for doc in remaining.by_ref() {
            let outcome = self.upload_one(lead_id, &doc).await;
            let stop = outcome != DocumentOutcome::Uploaded;
            if !stop {
                pending.remove(&doc.id);
            }
            report.results.push(DocumentResult {
                document_id: doc.id,
                file_name: doc.file_name,
                outcome,
            });
            if stop {
                break;
            }
        }
        report
            .results
            .extend(remaining.map(|doc| DocumentResult {
                document_id: doc.id,
                file_name: doc.file_name,
                outcome: DocumentOutcome::NotAttempted,
            }));

        let uploaded = report.uploaded_count();
        if uploaded > 0 {
            match self.refresh(lead_id).await {
                Ok(reconciliation) => {
                    self.emit(UploadEvent::Reconciled {
                        lead_id: lead_id.to_string(),
                        count: reconciliation.count,
                    });
                    report.reconciliation = Some(reconciliation);
                }
                Err(e) => {
                    warn!(lead = %lead_id, error = %e, "reconciliation failed");
                    self.emit(UploadEvent::ReconcileFailed {
                        lead_id: lead_id.to_string(),
                        error: e.to_string(),
                    });
                    report.warning = Some(format!(
                        "Documents were uploaded, but the document list could not be refreshed: {e}"
                    ));
                }
            }
        }

        match report.stopped_at() {
            None => info!(lead = %lead_id, uploaded, "batch upload finished"),
            Some(stopped) => error!(
                lead = %lead_id,
                uploaded,
                document = %stopped.document_id,
                "batch upload stopped"
            ),
        }
        Ok(report)
    }

    async fn upload_one(&self, lead_id: &str, doc: &DocumentAsset) -> DocumentOutcome {
        if self.retry.max_retries_reached(&doc.id) {
            return self.fail(doc, PipelineError::MaxRetriesReached(doc.id.clone()));
        }

        let token = match self
            .tokens
            .issue_upload_token(lead_id, &self.config.document_type)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                return self.fail(doc, PipelineError::TokenUnavailable(e.to_string()));
            }
        };
        debug!(lead = %lead_id, document = %doc.id, "upload token issued");

        match self.session.start_upload(doc, &token.sas_url).await {
            Ok(state) if state.is_completed => DocumentOutcome::Uploaded,
            Ok(state) if state.is_cancelled => DocumentOutcome::Cancelled,
            Ok(state) => DocumentOutcome::Failed(state.failure.unwrap_or_else(|| {
                PipelineError::Service(state.error.unwrap_or_else(|| "upload failed".into()))
            })),
            Err(e) => self.fail(doc, e),
        }
    }

    /// Records a failure raised before the session produced a state.
    fn fail(&self, doc: &DocumentAsset, err: PipelineError) -> DocumentOutcome {
        warn!(document = %doc.id, error = %err, "document not uploaded");
        self.emit(UploadEvent::Failed {
            document_id: doc.id.clone(),
            kind: err.kind(),
            error: err.user_message(),
        });
        DocumentOutcome::Failed(err)
    }

    /// Re-reads the lead's document list and count from the server.
    pub async fn refresh(&self, lead_id: &str) -> Result<Reconciliation, PipelineError> {
        let documents = self.registry.list_documents(lead_id).await?;
        let count = self.registry.document_count(lead_id).await?;
        debug!(lead = %lead_id, count, listed = documents.len(), "lead documents refreshed");
        Ok(Reconciliation { documents, count })
    }

    /// Signed read URL for an uploaded document.
    pub async fn view_url(&self, doc_id: &str) -> Result<String, PipelineError> {
        if !self.connectivity.is_online() {
            return Err(PipelineError::Offline);
        }
        let token = self
            .tokens
            .issue_view_token(doc_id)
            .await
            .map_err(|e| PipelineError::TokenUnavailable(e.to_string()))?;
        Ok(token.sas_url)
    }

    /// Cancels whatever document is uploading.
    pub fn cancel_current(&self) -> bool {
        self.session.cancel_upload()
    }

    /// Cancels the upload of a specific document if it is running.
    pub fn cancel_document(&self, document_id: &str) -> bool {
        let is_current = self
            .session
            .current_document()
            .is_some_and(|d| d.id == document_id);
        if is_current && self.session.is_uploading() {
            return self.session.cancel_upload();
        }
        self.inflight.cancel(document_id)
    }

    /// Clears retry history for a document so it may be attempted again.
    pub fn reset_document(&self, document_id: &str) {
        self.retry.reset(document_id);
        let is_current = self
            .session
            .current_document()
            .is_some_and(|d| d.id == document_id);
        if is_current {
            self.session.reset_upload();
        }
    }

    fn emit(&self, event: UploadEvent) {
        if self.events_tx.try_send(event).is_err() {
            debug!("upload event dropped");
        }
    }
}

/// Holds the single-batch flag for the duration of a batch.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PipelineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
