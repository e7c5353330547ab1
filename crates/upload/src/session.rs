//! Single-document upload state machine.
//!
//! One [`UploadSession`] runs at most one transfer at a time:
//! read the document, PUT it to the signed URL, and settle into exactly one
//! terminal state. Failures other than cancellation are charged to the
//! [`RetryGovernor`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use leaddocs_protocol::constants::{CANCELLED_BY_USER, PROGRESS_INTERVAL};
use leaddocs_protocol::{DocumentAsset, UploadProgress, redact_sas_url};
use leaddocs_transfer::{
    BinaryReader, BlobTransport, ProgressThrottle, PutRequest, SpeedCalculator, TransferError,
    TransferProgress,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::collaborators::DocumentRegistry;
use crate::error::PipelineError;
use crate::inflight::InflightUploads;
use crate::retry::RetryGovernor;
use crate::types::{UploadEvent, UploadState};

/// Raw reports buffered between the transport and the session.
const PROGRESS_BUFFER: usize = 64;

#[derive(Default)]
struct SessionInner {
    state: UploadState,
    current: Option<DocumentAsset>,
    cancel: Option<CancellationToken>,
    /// Bumped on every start and reset so a stale transfer cannot
    /// overwrite newer state.
    generation: u64,
}

/// Drives one document through read → transfer → terminal state.
pub struct UploadSession {
    reader: BinaryReader,
    transport: Arc<dyn BlobTransport>,
    registry: Arc<dyn DocumentRegistry>,
    retry: Arc<RetryGovernor>,
    inflight: InflightUploads,
    events_tx: Option<mpsc::Sender<UploadEvent>>,
    progress_interval: Duration,
    inner: RwLock<SessionInner>,
}

impl UploadSession {
    pub fn new(
        reader: BinaryReader,
        transport: Arc<dyn BlobTransport>,
        registry: Arc<dyn DocumentRegistry>,
        retry: Arc<RetryGovernor>,
    ) -> Self {
        Self {
            reader,
            transport,
            registry,
            retry,
            inflight: InflightUploads::new(),
            events_tx: None,
            progress_interval: PROGRESS_INTERVAL,
            inner: RwLock::new(SessionInner::default()),
        }
    }

    /// Sends lifecycle and progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    /// Shares an in-flight registry with the caller.
    pub fn with_inflight(mut self, inflight: InflightUploads) -> Self {
        self.inflight = inflight;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn retry_governor(&self) -> &Arc<RetryGovernor> {
        &self.retry
    }

    pub fn inflight(&self) -> &InflightUploads {
        &self.inflight
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> UploadState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    pub fn current_document(&self) -> Option<DocumentAsset> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .is_uploading
    }

    /// Uploads `doc` to `sas_url` and returns the terminal state.
    ///
    /// Refuses with `Err` before any I/O when a transfer is already running
    /// or the document's retries are exhausted. Every other outcome,
    /// including read and transport failures, is reported through the
    /// returned state.
    pub async fn start_upload(
        &self,
        doc: &DocumentAsset,
        sas_url: &str,
    ) -> Result<UploadState, PipelineError> {
        if self.retry.max_retries_reached(&doc.id) {
            warn!(document = %doc.id, "upload refused, retry limit reached");
            return Err(PipelineError::MaxRetriesReached(doc.id.clone()));
        }

        let (token, generation) = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if inner.state.is_uploading {
                return Err(PipelineError::Busy);
            }
            let token = self.inflight.register(&doc.id);
            inner.generation += 1;
            inner.state = UploadState {
                is_uploading: true,
                start_time: Some(Utc::now()),
                ..Default::default()
            };
            inner.current = Some(doc.clone());
            inner.cancel = Some(token.clone());
            (token, inner.generation)
        };

        debug!(
            document = %doc.id,
            file = %doc.file_name,
            url = %redact_sas_url(sas_url),
            "upload session started"
        );
        self.emit(UploadEvent::Started {
            document_id: doc.id.clone(),
            file_name: doc.file_name.clone(),
        });

        let result = self.transfer(doc, sas_url, &token, generation).await;
        self.inflight.remove(&doc.id);
        Ok(self.finish(doc, generation, result))
    }

    async fn transfer(
        &self,
        doc: &DocumentAsset,
        sas_url: &str,
        token: &CancellationToken,
        generation: u64,
    ) -> Result<u64, TransferError> {
        let body = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransferError::Cancelled),
            r = self.reader.read(&doc.uri) => r,
        }?;
        let total = body.len() as u64;
        trace!(document = %doc.id, bytes = total, "document loaded");

        let request = PutRequest {
            url: sas_url.to_string(),
            content_type: doc.mime_type.clone(),
            body,
        };
        let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER);
        let mut put = self.transport.put(request, progress_tx, token.clone());

        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut speed = SpeedCalculator::new();

        let result = loop {
            tokio::select! {
                biased;
                Some(report) = progress_rx.recv() => {
                    self.on_progress(doc, generation, report, &mut throttle, &mut speed);
                }
                r = &mut put => break r,
            }
        };
        while let Ok(report) = progress_rx.try_recv() {
            self.on_progress(doc, generation, report, &mut throttle, &mut speed);
        }

        if result.is_ok() && throttle.last_percent() != Some(100) && !token.is_cancelled() {
            let done = UploadProgress::complete(total, speed.bytes_per_second());
            self.publish_progress(doc, generation, done);
        }
        result.map(|_| total)
    }

    fn on_progress(
        &self,
        doc: &DocumentAsset,
        generation: u64,
        report: TransferProgress,
        throttle: &mut ProgressThrottle,
        speed: &mut SpeedCalculator,
    ) {
        let now = Instant::now();
        let bps = speed.record(report.loaded, now);
        let progress = UploadProgress::from_bytes(report.loaded, report.total, bps);
        if throttle.admit(&progress, now) {
            self.publish_progress(doc, generation, progress);
        } else {
            trace!(document = %doc.id, loaded = report.loaded, "progress throttled");
        }
    }

    fn publish_progress(&self, doc: &DocumentAsset, generation: u64, progress: UploadProgress) {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if inner.generation != generation || !inner.state.is_uploading {
                return;
            }
            inner.state.progress = progress;
        }
        self.emit(UploadEvent::Progress {
            document_id: doc.id.clone(),
            progress,
        });
    }

    fn finish(
        &self,
        doc: &DocumentAsset,
        generation: u64,
        result: Result<u64, TransferError>,
    ) -> UploadState {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.generation != generation {
            // Reset while running; the reset already returned state to idle.
            debug!(document = %doc.id, "upload finished after session reset");
            return cancelled_state(UploadState::default());
        }
        inner.cancel = None;

        if inner.state.is_cancelled {
            // Cancelled locally; that wins over whatever the transport said.
            if result.is_ok() {
                debug!(document = %doc.id, "transfer completed after local cancel");
            }
            return inner.state.clone();
        }

        let state = &mut inner.state;
        state.is_uploading = false;
        state.end_time = Some(Utc::now());

        let event = match result {
            Ok(bytes) => {
                state.is_completed = true;
                state.progress = UploadProgress::complete(bytes, state.progress.speed);
                self.retry.reset(&doc.id);
                info!(document = %doc.id, bytes, "document uploaded");
                UploadEvent::Completed {
                    document_id: doc.id.clone(),
                }
            }
            Err(TransferError::Cancelled) => {
                *state = cancelled_state(state.clone());
                info!(document = %doc.id, "upload cancelled");
                UploadEvent::Cancelled {
                    document_id: doc.id.clone(),
                }
            }
            Err(e) => {
                let err = PipelineError::from(e);
                state.error = Some(err.user_message());
                state.failure = Some(err.clone());
                let allowed = self.retry.track_attempt(&doc.id);
                warn!(
                    document = %doc.id,
                    error = %err,
                    retry_allowed = allowed,
                    "upload failed"
                );
                UploadEvent::Failed {
                    document_id: doc.id.clone(),
                    kind: err.kind(),
                    error: err.user_message(),
                }
            }
        };

        let snapshot = inner.state.clone();
        drop(inner);
        self.emit(event);
        snapshot
    }

    /// Cancels the running transfer.
    ///
    /// Local state flips to cancelled immediately; the transport is told
    /// through its token and the server through a detached best-effort
    /// request. Returns `false` if nothing was uploading.
    pub fn cancel_upload(&self) -> bool {
        let (token, document_id) = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if !inner.state.is_uploading {
                return false;
            }
            inner.state = cancelled_state(inner.state.clone());
            inner.state.end_time = Some(Utc::now());
            let id = inner.current.as_ref().map(|d| d.id.clone());
            (inner.cancel.clone(), id)
        };

        if let Some(token) = token {
            token.cancel();
        }
        let Some(document_id) = document_id else {
            return true;
        };
        info!(document = %document_id, "upload cancelled by user");
        self.emit(UploadEvent::Cancelled {
            document_id: document_id.clone(),
        });
        self.notify_server_cancel(document_id);
        true
    }

    fn notify_server_cancel(&self, document_id: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(document = %document_id, "no runtime, skipping server cancel");
            return;
        };
        let registry = Arc::clone(&self.registry);
        handle.spawn(async move {
            if let Err(e) = registry.cancel_upload(&document_id).await {
                debug!(document = %document_id, error = %e, "server cancel failed");
            }
        });
    }

    /// Cancels anything in flight and returns to the idle state.
    ///
    /// A running transfer is cancelled the same way [`cancel_upload`]
    /// does it: a `Cancelled` event and a detached server cancel.
    ///
    /// [`cancel_upload`]: Self::cancel_upload
    pub fn reset_upload(&self) {
        let interrupted = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let was_uploading = inner.state.is_uploading;
            if let Some(token) = inner.cancel.take() {
                token.cancel();
            }
            let current = inner.current.take();
            if let Some(doc) = &current {
                debug!(document = %doc.id, "upload session reset");
            }
            inner.generation += 1;
            inner.state = UploadState::default();
            current.filter(|_| was_uploading).map(|doc| doc.id)
        };

        if let Some(document_id) = interrupted {
            info!(document = %document_id, "running upload cancelled by reset");
            self.emit(UploadEvent::Cancelled {
                document_id: document_id.clone(),
            });
            self.notify_server_cancel(document_id);
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events_tx
            && tx.try_send(event).is_err()
        {
            trace!("upload event dropped");
        }
    }
}

fn cancelled_state(mut state: UploadState) -> UploadState {
    state.is_uploading = false;
    state.is_cancelled = true;
    state.is_completed = false;
    state.error = Some(CANCELLED_BY_USER.to_string());
    state.failure = Some(PipelineError::Transfer(TransferError::Cancelled));
    state
}
