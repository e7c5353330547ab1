//! Data types for the upload flow.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leaddocs_protocol::{ExistingDocumentAsset, UploadProgress};

use crate::error::{ErrorKind, PipelineError};

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Uploading,
    Completed,
    Cancelled,
    Failed,
}

/// Observable state of one upload session.
///
/// In a terminal state `is_uploading` is false and at most one of
/// `is_completed` and `is_cancelled` is set; `error` is present on
/// cancellation and on failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadState {
    pub progress: UploadProgress,
    pub is_uploading: bool,
    pub is_cancelled: bool,
    pub is_completed: bool,
    /// User-facing message; set on cancellation and failure.
    pub error: Option<String>,
    /// Classified cause behind `error`.
    pub failure: Option<PipelineError>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl UploadState {
    pub fn phase(&self) -> SessionPhase {
        if self.is_uploading {
            SessionPhase::Uploading
        } else if self.is_completed {
            SessionPhase::Completed
        } else if self.is_cancelled {
            SessionPhase::Cancelled
        } else if self.error.is_some() {
            SessionPhase::Failed
        } else {
            SessionPhase::Idle
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase(),
            SessionPhase::Completed | SessionPhase::Cancelled | SessionPhase::Failed
        )
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(PipelineError::kind)
    }

    /// Remaining time at the current average speed.
    pub fn eta(&self) -> Option<Duration> {
        if !self.is_uploading || self.progress.speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.progress.remaining() as f64 / self.progress.speed).ok()
    }

    /// Wall-clock duration of a finished session.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }
}

/// Event emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started {
        document_id: String,
        file_name: String,
    },
    Progress {
        document_id: String,
        progress: UploadProgress,
    },
    Completed {
        document_id: String,
    },
    Cancelled {
        document_id: String,
    },
    Failed {
        document_id: String,
        kind: ErrorKind,
        error: String,
    },
    /// Server state re-read after the batch.
    Reconciled { lead_id: String, count: usize },
    /// Re-reading server state failed; uploads are unaffected.
    ReconcileFailed { lead_id: String, error: String },
}

/// What happened to one document of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    Uploaded,
    Cancelled,
    Failed(PipelineError),
    /// Skipped because an earlier document stopped the batch.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResult {
    pub document_id: String,
    pub file_name: String,
    pub outcome: DocumentOutcome,
}

/// Authoritative server state fetched after a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub documents: Vec<ExistingDocumentAsset>,
    pub count: usize,
}

/// Result of one `upload_batch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub lead_id: String,
    pub results: Vec<DocumentResult>,
    pub reconciliation: Option<Reconciliation>,
    /// Non-fatal problem, e.g. reconciliation failure.
    pub warning: Option<String>,
}

impl BatchReport {
    pub fn empty(lead_id: &str) -> Self {
        Self {
            lead_id: lead_id.to_string(),
            results: Vec::new(),
            reconciliation: None,
            warning: None,
        }
    }

    pub fn uploaded_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == DocumentOutcome::Uploaded)
            .count()
    }

    /// True when every document in the batch was uploaded.
    pub fn is_complete(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome == DocumentOutcome::Uploaded)
    }

    /// The result that stopped the batch, if any.
    pub fn stopped_at(&self) -> Option<&DocumentResult> {
        self.results.iter().find(|r| {
            matches!(
                r.outcome,
                DocumentOutcome::Failed(_) | DocumentOutcome::Cancelled
            )
        })
    }
}
