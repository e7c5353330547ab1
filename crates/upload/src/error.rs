//! Pipeline error types.

use leaddocs_protocol::constants::CANCELLED_BY_USER;
use leaddocs_transfer::TransferError;

/// Errors produced by the upload pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(
        "lead {lead_id} has {server_count} documents; adding {pending} would exceed the limit of {max}"
    )]
    QuotaExceeded {
        lead_id: String,
        server_count: usize,
        pending: usize,
        max: usize,
    },

    #[error("document count verification failed: {0}")]
    VerificationFailed(String),

    #[error("retry limit reached for document {0}")]
    MaxRetriesReached(String),

    #[error("device is offline")]
    Offline,

    #[error("upload token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("an upload is already in progress")]
    Busy,

    #[error("service error: {0}")]
    Service(String),
}

/// Failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileNotFound,
    ReadFailed,
    Cancelled,
    Timeout,
    TokenExpired,
    NetworkError,
    QuotaExceeded,
    VerificationFailed,
    MaxRetriesReached,
    Offline,
    TokenUnavailable,
    Busy,
    Service,
}

impl ErrorKind {
    /// Whether trying again without user intervention can succeed.
    ///
    /// Read failures count: the file may reappear. Token expiry counts
    /// because every attempt requests a fresh token.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::Cancelled | Self::QuotaExceeded | Self::MaxRetriesReached | Self::Busy
        )
    }
}

impl PipelineError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer(e) => match e {
                TransferError::FileNotFound(_) => ErrorKind::FileNotFound,
                TransferError::ReadFailed(_) => ErrorKind::ReadFailed,
                TransferError::Cancelled => ErrorKind::Cancelled,
                TransferError::Timeout(_) => ErrorKind::Timeout,
                TransferError::TokenExpired { .. } => ErrorKind::TokenExpired,
                TransferError::Http { .. } | TransferError::Network(_) => ErrorKind::NetworkError,
            },
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Self::MaxRetriesReached(_) => ErrorKind::MaxRetriesReached,
            Self::Offline => ErrorKind::Offline,
            Self::TokenUnavailable(_) => ErrorKind::TokenUnavailable,
            Self::Busy => ErrorKind::Busy,
            Self::Service(_) => ErrorKind::Service,
        }
    }

    /// Short text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transfer(e) => transfer_message(e),
            Self::QuotaExceeded {
                server_count,
                pending,
                max,
                ..
            } => {
                let room = max.saturating_sub(*server_count);
                format!(
                    "This lead already has {server_count} of {max} documents. \
                     You can add {room} more, but {pending} were selected."
                )
            }
            Self::VerificationFailed(_) => {
                "Could not verify the current document count. Please try again.".into()
            }
            Self::MaxRetriesReached(_) => {
                "Upload failed repeatedly. Reset the document before trying again.".into()
            }
            Self::Offline => "You are offline. Connect to the internet to upload documents.".into(),
            Self::TokenUnavailable(_) => "Could not prepare the upload. Please try again.".into(),
            Self::Busy => "An upload is already in progress.".into(),
            Self::Service(_) => "The server could not complete the request.".into(),
        }
    }
}

fn transfer_message(e: &TransferError) -> String {
    match e {
        TransferError::FileNotFound(_) => {
            "The selected file could not be found. It may have been moved or deleted.".into()
        }
        TransferError::ReadFailed(_) => "The selected file could not be read.".into(),
        TransferError::Cancelled => CANCELLED_BY_USER.into(),
        TransferError::Timeout(_) => {
            "The upload timed out. Check your connection and try again.".into()
        }
        TransferError::TokenExpired { .. } => "The upload link expired. Please try again.".into(),
        TransferError::Http { status, .. } => match status {
            413 => "The file is too large to upload.".into(),
            401 | 403 => format!("The upload was not authorized (HTTP {status})."),
            500..=599 => format!(
                "The storage service is unavailable (HTTP {status}). Please try again later."
            ),
            _ => format!("Upload failed (HTTP {status})."),
        },
        TransferError::Network(_) => "Network error. Check your connection and try again.".into(),
    }
}
