//! Binary I/O and the signed-URL upload transport.
//!
//! - [`BinaryReader`] loads a local document reference into memory.
//! - [`BlobTransport`] performs one PUT of those bytes to a signed URL,
//!   reporting raw byte progress and honoring a cancellation token.
//! - [`ProgressThrottle`] and [`SpeedCalculator`] turn raw reports into
//!   the paced, monotonic progress the UI consumes.

mod progress;
mod reader;
mod transport;

use std::time::Duration;

pub use progress::{ProgressThrottle, SpeedCalculator};
pub use reader::{BinaryReader, ContentResolver, LocalRef};
pub use transport::{
    BlobTransport, HttpTransport, PutRequest, TOKEN_REJECTION_MARKERS, TransferFuture,
    TransferProgress, TransferReceipt, classify_response,
};

/// Errors produced by the transfer crate.
///
/// Payloads are plain strings so the error can be cloned into session state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("upload timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("upload token rejected (HTTP {status})")]
    TokenExpired { status: u16 },

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_keeps_sub_second_precision() {
        let err = TransferError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "upload timed out after 250ms");
        let err = TransferError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "upload timed out after 30000ms");
    }
}
