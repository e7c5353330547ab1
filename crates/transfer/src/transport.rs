//! Single-shot PUT of a document to a signed blob URL.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use leaddocs_protocol::constants::{
    BLOB_TYPE_HEADER, BODY_CHUNK_SIZE, DEFAULT_BLOB_TYPE, UPLOAD_TIMEOUT,
};
use leaddocs_protocol::redact_sas_url;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::TransferError;

/// Response-body fragments the storage provider uses when it rejects a
/// signed URL. A 403 carrying any of them means the token must be re-issued.
pub const TOKEN_REJECTION_MARKERS: &[&str] = &[
    "SignatureDoesNotMatch",
    "AuthenticationFailed",
    "AuthorizationFailure",
    "AuthorizationPermissionMismatch",
];

/// Raw cumulative byte count reported while the body is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

/// One PUT to perform.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub url: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Successful transfer outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub status: u16,
    pub bytes_sent: u64,
}

pub type TransferFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransferReceipt, TransferError>> + Send + 'a>>;

/// Moves bytes to a signed destination.
///
/// Implementations report progress on `progress_tx` without blocking
/// (a full channel drops the report) and must resolve promptly with
/// [`TransferError::Cancelled`] once `cancel` fires.
pub trait BlobTransport: Send + Sync {
    fn put(
        &self,
        request: PutRequest,
        progress_tx: mpsc::Sender<TransferProgress>,
        cancel: CancellationToken,
    ) -> TransferFuture<'_>;
}

/// Maps an HTTP status and body onto the transfer outcome.
pub fn classify_response(status: u16, body: &str) -> Result<(), TransferError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    if status == 403 && TOKEN_REJECTION_MARKERS.iter().any(|m| body.contains(m)) {
        return Err(TransferError::TokenExpired { status });
    }
    Err(TransferError::Http {
        status,
        body: body.to_string(),
    })
}

/// [`BlobTransport`] backed by `reqwest`.
pub struct HttpTransport {
    http: reqwest::Client,
    timeout: Duration,
    blob_type: String,
    chunk_size: usize,
}

impl HttpTransport {
    /// Creates a transport with the given per-attempt timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransferError::Network(e.to_string()))?;
        Ok(Self::from_client(http, timeout))
    }

    /// Wraps an existing client.
    pub fn from_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            blob_type: DEFAULT_BLOB_TYPE.to_string(),
            chunk_size: BODY_CHUNK_SIZE,
        }
    }

    /// Overrides the blob-type header value.
    pub fn with_blob_type(mut self, blob_type: impl Into<String>) -> Self {
        self.blob_type = blob_type.into();
        self
    }

    /// Overrides the body streaming granularity. Zero keeps the default.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    async fn send(
        &self,
        request: PutRequest,
        progress_tx: mpsc::Sender<TransferProgress>,
    ) -> Result<TransferReceipt, TransferError> {
        let total = request.body.len() as u64;
        let body = progress_body(request.body, self.chunk_size, progress_tx);

        let resp = self
            .http
            .put(&request.url)
            .header(CONTENT_TYPE, &request.content_type)
            .header(CONTENT_LENGTH, total)
            .header(BLOB_TYPE_HEADER, &self.blob_type)
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = resp.status().as_u16();
        let text = if resp.status().is_success() {
            String::new()
        } else {
            resp.text().await.unwrap_or_default()
        };

        classify_response(status, &text)?;
        Ok(TransferReceipt {
            status,
            bytes_sent: total,
        })
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransferError {
        if e.is_timeout() {
            TransferError::Timeout(self.timeout)
        } else {
            TransferError::Network(e.to_string())
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::from_client(reqwest::Client::new(), UPLOAD_TIMEOUT)
    }
}

impl BlobTransport for HttpTransport {
    fn put(
        &self,
        request: PutRequest,
        progress_tx: mpsc::Sender<TransferProgress>,
        cancel: CancellationToken,
    ) -> TransferFuture<'_> {
        Box::pin(async move {
            let target = redact_sas_url(&request.url).to_string();
            let size = request.body.len();
            debug!(url = %target, bytes = size, "starting blob upload");

            // Dropping the in-flight future aborts the connection.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransferError::Cancelled),
                r = tokio::time::timeout(self.timeout, self.send(request, progress_tx)) => {
                    match r {
                        Ok(inner) => inner,
                        Err(_) => Err(TransferError::Timeout(self.timeout)),
                    }
                }
            };

            match &result {
                Ok(receipt) => info!(url = %target, status = receipt.status, "blob upload finished"),
                Err(e) => debug!(url = %target, error = %e, "blob upload ended without success"),
            }
            result
        })
    }
}

/// Splits `payload` into a streamed body that reports cumulative progress
/// as each chunk is pulled by the HTTP stack.
fn progress_body(
    payload: Bytes,
    chunk_size: usize,
    progress_tx: mpsc::Sender<TransferProgress>,
) -> reqwest::Body {
    let total = payload.len() as u64;
    let chunks: Vec<Bytes> = (0..payload.len())
        .step_by(chunk_size)
        .map(|start| payload.slice(start..(start + chunk_size).min(payload.len())))
        .collect();

    let mut loaded: u64 = 0;
    let stream = futures_util::stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len() as u64;
        if progress_tx
            .try_send(TransferProgress { loaded, total })
            .is_err()
        {
            trace!(loaded, total, "progress report dropped");
        }
        Ok::<Bytes, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reads one HTTP/1.1 request: returns the lowercase head and the body.
    async fn read_request(stream: &mut TcpStream) -> (String, Vec<u8>) {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut tmp).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        let mut body = buf[header_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut tmp).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&tmp[..n]);
        }
        (head, body)
    }

    /// Accepts one request and answers with `status` and `body`.
    async fn mock_blob_server(
        status: u16,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/container/doc.pdf?sv=1&sig=secret");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let resp = format!(
                "HTTP/1.1 {status} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    /// Accepts one connection and never answers.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/container/doc.pdf");
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
        (url, handle)
    }

    fn request(url: &str, body: &[u8]) -> PutRequest {
        PutRequest {
            url: url.to_string(),
            content_type: "application/pdf".into(),
            body: Bytes::copy_from_slice(body),
        }
    }

    #[test]
    fn classify_success_range() {
        assert!(classify_response(200, "").is_ok());
        assert!(classify_response(201, "").is_ok());
    }

    #[test]
    fn classify_token_rejection() {
        let body = "<Error><Code>SignatureDoesNotMatch</Code></Error>";
        assert_eq!(
            classify_response(403, body),
            Err(TransferError::TokenExpired { status: 403 })
        );
        assert!(matches!(
            classify_response(403, "AuthenticationFailed"),
            Err(TransferError::TokenExpired { .. })
        ));
    }

    #[test]
    fn classify_plain_forbidden_is_http() {
        assert!(matches!(
            classify_response(403, "<Code>AccountIsDisabled</Code>"),
            Err(TransferError::Http { status: 403, .. })
        ));
    }

    #[test]
    fn classify_server_error() {
        assert!(matches!(
            classify_response(500, "boom"),
            Err(TransferError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn put_sends_headers_and_body() {
        let (url, handle) = mock_blob_server(201, "").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let receipt = transport
            .put(request(&url, b"%PDF-1.7 data"), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(receipt.status, 201);
        assert_eq!(receipt.bytes_sent, 13);

        let (head, body) = handle.await.unwrap();
        assert!(head.starts_with("put /container/doc.pdf?sv=1&sig=secret"));
        assert!(head.contains("content-type: application/pdf"));
        assert!(head.contains("x-ms-blob-type: blockblob"));
        assert_eq!(body, b"%PDF-1.7 data");
    }

    #[tokio::test]
    async fn put_reports_cumulative_progress() {
        let (url, handle) = mock_blob_server(200, "").await;
        let transport = HttpTransport::new(Duration::from_secs(5))
            .unwrap()
            .with_chunk_size(4);
        let (tx, mut rx) = mpsc::channel(16);

        transport
            .put(request(&url, b"0123456789"), tx, CancellationToken::new())
            .await
            .unwrap();
        handle.await.unwrap();

        let mut reports = Vec::new();
        while let Ok(p) = rx.try_recv() {
            reports.push((p.loaded, p.total));
        }
        assert_eq!(reports, vec![(4, 10), (8, 10), (10, 10)]);
    }

    #[tokio::test]
    async fn put_detects_expired_token() {
        let body = "<?xml version=\"1.0\"?><Error><Code>SignatureDoesNotMatch</Code></Error>";
        let (url, handle) = mock_blob_server(403, body).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let result = transport
            .put(request(&url, b"data"), tx, CancellationToken::new())
            .await;
        assert_eq!(result, Err(TransferError::TokenExpired { status: 403 }));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn put_server_error_keeps_status() {
        let (url, handle) = mock_blob_server(503, "busy").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let result = transport
            .put(request(&url, b"data"), tx, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TransferError::Http { status: 503, .. })));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn put_times_out() {
        let (url, handle) = silent_server().await;
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let result = transport
            .put(request(&url, b"data"), tx, CancellationToken::new())
            .await;
        assert_eq!(result, Err(TransferError::Timeout(Duration::from_millis(200))));
        handle.abort();
    }

    #[tokio::test]
    async fn put_honors_cancellation() {
        let (url, handle) = silent_server().await;
        let transport = HttpTransport::new(Duration::from_secs(10)).unwrap();
        let (tx, _rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let result = transport.put(request(&url, b"data"), tx, cancel).await;
        assert_eq!(result, Err(TransferError::Cancelled));
        canceller.await.unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn put_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let (tx, _rx) = mpsc::channel(64);
        let url = format!("http://127.0.0.1:{port}/doc");

        let result = transport
            .put(request(&url, b"data"), tx, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TransferError::Network(_))));
    }
}
