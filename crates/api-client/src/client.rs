//! Lead document API client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.

use std::time::Duration;

use leaddocs_protocol::{
    DocumentCountResponse, DocumentListResponse, ExistingDocumentAsset, SasToken,
    SasTokenResponse, UploadTokenRequest, redact_sas_url,
};
use leaddocs_upload::{DocumentRegistry, PipelineError, ServiceFuture, TokenBroker};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid API token")]
    InvalidToken,

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl From<ApiError> for PipelineError {
    fn from(e: ApiError) -> Self {
        PipelineError::Service(e.to_string())
    }
}

/// Lead document API client.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for `base_url` authenticating with `api_token`.
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, ApiError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if parsed.host_str().is_none() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_token}"))
                .map_err(|_| ApiError::InvalidToken)?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Host and port the client talks to, for connectivity probing.
    pub fn endpoint(&self) -> Option<(String, u16)> {
        let url = reqwest::Url::parse(&self.base_url).ok()?;
        Some((url.host_str()?.to_string(), url.port_or_known_default()?))
    }

    /// Authoritative number of documents attached to a lead.
    pub async fn document_count(&self, lead_id: &str) -> Result<usize, ApiError> {
        let path = format!("/leads/{}/documents/count", segment(lead_id));
        let resp: DocumentCountResponse = self.get_json(&path).await?;
        Ok(resp.count)
    }

    /// Documents currently attached to a lead.
    pub async fn list_documents(
        &self,
        lead_id: &str,
    ) -> Result<Vec<ExistingDocumentAsset>, ApiError> {
        let path = format!("/leads/{}/documents", segment(lead_id));
        let resp: DocumentListResponse = self.get_json(&path).await?;
        Ok(resp.into_existing())
    }

    /// Requests a signed URL for uploading a new document to a lead.
    pub async fn upload_token(&self, lead_id: &str, doc_type: &str) -> Result<SasToken, ApiError> {
        let path = format!("/leads/{}/documents/upload-token", segment(lead_id));
        let request = UploadTokenRequest {
            doc_type: doc_type.to_string(),
        };
        let resp: SasTokenResponse = self.post_json(&path, &request).await?;
        debug!(lead = %lead_id, url = %redact_sas_url(&resp.sas_url), "upload token received");
        Ok(resp.into())
    }

    /// Requests a signed read URL for an existing document.
    pub async fn view_token(&self, doc_id: &str) -> Result<SasToken, ApiError> {
        let path = format!("/documents/{}/view-token", segment(doc_id));
        let resp: SasTokenResponse = self.get_json(&path).await?;
        Ok(resp.into())
    }

    /// Asks the backend to abandon an upload.
    pub async fn cancel_upload(&self, doc_id: &str) -> Result<(), ApiError> {
        let path = format!("/documents/{}/cancel", segment(doc_id));
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Performs an authenticated GET and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).send().await?;
        let body = check_status(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Performs an authenticated JSON POST and decodes the JSON body.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).json(payload).send().await?;
        let body = check_status(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Returns the body of a successful response, or the status as an error.
async fn check_status(resp: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.bytes().await?.to_vec())
}

fn segment(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}

impl TokenBroker for ApiClient {
    fn issue_upload_token<'a>(
        &'a self,
        lead_id: &'a str,
        doc_type: &'a str,
    ) -> ServiceFuture<'a, SasToken> {
        Box::pin(async move { Ok(self.upload_token(lead_id, doc_type).await?) })
    }

    fn issue_view_token<'a>(&'a self, doc_id: &'a str) -> ServiceFuture<'a, SasToken> {
        Box::pin(async move { Ok(self.view_token(doc_id).await?) })
    }
}

impl DocumentRegistry for ApiClient {
    fn document_count<'a>(&'a self, lead_id: &'a str) -> ServiceFuture<'a, usize> {
        Box::pin(async move { Ok(ApiClient::document_count(self, lead_id).await?) })
    }

    fn list_documents<'a>(
        &'a self,
        lead_id: &'a str,
    ) -> ServiceFuture<'a, Vec<ExistingDocumentAsset>> {
        Box::pin(async move { Ok(ApiClient::list_documents(self, lead_id).await?) })
    }

    fn cancel_upload<'a>(&'a self, document_id: &'a str) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::cancel_upload(self, document_id).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaddocs_protocol::DocumentStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reads one request: the head as sent and the body.
    async fn read_request(stream: &mut TcpStream) -> (String, String) {
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
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                l.to_lowercase()
                    .strip_prefix("content-length:")
                    .map(|v| v.trim().parse::<usize>().unwrap())
            })
            .unwrap_or(0);
        let mut body = buf[header_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut tmp).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&tmp[..n]);
        }
        (head, String::from_utf8_lossy(&body).to_string())
    }

    /// Starts a mock HTTP server that answers one request with `status`
    /// and `body`, and hands back the request it received.
    async fn mock_server(
        status: u16,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/api");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let resp = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    #[tokio::test]
    async fn document_count_parses_and_authenticates() {
        let (url, handle) = mock_server(200, r#"{"count":5}"#).await;
        let client = ApiClient::new(&url, "secret-token").unwrap();

        assert_eq!(client.document_count("L-1").await.unwrap(), 5);

        let (head, _) = handle.await.unwrap();
        assert!(head.starts_with("GET /api/leads/L%2D1/documents/count "), "{head}");
        assert!(head.to_lowercase().contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn list_documents_transforms_entries() {
        let json = r#"{"documents":[
            {"docId":"d1","fileName":"a.pdf","mimeType":"application/pdf","fileSize":10,"status":"uploaded"},
            {"docId":"d2","fileName":"b.bin","status":"pending"}
        ]}"#;
        let (url, handle) = mock_server(200, json).await;
        let client = ApiClient::new(&url, "t").unwrap();

        let docs = client.list_documents("L1").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].doc_id, "d1");
        assert_eq!(docs[0].file_size, 10);
        assert_eq!(docs[1].status, DocumentStatus::Pending);
        assert_eq!(docs[1].mime_type, "application/octet-stream");

        handle.abort();
    }

    #[tokio::test]
    async fn upload_token_posts_doc_type() {
        let (url, handle) =
            mock_server(200, r#"{"sasUrl":"https://store.example/c/x?sig=abc"}"#).await;
        let client = ApiClient::new(&url, "t").unwrap();

        let token = client.upload_token("L1", "lead_document").await.unwrap();
        assert_eq!(token.sas_url, "https://store.example/c/x?sig=abc");

        let (head, body) = handle.await.unwrap();
        assert!(head.starts_with("POST /api/leads/L1/documents/upload-token "));
        let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(sent["docType"], "lead_document");
    }

    #[tokio::test]
    async fn view_token_via_broker_trait() {
        let (url, handle) = mock_server(200, r#"{"sasUrl":"https://store.example/r"}"#).await;
        let client = ApiClient::new(&url, "t").unwrap();
        let broker: &dyn TokenBroker = &client;

        let token = broker.issue_view_token("d 1").await.unwrap();
        assert_eq!(token.sas_url, "https://store.example/r");

        let (head, _) = handle.await.unwrap();
        assert!(head.starts_with("GET /api/documents/d%201/view-token "), "{head}");
    }

    #[tokio::test]
    async fn cancel_posts_to_document() {
        let (url, handle) = mock_server(204, "").await;
        let client = ApiClient::new(&url, "t").unwrap();

        DocumentRegistry::cancel_upload(&client, "d1").await.unwrap();
        let (head, _) = handle.await.unwrap();
        assert!(head.starts_with("POST /api/documents/d1/cancel "));
    }

    #[tokio::test]
    async fn api_error_keeps_status() {
        let (url, handle) = mock_server(500, r#"{"error":"boom"}"#).await;
        let client = ApiClient::new(&url, "t").unwrap();

        let err = client.document_count("L1").await.unwrap_err();
        assert!(matches!(err, ApiError::Api { status: 500, .. }));
        assert!(err.to_string().contains("500"));

        handle.abort();
    }

    #[tokio::test]
    async fn registry_errors_become_service_errors() {
        let (url, handle) = mock_server(503, "unavailable").await;
        let client = ApiClient::new(&url, "t").unwrap();
        let registry: &dyn DocumentRegistry = &client;

        let err = registry.document_count("L1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Service(ref m) if m.contains("503")));

        handle.abort();
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", "t"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn rejects_bad_token() {
        assert!(matches!(
            ApiClient::new("https://api.example", "bad\ntoken"),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn endpoint_uses_default_port() {
        let client = ApiClient::new("https://api.example/v1/", "t").unwrap();
        assert_eq!(client.base_url(), "https://api.example/v1");
        assert_eq!(client.endpoint(), Some(("api.example".into(), 443)));
    }
}
