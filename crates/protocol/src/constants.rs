use std::time::Duration;

/// Maximum number of documents a single lead may hold.
pub const MAX_DOCUMENTS_PER_LEAD: usize = 7;

/// Consecutive failures tolerated per document before further attempts
/// are refused until a manual reset.
pub const MAX_RETRY_ATTEMPTS: u32 = 2;

/// Client-side bound on a single binary transfer.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum wall-clock spacing between two emitted progress events.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Granularity of the streamed request body (64 KiB).
///
/// Each chunk handed to the HTTP stack produces one raw progress report.
pub const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Header carrying the blob type required by the storage provider.
pub const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Blob type sent with every upload.
pub const DEFAULT_BLOB_TYPE: &str = "BlockBlob";

/// Document-type tag sent when requesting an upload token.
pub const DEFAULT_DOCUMENT_TYPE: &str = "lead_document";

/// MIME type used when nothing better is known.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// User-facing text for a cancelled upload.
pub const CANCELLED_BY_USER: &str = "Upload cancelled by user";
