use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::TransferError;

const FILE_SCHEME: &str = "file://";
const CONTENT_SCHEME: &str = "content://";

/// A normalized local document reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRef {
    /// Directly readable path (plain paths and stripped `file://` URIs).
    Path(PathBuf),
    /// Content-provider URI that has to be copied to a temp file first.
    Content(String),
}

impl LocalRef {
    /// Classifies an opaque reference.
    ///
    /// `file://` references are stripped and percent-decoded.
    pub fn parse(reference: &str) -> Result<Self, TransferError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(TransferError::FileNotFound("empty reference".into()));
        }

        if reference.starts_with(CONTENT_SCHEME) {
            return Ok(Self::Content(reference.to_string()));
        }

        if let Some(stripped) = reference.strip_prefix(FILE_SCHEME) {
            let decoded = percent_decode_str(stripped)
                .decode_utf8()
                .map_err(|e| TransferError::ReadFailed(format!("invalid file URI: {e}")))?;
            return Ok(Self::Path(PathBuf::from(decoded.as_ref())));
        }

        Ok(Self::Path(PathBuf::from(reference)))
    }
}

/// Copies a content-provider document into a local file.
///
/// Implemented by the host platform; the reader owns the destination path
/// and removes it once the bytes are loaded.
pub trait ContentResolver: Send + Sync {
    fn materialize<'a>(
        &'a self,
        uri: &'a str,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;
}

/// Loads local documents into memory.
#[derive(Clone, Default)]
pub struct BinaryReader {
    resolver: Option<Arc<dyn ContentResolver>>,
}

impl BinaryReader {
    /// Creates a reader that handles plain paths and `file://` URIs only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader that can also materialize `content://` URIs.
    pub fn with_resolver(resolver: Arc<dyn ContentResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    /// Reads the whole document behind `reference`.
    ///
    /// Missing files yield [`TransferError::FileNotFound`]; unreadable or
    /// empty files yield [`TransferError::ReadFailed`]. A materialized temp
    /// copy is deleted on every path out of this function.
    pub async fn read(&self, reference: &str) -> Result<Bytes, TransferError> {
        match LocalRef::parse(reference)? {
            LocalRef::Path(path) => read_path(&path).await,
            LocalRef::Content(uri) => {
                let resolver = self.resolver.as_ref().ok_or_else(|| {
                    TransferError::ReadFailed(format!("no content resolver for {uri}"))
                })?;

                let temp = tempfile::Builder::new()
                    .prefix("leaddocs-")
                    .tempfile()
                    .map_err(|e| TransferError::ReadFailed(format!("temp file: {e}")))?
                    .into_temp_path();

                let result = match resolver.materialize(&uri, &temp).await {
                    Ok(()) => read_path(&temp).await,
                    Err(e) => Err(e),
                };

                let temp_display = temp.display().to_string();
                if let Err(e) = temp.close() {
                    warn!(path = %temp_display, error = %e, "failed to remove materialized copy");
                }
                result
            }
        }
    }
}

async fn read_path(path: &Path) -> Result<Bytes, TransferError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::FileNotFound(path.display().to_string()));
        }
        Err(e) => {
            return Err(TransferError::ReadFailed(format!("{}: {e}", path.display())));
        }
    };

    if !metadata.is_file() {
        return Err(TransferError::ReadFailed(format!(
            "not a regular file: {}",
            path.display()
        )));
    }

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| TransferError::ReadFailed(format!("{}: {e}", path.display())))?;

    if data.is_empty() {
        return Err(TransferError::ReadFailed(format!(
            "file is empty: {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), bytes = data.len(), "document loaded");
    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Resolver that writes fixed bytes (or fails) and remembers the destination.
    struct MockResolver {
        data: Option<Vec<u8>>,
        fail: bool,
        seen: Mutex<Option<PathBuf>>,
    }

    impl MockResolver {
        fn writing(data: &[u8]) -> Self {
            Self {
                data: Some(data.to_vec()),
                fail: false,
                seen: Mutex::new(None),
            }
        }

        fn failing_after_write(data: &[u8]) -> Self {
            Self {
                data: Some(data.to_vec()),
                fail: true,
                seen: Mutex::new(None),
            }
        }

        fn seen(&self) -> PathBuf {
            self.seen.lock().unwrap().clone().unwrap()
        }
    }

    impl ContentResolver for MockResolver {
        fn materialize<'a>(
            &'a self,
            _uri: &'a str,
            dest: &'a Path,
        ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>> {
            Box::pin(async move {
                *self.seen.lock().unwrap() = Some(dest.to_path_buf());
                if let Some(data) = &self.data {
                    std::fs::write(dest, data).unwrap();
                }
                if self.fail {
                    Err(TransferError::ReadFailed("provider revoked access".into()))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[test]
    fn parse_plain_path() {
        assert_eq!(
            LocalRef::parse("/data/docs/a.pdf").unwrap(),
            LocalRef::Path(PathBuf::from("/data/docs/a.pdf"))
        );
    }

    #[test]
    fn parse_file_uri_strips_and_decodes() {
        assert_eq!(
            LocalRef::parse("file:///tmp/My%20Doc.pdf").unwrap(),
            LocalRef::Path(PathBuf::from("/tmp/My Doc.pdf"))
        );
    }

    #[test]
    fn parse_content_uri() {
        assert_eq!(
            LocalRef::parse("content://media/external/file/12").unwrap(),
            LocalRef::Content("content://media/external/file/12".into())
        );
    }

    #[test]
    fn parse_empty_reference() {
        assert!(matches!(
            LocalRef::parse("  "),
            Err(TransferError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn reads_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.bin");
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::write(&path, &data).unwrap();

        let bytes = BinaryReader::new()
            .read(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn reads_through_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let uri = format!("file://{}", path.display());
        let bytes = BinaryReader::new().read(&uri).await.unwrap();
        assert_eq!(bytes.as_ref(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let result = BinaryReader::new().read("/nonexistent/dir/doc.pdf").await;
        assert!(matches!(result, Err(TransferError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn empty_file_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        std::fs::write(&path, b"").unwrap();

        let result = BinaryReader::new().read(path.to_str().unwrap()).await;
        assert!(matches!(result, Err(TransferError::ReadFailed(_))));
    }

    #[tokio::test]
    async fn directory_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = BinaryReader::new().read(dir.path().to_str().unwrap()).await;
        assert!(matches!(result, Err(TransferError::ReadFailed(_))));
    }

    #[tokio::test]
    async fn content_uri_without_resolver_fails() {
        let result = BinaryReader::new().read("content://docs/1").await;
        assert!(matches!(result, Err(TransferError::ReadFailed(_))));
    }

    #[tokio::test]
    async fn content_uri_temp_copy_removed_on_success() {
        let resolver = Arc::new(MockResolver::writing(b"materialized"));
        let reader = BinaryReader::with_resolver(resolver.clone());

        let bytes = reader.read("content://docs/7").await.unwrap();
        assert_eq!(bytes.as_ref(), b"materialized");
        assert!(!resolver.seen().exists());
    }

    #[tokio::test]
    async fn content_uri_temp_copy_removed_on_failure() {
        let resolver = Arc::new(MockResolver::failing_after_write(b"partial"));
        let reader = BinaryReader::with_resolver(resolver.clone());

        let result = reader.read("content://docs/8").await;
        assert!(matches!(result, Err(TransferError::ReadFailed(_))));
        assert!(!resolver.seen().exists());
    }
}
