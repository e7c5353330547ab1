//! Data model and wire types shared by the document upload pipeline.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{
    DocumentCountResponse, DocumentListResponse, SasTokenResponse, ServerDocument,
    UploadTokenRequest,
};
pub use types::{
    DocumentAsset, DocumentStatus, ExistingDocumentAsset, SasToken, UploadProgress,
    detect_mime_type, redact_sas_url,
};
