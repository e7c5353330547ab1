//! REST client for the lead document backend.
//!
//! Provides an async, bearer-authenticated client and implements the
//! pipeline's [`TokenBroker`](leaddocs_upload::TokenBroker) and
//! [`DocumentRegistry`](leaddocs_upload::DocumentRegistry) on top of it.

pub mod client;

pub use client::{ApiClient, ApiError};
