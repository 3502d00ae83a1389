//! Object storage for proof photos.
//!
//! Objects are written once per path and then addressed by a stable
//! retrieval URL. Paths follow `choreProofs/{familyCode}/{choreId}-{uploadTimestamp}`
//! so a retried upload never collides with an earlier attempt.

mod http;
mod local;

pub use http::HttpObjectStore;
pub use local::{LocalObjectStore, StoredObject};

use std::future::Future;

use crate::error::StorageError;

/// Top-level prefix for every proof object.
pub const PROOF_PREFIX: &str = "choreProofs";

pub trait ObjectStore: Send + Sync + 'static {
    /// Write `bytes` at `path`. Fails if an object already exists there.
    fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Stable URL from which the object at `path` can be fetched.
    fn url(&self, path: &str) -> impl Future<Output = Result<String, StorageError>> + Send;
}

/// Object path for a proof photo uploaded at `uploaded_at_ms` (epoch millis).
pub fn proof_object_path(family_code: &str, chore_id: &str, uploaded_at_ms: i64) -> String {
    format!("{PROOF_PREFIX}/{family_code}/{chore_id}-{uploaded_at_ms}")
}

/// Reject paths that are empty, absolute, or step outside the store.
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// `path` as it appears in a URL: each segment percent-encoded, the
/// separators kept.
pub fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
