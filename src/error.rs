//! Error taxonomy shared by the repository, storage and pipeline layers.
//!
//! Each failure is caught at the boundary of the operation that produced it
//! and surfaced once as a [`ChoreError`], whose [`ChoreError::notice`] is the
//! message shown to the member. Nothing here is retried automatically.

use thiserror::Error;

use crate::identity::IdentityError;
use crate::models::ProfileError;
use crate::proof::ProofError;

/// Failures of the chore collection.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("chore not found: {0}")]
    NotFound(String),

    #[error("invalid chore: {0}")]
    Invalid(String),

    #[error("chore write rejected: {0}")]
    Write(String),

    #[error("chore subscription failed: {0}")]
    Subscription(String),
}

/// Failures of the proof object store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object already exists at {0}")]
    AlreadyExists(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("object upload failed: {0}")]
    Upload(String),
}

/// The member-facing error taxonomy.
#[derive(Debug, Error)]
pub enum ChoreError {
    #[error("photo library access was denied")]
    PermissionDenied,

    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("profile storage failed: {0}")]
    Identity(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("{0}")]
    NotAllowed(String),
}

impl ChoreError {
    /// Single line shown to the member for this failure.
    pub fn notice(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Permission needed: allow photo access to attach proof.".to_string()
            }
            Self::Subscription(_) => {
                "Couldn't refresh chores. Showing the last list we received.".to_string()
            }
            Self::Write(_) => "Couldn't save the chore. Please try again.".to_string(),
            Self::Upload(_) => "Couldn't upload the photo. Please try again.".to_string(),
            Self::Identity(_) => "Couldn't save your profile on this device.".to_string(),
            Self::Profile(e) => format!("Check your details: {e}."),
            Self::NotAllowed(reason) => reason.clone(),
        }
    }
}

impl From<RepoError> for ChoreError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Subscription(msg) => Self::Subscription(msg),
            other => Self::Write(other.to_string()),
        }
    }
}

impl From<StorageError> for ChoreError {
    fn from(e: StorageError) -> Self {
        Self::Upload(e.to_string())
    }
}

impl From<IdentityError> for ChoreError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Profile(p) => Self::Profile(p),
            other => Self::Identity(other.to_string()),
        }
    }
}

impl From<ProofError> for ChoreError {
    fn from(e: ProofError) -> Self {
        match e {
            ProofError::PermissionDenied => Self::PermissionDenied,
            ProofError::NotAllowed(reason) => Self::NotAllowed(reason.to_string()),
            ProofError::Upload { source, .. } => Self::Upload(source.to_string()),
            ProofError::WriteAfterUpload { source, .. } => Self::Write(source.to_string()),
        }
    }
}
