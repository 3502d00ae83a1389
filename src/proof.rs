//! Upload coordinator: the "mark complete with photo proof" pipeline.
//!
//! A run walks `Idle → RequestingPermission → PickingImage → Uploading →
//! Writing → Done`, stopping at `Failed` on the first error. Stages never
//! overlap and nothing is retried or rolled back. In particular a failed
//! chore update leaves the uploaded object in storage; that case is reported
//! as [`ProofError::WriteAfterUpload`] carrying the object's path and URL.
//!
//! Two runs against the same chore are not serialized. Callers are expected
//! to stop offering the action once a chore shows as completed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::{RepoError, StorageError};
use crate::evidence::{EvidenceSource, PermissionStatus};
use crate::models::{Chore, ChorePatch, Profile};
use crate::repository::ChoreRepository;
use crate::storage::{proof_object_path, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    RequestingPermission,
    PickingImage,
    Uploading,
    Writing,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestingPermission => "requesting_permission",
            Self::PickingImage => "picking_image",
            Self::Uploading => "uploading",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// A proof object that made it into storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedProof {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProofOutcome {
    /// The chore is now completed with `proof` attached.
    Completed {
        chore_id: String,
        proof: UploadedProof,
        completed_at: DateTime<Utc>,
    },
    /// The member backed out of picking an image. Nothing was written.
    Cancelled,
}

/// Why a run may not start at all.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NotAllowed {
    #[error("Only children can complete chores with a photo.")]
    NotChild,

    #[error("This chore is already completed.")]
    AlreadyCompleted,
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("photo library access was denied")]
    PermissionDenied,

    #[error(transparent)]
    NotAllowed(#[from] NotAllowed),

    /// Writing the object or fetching its URL failed. The chore is untouched;
    /// if the write itself succeeded the object at `path` is orphaned.
    #[error("proof upload to {path} failed: {source}")]
    Upload {
        path: String,
        #[source]
        source: StorageError,
    },

    /// The object is stored but the chore still shows pending without it.
    #[error("proof stored at {} but the chore was not updated: {source}", .uploaded.path)]
    WriteAfterUpload {
        uploaded: UploadedProof,
        #[source]
        source: RepoError,
    },
}

impl ProofError {
    /// Stage the run was in when it failed.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::NotAllowed(_) => PipelineStage::Idle,
            Self::PermissionDenied => PipelineStage::RequestingPermission,
            Self::Upload { .. } => PipelineStage::Uploading,
            Self::WriteAfterUpload { .. } => PipelineStage::Writing,
        }
    }
}

/// Tracks one run's stage and reports every transition.
struct PipelineRun<'a, F> {
    chore_id: &'a str,
    stage: PipelineStage,
    on_stage: F,
}

impl<'a, F: FnMut(PipelineStage)> PipelineRun<'a, F> {
    fn new(chore_id: &'a str, on_stage: F) -> Self {
        Self {
            chore_id,
            stage: PipelineStage::Idle,
            on_stage,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        tracing::debug!(
            chore_id = %self.chore_id,
            from = self.stage.as_str(),
            to = next.as_str(),
            "Proof pipeline transition"
        );
        self.stage = next;
        (self.on_stage)(next);
    }

    fn fail(&mut self, error: ProofError) -> ProofError {
        tracing::warn!(
            chore_id = %self.chore_id,
            stage = self.stage.as_str(),
            error = %error,
            "Proof pipeline failed"
        );
        self.advance(PipelineStage::Failed);
        error
    }
}

pub struct UploadCoordinator<R, O, E> {
    repo: Arc<R>,
    store: Arc<O>,
    evidence: E,
}

impl<R, O, E> UploadCoordinator<R, O, E>
where
    R: ChoreRepository,
    O: ObjectStore,
    E: EvidenceSource,
{
    pub fn new(repo: Arc<R>, store: Arc<O>, evidence: E) -> Self {
        Self {
            repo,
            store,
            evidence,
        }
    }

    /// Run the pipeline for `chore` on behalf of `profile`.
    pub async fn complete(
        &self,
        profile: &Profile,
        chore: &Chore,
    ) -> Result<ProofOutcome, ProofError> {
        self.complete_with_progress(profile, chore, |_| {}).await
    }

    /// Like [`complete`](Self::complete), calling `on_stage` on every stage
    /// transition.
    pub async fn complete_with_progress<F>(
        &self,
        profile: &Profile,
        chore: &Chore,
        on_stage: F,
    ) -> Result<ProofOutcome, ProofError>
    where
        F: FnMut(PipelineStage) + Send,
    {
        let mut run = PipelineRun::new(&chore.id, on_stage);

        if !profile.is_child() {
            return Err(run.fail(NotAllowed::NotChild.into()));
        }
        if chore.is_completed() {
            return Err(run.fail(NotAllowed::AlreadyCompleted.into()));
        }

        run.advance(PipelineStage::RequestingPermission);
        if self.evidence.request_permission().await == PermissionStatus::Denied {
            return Err(run.fail(ProofError::PermissionDenied));
        }

        run.advance(PipelineStage::PickingImage);
        let Some(asset) = self.evidence.pick_image().await else {
            tracing::info!(chore_id = %chore.id, "Proof cancelled by member");
            run.advance(PipelineStage::Idle);
            return Ok(ProofOutcome::Cancelled);
        };

        run.advance(PipelineStage::Uploading);
        let path = proof_object_path(
            &profile.family_code,
            &chore.id,
            Utc::now().timestamp_millis(),
        );
        let bytes = match asset.read().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let source =
                    StorageError::Upload(format!("couldn't read {}: {e}", asset.file_name));
                return Err(run.fail(ProofError::Upload { path, source }));
            }
        };
        if let Err(source) = self.store.put(&path, bytes, &asset.content_type).await {
            return Err(run.fail(ProofError::Upload { path, source }));
        }
        let url = match self.store.url(&path).await {
            Ok(url) => url,
            Err(source) => return Err(run.fail(ProofError::Upload { path, source })),
        };
        let uploaded = UploadedProof { path, url };

        run.advance(PipelineStage::Writing);
        let completed_at = Utc::now();
        let patch = ChorePatch::completion(&uploaded.url, &profile.display_name, completed_at);
        if let Err(source) = self.repo.update(&chore.id, patch).await {
            return Err(run.fail(ProofError::WriteAfterUpload { uploaded, source }));
        }

        run.advance(PipelineStage::Done);
        tracing::info!(chore_id = %chore.id, path = %uploaded.path, "Chore completed with proof");
        Ok(ProofOutcome::Completed {
            chore_id: chore.id.clone(),
            proof: uploaded,
            completed_at,
        })
    }
}
