//! The member's session on this device.
//!
//! [`Household`] owns the identity store and the sync engine and keeps them
//! consistent: whatever profile the store holds is the one the engine is
//! subscribed for. Build it once at startup with [`Household::start`] and
//! pass it around instead of reaching for process-wide state.

use std::sync::Arc;

use crate::error::ChoreError;
use crate::evidence::EvidenceSource;
use crate::identity::{IdentityStore, KeyValueStore};
use crate::models::{Chore, CreateChoreInput, Profile};
use crate::proof::{PipelineStage, ProofOutcome, UploadCoordinator};
use crate::repository::ChoreRepository;
use crate::storage::ObjectStore;
use crate::sync::SyncEngine;

pub struct Household<R, K> {
    repo: Arc<R>,
    identity: IdentityStore<K>,
    engine: SyncEngine<R>,
}

impl<R: ChoreRepository, K: KeyValueStore> Household<R, K> {
    /// Restore the saved profile and, if there is one, start syncing it.
    pub fn start(repo: Arc<R>, storage: K) -> Result<Self, ChoreError> {
        let identity = IdentityStore::open(storage)?;
        let mut engine = SyncEngine::new(Arc::clone(&repo));
        engine.set_profile(identity.current().cloned())?;

        Ok(Self {
            repo,
            identity,
            engine,
        })
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.identity.current()
    }

    pub fn engine(&self) -> &SyncEngine<R> {
        &self.engine
    }

    /// Save `profile` and resubscribe for its family.
    pub fn join(&mut self, profile: Profile) -> Result<(), ChoreError> {
        self.identity.save(profile)?;
        self.engine.set_profile(self.identity.current().cloned())?;
        Ok(())
    }

    /// Forget the profile and stop syncing.
    pub fn switch_member(&mut self) -> Result<(), ChoreError> {
        self.engine.set_profile(None)?;
        self.identity.clear()?;
        Ok(())
    }

    /// Chores visible to the active profile, from the last snapshot.
    pub fn visible_chores(&self) -> Vec<Chore> {
        self.engine.visible_chores()
    }

    /// Create a chore in the active family. Parents only.
    pub async fn create_chore(
        &self,
        title: &str,
        assigned_to: &str,
    ) -> Result<Chore, ChoreError> {
        add_chore(self.repo.as_ref(), self.identity.current(), title, assigned_to).await
    }

    /// Run the proof pipeline for the visible chore with this id.
    pub async fn complete_chore<O, E, F>(
        &self,
        coordinator: &UploadCoordinator<R, O, E>,
        chore_id: &str,
        on_stage: F,
    ) -> Result<ProofOutcome, ChoreError>
    where
        O: ObjectStore,
        E: EvidenceSource,
        F: FnMut(PipelineStage) + Send,
    {
        let profile = self.require_profile()?;
        let chore = self
            .visible_chores()
            .into_iter()
            .find(|c| c.id == chore_id)
            .ok_or_else(|| ChoreError::NotAllowed(format!("No chore {chore_id} on your list.")))?;

        Ok(coordinator
            .complete_with_progress(profile, &chore, on_stage)
            .await?)
    }

    /// Build a coordinator writing through this household's repository.
    pub fn coordinator<O, E>(&self, store: Arc<O>, evidence: E) -> UploadCoordinator<R, O, E>
    where
        O: ObjectStore,
        E: EvidenceSource,
    {
        UploadCoordinator::new(Arc::clone(&self.repo), store, evidence)
    }

    fn require_profile(&self) -> Result<&Profile, ChoreError> {
        require_profile(self.identity.current())
    }
}

/// Create a chore in `profile`'s family without a running sync engine.
/// Parents only.
pub async fn add_chore<R: ChoreRepository>(
    repo: &R,
    profile: Option<&Profile>,
    title: &str,
    assigned_to: &str,
) -> Result<Chore, ChoreError> {
    let profile = require_profile(profile)?;
    if !profile.is_parent() {
        return Err(ChoreError::NotAllowed(
            "Only parents can add chores.".to_string(),
        ));
    }

    let input = CreateChoreInput::new(title, assigned_to, profile.family_code.clone());
    Ok(repo.create(input).await?)
}

fn require_profile(profile: Option<&Profile>) -> Result<&Profile, ChoreError> {
    profile.ok_or_else(|| {
        ChoreError::NotAllowed("Join a family first with `chores join`.".to_string())
    })
}
