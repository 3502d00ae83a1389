//! Sync engine: keeps a live, normalized copy of the active family's chores.
//!
//! # State machine
//!
//! ```text
//! Idle --profile set--> Subscribing --first snapshot--> Synced --snapshot--> Synced
//!                            |                             |
//!                            +--------stream error---------+--> Error
//! ```
//!
//! Changing or clearing the profile tears the current subscription down
//! before anything else happens, so at most one subscription is live per
//! engine and nothing from a torn-down subscription is applied afterwards.
//! In `Error` the last delivered chore list is kept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::RepoError;
use crate::models::{normalize_family_code, Chore, ChoreDocument, Profile};
use crate::repository::{ChoreRepository, SnapshotEvent, Subscription};
use crate::view;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    /// No profile, no subscription.
    Idle,
    /// Subscription opened, waiting for the first snapshot.
    Subscribing,
    /// At least one snapshot applied.
    Synced,
    /// The stream failed; the held list is the last one received.
    Error(String),
}

/// What the engine currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncView {
    pub profile: Option<Profile>,
    pub state: SyncState,
    /// Every chore of the family, newest first.
    pub chores: Vec<Chore>,
}

impl SyncView {
    fn idle() -> Self {
        Self {
            profile: None,
            state: SyncState::Idle,
            chores: Vec::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == SyncState::Subscribing
    }

    /// The held chores projected for the active profile's role.
    pub fn visible(&self) -> Vec<Chore> {
        match &self.profile {
            Some(profile) => view::project(&self.chores, profile),
            None => Vec::new(),
        }
    }
}

struct ActiveSubscription {
    family_code: String,
    task: JoinHandle<()>,
}

pub struct SyncEngine<R> {
    repo: Arc<R>,
    view: Arc<watch::Sender<SyncView>>,
    /// Bumped on every teardown; a pump only applies deliveries while its
    /// own generation is current.
    generation: Arc<AtomicU64>,
    active: Option<ActiveSubscription>,
}

impl<R: ChoreRepository> SyncEngine<R> {
    pub fn new(repo: Arc<R>) -> Self {
        let (view, _) = watch::channel(SyncView::idle());
        Self {
            repo,
            view: Arc::new(view),
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    /// Switch the engine to `profile`, or back to idle with `None`.
    ///
    /// The previous subscription is always released first. Setting the same
    /// profile again opens a fresh subscription, which is how a caller
    /// recovers from `Error`.
    pub fn set_profile(&mut self, profile: Option<Profile>) -> Result<(), RepoError> {
        self.teardown();

        let Some(profile) = profile else {
            self.view.send_replace(SyncView::idle());
            return Ok(());
        };

        let generation = self.generation.load(Ordering::SeqCst);
        self.view.send_replace(SyncView {
            profile: Some(profile.clone()),
            state: SyncState::Subscribing,
            chores: Vec::new(),
        });

        let subscription = match self.repo.subscribe(&profile.family_code) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(family_code = %profile.family_code, error = %e, "Failed to open subscription");
                self.view
                    .send_modify(|view| view.state = SyncState::Error(e.to_string()));
                return Err(e);
            }
        };

        tracing::info!(family_code = %profile.family_code, "Subscribing to chores");
        let task = tokio::spawn(pump(
            subscription,
            generation,
            Arc::clone(&self.generation),
            Arc::clone(&self.view),
        ));
        self.active = Some(ActiveSubscription {
            family_code: profile.family_code,
            task,
        });
        Ok(())
    }

    /// Release the subscription and return to idle.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.view.send_replace(SyncView::idle());
    }

    fn teardown(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = self.active.take() {
            active.task.abort();
            tracing::debug!(family_code = %active.family_code, "Released subscription");
        }
    }

    pub fn view(&self) -> SyncView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> SyncState {
        self.view.borrow().state.clone()
    }

    pub fn chores(&self) -> Vec<Chore> {
        self.view.borrow().chores.clone()
    }

    pub fn visible_chores(&self) -> Vec<Chore> {
        self.view.borrow().visible()
    }

    /// Family code of the live subscription, if any.
    pub fn active_family_code(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.family_code.as_str())
    }

    /// Receiver notified on every state or list change.
    pub fn watch(&self) -> watch::Receiver<SyncView> {
        self.view.subscribe()
    }

    /// Wait until the engine leaves `Subscribing`, then return the view.
    pub async fn settled(&self) -> SyncView {
        let mut rx = self.view.subscribe();
        let settled = match rx.wait_for(|view| view.state != SyncState::Subscribing).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        };
        settled
    }
}

impl<R> Drop for SyncEngine<R> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

async fn pump(
    mut subscription: Subscription,
    generation: u64,
    current: Arc<AtomicU64>,
    view: Arc<watch::Sender<SyncView>>,
) {
    let family_code = subscription.family_code().to_string();
    let is_current = || current.load(Ordering::SeqCst) == generation;

    while let Some(event) = subscription.next().await {
        match event {
            SnapshotEvent::Snapshot(docs) => {
                let chores = normalize_snapshot(&family_code, &docs);
                let count = chores.len();
                let applied = view.send_if_modified(|view| {
                    if !is_current() {
                        return false;
                    }
                    view.state = SyncState::Synced;
                    view.chores = chores;
                    true
                });
                if !applied {
                    break;
                }
                tracing::debug!(family_code = %family_code, count, "Applied snapshot");
            }
            SnapshotEvent::Error(message) => {
                tracing::warn!(family_code = %family_code, error = %message, "Chore subscription failed");
                view.send_if_modified(|view| {
                    if !is_current() {
                        return false;
                    }
                    view.state = SyncState::Error(message);
                    true
                });
                subscription.stop();
                return;
            }
        }
    }

    if is_current() {
        view.send_if_modified(|view| {
            if !is_current() {
                return false;
            }
            view.state = SyncState::Error("chore subscription ended".to_string());
            true
        });
    }
    subscription.stop();
}

/// Normalize a delivered snapshot for the subscription scoped to
/// `family_code`, keeping delivery order.
///
/// Records belonging to another family are dropped.
pub fn normalize_snapshot(family_code: &str, docs: &[ChoreDocument]) -> Vec<Chore> {
    let scope = normalize_family_code(family_code);
    let chores: Vec<Chore> = docs
        .iter()
        .map(Chore::from_document)
        .filter(|chore| chore.family_code == scope)
        .collect();

    let dropped = docs.len() - chores.len();
    if dropped > 0 {
        tracing::warn!(family_code = %scope, dropped, "Dropped out-of-scope chore records");
    }
    chores
}
