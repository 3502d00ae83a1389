//! The authoritative chore collection.
//!
//! [`ChoreRepository`] is the seam between the engine and whatever stores the
//! family's chores. Writes are plain async calls; reads come through a live
//! [`Subscription`] that delivers full, newest-first snapshots.

mod http;
mod sqlite;

pub use http::HttpChoreRepository;
pub use sqlite::SqliteChoreRepository;

use std::future::Future;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::RepoError;
use crate::models::{Chore, ChoreDocument, ChorePatch, CreateChoreInput};

/// Snapshots buffered per subscription before the producer waits.
const SUBSCRIPTION_BUFFER: usize = 16;

pub trait ChoreRepository: Send + Sync + 'static {
    /// Open a live subscription to every chore of `family_code`.
    ///
    /// Must be called from within a Tokio runtime; the producer runs as a
    /// background task until the subscription is stopped or dropped.
    fn subscribe(&self, family_code: &str) -> Result<Subscription, RepoError>;

    /// Create a pending chore. The repository assigns the id and `createdAt`.
    fn create(
        &self,
        input: CreateChoreInput,
    ) -> impl Future<Output = Result<Chore, RepoError>> + Send;

    /// Merge `patch` into the chore with this id.
    fn update(
        &self,
        id: &str,
        patch: ChorePatch,
    ) -> impl Future<Output = Result<(), RepoError>> + Send;
}

/// One delivery on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Every chore currently in scope, newest `createdAt` first. Replaces
    /// whatever was delivered before.
    Snapshot(Vec<ChoreDocument>),
    /// The stream failed. No further events follow.
    Error(String),
}

/// Consumer half of a live chore stream.
///
/// A subscription cannot be restarted: once stopped or ended, open a new one.
#[derive(Debug)]
pub struct Subscription {
    family_code: String,
    events: mpsc::Receiver<SnapshotEvent>,
}

/// Producer half of a live chore stream.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::Sender<SnapshotEvent>,
}

impl Subscription {
    pub fn channel(family_code: impl Into<String>) -> (SnapshotSender, Self) {
        let (tx, events) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (
            SnapshotSender { tx },
            Self {
                family_code: family_code.into(),
                events,
            },
        )
    }

    pub fn family_code(&self) -> &str {
        &self.family_code
    }

    /// Next delivery, or `None` once the stream has ended or been stopped.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }

    /// Stop delivery and discard anything already buffered.
    pub fn stop(&mut self) {
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }

    pub fn into_stream(self) -> ReceiverStream<SnapshotEvent> {
        ReceiverStream::new(self.events)
    }
}

impl SnapshotSender {
    /// Returns `false` when the subscriber has gone away.
    pub async fn send(&self, event: SnapshotEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Resolves once the subscriber has stopped or dropped the stream.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
