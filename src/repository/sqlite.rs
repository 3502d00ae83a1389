use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{ChoreRepository, SnapshotEvent, SnapshotSender, Subscription};
use crate::db::Database;
use crate::error::RepoError;
use crate::models::{normalize_family_code, Chore, ChorePatch, CreateChoreInput};

/// Change notices kept for lagging subscribers. A lagged subscriber simply
/// re-reads the full snapshot, so this only bounds memory.
const CHANGE_BUFFER: usize = 64;

/// Chore repository over the local SQLite collection.
///
/// Every successful write publishes the affected family code; subscriptions
/// for that family re-query and deliver a fresh full snapshot.
#[derive(Clone)]
pub struct SqliteChoreRepository {
    db: Database,
    changes: broadcast::Sender<String>,
}

impl SqliteChoreRepository {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self { db, changes }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Tell live subscriptions of `family_code` to re-read the collection.
    fn notify_changed(&self, family_code: &str) {
        // No receivers just means nobody is subscribed right now.
        let _ = self.changes.send(family_code.to_string());
    }
}

impl ChoreRepository for SqliteChoreRepository {
    fn subscribe(&self, family_code: &str) -> Result<Subscription, RepoError> {
        let family_code = normalize_family_code(family_code);
        if family_code.is_empty() {
            return Err(RepoError::Invalid("family code cannot be empty".to_string()));
        }

        let (sink, subscription) = Subscription::channel(family_code.clone());
        // Listen before the first read so no write between the two is missed.
        let changes = self.changes.subscribe();
        let db = self.db.clone();

        tokio::spawn(run_subscription(db, family_code, changes, sink));
        Ok(subscription)
    }

    async fn create(&self, input: CreateChoreInput) -> Result<Chore, RepoError> {
        let input = input.normalized().map_err(RepoError::Invalid)?;
        let family_code = input.family_code.clone();

        let doc = self
            .db
            .create_chore(input)
            .map_err(|e| RepoError::Write(e.to_string()))?;

        tracing::info!(chore_id = %doc.id, family_code = %family_code, "Created chore");
        self.notify_changed(&family_code);
        Ok(Chore::from_document(&doc))
    }

    async fn update(&self, id: &str, patch: ChorePatch) -> Result<(), RepoError> {
        let doc = self
            .db
            .update_chore(id, &patch)
            .map_err(|e| RepoError::Write(e.to_string()))?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        tracing::info!(chore_id = %id, "Updated chore");
        if let Some(family_code) = doc.family_code() {
            self.notify_changed(family_code);
        }
        Ok(())
    }
}

async fn run_subscription(
    db: Database,
    family_code: String,
    mut changes: broadcast::Receiver<String>,
    sink: SnapshotSender,
) {
    tracing::debug!(family_code = %family_code, "Subscription started");

    if deliver_snapshot(&db, &family_code, &sink).await {
        loop {
            let refresh = tokio::select! {
                _ = sink.closed() => break,
                change = changes.recv() => match change {
                    Ok(code) => code == family_code,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(family_code = %family_code, skipped, "Subscription lagged, resending snapshot");
                        true
                    }
                    Err(RecvError::Closed) => {
                        sink.send(SnapshotEvent::Error("chore collection closed".to_string()))
                            .await;
                        break;
                    }
                },
            };

            if refresh && !deliver_snapshot(&db, &family_code, &sink).await {
                break;
            }
        }
    }

    tracing::debug!(family_code = %family_code, "Subscription ended");
}

/// Send the current snapshot. Returns `false` when the stream should end.
async fn deliver_snapshot(db: &Database, family_code: &str, sink: &SnapshotSender) -> bool {
    match db.get_family_chores(family_code) {
        Ok(docs) => sink.send(SnapshotEvent::Snapshot(docs)).await,
        Err(e) => {
            tracing::warn!(family_code = %family_code, error = %e, "Snapshot query failed");
            sink.send(SnapshotEvent::Error(e.to_string())).await;
            false
        }
    }
}
