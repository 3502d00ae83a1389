use std::sync::{Arc, Mutex};
use std::time::Duration;

use chore_sync::db::Database;
use chore_sync::error::RepoError;
use chore_sync::models::*;
use chore_sync::repository::{
    ChoreRepository, SnapshotEvent, SnapshotSender, SqliteChoreRepository, Subscription,
};
use chore_sync::sync::{SyncEngine, SyncState, SyncView};
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(2);

/// Repository whose subscriptions are fed by the test.
#[derive(Clone, Default)]
struct ScriptedRepository {
    opened: Arc<Mutex<Vec<Option<SnapshotSender>>>>,
    refuse: bool,
}

impl ScriptedRepository {
    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    fn sender(&self, index: usize) -> SnapshotSender {
        self.opened.lock().unwrap()[index]
            .clone()
            .expect("subscription already ended")
    }

    /// End subscription `index` by dropping its producer.
    fn end(&self, index: usize) {
        self.opened.lock().unwrap()[index].take();
    }

    fn opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    fn live(&self) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter(|sender| !sender.is_closed())
            .count()
    }
}

impl ChoreRepository for ScriptedRepository {
    fn subscribe(&self, family_code: &str) -> Result<Subscription, RepoError> {
        if self.refuse {
            return Err(RepoError::Subscription("backend unavailable".to_string()));
        }
        let (sender, subscription) = Subscription::channel(normalize_family_code(family_code));
        self.opened.lock().unwrap().push(Some(sender));
        Ok(subscription)
    }

    async fn create(&self, _input: CreateChoreInput) -> Result<Chore, RepoError> {
        Err(RepoError::Write("read-only".to_string()))
    }

    async fn update(&self, _id: &str, _patch: ChorePatch) -> Result<(), RepoError> {
        Ok(())
    }
}

fn parent(family_code: &str) -> Profile {
    Profile::new("Dana", family_code, Role::Parent).unwrap()
}

fn child(name: &str) -> Profile {
    Profile::new(name, "abc12", Role::Child).unwrap()
}

fn doc(id: &str, family_code: &str, title: &str, assigned_to: &str) -> ChoreDocument {
    ChoreDocument::new(id)
        .with(field::FAMILY_CODE, family_code)
        .with(field::TITLE, title)
        .with(field::ASSIGNED_TO, assigned_to)
        .with(field::STATUS, "pending")
}

fn ids(chores: &[Chore]) -> Vec<&str> {
    chores.iter().map(|c| c.id.as_str()).collect()
}

async fn wait_for_view<R: ChoreRepository>(
    engine: &SyncEngine<R>,
    predicate: impl FnMut(&SyncView) -> bool,
) -> SyncView {
    let mut updates = engine.watch();
    let result = timeout(WAIT, updates.wait_for(predicate))
        .await
        .expect("timed out waiting for the engine");
    let view = result.expect("engine dropped").clone();
    view
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

mod state_machine {
    use super::*;

    #[tokio::test]
    async fn starts_idle_without_subscribing() {
        let repo = ScriptedRepository::default();
        let engine = SyncEngine::new(Arc::new(repo.clone()));

        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.chores().is_empty());
        assert!(engine.active_family_code().is_none());
        assert_eq!(repo.opened(), 0);
    }

    #[tokio::test]
    async fn moves_from_subscribing_to_synced_on_first_snapshot() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));

        assert_ok!(engine.set_profile(Some(parent("ABC12"))));
        assert_eq!(engine.state(), SyncState::Subscribing);
        assert!(engine.view().is_loading());
        assert_eq!(engine.active_family_code(), Some("abc12"));

        let sender = repo.sender(0);
        assert!(
            sender
                .send(SnapshotEvent::Snapshot(vec![
                    doc("b", "abc12", "Trash", "Alex"),
                    doc("a", "abc12", "Dishes", "Sam"),
                ]))
                .await
        );

        let view = wait_for_view(&engine, |v| v.state == SyncState::Synced).await;
        assert_eq!(ids(&view.chores), vec!["b", "a"]);
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn each_snapshot_replaces_the_list() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();
        let sender = repo.sender(0);

        sender
            .send(SnapshotEvent::Snapshot(vec![doc("a", "abc12", "Dishes", "Sam")]))
            .await;
        wait_for_view(&engine, |v| ids(&v.chores) == vec!["a"]).await;

        sender
            .send(SnapshotEvent::Snapshot(vec![doc("c", "abc12", "Laundry", "Sam")]))
            .await;
        let view = wait_for_view(&engine, |v| ids(&v.chores) == vec!["c"]).await;
        assert_eq!(view.state, SyncState::Synced);

        sender.send(SnapshotEvent::Snapshot(vec![])).await;
        let view = wait_for_view(&engine, |v| v.chores.is_empty()).await;
        assert_eq!(view.state, SyncState::Synced);
    }

    #[tokio::test]
    async fn stream_error_keeps_last_list() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();
        let sender = repo.sender(0);

        sender
            .send(SnapshotEvent::Snapshot(vec![doc("a", "abc12", "Dishes", "Sam")]))
            .await;
        wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

        sender
            .send(SnapshotEvent::Error("network unreachable".to_string()))
            .await;
        let view = wait_for_view(&engine, |v| matches!(v.state, SyncState::Error(_))).await;

        assert_eq!(view.state, SyncState::Error("network unreachable".to_string()));
        assert_eq!(ids(&view.chores), vec!["a"]);
    }

    #[tokio::test]
    async fn error_before_first_snapshot_leaves_list_empty() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();

        repo.sender(0)
            .send(SnapshotEvent::Error("permission denied".to_string()))
            .await;
        let view = wait_for_view(&engine, |v| matches!(v.state, SyncState::Error(_))).await;
        assert!(view.chores.is_empty());
    }

    #[tokio::test]
    async fn ended_stream_is_reported_as_error() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();

        repo.sender(0)
            .send(SnapshotEvent::Snapshot(vec![doc("a", "abc12", "Dishes", "Sam")]))
            .await;
        wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

        repo.end(0);
        let view = wait_for_view(&engine, |v| matches!(v.state, SyncState::Error(_))).await;
        assert_eq!(ids(&view.chores), vec!["a"]);
    }

    #[tokio::test]
    async fn refused_subscription_surfaces_as_error() {
        let repo = ScriptedRepository::refusing();
        let mut engine = SyncEngine::new(Arc::new(repo));

        assert_err!(engine.set_profile(Some(parent("abc12"))));
        assert!(matches!(engine.state(), SyncState::Error(_)));
        assert!(engine.active_family_code().is_none());
    }

    #[tokio::test]
    async fn settled_waits_for_the_first_delivery() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();

        let sender = repo.sender(0);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender
                .send(SnapshotEvent::Snapshot(vec![doc("a", "abc12", "Dishes", "Sam")]))
                .await;
        });

        let view = timeout(WAIT, engine.settled()).await.expect("never settled");
        assert_eq!(view.state, SyncState::Synced);
        assert_eq!(ids(&view.chores), vec!["a"]);
    }
}

mod profile_changes {
    use super::*;

    #[tokio::test]
    async fn switching_family_releases_the_old_subscription() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));

        engine.set_profile(Some(parent("abc12"))).unwrap();
        engine.set_profile(Some(parent("zzz99"))).unwrap();

        assert_eq!(repo.opened(), 2);
        assert_eq!(engine.active_family_code(), Some("zzz99"));
        wait_until(|| repo.live() == 1).await;
        assert!(repo.sender(0).is_closed());
        assert!(!repo.sender(1).is_closed());
    }

    #[tokio::test]
    async fn deliveries_from_the_old_subscription_are_never_applied() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));

        engine.set_profile(Some(parent("abc12"))).unwrap();
        let stale = repo.sender(0);
        // Buffered but not yet pumped when the profile changes.
        stale
            .send(SnapshotEvent::Snapshot(vec![doc("old", "abc12", "Dishes", "Sam")]))
            .await;

        engine.set_profile(Some(parent("zzz99"))).unwrap();
        assert_eq!(engine.state(), SyncState::Subscribing);
        assert!(engine.chores().is_empty());

        repo.sender(1)
            .send(SnapshotEvent::Snapshot(vec![doc("new", "zzz99", "Mow", "Kim")]))
            .await;
        let view = wait_for_view(&engine, |v| v.state == SyncState::Synced).await;
        assert_eq!(ids(&view.chores), vec!["new"]);

        wait_until(|| stale.is_closed()).await;
        assert!(
            !stale
                .send(SnapshotEvent::Snapshot(vec![doc("late", "abc12", "Dishes", "Sam")]))
                .await
        );
        assert_eq!(ids(&engine.chores()), vec!["new"]);
    }

    #[tokio::test]
    async fn clearing_the_profile_returns_to_idle() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();
        repo.sender(0)
            .send(SnapshotEvent::Snapshot(vec![doc("a", "abc12", "Dishes", "Sam")]))
            .await;
        wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

        engine.set_profile(None).unwrap();

        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.chores().is_empty());
        assert!(engine.view().profile.is_none());
        wait_until(|| repo.live() == 0).await;
    }

    #[tokio::test]
    async fn setting_the_same_profile_again_recovers_from_error() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();
        repo.sender(0)
            .send(SnapshotEvent::Error("offline".to_string()))
            .await;
        wait_for_view(&engine, |v| matches!(v.state, SyncState::Error(_))).await;

        engine.set_profile(Some(parent("abc12"))).unwrap();
        assert_eq!(repo.opened(), 2);
        assert_eq!(engine.state(), SyncState::Subscribing);

        repo.sender(1)
            .send(SnapshotEvent::Snapshot(vec![doc("a", "abc12", "Dishes", "Sam")]))
            .await;
        let view = wait_for_view(&engine, |v| v.state == SyncState::Synced).await;
        assert_eq!(ids(&view.chores), vec!["a"]);
    }

    #[tokio::test]
    async fn dropping_the_engine_releases_its_subscription() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();

        drop(engine);
        wait_until(|| repo.live() == 0).await;
    }
}

mod scoping_and_visibility {
    use super::*;

    #[tokio::test]
    async fn records_of_another_family_are_dropped() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();

        repo.sender(0)
            .send(SnapshotEvent::Snapshot(vec![
                doc("a", "abc12", "Dishes", "Sam"),
                doc("x", "zzz99", "Mow", "Kim"),
            ]))
            .await;

        let view = wait_for_view(&engine, |v| v.state == SyncState::Synced).await;
        assert_eq!(ids(&view.chores), vec!["a"]);
    }

    #[tokio::test]
    async fn children_see_chores_assigned_to_their_name() {
        let repo = ScriptedRepository::default();
        let snapshot = vec![
            doc("a", "abc12", "Dishes", "Sam"),
            doc("b", "abc12", "Trash", "Alex"),
            doc("c", "abc12", "Laundry", "  SAM "),
        ];

        for (name, expected) in [
            ("Sam", vec!["a", "c"]),
            ("sam", vec!["a", "c"]),
            ("alex", vec!["b"]),
            ("Jo", vec![]),
        ] {
            let mut engine = SyncEngine::new(Arc::new(repo.clone()));
            engine.set_profile(Some(child(name))).unwrap();
            repo.sender(repo.opened() - 1)
                .send(SnapshotEvent::Snapshot(snapshot.clone()))
                .await;
            wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

            assert_eq!(ids(&engine.visible_chores()), expected, "child {name}");
            assert_eq!(engine.chores().len(), 3);
        }
    }

    #[tokio::test]
    async fn parents_see_every_chore_of_the_family() {
        let repo = ScriptedRepository::default();
        let mut engine = SyncEngine::new(Arc::new(repo.clone()));
        engine.set_profile(Some(parent("abc12"))).unwrap();
        repo.sender(0)
            .send(SnapshotEvent::Snapshot(vec![
                doc("a", "abc12", "Dishes", "Sam"),
                doc("b", "abc12", "Trash", "Alex"),
            ]))
            .await;
        wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

        assert_eq!(ids(&engine.visible_chores()), vec!["a", "b"]);
    }
}

mod with_sqlite {
    use super::*;

    fn repository() -> SqliteChoreRepository {
        let db = Database::open_memory().expect("Failed to create database");
        db.migrate().expect("Failed to migrate");
        SqliteChoreRepository::new(db)
    }

    #[tokio::test]
    async fn created_chores_reach_every_subscribed_member() {
        let repo = Arc::new(repository());
        let mut parent_engine = SyncEngine::new(Arc::clone(&repo));
        let mut sam_engine = SyncEngine::new(Arc::clone(&repo));
        let mut alex_engine = SyncEngine::new(Arc::clone(&repo));

        parent_engine.set_profile(Some(parent("abc12"))).unwrap();
        sam_engine.set_profile(Some(child("Sam"))).unwrap();
        alex_engine.set_profile(Some(child("alex"))).unwrap();
        wait_for_view(&parent_engine, |v| v.state == SyncState::Synced).await;

        let created = assert_ok!(
            repo.create(CreateChoreInput::new("Dishes", "Sam", "abc12"))
                .await
        );
        assert_eq!(created.status, ChoreStatus::Pending);
        assert!(created.photo_url.is_none());

        let view = wait_for_view(&sam_engine, |v| v.chores.len() == 1).await;
        assert_eq!(ids(&view.visible()), vec![created.id.as_str()]);
        wait_for_view(&parent_engine, |v| v.chores.len() == 1).await;
        wait_for_view(&alex_engine, |v| v.chores.len() == 1).await;
        assert!(alex_engine.visible_chores().is_empty());
    }

    #[tokio::test]
    async fn updates_are_delivered_as_fresh_snapshots() {
        let repo = Arc::new(repository());
        let mut engine = SyncEngine::new(Arc::clone(&repo));
        engine.set_profile(Some(child("Sam"))).unwrap();
        wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

        let chore = repo
            .create(CreateChoreInput::new("Dishes", "Sam", "abc12"))
            .await
            .unwrap();
        wait_for_view(&engine, |v| v.chores.len() == 1).await;

        repo.update(
            &chore.id,
            ChorePatch::completion("http://proofs/p", "Sam", chrono::Utc::now()),
        )
        .await
        .unwrap();

        let view = wait_for_view(&engine, |v| {
            v.chores.first().is_some_and(|c| c.is_completed())
        })
        .await;
        assert_eq!(view.chores[0].completed_by.as_deref(), Some("Sam"));
        assert_eq!(view.chores[0].photo_url.as_deref(), Some("http://proofs/p"));
    }

    #[tokio::test]
    async fn writes_to_another_family_do_not_disturb_the_list() {
        let repo = Arc::new(repository());
        let mut engine = SyncEngine::new(Arc::clone(&repo));
        engine.set_profile(Some(parent("abc12"))).unwrap();
        wait_for_view(&engine, |v| v.state == SyncState::Synced).await;

        repo.create(CreateChoreInput::new("Mow", "Kim", "zzz99"))
            .await
            .unwrap();
        repo.create(CreateChoreInput::new("Dishes", "Sam", "abc12"))
            .await
            .unwrap();

        let view = wait_for_view(&engine, |v| v.chores.len() == 1).await;
        assert_eq!(view.chores[0].title, "Dishes");
    }

    #[tokio::test]
    async fn updating_a_missing_chore_is_not_found() {
        let repo = repository();
        let result = repo.update("missing", ChorePatch::default()).await;
        assert!(matches!(result, Err(RepoError::NotFound(_))));
    }
}
