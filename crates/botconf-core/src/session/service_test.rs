#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::error::{BotconfError, Result};
    use crate::notifier::SessionNotifier;
    use crate::session::{CloseReason, GroupInfo, SessionService, SessionState, SessionView};
    use crate::settings::{SchemaRegistry, SettingValue, SettingsExt};
    use crate::store::{SessionStore, StoreSnapshot};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    // Mock SessionStore for testing
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Option<StoreSnapshot>>,
        backups: Mutex<Vec<StoreSnapshot>>,
        saves: AtomicUsize,
        fail_saves: AtomicBool,
        hold_saves: AtomicBool,
        release: Notify,
    }

    impl MemoryStore {
        fn saved(&self) -> StoreSnapshot {
            self.saved.lock().unwrap().clone().unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl SessionStore for MemoryStore {
        async fn load(&self) -> Result<StoreSnapshot> {
            Ok(self.saved())
        }

        async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.hold_saves.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(BotconfError::io("disk full"));
            }
            *self.saved.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }

        async fn backup(&self, snapshot: &StoreSnapshot) -> Result<()> {
            self.backups.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        View(String, SessionState),
        Closed(String, CloseReason),
    }

    // Mock SessionNotifier recording every event
    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<Event>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl SessionNotifier for RecordingNotifier {
        async fn notify(&self, view: &SessionView) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(Event::View(view.token.clone(), view.state));
            if self.fail.load(Ordering::SeqCst) {
                return Err(BotconfError::internal("transport down"));
            }
            Ok(())
        }

        async fn notify_closed(&self, token: &str, reason: CloseReason) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(Event::Closed(token.to_string(), reason));
            Ok(())
        }
    }

    const GROUP: i64 = -100123;

    struct Fixture {
        service: Arc<SessionService>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        clock: ManualClock,
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStore::default())).await
    }

    async fn fixture_with(store: Arc<MemoryStore>) -> Fixture {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let service = SessionService::builder(Arc::new(SchemaRegistry::with_builtin()), store.clone())
            .notifier(notifier.clone())
            .clock(Arc::new(clock.clone()))
            .open()
            .await
            .unwrap();
        Fixture {
            service: Arc::new(service),
            store,
            notifier,
            clock,
        }
    }

    fn group() -> GroupInfo {
        GroupInfo::new(GROUP, "Test Group", "https://t.me/testgroup")
    }

    #[tokio::test]
    async fn test_edit_lock_commit_changes_only_the_edited_option() {
        let f = fixture().await;
        let before = f.service.authoritative("warn", GROUP).await.unwrap();
        assert_eq!(before["limit"], SettingValue::Int(3));

        let view = f.service.begin_session("warn", group(), 42).await.unwrap();
        assert_eq!(view.state, SessionState::Open);

        let view = f
            .service
            .apply_edit(&view.token, "limit", SettingValue::Int(5))
            .await
            .unwrap();
        assert_eq!(view.changed.len(), 1);
        assert_eq!(view.changed[0].to_string(), "limit");

        f.service.lock(&view.token).await.unwrap();
        let committed = f.service.commit(&view.token).await.unwrap();
        assert_eq!(committed.state, SessionState::Committed);

        let after = f.service.authoritative("warn", GROUP).await.unwrap();
        assert_eq!(after["limit"], SettingValue::Int(5));
        let mut expected = before.clone();
        expected.insert("limit".into(), SettingValue::Int(5));
        assert_eq!(after, expected);

        assert!(f.service.list_active().await.is_empty());
        assert_eq!(
            f.service.get_view(&view.token).await.unwrap().state,
            SessionState::Committed
        );
        assert!(
            f.notifier
                .events()
                .contains(&Event::Closed(view.token.clone(), CloseReason::Committed))
        );

        // persisted verbatim
        let saved = f.store.saved();
        assert_eq!(saved.authoritative.len(), 1);
        assert_eq!(saved.authoritative[0].settings, after);
        assert!(saved.sessions.is_empty());
        assert_eq!(saved.terminal.len(), 1);
    }

    #[tokio::test]
    async fn test_single_writer_per_pair() {
        let f = fixture().await;
        let first = f.service.begin_session("warn", group(), 1).await.unwrap();

        let err = f.service.begin_session("warn", group(), 2).await.unwrap_err();
        match err {
            BotconfError::AlreadyEditing { token, group_id, .. } => {
                assert_eq!(token, first.token);
                assert_eq!(group_id, GROUP);
            }
            other => panic!("unexpected error: {other}"),
        }

        f.service.abandon(&first.token).await.unwrap();
        let second = f.service.begin_session("warn", group(), 2).await.unwrap();
        assert_ne!(second.token, first.token);

        // abandoning never touches the authoritative store
        assert!(f.store.saved().authoritative.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_bot_type() {
        let f = fixture().await;
        let err = f.service.begin_session("captcha", group(), 1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_schema_violations_are_reported_without_change() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();

        let err = f
            .service
            .apply_edit(&view.token, "limit", SettingValue::Text("five".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, BotconfError::TypeMismatch { .. }));

        let err = f
            .service
            .apply_raw_edit(&view.token, "limit", "5; drop")
            .await
            .unwrap_err();
        assert!(matches!(err, BotconfError::InvalidValue { .. }));

        let err = f
            .service
            .apply_edit(&view.token, "report..auto", SettingValue::Bool(true))
            .await
            .unwrap_err();
        assert!(err.is_schema_violation());

        let current = f.service.get_view(&view.token).await.unwrap();
        assert!(current.changed.is_empty());
        assert_eq!(
            current.working_copy.leaf_paths(),
            f.service.authoritative("warn", GROUP).await.unwrap().leaf_paths()
        );
    }

    #[tokio::test]
    async fn test_raw_edit_and_restore_default_then_commit_keeps_baseline() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();

        let view = f
            .service
            .apply_raw_edit(&view.token, "report.auto", "true")
            .await
            .unwrap();
        assert_eq!(view.changed[0].to_string(), "report.auto");

        let view = f.service.restore_default(&view.token).await.unwrap();
        assert!(view.changed.is_empty());

        f.service.lock(&view.token).await.unwrap();
        f.service.commit(&view.token).await.unwrap();

        let after = f.service.authoritative("warn", GROUP).await.unwrap();
        assert_eq!(&after, SchemaRegistry::with_builtin().get("warn").unwrap().defaults());
    }

    #[tokio::test]
    async fn test_sweep_expires_uncommitted_session() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service
            .apply_edit(&view.token, "mention", SettingValue::Bool(true))
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(300));
        assert!(f.service.expire_stale().await.unwrap().is_empty());

        f.clock.advance(Duration::seconds(1));
        let expired = f.service.expire_stale().await.unwrap();
        assert_eq!(expired, vec![view.token.clone()]);

        assert!(f.service.list_active().await.is_empty());
        assert_eq!(
            f.service.get_view(&view.token).await.unwrap().state,
            SessionState::Expired
        );
        assert_eq!(
            f.service.authoritative("warn", GROUP).await.unwrap()["mention"],
            SettingValue::Bool(false)
        );
        assert!(
            f.notifier
                .events()
                .contains(&Event::Closed(view.token.clone(), CloseReason::Expired))
        );

        // the expired session can no longer be edited
        let err = f
            .service
            .apply_edit(&view.token, "limit", SettingValue::Int(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotconfError::InvalidState {
                state: SessionState::Expired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_session_locked_in_time_is_stale_after_ttl() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service
            .apply_edit(&view.token, "limit", SettingValue::Int(9))
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(10));
        f.service.lock(&view.token).await.unwrap();

        f.clock.advance(Duration::seconds(291));
        let err = f.service.commit(&view.token).await.unwrap_err();
        assert!(matches!(err, BotconfError::StaleSession { .. }));

        f.service.expire_stale().await.unwrap();
        let err = f.service.commit(&view.token).await.unwrap_err();
        assert!(matches!(err, BotconfError::StaleSession { .. }));
        assert_eq!(
            f.service.authoritative("warn", GROUP).await.unwrap()["limit"],
            SettingValue::Int(3)
        );
    }

    #[tokio::test]
    async fn test_begin_session_replaces_stale_session() {
        let f = fixture().await;
        let old = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.clock.advance(Duration::seconds(301));

        let new = f.service.begin_session("warn", group(), 2).await.unwrap();
        assert_ne!(new.token, old.token);
        assert_eq!(
            f.service.get_view(&old.token).await.unwrap().state,
            SessionState::Expired
        );
        assert_eq!(f.service.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_requires_lock() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        let err = f.service.commit(&view.token).await.unwrap_err();
        assert!(matches!(
            err,
            BotconfError::InvalidState {
                state: SessionState::Open,
                ..
            }
        ));
        assert!(f.service.commit("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_session_commits_at_most_once() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service
            .apply_edit(&view.token, "limit", SettingValue::Int(5))
            .await
            .unwrap();
        f.service.lock(&view.token).await.unwrap();
        f.service.commit(&view.token).await.unwrap();
        let saves = f.store.saves.load(Ordering::SeqCst);

        let err = f.service.commit(&view.token).await.unwrap_err();
        assert!(matches!(
            err,
            BotconfError::InvalidState {
                state: SessionState::Committed,
                ..
            }
        ));
        assert_eq!(f.store.saves.load(Ordering::SeqCst), saves);
        assert_eq!(
            f.service.authoritative("warn", GROUP).await.unwrap()["limit"],
            SettingValue::Int(5)
        );
    }

    #[tokio::test]
    async fn test_effective_follows_live_session() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service
            .apply_edit(&view.token, "limit", SettingValue::Int(7))
            .await
            .unwrap();

        let effective = f.service.effective("warn", GROUP).await.unwrap();
        assert_eq!(effective["limit"], SettingValue::Int(7));

        f.service.abandon(&view.token).await.unwrap();
        let effective = f.service.effective("warn", GROUP).await.unwrap();
        assert_eq!(effective["limit"], SettingValue::Int(3));
    }

    #[tokio::test]
    async fn test_reset_zeroes_transient_fields_and_patches_live_session() {
        let f = fixture().await;

        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service
            .apply_edit(&view.token, "report.auto", SettingValue::Bool(true))
            .await
            .unwrap();
        f.service
            .apply_edit(&view.token, "limit", SettingValue::Int(7))
            .await
            .unwrap();
        f.service.lock(&view.token).await.unwrap();
        f.service.commit(&view.token).await.unwrap();

        // an operator is mid-edit when the reset runs
        let live = f.service.begin_session("warn", group(), 2).await.unwrap();
        f.service
            .apply_edit(&live.token, "mention", SettingValue::Bool(true))
            .await
            .unwrap();

        let reset = f.service.reset_all().await.unwrap();
        assert_eq!(reset, 1);

        let after = f.service.authoritative("warn", GROUP).await.unwrap();
        assert_eq!(after["limit"], SettingValue::Int(7));
        assert_eq!(
            after["report"].as_table().unwrap()["auto"],
            SettingValue::Bool(false)
        );

        f.service.lock(&live.token).await.unwrap();
        f.service.commit(&live.token).await.unwrap();
        let after = f.service.authoritative("warn", GROUP).await.unwrap();
        assert_eq!(after["mention"], SettingValue::Bool(true));
        assert_eq!(
            after["report"].as_table().unwrap()["auto"],
            SettingValue::Bool(false)
        );
    }

    #[tokio::test]
    async fn test_restart_restores_live_sessions() {
        let store = Arc::new(MemoryStore::default());
        let token = {
            let f = fixture_with(store.clone()).await;
            let view = f.service.begin_session("warn", group(), 1).await.unwrap();
            f.service
                .apply_edit(&view.token, "limit", SettingValue::Int(4))
                .await
                .unwrap();
            f.service.shutdown().await.unwrap();
            view.token
        };

        let f = fixture_with(store).await;
        let active = f.service.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token, token);
        assert_eq!(active[0].working_copy["limit"], SettingValue::Int(4));
    }

    #[tokio::test]
    async fn test_backup_copies_current_snapshot() {
        let f = fixture().await;
        f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service.backup().await.unwrap();

        let backups = f.store.backups.lock().unwrap().clone();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_undo_transition() {
        let f = fixture().await;
        f.notifier.fail.store(true, Ordering::SeqCst);

        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        assert_eq!(f.service.list_active().await.len(), 1);
        assert_eq!(f.notifier.events(), vec![Event::View(view.token, SessionState::Open)]);
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();

        f.store.fail_saves.store(true, Ordering::SeqCst);
        let err = f
            .service
            .apply_edit(&view.token, "limit", SettingValue::Int(6))
            .await
            .unwrap_err();
        assert!(matches!(err, BotconfError::Io { .. }));

        // the in-memory edit stands and is written by the next persist
        f.store.fail_saves.store(false, Ordering::SeqCst);
        f.service.persist().await.unwrap();
        assert_eq!(
            f.store.saved().sessions[0].working_copy["limit"],
            SettingValue::Int(6)
        );
    }

    #[tokio::test]
    async fn test_failed_commit_save_keeps_session_locked_for_retry() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        f.service
            .apply_edit(&view.token, "limit", SettingValue::Int(5))
            .await
            .unwrap();
        f.service.lock(&view.token).await.unwrap();

        f.store.fail_saves.store(true, Ordering::SeqCst);
        let err = f.service.commit(&view.token).await.unwrap_err();
        assert!(matches!(err, BotconfError::Io { .. }));

        // nothing changed in memory or on disk
        assert_eq!(
            f.service.authoritative("warn", GROUP).await.unwrap()["limit"],
            SettingValue::Int(3)
        );
        assert_eq!(
            f.service.get_view(&view.token).await.unwrap().state,
            SessionState::Locked
        );
        assert_eq!(f.service.list_active().await.len(), 1);
        assert!(f.store.saved().authoritative.is_empty());
        assert!(
            !f.notifier
                .events()
                .contains(&Event::Closed(view.token.clone(), CloseReason::Committed))
        );

        f.store.fail_saves.store(false, Ordering::SeqCst);
        let committed = f.service.commit(&view.token).await.unwrap();
        assert_eq!(committed.state, SessionState::Committed);
        let saved = f.store.saved();
        assert_eq!(saved.authoritative[0].settings["limit"], SettingValue::Int(5));
        assert!(saved.sessions.is_empty());
        assert!(f.service.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_busy_session_fails_with_contention() {
        let f = fixture().await;
        let view = f.service.begin_session("warn", group(), 1).await.unwrap();
        let saves = f.store.saves.load(Ordering::SeqCst);

        f.store.hold_saves.store(true, Ordering::SeqCst);
        let service = f.service.clone();
        let token = view.token.clone();
        let pending = tokio::spawn(async move {
            service
                .apply_edit(&token, "limit", SettingValue::Int(5))
                .await
        });

        // wait until the first edit holds the token lock inside persist
        for _ in 0..100 {
            if f.store.saves.load(Ordering::SeqCst) > saves {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        f.store.hold_saves.store(false, Ordering::SeqCst);

        let err = f
            .service
            .apply_edit(&view.token, "limit", SettingValue::Int(6))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        f.store.release.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(
            f.service.get_view(&view.token).await.unwrap().working_copy["limit"],
            SettingValue::Int(5)
        );
    }
}
