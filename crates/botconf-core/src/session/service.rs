use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use super::model::{CloseReason, ConfigKey, GroupInfo, Session, SessionView};
use super::table::SessionTable;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;
use crate::error::{BotconfError, Result};
use crate::merge;
use crate::notifier::{NoopNotifier, SessionNotifier};
use crate::settings::{OptionPath, SchemaRegistry, SettingValue, Settings};
use crate::store::{AuthoritativeEntry, SNAPSHOT_FORMAT_VERSION, SessionStore, StoreSnapshot};
use crate::sync::KeyedLocks;

/// Owns the session table and the authoritative settings of every
/// (bot type, group) pair.
///
/// `SessionService` is responsible for:
/// - Opening, editing, locking, committing and abandoning sessions
/// - Serializing mutations per token and per pair with bounded waits
/// - Persisting every state-changing transition through a [`SessionStore`]
/// - Reporting views and closures to a [`SessionNotifier`]
///
/// In-memory locks are always taken table first, authoritative second. The
/// persist lock, when held, is taken before either of them.
pub struct SessionService {
    registry: Arc<SchemaRegistry>,
    table: RwLock<SessionTable>,
    authoritative: RwLock<HashMap<ConfigKey, Settings>>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn SessionNotifier>,
    clock: Arc<dyn Clock>,
    token_locks: KeyedLocks<String>,
    pair_locks: KeyedLocks<ConfigKey>,
    /// Serializes snapshot-and-save so writes land in order
    persist_lock: Mutex<()>,
    settings: SessionSettings,
}

/// Builder for [`SessionService`]. Opening it loads the persisted store.
pub struct SessionServiceBuilder {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn SessionNotifier>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionServiceBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Loads the store and restores the session table.
    ///
    /// # Errors
    ///
    /// Returns `Config` for out-of-range session settings, and
    /// `StoreCorruption` if the store cannot be loaded or was written by a
    /// newer format.
    pub async fn open(self) -> Result<SessionService> {
        self.settings.validate()?;
        let snapshot = self.store.load().await?;
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(BotconfError::StoreCorruption(format!(
                "store format version {} is newer than supported version {}",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let now = self.clock.now();
        let mut authoritative = HashMap::with_capacity(snapshot.authoritative.len());
        for entry in snapshot.authoritative {
            if self.registry.get(&entry.bot_type).is_err() {
                warn!(bot_type = %entry.bot_type, group_id = entry.group_id, "Keeping settings of unknown bot type");
            }
            authoritative.insert(entry.key(), entry.settings);
        }

        let table = SessionTable::restore(
            snapshot.sessions,
            snapshot.terminal,
            self.settings.terminal_retention_max,
            now,
        );
        info!(
            authoritative = authoritative.len(),
            active_sessions = table.active_len(),
            "Session store loaded"
        );

        Ok(SessionService {
            registry: self.registry,
            table: RwLock::new(table),
            authoritative: RwLock::new(authoritative),
            store: self.store,
            notifier: self.notifier,
            clock: self.clock,
            token_locks: KeyedLocks::new("session"),
            pair_locks: KeyedLocks::new("pair"),
            persist_lock: Mutex::new(()),
            settings: self.settings,
        })
    }
}

impl SessionService {
    /// Starts building a service over `registry` and `store`.
    ///
    /// Defaults to the system clock, a no-op notifier and default session
    /// settings.
    pub fn builder(registry: Arc<SchemaRegistry>, store: Arc<dyn SessionStore>) -> SessionServiceBuilder {
        SessionServiceBuilder {
            registry,
            store,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            settings: SessionSettings::default(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    async fn lock_token(&self, token: &str) -> Result<OwnedMutexGuard<()>> {
        self.token_locks
            .acquire(&token.to_string(), self.settings.lock_timeout())
            .await
    }

    async fn lock_pair(&self, key: &ConfigKey) -> Result<OwnedMutexGuard<()>> {
        self.pair_locks.acquire(key, self.settings.lock_timeout()).await
    }

    // ============================================================================
    // Session lifecycle
    // ============================================================================

    /// Opens a session on (`bot_type`, `group.group_id`).
    ///
    /// A live session for the pair whose TTL already elapsed is expired first.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the bot type has no schema
    /// - `AlreadyEditing` if another live session holds the pair
    /// - `Contention` if the pair lock could not be acquired in time
    pub async fn begin_session(
        &self,
        bot_type: &str,
        group: GroupInfo,
        requester_id: i64,
    ) -> Result<SessionView> {
        let schema = self.registry.get(bot_type)?;
        let key = ConfigKey::new(bot_type, group.group_id);
        let _pair = self.lock_pair(&key).await?;

        let ttl = self.settings.ttl();
        let now = self.clock.now();

        let stale = {
            let table = self.table.read().await;
            table
                .token_for(&key)
                .and_then(|token| table.get(token).ok())
                .filter(|session| session.is_expired_at(now, ttl))
                .map(|session| session.token.clone())
        };
        let mut expired = None;
        if let Some(token) = stale {
            let _token = self.lock_token(&token).await?;
            let mut table = self.table.write().await;
            if let Some(mut stale) = table.take_stale(&key, now, ttl) {
                stale.expire(now)?;
                info!(token = %stale.token, key = %key, "Expired stale session before opening a new one");
                expired = Some(stale.token.clone());
                table.retire(stale);
            }
        }

        let view = {
            let mut table = self.table.write().await;
            let authoritative = self.authoritative.read().await;
            let stored = authoritative.get(&key).unwrap_or(schema.defaults());
            let baseline = merge::reconcile(stored, schema.defaults());
            let session = table.create(&key, group, requester_id, baseline, now)?;
            session.view(ttl)
        };
        info!(token = %view.token, key = %key, requester_id, "Session opened");

        self.persist().await?;
        if let Some(token) = expired {
            self.notify_closed(&token, CloseReason::Expired).await;
        }
        self.notify(&view).await;
        Ok(view)
    }

    /// Applies `mutation` to an active session under its token lock, then
    /// persists and notifies.
    async fn mutate<T, F>(&self, token: &str, operation: &'static str, mutation: F) -> Result<(T, SessionView)>
    where
        F: FnOnce(&mut Session, &SchemaRegistry, DateTime<Utc>) -> Result<T>,
    {
        let _token = self.lock_token(token).await?;
        let now = self.clock.now();

        let (output, view) = {
            let mut table = self.table.write().await;
            let session = table.get_active_mut(token, operation)?;
            let output = mutation(session, self.registry.as_ref(), now)?;
            (output, session.view(self.settings.ttl()))
        };

        self.persist().await?;
        self.notify(&view).await;
        Ok((output, view))
    }

    /// Records the transport message presenting this session.
    pub async fn attach_anchor(&self, token: &str, message_id: i64) -> Result<SessionView> {
        let ((), view) = self
            .mutate(token, "attach a message to", |session, _, _| {
                session.attach_anchor(message_id)
            })
            .await?;
        Ok(view)
    }

    /// Sets one option of the working copy.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the session is open
    /// - `UnknownOption` if `path` is not an editable option of the bot type
    /// - `TypeMismatch` if `value` has the wrong kind
    pub async fn apply_edit(&self, token: &str, path: &str, value: SettingValue) -> Result<SessionView> {
        let ((), view) = self
            .mutate(token, "edit", |session, registry, _| {
                let schema = registry.get(&session.bot_type)?;
                let path = parse_option_path(&session.bot_type, path)?;
                session.apply_edit(schema, &path, value)
            })
            .await?;
        debug!(token, path, "Option edited");
        Ok(view)
    }

    /// Parses `raw` against the option's kind and sets it.
    ///
    /// # Errors
    ///
    /// As [`apply_edit`](Self::apply_edit), plus `InvalidValue` if `raw` is
    /// malformed for the option's kind.
    pub async fn apply_raw_edit(&self, token: &str, path: &str, raw: &str) -> Result<SessionView> {
        let (value, view) = self
            .mutate(token, "edit", |session, registry, _| {
                let schema = registry.get(&session.bot_type)?;
                let path = parse_option_path(&session.bot_type, path)?;
                session.apply_raw_edit(schema, &path, raw)
            })
            .await?;
        debug!(token, path, value = %value, "Option edited from raw input");
        Ok(view)
    }

    /// Freezes the working copy. Locking a locked session is a no-op.
    pub async fn lock(&self, token: &str) -> Result<SessionView> {
        let (changed, view) = self
            .mutate(token, "lock", |session, _, now| session.lock(now))
            .await?;
        if changed {
            info!(token, "Session locked");
        }
        Ok(view)
    }

    /// Discards every edit of an open session.
    pub async fn restore_default(&self, token: &str) -> Result<SessionView> {
        let ((), view) = self
            .mutate(token, "restore defaults of", |session, _, _| {
                session.restore_default()
            })
            .await?;
        debug!(token, "Working copy restored to baseline");
        Ok(view)
    }

    /// Writes a locked session's working copy as the new authoritative value.
    ///
    /// The committed state is saved before it is applied in memory. If the
    /// save fails the session stays locked and the authoritative value is
    /// unchanged, so the commit can be retried.
    ///
    /// # Errors
    ///
    /// - `StaleSession` if the TTL elapsed, whether or not the session was
    ///   locked in time
    /// - `InvalidState` unless the session is locked
    /// - `Contention` if the pair or token lock could not be acquired in time
    /// - any store error from saving the committed state
    pub async fn commit(&self, token: &str) -> Result<SessionView> {
        let key = self.table.read().await.get(token)?.key();
        let _pair = self.lock_pair(&key).await?;
        let _token = self.lock_token(token).await?;
        let persist_guard = self.persist_lock.lock().await;

        let ttl = self.settings.ttl();
        let now = self.clock.now();

        let (next, closed, changes, staged) = {
            let table = self.table.read().await;
            let authoritative = self.authoritative.read().await;
            let session = table.get(token)?;
            let next = session.prepare_commit(now, ttl)?;
            let mut closed = session.clone();
            closed.mark_committed(now)?;

            let previous = authoritative.get(&key).unwrap_or(&closed.baseline);
            let changes = merge::diff(previous, &next);

            let mut staged_table = (*table).clone();
            let mut staged_authoritative = (*authoritative).clone();
            apply_commit(
                &mut staged_table,
                &mut staged_authoritative,
                &key,
                next.clone(),
                closed.clone(),
            );
            let staged = snapshot_of(&staged_table, &staged_authoritative);
            (next, closed, changes, staged)
        };

        self.store.save(&staged).await.inspect_err(|e| {
            error!(token, key = %key, error = %e, "Failed to persist commit, session stays locked");
        })?;

        let view = closed.view(ttl);
        {
            let mut table = self.table.write().await;
            let mut authoritative = self.authoritative.write().await;
            apply_commit(&mut table, &mut authoritative, &key, next, closed);
        }
        drop(persist_guard);

        let summary: Vec<String> = changes
            .iter()
            .map(|change| match (&change.before, &change.after) {
                (Some(before), Some(after)) => format!("{}: {} -> {}", change.path, before, after),
                _ => change.path.to_string(),
            })
            .collect();
        info!(token, key = %key, changes = ?summary, "Session committed");

        self.notify_closed(token, CloseReason::Committed).await;
        Ok(view)
    }

    /// Closes a session without touching the authoritative value.
    pub async fn abandon(&self, token: &str) -> Result<SessionView> {
        let _token = self.lock_token(token).await?;
        let now = self.clock.now();

        let view = {
            let mut table = self.table.write().await;
            table.get_active_mut(token, "abandon")?.abandon(now)?;
            let session = table
                .remove(token)
                .ok_or_else(|| BotconfError::internal(format!("session {} vanished while abandoning", token)))?;
            let view = session.view(self.settings.ttl());
            table.retire(session);
            view
        };
        info!(token, "Session abandoned");

        self.persist().await?;
        self.notify_closed(token, CloseReason::Abandoned).await;
        Ok(view)
    }

    // ============================================================================
    // Queries
    // ============================================================================

    /// View of an active session or a retained terminal record.
    pub async fn get_view(&self, token: &str) -> Result<SessionView> {
        let table = self.table.read().await;
        Ok(table.get(token)?.view(self.settings.ttl()))
    }

    /// Views of every active session, oldest first.
    pub async fn list_active(&self) -> Vec<SessionView> {
        let ttl = self.settings.ttl();
        self.table
            .read()
            .await
            .list_active()
            .iter()
            .map(|session| session.view(ttl))
            .collect()
    }

    /// Authoritative settings of a pair, reconciled with the schema. Pairs
    /// never committed yield the defaults.
    pub async fn authoritative(&self, bot_type: &str, group_id: i64) -> Result<Settings> {
        let schema = self.registry.get(bot_type)?;
        let key = ConfigKey::new(bot_type, group_id);
        let authoritative = self.authoritative.read().await;
        let stored = authoritative.get(&key).unwrap_or(schema.defaults());
        Ok(merge::reconcile(stored, schema.defaults()))
    }

    /// Settings in effect for a pair: the live working copy while a session
    /// is open, otherwise the authoritative value.
    pub async fn effective(&self, bot_type: &str, group_id: i64) -> Result<Settings> {
        let schema = self.registry.get(bot_type)?;
        let key = ConfigKey::new(bot_type, group_id);

        let table = self.table.read().await;
        let live = match table.token_for(&key) {
            Some(token) => Some(table.get(token)?),
            None => None,
        };
        let authoritative = self.authoritative.read().await;
        let stored = authoritative.get(&key).unwrap_or(schema.defaults());
        let reconciled = merge::reconcile(stored, schema.defaults());
        Ok(merge::effective(&reconciled, live).clone())
    }

    // ============================================================================
    // Scheduled duties
    // ============================================================================

    /// Expires every active session past its TTL and evicts terminal records
    /// past retention.
    ///
    /// Sessions whose token lock is busy are left for the next sweep.
    /// Returns the tokens expired.
    pub async fn expire_stale(&self) -> Result<Vec<String>> {
        let ttl = self.settings.ttl();
        let now = self.clock.now();
        let candidates = self.table.read().await.expired_tokens(now, ttl);

        let mut expired = Vec::new();
        for token in candidates {
            let _guard = match self.lock_token(&token).await {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(token = %token, error = %e, "Skipping busy session in expiry sweep");
                    continue;
                }
            };

            let mut table = self.table.write().await;
            let still_stale = table
                .get_active_mut(&token, "expire")
                .map(|session| session.is_expired_at(now, ttl))
                .unwrap_or(false);
            if !still_stale {
                continue;
            }
            if let Some(mut session) = table.remove(&token) {
                session.expire(now)?;
                info!(token = %token, key = %session.key(), "Session expired");
                table.retire(session);
                expired.push(token);
            }
        }

        let evicted = self
            .table
            .write()
            .await
            .evict_terminal(now, self.settings.terminal_retention());
        let idle = self.settings.terminal_retention().to_std().unwrap_or_default();
        self.token_locks.cleanup_stale(idle);
        self.pair_locks.cleanup_stale(idle);

        if expired.is_empty() && evicted == 0 {
            return Ok(expired);
        }
        debug!(expired = expired.len(), evicted, "Expiry sweep finished");

        self.persist().await?;
        for token in &expired {
            self.notify_closed(token, CloseReason::Expired).await;
        }
        Ok(expired)
    }

    /// Zeroes the reset fields of every authoritative entry, and of the live
    /// session of each pair, then persists once.
    ///
    /// Reset is idempotent: pairs whose lock is busy are skipped and reported
    /// through a `Contention` error after the rest were reset and persisted,
    /// so the caller may simply run it again.
    pub async fn reset_all(&self) -> Result<usize> {
        let keys: BTreeSet<ConfigKey> = {
            let table = self.table.read().await;
            let authoritative = self.authoritative.read().await;
            table
                .list_active()
                .iter()
                .map(Session::key)
                .chain(authoritative.keys().cloned())
                .collect()
        };

        let ttl = self.settings.ttl();
        let mut reset = 0;
        let mut skipped = Vec::new();
        let mut patched = Vec::new();

        for key in keys {
            let Ok(schema) = self.registry.get(&key.bot_type) else {
                warn!(key = %key, "No schema for stored settings, skipping reset");
                continue;
            };
            if schema.reset_fields().is_empty() {
                continue;
            }
            let _pair = match self.lock_pair(&key).await {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping busy pair in reset");
                    skipped.push(key);
                    continue;
                }
            };

            let mut table = self.table.write().await;
            let mut authoritative = self.authoritative.write().await;
            if let Some(current) = authoritative.get_mut(&key) {
                let reconciled = merge::reconcile(current, schema.defaults());
                *current = merge::compute_reset(&reconciled, schema.reset_fields());
                reset += 1;
            }
            if let Some(token) = table.token_for(&key).map(str::to_string) {
                let session = table.get_active_mut(&token, "reset")?;
                session.apply_reset(schema.reset_fields());
                patched.push(session.view(ttl));
            }
        }

        info!(reset, live_sessions = patched.len(), skipped = skipped.len(), "Periodic reset applied");
        self.persist().await?;
        for view in &patched {
            self.notify(view).await;
        }

        if let Some(first) = skipped.first() {
            return Err(BotconfError::contention(
                format!("pair {} and {} more during reset", first, skipped.len() - 1),
                self.settings.lock_timeout_ms,
            ));
        }
        Ok(reset)
    }

    /// Copies the current snapshot to the backup file.
    pub async fn backup(&self) -> Result<()> {
        let snapshot = {
            let _guard = self.persist_lock.lock().await;
            self.snapshot().await
        };
        self.store.backup(&snapshot).await?;
        info!(
            authoritative = snapshot.authoritative.len(),
            sessions = snapshot.sessions.len(),
            "Store backed up"
        );
        Ok(())
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    /// Current state as a persistable snapshot.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let table = self.table.read().await;
        let authoritative = self.authoritative.read().await;
        snapshot_of(&table, &authoritative)
    }

    /// Writes the current snapshot to the live store file.
    ///
    /// A failed write leaves the in-memory transition in place; the error is
    /// returned so the caller can report it, and the next write retries.
    /// [`commit`](Self::commit) does not go through here: it saves first.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;
        self.store.save(&snapshot).await.inspect_err(|e| {
            error!(error = %e, "Failed to persist session store");
        })
    }

    /// Final flush before the process exits.
    pub async fn shutdown(&self) -> Result<()> {
        self.persist().await?;
        info!("Session service shut down");
        Ok(())
    }

    // ============================================================================
    // Notifications
    // ============================================================================

    async fn notify(&self, view: &SessionView) {
        if let Err(e) = self.notifier.notify(view).await {
            warn!(token = %view.token, error = %e, "Notifier failed to render session");
        }
    }

    async fn notify_closed(&self, token: &str, reason: CloseReason) {
        if let Err(e) = self.notifier.notify_closed(token, reason).await {
            warn!(token, reason = %reason, error = %e, "Notifier failed to report closed session");
        }
    }
}

/// Moves a committed session out of the active index and installs its
/// settings as the authoritative value of `key`.
fn apply_commit(
    table: &mut SessionTable,
    authoritative: &mut HashMap<ConfigKey, Settings>,
    key: &ConfigKey,
    settings: Settings,
    closed: Session,
) {
    authoritative.insert(key.clone(), settings);
    table.remove(&closed.token);
    table.retire(closed);
}

fn snapshot_of(table: &SessionTable, authoritative: &HashMap<ConfigKey, Settings>) -> StoreSnapshot {
    let mut entries: Vec<AuthoritativeEntry> = authoritative
        .iter()
        .map(|(key, settings)| AuthoritativeEntry {
            bot_type: key.bot_type.clone(),
            group_id: key.group_id,
            settings: settings.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.key().cmp(&b.key()));

    let (sessions, terminal) = table.snapshot();
    StoreSnapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        authoritative: entries,
        sessions,
        terminal,
    }
}

fn parse_option_path(bot_type: &str, raw: &str) -> Result<OptionPath> {
    raw.parse()
        .map_err(|_| BotconfError::unknown_option(bot_type, raw))
}
