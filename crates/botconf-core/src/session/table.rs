//! In-memory index of active and recently closed sessions.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::model::{ConfigKey, GroupInfo, Session};
use crate::error::{BotconfError, Result};
use crate::settings::Settings;

/// Sessions keyed by token, with a secondary index by (bot type, group).
///
/// Terminal sessions leave the active index and are kept in a bounded audit
/// log until evicted.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    active: HashMap<String, Session>,
    by_key: HashMap<ConfigKey, String>,
    terminal: VecDeque<Session>,
    terminal_max: usize,
}

impl SessionTable {
    pub fn new(terminal_max: usize) -> Self {
        Self {
            terminal_max,
            ..Self::default()
        }
    }

    /// Rebuilds a table from persisted records.
    ///
    /// A second live record for an already indexed pair is retired as expired.
    pub fn restore(
        sessions: Vec<Session>,
        terminal: Vec<Session>,
        terminal_max: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let mut table = Self::new(terminal_max);
        for session in terminal {
            table.retire(session);
        }

        let mut sessions = sessions;
        sessions.sort_by_key(|s| s.created_at);
        for mut session in sessions {
            if session.state.is_terminal() {
                table.retire(session);
                continue;
            }
            if table.by_key.contains_key(&session.key()) {
                tracing::warn!(
                    token = %session.token,
                    key = %session.key(),
                    "Duplicate live session in store, retiring it as expired"
                );
                if session.expire(now).is_ok() {
                    table.retire(session);
                }
                continue;
            }
            table.by_key.insert(session.key(), session.token.clone());
            table.active.insert(session.token.clone(), session);
        }
        table
    }

    /// Opens a session for `key`, failing if one is already active.
    pub fn create(
        &mut self,
        key: &ConfigKey,
        group: GroupInfo,
        requester_id: i64,
        baseline: Settings,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if let Some(token) = self.by_key.get(key) {
            return Err(BotconfError::AlreadyEditing {
                bot_type: key.bot_type.clone(),
                group_id: key.group_id,
                token: token.clone(),
            });
        }

        let token = self.fresh_token();
        let session = Session::open(
            token.clone(),
            key.bot_type.clone(),
            group,
            requester_id,
            baseline,
            now,
        );
        self.by_key.insert(key.clone(), token.clone());
        self.active.insert(token, session.clone());
        Ok(session)
    }

    fn fresh_token(&self) -> String {
        loop {
            let token = Uuid::new_v4().simple().to_string();
            if !self.active.contains_key(&token) && !self.terminal.iter().any(|s| s.token == token)
            {
                return token;
            }
        }
    }

    /// Active session or retained terminal record.
    pub fn get(&self, token: &str) -> Result<&Session> {
        self.active
            .get(token)
            .or_else(|| self.terminal.iter().rev().find(|s| s.token == token))
            .ok_or_else(|| BotconfError::not_found("session", token))
    }

    /// Mutable access to an active session.
    ///
    /// A retained terminal record yields `InvalidState` for `operation`.
    pub fn get_active_mut(&mut self, token: &str, operation: &'static str) -> Result<&mut Session> {
        if !self.active.contains_key(token) {
            let session = self.get(token)?;
            return Err(BotconfError::InvalidState {
                token: token.to_string(),
                state: session.state,
                operation,
            });
        }
        self.active
            .get_mut(token)
            .ok_or_else(|| BotconfError::not_found("session", token))
    }

    /// Token of the active session for `key`, if any.
    pub fn token_for(&self, key: &ConfigKey) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    /// Active sessions, oldest first.
    pub fn list_active(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.active.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Removes a session from the active index.
    pub fn remove(&mut self, token: &str) -> Option<Session> {
        let session = self.active.remove(token)?;
        self.by_key.remove(&session.key());
        Some(session)
    }

    /// Keeps a closed session for audit, dropping the oldest beyond capacity.
    pub fn retire(&mut self, session: Session) {
        self.terminal.push_back(session);
        while self.terminal.len() > self.terminal_max {
            self.terminal.pop_front();
        }
    }

    /// Removes the active session for `key` if its TTL has elapsed.
    pub fn take_stale(&mut self, key: &ConfigKey, now: DateTime<Utc>, ttl: Duration) -> Option<Session> {
        let token = self.by_key.get(key)?;
        let stale = self.active.get(token)?.is_expired_at(now, ttl);
        if !stale {
            return None;
        }
        let token = token.clone();
        self.remove(&token)
    }

    /// Tokens of active sessions past their TTL.
    pub fn expired_tokens(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        self.active
            .values()
            .filter(|s| s.is_expired_at(now, ttl))
            .map(|s| s.token.clone())
            .collect()
    }

    /// Drops terminal records closed more than `retention` ago.
    pub fn evict_terminal(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.terminal.len();
        self.terminal
            .retain(|s| s.closed_at.map(|closed| now - closed <= retention).unwrap_or(false));
        before - self.terminal.len()
    }

    /// Active and terminal records for persistence.
    pub fn snapshot(&self) -> (Vec<Session>, Vec<Session>) {
        (self.list_active(), self.terminal.iter().cloned().collect())
    }
}
