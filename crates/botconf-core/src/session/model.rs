//! Session domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::merge;
use crate::settings::{OptionPath, Settings};

/// Identity of one authoritative settings entry: a bot type in a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigKey {
    pub bot_type: String,
    pub group_id: i64,
}

impl ConfigKey {
    pub fn new(bot_type: impl Into<String>, group_id: i64) -> Self {
        Self {
            bot_type: bot_type.into(),
            group_id,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bot_type, self.group_id)
    }
}

/// Display metadata of the target group, captured when a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: i64,
    pub group_name: String,
    pub group_link: String,
}

impl GroupInfo {
    pub fn new(group_id: i64, group_name: impl Into<String>, group_link: impl Into<String>) -> Self {
        Self {
            group_id,
            group_name: group_name.into(),
            group_link: group_link.into(),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Locked,
    Committed,
    Expired,
    Abandoned,
}

impl SessionState {
    /// Open or locked: the session still holds its pair.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Open | SessionState::Locked)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Open => "open",
            SessionState::Locked => "locked",
            SessionState::Committed => "committed",
            SessionState::Expired => "expired",
            SessionState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Why a session left the active index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Committed,
    Expired,
    Abandoned,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseReason::Committed => "committed",
            CloseReason::Expired => "expired",
            CloseReason::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// One bounded, single-writer edit transaction against one bot type's
/// settings for one group.
///
/// Settings objects come last so the record serializes as a valid TOML table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique handle (UUID v4, simple form)
    pub token: String,
    pub bot_type: String,
    pub group_id: i64,
    pub group_name: String,
    pub group_link: String,
    /// User who opened the session (audit only)
    pub requester_id: i64,
    /// Message presenting this session, owned by the transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub committed: bool,
    pub state: SessionState,
    pub working_copy: Settings,
    /// Authoritative value at creation time; never mutated by edits
    pub baseline: Settings,
}

impl Session {
    pub fn key(&self) -> ConfigKey {
        ConfigKey::new(self.bot_type.clone(), self.group_id)
    }

    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True once more than `ttl` has passed since creation.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }

    /// Option paths whose working value differs from the baseline.
    pub fn changed_paths(&self) -> Vec<OptionPath> {
        merge::diff(&self.baseline, &self.working_copy)
            .into_iter()
            .map(|change| change.path)
            .collect()
    }

    /// Transport-agnostic snapshot of this session.
    pub fn view(&self, ttl: Duration) -> SessionView {
        SessionView {
            token: self.token.clone(),
            bot_type: self.bot_type.clone(),
            group_id: self.group_id,
            group_name: self.group_name.clone(),
            group_link: self.group_link.clone(),
            anchor_message_id: self.anchor_message_id,
            state: self.state,
            created_at: self.created_at,
            locked_at: self.locked_at,
            expires_at: self.expires_at(ttl),
            changed: self.changed_paths(),
            working_copy: self.working_copy.clone(),
        }
    }
}

/// What the transport renders for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub token: String,
    pub bot_type: String,
    pub group_id: i64,
    pub group_name: String,
    pub group_link: String,
    pub anchor_message_id: Option<i64>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub changed: Vec<OptionPath>,
    pub working_copy: Settings,
}
