//! Durable store contract.
//!
//! Defines the persisted snapshot and the repository trait the session
//! service writes through, decoupling the core from the file format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{ConfigKey, Session};
use crate::settings::Settings;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

/// One authoritative settings entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeEntry {
    pub bot_type: String,
    pub group_id: i64,
    pub settings: Settings,
}

impl AuthoritativeEntry {
    pub fn key(&self) -> ConfigKey {
        ConfigKey::new(self.bot_type.clone(), self.group_id)
    }
}

/// Everything the store persists: authoritative settings, live sessions and
/// the terminal-session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub authoritative: Vec<AuthoritativeEntry>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub terminal: Vec<Session>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            authoritative: Vec::new(),
            sessions: Vec::new(),
            terminal: Vec::new(),
        }
    }
}

/// Persistence backend for the session manager.
///
/// # Implementation Notes
///
/// - `save` must be atomic from a reader's point of view.
/// - `load` falls back to the backup copy when the live copy is missing or
///   unreadable, and returns `StoreCorruption` only when both fail.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the last persisted snapshot, or an empty one on first start.
    async fn load(&self) -> Result<StoreSnapshot>;

    /// Replaces the live copy.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// Replaces the backup copy.
    async fn backup(&self, snapshot: &StoreSnapshot) -> Result<()>;
}
