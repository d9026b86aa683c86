//! Interface to the transport adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::session::{CloseReason, SessionView};

/// Liveness status reported by the scheduler's heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    /// Sent once at startup
    Online,
    /// Sent on every heartbeat tick
    Awake,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotStatus::Online => f.write_str("online"),
            BotStatus::Awake => f.write_str("awake"),
        }
    }
}

/// Receives session events for rendering.
///
/// The core never retries a failed notification; implementations own their
/// retry and backoff. Errors are logged and do not undo the transition.
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    /// Render or update the interactive view of a session.
    async fn notify(&self, view: &SessionView) -> Result<()>;

    /// A session left the active index.
    async fn notify_closed(&self, token: &str, reason: CloseReason) -> Result<()>;

    async fn heartbeat(&self, _status: BotStatus) -> Result<()> {
        Ok(())
    }
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl SessionNotifier for NoopNotifier {
    async fn notify(&self, _view: &SessionView) -> Result<()> {
        Ok(())
    }

    async fn notify_closed(&self, _token: &str, _reason: CloseReason) -> Result<()> {
        Ok(())
    }
}
