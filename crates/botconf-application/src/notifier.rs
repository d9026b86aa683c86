//! Notifier that writes session events to the log.
//!
//! Stands in for a chat transport when the manager runs headless.

use async_trait::async_trait;
use tracing::info;

use botconf_core::error::{BotconfError, Result};
use botconf_core::notifier::{BotStatus, SessionNotifier};
use botconf_core::session::{CloseReason, SessionView};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl SessionNotifier for LoggingNotifier {
    async fn notify(&self, view: &SessionView) -> Result<()> {
        let rendered = serde_json::to_string(view).map_err(|e| BotconfError::Serialization {
            format: "JSON".to_string(),
            message: e.to_string(),
        })?;
        info!(token = %view.token, state = %view.state, view = %rendered, "Session view");
        Ok(())
    }

    async fn notify_closed(&self, token: &str, reason: CloseReason) -> Result<()> {
        info!(token, reason = %reason, "Session closed");
        Ok(())
    }

    async fn heartbeat(&self, status: BotStatus) -> Result<()> {
        info!(status = %status, "Heartbeat");
        Ok(())
    }
}
