//! Legal transitions of a single session.
//!
//! ```text
//! Open ──lock──▶ Locked ──commit──▶ Committed
//!   │              │
//!   ├──abandon─────┼──▶ Abandoned
//!   └──expire──────┴──▶ Expired
//! ```
//!
//! Every method either applies its transition completely or returns an error
//! and leaves the session untouched.

use chrono::{DateTime, Duration, Utc};

use super::model::{GroupInfo, Session, SessionState};
use crate::error::{BotconfError, Result};
use crate::merge;
use crate::settings::{BotSchema, OptionPath, SettingValue, Settings, SettingsExt};

impl Session {
    /// A fresh `Open` session whose working copy starts as the baseline.
    pub fn open(
        token: String,
        bot_type: impl Into<String>,
        group: GroupInfo,
        requester_id: i64,
        baseline: Settings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            bot_type: bot_type.into(),
            group_id: group.group_id,
            group_name: group.group_name,
            group_link: group.group_link,
            requester_id,
            anchor_message_id: None,
            created_at: now,
            locked_at: None,
            closed_at: None,
            committed: false,
            state: SessionState::Open,
            working_copy: baseline.clone(),
            baseline,
        }
    }

    fn ensure_state(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BotconfError::InvalidState {
                token: self.token.clone(),
                state: self.state,
                operation,
            })
        }
    }

    /// Sets one leaf option of the working copy.
    pub fn apply_edit(
        &mut self,
        schema: &BotSchema,
        path: &OptionPath,
        value: SettingValue,
    ) -> Result<()> {
        self.ensure_state(&[SessionState::Open], "edit")?;

        let expected = schema.leaf_kind(path)?;
        if value.kind() != expected {
            return Err(BotconfError::TypeMismatch {
                path: path.to_string(),
                expected,
                found: value.kind(),
            });
        }

        let slot = self
            .working_copy
            .get_path_mut(path)
            .ok_or_else(|| BotconfError::unknown_option(&self.bot_type, path.to_string()))?;
        *slot = value;
        Ok(())
    }

    /// Parses `raw` against the option's kind, then applies it.
    pub fn apply_raw_edit(
        &mut self,
        schema: &BotSchema,
        path: &OptionPath,
        raw: &str,
    ) -> Result<SettingValue> {
        self.ensure_state(&[SessionState::Open], "edit")?;
        let value = SettingValue::parse_as(schema.leaf_kind(path)?, raw)?;
        self.apply_edit(schema, path, value.clone())?;
        Ok(value)
    }

    /// Moves to `Locked`. Returns false if the session was already locked.
    pub fn lock(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if self.state == SessionState::Locked {
            return Ok(false);
        }
        self.ensure_state(&[SessionState::Open], "lock")?;
        self.state = SessionState::Locked;
        self.locked_at = Some(now);
        Ok(true)
    }

    /// Checks that the session may commit now and returns the new
    /// authoritative value.
    ///
    /// The TTL is checked before the lock state: an expired session is stale
    /// whether or not it was locked in time.
    pub fn prepare_commit(&self, now: DateTime<Utc>, ttl: Duration) -> Result<Settings> {
        self.ensure_state(
            &[SessionState::Open, SessionState::Locked, SessionState::Expired],
            "commit",
        )?;
        if self.state == SessionState::Expired || self.is_expired_at(now, ttl) {
            return Err(BotconfError::StaleSession {
                token: self.token.clone(),
                expired_at: self.expires_at(ttl),
            });
        }
        self.ensure_state(&[SessionState::Locked], "commit")?;
        Ok(merge::merge_commit(&self.working_copy))
    }

    /// Records a successful authoritative write.
    pub fn mark_committed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_state(&[SessionState::Locked], "commit")?;
        self.state = SessionState::Committed;
        self.committed = true;
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_state(&[SessionState::Open, SessionState::Locked], "abandon")?;
        self.state = SessionState::Abandoned;
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_state(&[SessionState::Open, SessionState::Locked], "expire")?;
        self.state = SessionState::Expired;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Discards every edit: the working copy becomes the baseline again.
    pub fn restore_default(&mut self) -> Result<()> {
        self.ensure_state(&[SessionState::Open], "restore defaults of")?;
        self.working_copy = self.baseline.clone();
        Ok(())
    }

    pub fn attach_anchor(&mut self, message_id: i64) -> Result<()> {
        self.ensure_state(&[SessionState::Open, SessionState::Locked], "attach a message to")?;
        self.anchor_message_id = Some(message_id);
        Ok(())
    }

    /// Applies a scheduled reset to both the baseline and the working copy,
    /// so a later commit keeps the reset transient fields.
    pub fn apply_reset(&mut self, reset_fields: &[OptionPath]) {
        self.baseline = merge::compute_reset(&self.baseline, reset_fields);
        self.working_copy = merge::compute_reset(&self.working_copy, reset_fields);
    }
}
