//! Runtime configuration: session limits, scheduler calendar, storage and
//! the bot-type schema registry.
//!
//! Every section is optional in the file; missing values take the defaults
//! below.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BotconfError, Result};
use crate::settings::{BotSchema, OptionPath, SchemaRegistry, Settings};

/// Longest accepted session TTL.
pub const MAX_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted retention of closed sessions.
pub const MAX_RETENTION_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest accepted lock wait, sweep interval and grace window.
pub const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Root of `botconf.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub bots: Vec<BotDefinition>,
}

impl CoreConfig {
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.schedule.validate()?;
        Ok(())
    }

    /// Builds the schema registry. Without any `[[bots]]` entry the built-in
    /// schemas are used.
    pub fn schema_registry(&self) -> Result<SchemaRegistry> {
        if self.bots.is_empty() {
            return Ok(SchemaRegistry::with_builtin());
        }

        let mut registry = SchemaRegistry::new();
        for bot in &self.bots {
            if registry.get(&bot.bot_type).is_ok() {
                return Err(BotconfError::config(format!(
                    "bot type '{}' is defined twice",
                    bot.bot_type
                )));
            }
            registry.register(BotSchema::new(
                bot.bot_type.clone(),
                bot.defaults.clone(),
                bot.reset_fields.clone(),
            )?);
        }
        Ok(registry)
    }
}

/// `[session]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub lock_timeout_ms: u64,
    pub terminal_retention_secs: u64,
    pub terminal_retention_max: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            lock_timeout_ms: 2000,
            terminal_retention_secs: 3600,
            terminal_retention_max: 256,
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self) -> ChronoDuration {
        seconds(self.ttl_secs.min(MAX_TTL_SECS))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn terminal_retention(&self) -> ChronoDuration {
        seconds(self.terminal_retention_secs.min(MAX_RETENTION_SECS))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_range("session.ttl_secs", self.ttl_secs, 1, MAX_TTL_SECS)?;
        check_range(
            "session.lock_timeout_ms",
            self.lock_timeout_ms,
            1,
            MAX_WAIT_SECS * 1000,
        )?;
        check_range(
            "session.terminal_retention_secs",
            self.terminal_retention_secs,
            0,
            MAX_RETENTION_SECS,
        )?;
        Ok(())
    }
}

/// `[schedule]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub sweep_interval_secs: u64,
    pub backup_at: TimeOfDay,
    /// Day of month of the periodic reset (1..=31)
    pub reset_day: u32,
    pub reset_at: TimeOfDay,
    /// Minute of the hourly heartbeat; picked at random in 30..=34 if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_minute: Option<u32>,
    /// Second of the hourly heartbeat; picked at random if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_second: Option<u32>,
    /// Calendar runs woken later than this are skipped
    pub grace_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            backup_at: TimeOfDay::new(20, 0),
            reset_day: 1,
            reset_at: TimeOfDay::new(22, 0),
            heartbeat_minute: None,
            heartbeat_second: None,
            grace_secs: 60,
        }
    }
}

impl ScheduleSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn grace(&self) -> ChronoDuration {
        seconds(self.grace_secs.min(MAX_WAIT_SECS))
    }

    fn validate(&self) -> Result<()> {
        check_range(
            "schedule.sweep_interval_secs",
            self.sweep_interval_secs,
            1,
            MAX_WAIT_SECS,
        )?;
        check_range("schedule.grace_secs", self.grace_secs, 0, MAX_WAIT_SECS)?;
        if !(1..=31).contains(&self.reset_day) {
            return Err(BotconfError::config(format!(
                "schedule.reset_day must be within 1..=31, got {}",
                self.reset_day
            )));
        }
        if let Some(minute) = self.heartbeat_minute {
            check_range("schedule.heartbeat_minute", minute.into(), 0, 59)?;
        }
        if let Some(second) = self.heartbeat_second {
            check_range("schedule.heartbeat_second", second.into(), 0, 59)?;
        }
        Ok(())
    }
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(BotconfError::config(format!(
            "{} must be within {}..={}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

fn seconds(secs: u64) -> ChronoDuration {
    i64::try_from(secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .unwrap_or(ChronoDuration::MAX)
}

/// `[storage]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding `store.toml` and `store.backup.toml`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// `[[bots]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotDefinition {
    pub bot_type: String,
    #[serde(default)]
    pub reset_fields: Vec<OptionPath>,
    pub defaults: Settings,
}

/// A wall-clock time written as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }
}

impl FromStr for TimeOfDay {
    type Err = BotconfError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BotconfError::config(format!("invalid time of day '{}', expected HH:MM", s));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = BotconfError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}
