//! Wall-clock calendars for the scheduled duties. All times are UTC.
//!
//! Each calendar is a cron expression with a seconds field:
//! `sec min hour day-of-month month day-of-week year`.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

use botconf_core::config::TimeOfDay;
use botconf_core::error::{BotconfError, Result};

/// When a calendar job fires.
#[derive(Debug, Clone)]
pub struct Calendar {
    expr: String,
    schedule: Schedule,
}

impl Calendar {
    /// Parses a cron expression.
    pub fn parse(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        let schedule = Schedule::from_str(&expr)
            .map_err(|e| BotconfError::config(format!("invalid cron expression '{}': {}", expr, e)))?;
        Ok(Self { expr, schedule })
    }

    /// Every hour at `minute:second`.
    pub fn hourly(minute: u32, second: u32) -> Result<Self> {
        Self::parse(format!("{} {} * * * * *", second, minute))
    }

    /// Every day at `at`.
    pub fn daily(at: TimeOfDay) -> Result<Self> {
        Self::parse(format!("0 {} {} * * * *", at.minute, at.hour))
    }

    /// On `day` of every month at `at`. Months without that day are skipped.
    pub fn monthly(day: u32, at: TimeOfDay) -> Result<Self> {
        Self::parse(format!("0 {} {} {} * * *", at.minute, at.hour, day))
    }

    /// First run strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// True if a run scheduled for `scheduled` that woke at `woke` is outside
/// the grace window and must be skipped.
pub fn missed(scheduled: DateTime<Utc>, woke: DateTime<Utc>, grace: Duration) -> bool {
    woke - scheduled > grace
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_hourly() {
        let calendar = Calendar::hourly(32, 0).unwrap();
        assert_eq!(
            calendar.next_after(utc(2026, 3, 1, 10, 15, 0)),
            Some(utc(2026, 3, 1, 10, 32, 0))
        );
        assert_eq!(
            calendar.next_after(utc(2026, 3, 1, 10, 32, 0)),
            Some(utc(2026, 3, 1, 11, 32, 0))
        );
        assert_eq!(
            calendar.next_after(utc(2026, 12, 31, 23, 40, 0)),
            Some(utc(2027, 1, 1, 0, 32, 0))
        );

        let with_second = Calendar::hourly(30, 17).unwrap();
        assert_eq!(
            with_second.next_after(utc(2026, 3, 1, 10, 30, 0)),
            Some(utc(2026, 3, 1, 10, 30, 17))
        );
    }

    #[test]
    fn test_daily() {
        let calendar = Calendar::daily(TimeOfDay::new(20, 0)).unwrap();
        assert_eq!(calendar.to_string(), "0 0 20 * * * *");
        assert_eq!(
            calendar.next_after(utc(2026, 3, 1, 19, 59, 59)),
            Some(utc(2026, 3, 1, 20, 0, 0))
        );
        assert_eq!(
            calendar.next_after(utc(2026, 3, 1, 20, 0, 0)),
            Some(utc(2026, 3, 2, 20, 0, 0))
        );
    }

    #[test]
    fn test_monthly_skips_short_months() {
        let calendar = Calendar::monthly(31, TimeOfDay::new(22, 0)).unwrap();
        assert_eq!(
            calendar.next_after(utc(2026, 3, 31, 22, 0, 0)),
            Some(utc(2026, 5, 31, 22, 0, 0))
        );

        let first = Calendar::monthly(1, TimeOfDay::new(22, 0)).unwrap();
        assert_eq!(
            first.next_after(utc(2026, 12, 1, 23, 0, 0)),
            Some(utc(2027, 1, 1, 22, 0, 0))
        );
    }

    #[test]
    fn test_invalid_expression_is_a_config_error() {
        assert!(matches!(
            Calendar::parse("every tuesday"),
            Err(BotconfError::Config(_))
        ));
    }

    #[test]
    fn test_missed_respects_grace() {
        let scheduled = utc(2026, 3, 1, 20, 0, 0);
        let grace = Duration::seconds(60);
        assert!(!missed(scheduled, scheduled + Duration::seconds(60), grace));
        assert!(missed(scheduled, scheduled + Duration::seconds(61), grace));
    }
}
