//! Background jobs: expiry sweep, nightly backup, periodic reset and
//! heartbeat.
//!
//! Each job runs in its own task and stops when the shared
//! `CancellationToken` is cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use botconf_core::clock::{Clock, SystemClock};
use botconf_core::config::ScheduleSettings;
use botconf_core::error::Result;
use botconf_core::notifier::{BotStatus, SessionNotifier};
use botconf_core::session::SessionService;

use super::calendar::{self, Calendar};

/// Attempts of the reset before giving up until next month.
const RESET_ATTEMPTS: u32 = 3;

/// Pause between reset attempts that hit lock contention.
const RESET_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Handle for stopping the scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cancels every job and waits for the tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

/// The scheduler service.
pub struct Scheduler {
    service: Arc<SessionService>,
    notifier: Arc<dyn SessionNotifier>,
    settings: ScheduleSettings,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        service: Arc<SessionService>,
        notifier: Arc<dyn SessionNotifier>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            service,
            notifier,
            settings,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the clock used to compute calendar runs.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Minute and second of the hourly heartbeat.
    fn heartbeat_at(&self) -> (u32, u32) {
        let mut rng = rand::thread_rng();
        let minute = self
            .settings
            .heartbeat_minute
            .unwrap_or_else(|| rng.gen_range(30..=34));
        let second = self
            .settings
            .heartbeat_second
            .unwrap_or_else(|| rng.gen_range(0..60));
        (minute, second)
    }

    /// Spawns every job and returns a handle for stopping them.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a calendar cannot be built from the settings.
    pub fn start(self) -> Result<SchedulerHandle> {
        let (minute, second) = self.heartbeat_at();
        let backup = Calendar::daily(self.settings.backup_at)?;
        let reset = Calendar::monthly(self.settings.reset_day, self.settings.reset_at)?;
        let heartbeat = Calendar::hourly(minute, second)?;
        info!(
            sweep_interval_secs = self.settings.sweep_interval_secs,
            backup = %backup,
            reset = %reset,
            heartbeat = %heartbeat,
            "Scheduler started"
        );

        let mut tasks = vec![self.spawn_sweep()];

        let service = self.service.clone();
        tasks.push(self.spawn_calendar_job(
            "backup",
            backup,
            move || {
                let service = service.clone();
                async move {
                    if let Err(e) = service.backup().await {
                        error!(error = %e, "Scheduled backup failed");
                    }
                }
            },
        ));

        let service = self.service.clone();
        tasks.push(self.spawn_calendar_job(
            "reset",
            reset,
            move || run_reset(service.clone()),
        ));

        let notifier = self.notifier.clone();
        tasks.push(self.spawn_calendar_job(
            "heartbeat",
            heartbeat,
            move || {
                let notifier = notifier.clone();
                async move {
                    if let Err(e) = notifier.heartbeat(BotStatus::Awake).await {
                        warn!(error = %e, "Heartbeat failed");
                    }
                }
            },
        ));

        Ok(SchedulerHandle {
            cancel: self.cancel,
            tasks,
        })
    }

    fn spawn_sweep(&self) -> JoinHandle<()> {
        let service = self.service.clone();
        let cancel = self.cancel.clone();
        let period = self.settings.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match service.expire_stale().await {
                            Ok(expired) if !expired.is_empty() => {
                                info!(count = expired.len(), "Expiry sweep closed sessions");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "Expiry sweep failed"),
                        }
                    }
                }
            }
            debug!(job = "sweep", "Job stopped");
        })
    }

    fn spawn_calendar_job<F, Fut>(&self, name: &'static str, calendar: Calendar, job: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let clock = self.clock.clone();
        let grace = self.settings.grace();
        let mut after = clock.now();

        tokio::spawn(async move {
            loop {
                let Some(next) = calendar.next_after(after) else {
                    warn!(job = name, calendar = %calendar, "Calendar has no further runs");
                    break;
                };
                let delay = (next - clock.now()).to_std().unwrap_or(Duration::ZERO);
                debug!(job = name, next_run = %next, delay_secs = delay.as_secs(), "Next run scheduled");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let woke = clock.now();
                if calendar::missed(next, woke, grace) {
                    warn!(job = name, scheduled = %next, woke = %woke, "Run outside grace window, skipping");
                } else {
                    debug!(job = name, "Running");
                    job().await;
                }
                after = next.max(woke);
            }
            debug!(job = name, "Job stopped");
        })
    }
}

async fn run_reset(service: Arc<SessionService>) {
    for attempt in 1..=RESET_ATTEMPTS {
        match service.reset_all().await {
            Ok(count) => {
                info!(count, "Scheduled reset finished");
                return;
            }
            Err(e) if e.is_retryable() && attempt < RESET_ATTEMPTS => {
                warn!(attempt, error = %e, "Reset hit busy pairs, retrying");
                tokio::time::sleep(RESET_RETRY_DELAY).await;
            }
            Err(e) => {
                error!(attempt, error = %e, "Scheduled reset failed");
                return;
            }
        }
    }
}
