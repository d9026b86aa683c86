//! Process wiring: store, session service, scheduler.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use botconf_core::clock::Clock;
use botconf_core::config::CoreConfig;
use botconf_core::notifier::{BotStatus, SessionNotifier};
use botconf_core::session::SessionService;
use botconf_infrastructure::{BotconfPaths, TomlSessionStore};

use crate::scheduler::{Scheduler, SchedulerHandle};

/// A running session manager.
pub struct Runtime {
    service: Arc<SessionService>,
    scheduler: SchedulerHandle,
    paths: BotconfPaths,
}

impl Runtime {
    /// Loads the store (with backup fallback), opens the session service,
    /// starts the scheduler and reports the bot online.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if neither store file can be read.
    pub async fn start(config: CoreConfig, notifier: Arc<dyn SessionNotifier>) -> Result<Self> {
        Self::start_with_clock(config, notifier, None).await
    }

    /// As [`start`](Self::start), with an explicit clock for the service and
    /// the scheduler calendars.
    pub async fn start_with_clock(
        config: CoreConfig,
        notifier: Arc<dyn SessionNotifier>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let registry = Arc::new(config.schema_registry().context("Invalid bot definitions")?);
        let paths = BotconfPaths::from_settings(&config.storage)?;
        let store = Arc::new(TomlSessionStore::at(&paths));

        let mut builder = SessionService::builder(registry, store)
            .notifier(notifier.clone())
            .settings(config.session.clone());
        if let Some(clock) = &clock {
            builder = builder.clock(clock.clone());
        }
        let service = Arc::new(
            builder
                .open()
                .await
                .with_context(|| format!("Failed to open store in {}", paths.data_dir().display()))?,
        );

        if let Err(e) = notifier.heartbeat(BotStatus::Online).await {
            warn!(error = %e, "Failed to report online status");
        }

        let mut scheduler = Scheduler::new(service.clone(), notifier, config.schedule.clone());
        if let Some(clock) = clock {
            scheduler = scheduler.with_clock(clock);
        }
        let scheduler = scheduler.start().context("Failed to start scheduler")?;

        info!(data_dir = %paths.data_dir().display(), "botconf runtime started");
        Ok(Self {
            service,
            scheduler,
            paths,
        })
    }

    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }

    pub fn paths(&self) -> &BotconfPaths {
        &self.paths
    }

    /// Stops the scheduled jobs and flushes the store.
    pub async fn shutdown(self) -> Result<()> {
        self.scheduler.shutdown().await;
        self.service
            .shutdown()
            .await
            .context("Final flush failed")?;
        info!("botconf runtime stopped");
        Ok(())
    }
}
