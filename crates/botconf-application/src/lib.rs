//! Runtime of the configuration session manager: scheduler, telemetry and
//! process wiring around `botconf-core`.

pub mod notifier;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

pub use notifier::LoggingNotifier;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use telemetry::init_tracing;
