//! Core of the configuration session manager: settings schemas, the session
//! state machine, the merge engine and the `SessionService` that ties them to
//! a durable store.

pub mod clock;
pub mod config;
pub mod error;
pub mod merge;
pub mod notifier;
pub mod session;
pub mod settings;
pub mod store;
pub mod sync;

// Re-export common error type
pub use error::{BotconfError, Result};
