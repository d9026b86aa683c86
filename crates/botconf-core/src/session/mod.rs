//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Session record, lifecycle states and the rendered view
//! - `state_machine`: Legal transitions of a single session
//! - `table`: In-memory index of active and recently closed sessions
//! - `service`: Concurrent session lifecycle over the durable store (`SessionService`)

mod model;
mod service;
mod state_machine;
mod table;

#[cfg(test)]
mod service_test;

// Re-export public API
pub use model::{CloseReason, ConfigKey, GroupInfo, Session, SessionState, SessionView};
pub use service::{SessionService, SessionServiceBuilder};
pub use table::SessionTable;
