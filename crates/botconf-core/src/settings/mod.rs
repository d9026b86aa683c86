//! Settings objects, option paths and bot-type schemas.

mod path;
mod schema;
mod value;

pub use path::OptionPath;
pub use schema::{BotSchema, SchemaRegistry};
pub use value::{SettingValue, Settings, SettingsExt, ValueKind};
