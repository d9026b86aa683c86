//! Per-bot-type option schemas.
//!
//! A schema is defined by its default settings object: the option names, their
//! kinds and their default values. Each bot type also names the transient
//! fields cleared by the scheduled reset.

use std::collections::HashMap;

use super::path::OptionPath;
use super::value::{SettingValue, Settings, SettingsExt, ValueKind};
use crate::error::{BotconfError, Result};

/// Schema of one sibling bot's settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BotSchema {
    bot_type: String,
    defaults: Settings,
    reset_fields: Vec<OptionPath>,
}

impl BotSchema {
    /// Builds a schema, rejecting empty defaults and reset fields the
    /// defaults do not contain.
    pub fn new(
        bot_type: impl Into<String>,
        defaults: Settings,
        reset_fields: Vec<OptionPath>,
    ) -> Result<Self> {
        let bot_type = bot_type.into();
        if bot_type.trim().is_empty() {
            return Err(BotconfError::config("bot type must not be empty"));
        }
        if defaults.is_empty() {
            return Err(BotconfError::config(format!(
                "bot type '{}' has no default options",
                bot_type
            )));
        }
        if let Some(missing) = reset_fields.iter().find(|p| defaults.get_path(p).is_none()) {
            return Err(BotconfError::config(format!(
                "reset field '{}' is not an option of '{}'",
                missing, bot_type
            )));
        }

        Ok(Self {
            bot_type,
            defaults,
            reset_fields,
        })
    }

    /// The settings of the warn bot.
    pub fn builtin_warn() -> Self {
        let mut report = Settings::new();
        report.insert("auto".into(), SettingValue::Bool(false));
        report.insert("manual".into(), SettingValue::Bool(false));

        let mut defaults = Settings::new();
        defaults.insert("default".into(), SettingValue::Bool(true));
        defaults.insert("limit".into(), SettingValue::Int(3));
        defaults.insert("locked".into(), SettingValue::Int(0));
        defaults.insert("mention".into(), SettingValue::Bool(false));
        defaults.insert("report".into(), SettingValue::Table(report));

        Self {
            bot_type: "warn".to_string(),
            defaults,
            reset_fields: vec![OptionPath::root("report")],
        }
    }

    pub fn bot_type(&self) -> &str {
        &self.bot_type
    }

    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    pub fn reset_fields(&self) -> &[OptionPath] {
        &self.reset_fields
    }

    /// Kind of the editable option at `path`.
    ///
    /// Only leaves are editable: a path into a leaf or naming a nested object
    /// is an unknown option.
    pub fn leaf_kind(&self, path: &OptionPath) -> Result<ValueKind> {
        match self.defaults.get_path(path) {
            Some(SettingValue::Table(_)) | None => {
                Err(BotconfError::unknown_option(&self.bot_type, path.to_string()))
            }
            Some(value) => Ok(value.kind()),
        }
    }
}

/// Registry of every known bot type's schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, BotSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in schemas.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(BotSchema::builtin_warn());
        registry
    }

    /// Adds or replaces the schema for its bot type.
    pub fn register(&mut self, schema: BotSchema) {
        self.schemas.insert(schema.bot_type.clone(), schema);
    }

    pub fn get(&self, bot_type: &str) -> Result<&BotSchema> {
        self.schemas
            .get(bot_type)
            .ok_or_else(|| BotconfError::not_found("bot type", bot_type))
    }

    pub fn bot_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_kind() {
        let schema = BotSchema::builtin_warn();
        assert_eq!(
            schema.leaf_kind(&"limit".parse().unwrap()).unwrap(),
            ValueKind::Int
        );
        assert_eq!(
            schema.leaf_kind(&"report.auto".parse().unwrap()).unwrap(),
            ValueKind::Bool
        );
    }

    #[test]
    fn test_nested_object_is_not_editable() {
        let schema = BotSchema::builtin_warn();
        let err = schema.leaf_kind(&"report".parse().unwrap()).unwrap_err();
        assert!(matches!(err, BotconfError::UnknownOption { .. }));
        let err = schema.leaf_kind(&"colour".parse().unwrap()).unwrap_err();
        assert!(matches!(err, BotconfError::UnknownOption { .. }));
    }

    #[test]
    fn test_new_rejects_unknown_reset_field() {
        let defaults = BotSchema::builtin_warn().defaults().clone();
        let result = BotSchema::new("warn", defaults, vec!["counters".parse().unwrap()]);
        assert!(matches!(result, Err(BotconfError::Config(_))));
    }

    #[test]
    fn test_new_rejects_empty_defaults() {
        assert!(BotSchema::new("noporn", Settings::new(), Vec::new()).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SchemaRegistry::with_builtin();
        assert_eq!(registry.bot_types(), vec!["warn"]);
        assert!(registry.get("warn").is_ok());
        assert!(registry.get("captcha").unwrap_err().is_not_found());
    }
}
