//! Setting values and the recursive settings object.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::path::OptionPath;
use crate::error::{BotconfError, Result};

/// A settings object: option name → value, ordered by name.
pub type Settings = BTreeMap<String, SettingValue>;

/// A single option value.
///
/// Serialized untagged so a settings object reads as a plain TOML table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Table(Settings),
}

/// The kind of a value, used for schema checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Text,
    Table,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "boolean",
            ValueKind::Int => "integer",
            ValueKind::Text => "string",
            ValueKind::Table => "table",
        };
        f.write_str(name)
    }
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SettingValue::Bool(_) => ValueKind::Bool,
            SettingValue::Int(_) => ValueKind::Int,
            SettingValue::Text(_) => ValueKind::Text,
            SettingValue::Table(_) => ValueKind::Table,
        }
    }

    /// Returns the zero value of the same shape. Tables are zeroed leaf by leaf.
    pub fn zeroed(&self) -> SettingValue {
        match self {
            SettingValue::Bool(_) => SettingValue::Bool(false),
            SettingValue::Int(_) => SettingValue::Int(0),
            SettingValue::Text(_) => SettingValue::Text(String::new()),
            SettingValue::Table(table) => SettingValue::Table(
                table
                    .iter()
                    .map(|(name, value)| (name.clone(), value.zeroed()))
                    .collect(),
            ),
        }
    }

    /// Parses a raw string strictly as `kind`.
    ///
    /// The grammar is closed: `true`/`false` for booleans, an optional sign
    /// followed by ASCII digits for integers, anything for strings. Tables
    /// cannot be written from a raw string.
    pub fn parse_as(kind: ValueKind, raw: &str) -> Result<SettingValue> {
        let invalid = || BotconfError::InvalidValue {
            expected: kind,
            raw: raw.to_string(),
        };

        match kind {
            ValueKind::Bool => match raw.trim() {
                "true" => Ok(SettingValue::Bool(true)),
                "false" => Ok(SettingValue::Bool(false)),
                _ => Err(invalid()),
            },
            ValueKind::Int => {
                let trimmed = raw.trim();
                let digits = trimmed
                    .strip_prefix('-')
                    .or_else(|| trimmed.strip_prefix('+'))
                    .unwrap_or(trimmed);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                trimmed
                    .parse::<i64>()
                    .map(SettingValue::Int)
                    .map_err(|_| invalid())
            }
            ValueKind::Text => Ok(SettingValue::Text(raw.to_string())),
            ValueKind::Table => Err(invalid()),
        }
    }

    pub fn as_table(&self) -> Option<&Settings> {
        match self {
            SettingValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(n) => write!(f, "{}", n),
            SettingValue::Text(s) => write!(f, "{:?}", s),
            SettingValue::Table(t) => write!(f, "{{{} options}}", t.len()),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

impl From<Settings> for SettingValue {
    fn from(value: Settings) -> Self {
        SettingValue::Table(value)
    }
}

/// Path-based access to a settings object.
pub trait SettingsExt {
    /// Looks up the value at `path`.
    fn get_path(&self, path: &OptionPath) -> Option<&SettingValue>;

    /// Mutable lookup of the value at `path`.
    fn get_path_mut(&mut self, path: &OptionPath) -> Option<&mut SettingValue>;

    /// Every leaf option path, depth first in name order.
    fn leaf_paths(&self) -> Vec<OptionPath>;
}

impl SettingsExt for Settings {
    fn get_path(&self, path: &OptionPath) -> Option<&SettingValue> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.get(first)?;
        for segment in rest {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    fn get_path_mut(&mut self, path: &OptionPath) -> Option<&mut SettingValue> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.get_mut(first)?;
        for segment in rest {
            current = match current {
                SettingValue::Table(table) => table.get_mut(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn leaf_paths(&self) -> Vec<OptionPath> {
        fn walk(table: &Settings, prefix: Option<&OptionPath>, out: &mut Vec<OptionPath>) {
            for (name, value) in table {
                let path = match prefix {
                    Some(parent) => parent.child(name),
                    None => OptionPath::root(name),
                };
                match value {
                    SettingValue::Table(inner) => walk(inner, Some(&path), out),
                    _ => out.push(path),
                }
            }
        }

        let mut out = Vec::new();
        walk(self, None, &mut out);
        out
    }
}
