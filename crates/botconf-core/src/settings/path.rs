//! Dot-separated option paths (`report.auto`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BotconfError;

/// Address of an option inside a settings object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OptionPath(Vec<String>);

impl OptionPath {
    /// A single top-level option.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Extends the path by one nested option.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self` equals `other` or lies inside it.
    pub fn starts_with(&self, other: &OptionPath) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl FromStr for OptionPath {
    type Err = BotconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s.split('.').map(|seg| seg.trim().to_string()).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(BotconfError::config(format!("invalid option path '{}'", s)));
        }
        Ok(Self(segments))
    }
}

impl TryFrom<String> for OptionPath {
    type Error = BotconfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OptionPath> for String {
    fn from(path: OptionPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for OptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}
