//! Merge engine.
//!
//! Computes authoritative settings from a session's working copy (commit),
//! from a reset rule (scheduled reset), and reconciles stored objects with
//! the bot-type schema.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

use crate::session::Session;
use crate::settings::{OptionPath, SettingValue, Settings, SettingsExt};

/// One option that differs between two settings objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub path: OptionPath,
    pub before: Option<SettingValue>,
    pub after: Option<SettingValue>,
}

/// New authoritative value on commit: the working copy, verbatim.
///
/// The working copy was seeded from a complete snapshot of the previous
/// default, so a full replacement never drops an option.
pub fn merge_commit(working_copy: &Settings) -> Settings {
    working_copy.clone()
}

/// New authoritative value on scheduled reset.
///
/// Each reset field names a leaf or a nested object; the named value is
/// replaced by its zero value and every other option is left untouched.
pub fn compute_reset(current: &Settings, reset_fields: &[OptionPath]) -> Settings {
    let mut next = current.clone();
    for field in reset_fields {
        match next.get_path_mut(field) {
            Some(value) => *value = value.zeroed(),
            None => warn!(field = %field, "Reset field not present in settings, skipping"),
        }
    }
    next
}

/// Layers a stored settings object over the schema defaults.
///
/// Options the stored object lacks take their default; options unknown to
/// the schema, or stored with the wrong kind, are dropped.
pub fn reconcile(stored: &Settings, defaults: &Settings) -> Settings {
    defaults
        .iter()
        .map(|(name, default)| {
            let value = match (stored.get(name), default) {
                (Some(SettingValue::Table(inner)), SettingValue::Table(inner_default)) => {
                    SettingValue::Table(reconcile(inner, inner_default))
                }
                (Some(value), default)
                    if value.kind() == default.kind() && !matches!(value, SettingValue::Table(_)) =>
                {
                    value.clone()
                }
                _ => default.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

/// Settings currently in effect for a pair: the live session's working copy
/// if one exists, otherwise the authoritative value.
pub fn effective<'a>(authoritative: &'a Settings, live_session: Option<&'a Session>) -> &'a Settings {
    match live_session {
        Some(session) if session.state.is_live() => &session.working_copy,
        _ => authoritative,
    }
}

/// Leaf-level differences from `before` to `after`.
pub fn diff(before: &Settings, after: &Settings) -> Vec<Change> {
    let paths: BTreeSet<OptionPath> = before
        .leaf_paths()
        .into_iter()
        .chain(after.leaf_paths())
        .collect();

    paths
        .into_iter()
        .filter_map(|path| {
            let old = before.get_path(&path);
            let new = after.get_path(&path);
            (old != new).then(|| Change {
                before: old.cloned(),
                after: new.cloned(),
                path,
            })
        })
        .collect()
}
