//! Propagator settings.
//!
//! Settings come from defaults, an optional TOML document, and then
//! `UPDATE_PROPAGATOR_*` environment variables, later sources winning.
//! All variable names are the upper-cased field name with that prefix.

use crate::error::PropagationError;
use serde::{Deserialize, Serialize};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "UPDATE_PROPAGATOR_";

/// Tunables of one propagator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropagatorConfig {
    /// Check each extracted change's kind/row invariant before seeding.
    pub validate_changes: bool,

    /// Emit a `trace!` event for every join key group.
    pub trace_key_groups: bool,

    /// Treat Inserted/Deleted as sets: a row with the same values and
    /// qualities as an existing member is dropped.
    pub deduplicate_rows: bool,

    /// Cache per-extent metadata (affected tables) across passes.
    pub cache_extent_metadata: bool,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        PropagatorConfig {
            validate_changes: true,
            trace_key_groups: false,
            deduplicate_rows: true,
            cache_extent_metadata: true,
        }
    }
}

impl PropagatorConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, PropagationError> {
        toml::from_str(text).map_err(|e| PropagationError::Config(e.to_string()))
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, PropagationError> {
        PropagatorConfig::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a full variable name to
    /// its value.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PropagationError> {
        let fields: [(&str, &mut bool); 4] = [
            ("VALIDATE_CHANGES", &mut self.validate_changes),
            ("TRACE_KEY_GROUPS", &mut self.trace_key_groups),
            ("DEDUPLICATE_ROWS", &mut self.deduplicate_rows),
            ("CACHE_EXTENT_METADATA", &mut self.cache_extent_metadata),
        ];
        for (suffix, slot) in fields {
            let name = format!("{ENV_PREFIX}{suffix}");
            if let Some(raw) = lookup(&name) {
                *slot = parse_bool(&name, &raw)?;
            }
        }
        Ok(self)
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, PropagationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(PropagationError::Config(format!(
            "{name}: expected a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = PropagatorConfig::default();
        assert!(c.validate_changes);
        assert!(!c.trace_key_groups);
        assert!(c.deduplicate_rows);
        assert!(c.cache_extent_metadata);
    }

    #[test]
    fn test_toml_partial_document_keeps_defaults() {
        let c = PropagatorConfig::from_toml_str("trace_key_groups = true\n").unwrap();
        assert!(c.trace_key_groups);
        assert!(c.validate_changes);
    }

    #[test]
    fn test_toml_rejects_unknown_and_mistyped_keys() {
        assert!(matches!(
            PropagatorConfig::from_toml_str("bogus = 1"),
            Err(PropagationError::Config(_))
        ));
        assert!(matches!(
            PropagatorConfig::from_toml_str("deduplicate_rows = \"maybe\""),
            Err(PropagationError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("UPDATE_PROPAGATOR_DEDUPLICATE_ROWS", "off"),
            ("UPDATE_PROPAGATOR_TRACE_KEY_GROUPS", "1"),
        ]);
        let c = PropagatorConfig::default()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(!c.deduplicate_rows);
        assert!(c.trace_key_groups);
        assert!(c.cache_extent_metadata);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = PropagatorConfig::default()
            .with_env_overrides(|k| {
                (k == "UPDATE_PROPAGATOR_VALIDATE_CHANGES").then(|| "sometimes".to_string())
            })
            .unwrap_err();
        assert!(err.to_string().contains("UPDATE_PROPAGATOR_VALIDATE_CHANGES"));
    }

    #[test]
    fn test_json_round_trip() {
        let c = PropagatorConfig {
            trace_key_groups: true,
            ..PropagatorConfig::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: PropagatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
