//! Engine configuration from the environment.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::executor::ExecutionLimits;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineConfig {
    pub parser_timeout: Duration,
    pub mapper_timeout: Duration,
    pub sink_timeout: Duration,
    pub limits: ExecutionLimits,
    pub parallel_render: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parser_timeout: Duration::from_millis(30_000),
            mapper_timeout: Duration::from_millis(60_000),
            sink_timeout: Duration::from_millis(30_000),
            limits: ExecutionLimits::default(),
            parallel_render: true,
        }
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid { name, expected: "milliseconds", value: raw }),
    }
}

fn count(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid { name, expected: "a positive integer", value: raw }),
        },
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, expected: "a boolean", value: raw }),
        },
    }
}

impl EngineConfig {
    /// Read `DECKFORGE_*` variables; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let limits = ExecutionLimits {
            max_steps: count(&lookup, "DECKFORGE_MAX_STEPS", defaults.limits.max_steps)?,
            max_draw_ops: count(&lookup, "DECKFORGE_MAX_DRAW_OPS", defaults.limits.max_draw_ops)?,
            max_loop_items: count(&lookup, "DECKFORGE_MAX_LOOP_ITEMS", defaults.limits.max_loop_items)?,
            max_value_bytes: count(&lookup, "DECKFORGE_MAX_VALUE_BYTES", defaults.limits.max_value_bytes)?,
            ..defaults.limits
        };
        Ok(Self {
            parser_timeout: millis(&lookup, "DECKFORGE_PARSER_TIMEOUT_MS", defaults.parser_timeout)?,
            mapper_timeout: millis(&lookup, "DECKFORGE_MAPPER_TIMEOUT_MS", defaults.mapper_timeout)?,
            sink_timeout: millis(&lookup, "DECKFORGE_SINK_TIMEOUT_MS", defaults.sink_timeout)?,
            limits,
            parallel_render: flag(&lookup, "DECKFORGE_PARALLEL_RENDER", defaults.parallel_render)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])).unwrap(), EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DECKFORGE_MAPPER_TIMEOUT_MS", "1500"),
            ("DECKFORGE_MAX_LOOP_ITEMS", "16"),
            ("DECKFORGE_MAX_VALUE_BYTES", "4096"),
            ("DECKFORGE_PARALLEL_RENDER", "off"),
        ]))
        .unwrap();
        assert_eq!(config.mapper_timeout, Duration::from_millis(1500));
        assert_eq!(config.limits.max_loop_items, 16);
        assert_eq!(config.limits.max_value_bytes, 4096);
        assert_eq!(config.limits.max_steps, 20_000);
        assert!(!config.parallel_render);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = EngineConfig::from_lookup(lookup(&[("DECKFORGE_MAX_STEPS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DECKFORGE_MAX_STEPS", .. }));
        assert!(EngineConfig::from_lookup(lookup(&[("DECKFORGE_MAX_DRAW_OPS", "0")])).is_err());
    }
}
