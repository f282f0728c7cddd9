//! Engine configuration loaded from environment variables.
//!
//! All settings have defaults so the engine can start with zero
//! configuration.

use std::time::Duration;

use parley_shared::constants::{
    RESEND_BASE_DELAY_MS, RESEND_MAX_COUNT, RESEND_TICK_MS, RETRIEVE_TICK_MS, UNMUTE_TICK_MS,
};

/// Messenger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Base delay of the resend backoff, doubled per attempt.
    /// Env: `PARLEY_RESEND_BASE_DELAY_MS`
    /// Default: `30000`
    pub resend_base_delay_ms: u64,

    /// Records are retried while `send_count <= resend_max_count`.
    /// Env: `PARLEY_RESEND_MAX_COUNT`
    /// Default: `3`
    pub resend_max_count: u32,

    /// Env: `PARLEY_RESEND_TICK_MS`
    /// Default: `1000`
    pub resend_tick_ms: u64,

    /// Env: `PARLEY_RETRIEVE_TICK_MS`
    /// Default: `500`
    pub retrieve_tick_ms: u64,

    /// Env: `PARLEY_UNMUTE_TICK_MS`
    /// Default: `60000`
    pub unmute_tick_ms: u64,

    /// Turns the resend scheduler off entirely.
    /// Env: `PARLEY_RESEND_DISABLED` (true/false)
    /// Default: `false`
    pub resend_disabled: bool,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            resend_base_delay_ms: RESEND_BASE_DELAY_MS,
            resend_max_count: RESEND_MAX_COUNT,
            resend_tick_ms: RESEND_TICK_MS,
            retrieve_tick_ms: RETRIEVE_TICK_MS,
            unmute_tick_ms: UNMUTE_TICK_MS,
            resend_disabled: false,
        }
    }
}

impl MessengerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "PARLEY_RESEND_BASE_DELAY_MS") {
            config.resend_base_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PARLEY_RESEND_MAX_COUNT") {
            config.resend_max_count = v;
        }
        if let Some(v) = parse_var(&lookup, "PARLEY_RESEND_TICK_MS") {
            config.resend_tick_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PARLEY_RETRIEVE_TICK_MS") {
            config.retrieve_tick_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PARLEY_UNMUTE_TICK_MS") {
            config.unmute_tick_ms = v;
        }
        if let Some(val) = lookup("PARLEY_RESEND_DISABLED") {
            config.resend_disabled = val == "true" || val == "1";
        }

        config
    }

    pub fn resend_tick(&self) -> Duration {
        Duration::from_millis(self.resend_tick_ms.max(1))
    }

    pub fn retrieve_tick(&self) -> Duration {
        Duration::from_millis(self.retrieve_tick_ms.max(1))
    }

    pub fn unmute_tick(&self) -> Duration {
        Duration::from_millis(self.unmute_tick_ms.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = MessengerConfig::default();
        assert_eq!(config.resend_base_delay_ms, 30_000);
        assert_eq!(config.resend_max_count, 3);
        assert!(!config.resend_disabled);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let vars: HashMap<&str, &str> = [
            ("PARLEY_RESEND_BASE_DELAY_MS", "500"),
            ("PARLEY_RESEND_MAX_COUNT", "not-a-number"),
            ("PARLEY_RESEND_DISABLED", "true"),
        ]
        .into_iter()
        .collect();
        let config = MessengerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.resend_base_delay_ms, 500);
        assert_eq!(config.resend_max_count, 3);
        assert!(config.resend_disabled);
    }
}
