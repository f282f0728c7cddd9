//! Node configuration loaded from environment variables.
//!
//! All settings have defaults so a development node can start with zero
//! configuration.

use std::path::PathBuf;

use parley_client::MessengerConfig;
use parley_shared::types::UserId;

/// Context of the development identity derived when none is configured.
const DEV_IDENTITY_CONTEXT: &str = "parley 2024 development node identity";

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// SQLite database file.
    /// Env: `PARLEY_DB_PATH`
    /// Default: `parley.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Public key of the local user (hex, optional `0x` prefix).
    /// Env: `PARLEY_IDENTITY`
    /// Default: a fixed development identity.
    pub identity: UserId,

    /// Whether push-style notifications are raised.
    /// Env: `PARLEY_NOTIFICATIONS_ENABLED` (true/false)
    /// Default: `true`
    pub notifications_enabled: bool,

    /// Engine settings, see [`MessengerConfig`].
    pub messenger: MessengerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            identity: dev_identity(),
            notifications_enabled: true,
            messenger: MessengerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            messenger: MessengerConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(path) = lookup("PARLEY_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(hex_key) = lookup("PARLEY_IDENTITY") {
            match UserId::from_hex(hex_key.trim()) {
                Ok(identity) => config.identity = identity,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid PARLEY_IDENTITY, using the development identity"
                    );
                }
            }
        }

        if let Some(val) = lookup("PARLEY_NOTIFICATIONS_ENABLED") {
            config.notifications_enabled = val != "false" && val != "0";
        }

        config
    }
}

fn dev_identity() -> UserId {
    UserId(blake3::derive_key(DEV_IDENTITY_CONTEXT, b"parley-node"))
}
