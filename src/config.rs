// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! The bridge consumes a single [`BridgeConfig`] options object. The binary
//! builds it from the environment; embedders may deserialize it from JSON
//! (every field has a default).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `NPUB_PRIVKEY` | Nostr signing identity (hex or `nsec1…`) | unset (sweeper/listener skipped) |
//! | `MINT_URL` | Backing Cashu mint | `https://mint.minibits.cash/Bitcoin` |
//! | `NPUB_CASH_URL` | Payment-receiver service | `https://npubx.cash` |
//! | `NWC_RELAY` | Relay for remote-control sessions | `wss://relay.damus.io` |
//! | `SWEEP_INTERVAL_MS` | Reconciliation period | `60000` |
//! | `PERSIST_INTERVAL_MS` | Autosave period | `5000` |
//! | `MIN_BALANCE_TO_SWEEP` | Smallest pending total a sweep acts on (sats) | `100` |
//! | `STATE_PATH` | Durable state file | `db.json` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const NPUB_PRIVKEY_ENV: &str = "NPUB_PRIVKEY";
pub const MINT_URL_ENV: &str = "MINT_URL";
pub const NPUB_CASH_URL_ENV: &str = "NPUB_CASH_URL";
pub const NWC_RELAY_ENV: &str = "NWC_RELAY";
pub const SWEEP_INTERVAL_MS_ENV: &str = "SWEEP_INTERVAL_MS";
pub const PERSIST_INTERVAL_MS_ENV: &str = "PERSIST_INTERVAL_MS";
pub const MIN_BALANCE_TO_SWEEP_ENV: &str = "MIN_BALANCE_TO_SWEEP";
pub const STATE_PATH_ENV: &str = "STATE_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_MINT_URL: &str = "https://mint.minibits.cash/Bitcoin";
pub const DEFAULT_NPUB_CASH_URL: &str = "https://npubx.cash";
pub const DEFAULT_NWC_RELAY: &str = "wss://relay.damus.io";
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_PERSIST_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MIN_BALANCE_TO_SWEEP: u64 = 100;
pub const DEFAULT_STATE_PATH: &str = "db.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("{field} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Options object consumed by the bridge core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Signing identity secret. Absent or placeholder values degrade the
    /// sweeper and the payment listener to skipped no-ops.
    pub npub_privkey: Option<String>,
    pub mint_url: String,
    pub npub_cash_url: String,
    pub nwc_relay: String,
    pub sweep_interval_ms: u64,
    pub persist_interval_ms: u64,
    pub min_balance_to_sweep: u64,
    pub state_path: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            npub_privkey: None,
            mint_url: DEFAULT_MINT_URL.to_string(),
            npub_cash_url: DEFAULT_NPUB_CASH_URL.to_string(),
            nwc_relay: DEFAULT_NWC_RELAY.to_string(),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            persist_interval_ms: DEFAULT_PERSIST_INTERVAL_MS,
            min_balance_to_sweep: DEFAULT_MIN_BALANCE_TO_SWEEP,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }
}

impl BridgeConfig {
    /// Build the configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            npub_privkey: env_optional(NPUB_PRIVKEY_ENV),
            mint_url: env_or_default(MINT_URL_ENV, DEFAULT_MINT_URL),
            npub_cash_url: env_or_default(NPUB_CASH_URL_ENV, DEFAULT_NPUB_CASH_URL),
            nwc_relay: env_or_default(NWC_RELAY_ENV, DEFAULT_NWC_RELAY),
            sweep_interval_ms: env_u64(SWEEP_INTERVAL_MS_ENV, DEFAULT_SWEEP_INTERVAL_MS),
            persist_interval_ms: env_u64(PERSIST_INTERVAL_MS_ENV, DEFAULT_PERSIST_INTERVAL_MS),
            min_balance_to_sweep: env_u64(
                MIN_BALANCE_TO_SWEEP_ENV,
                DEFAULT_MIN_BALANCE_TO_SWEEP,
            ),
            state_path: PathBuf::from(env_or_default(STATE_PATH_ENV, DEFAULT_STATE_PATH)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the timers or HTTP clients cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "sweep_interval_ms",
            });
        }
        if self.persist_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "persist_interval_ms",
            });
        }
        validate_url("mint_url", &self.mint_url)?;
        validate_url("npub_cash_url", &self.npub_cash_url)?;
        validate_url("nwc_relay", &self.nwc_relay)?;
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms)
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env_optional(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, default, "Ignoring unparsable number");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BridgeConfig::default();
        assert_eq!(config.mint_url, "https://mint.minibits.cash/Bitcoin");
        assert_eq!(config.nwc_relay, "wss://relay.damus.io");
        assert_eq!(config.sweep_interval_ms, 60_000);
        assert_eq!(config.min_balance_to_sweep, 100);
        assert!(config.npub_privkey.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "npub_privkey": "nsec1test", "sweep_interval_ms": 1000 }"#)
                .unwrap();
        assert_eq!(config.npub_privkey.as_deref(), Some("nsec1test"));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.npub_cash_url, DEFAULT_NPUB_CASH_URL);
        assert_eq!(config.state_path, PathBuf::from("db.json"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = BridgeConfig {
            sweep_interval_ms: 0,
            ..BridgeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                field: "sweep_interval_ms"
            })
        ));
    }

    #[test]
    fn non_url_mint_is_rejected() {
        let config = BridgeConfig {
            mint_url: "not a url".to_string(),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                field: "mint_url",
                ..
            })
        ));
    }
}
