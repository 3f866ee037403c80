// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Environment variable configuration for a request/response cycle.
//!
//! - `HDDS_RCL_NODE_NAME`: node name (default: "client_fixture_node")
//! - `HDDS_RCL_NAMESPACE`: node namespace (default: root)
//! - `HDDS_RCL_SERVICE_NAME`: service to call (default: "add_two_ints")
//! - `HDDS_RCL_DISCOVERY_TRIES`: availability queries (default: 1000)
//! - `HDDS_RCL_DISCOVERY_PERIOD_MS`: pause between queries (default: 100)
//! - `HDDS_RCL_RESPONSE_TRIES`: wait-set blocks (default: 1000)
//! - `HDDS_RCL_RESPONSE_PERIOD_MS`: timeout of each block (default: 100)
//! - `HDDS_LOG_LEVEL`: logging level (default: "info")
//!
//! Empty or unparsable values fall back to the default.
//!
//! ```bash
//! export HDDS_RCL_SERVICE_NAME=add_two_ints
//! export HDDS_RCL_DISCOVERY_TRIES=50
//! export HDDS_LOG_LEVEL=debug
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_NODE_NAME: &str = "HDDS_RCL_NODE_NAME";
pub const ENV_NAMESPACE: &str = "HDDS_RCL_NAMESPACE";
pub const ENV_SERVICE_NAME: &str = "HDDS_RCL_SERVICE_NAME";
pub const ENV_DISCOVERY_TRIES: &str = "HDDS_RCL_DISCOVERY_TRIES";
pub const ENV_DISCOVERY_PERIOD_MS: &str = "HDDS_RCL_DISCOVERY_PERIOD_MS";
pub const ENV_RESPONSE_TRIES: &str = "HDDS_RCL_RESPONSE_TRIES";
pub const ENV_RESPONSE_PERIOD_MS: &str = "HDDS_RCL_RESPONSE_PERIOD_MS";
pub const ENV_LOG_LEVEL: &str = "HDDS_LOG_LEVEL";

pub const DEFAULT_NODE_NAME: &str = "client_fixture_node";
pub const DEFAULT_SERVICE_NAME: &str = "add_two_ints";
pub const DEFAULT_MAX_TRIES: usize = 1000;
pub const DEFAULT_PERIOD_MS: u64 = 100;

/// Bounds of one polling loop: attempts and the pause or timeout of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_tries: usize,
    pub period: Duration,
}

impl Budget {
    #[must_use]
    pub const fn new(max_tries: usize, period: Duration) -> Self {
        Self { max_tries, period }
    }

    /// Attempts actually made when the budget runs out (at least one).
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.max_tries.max(1)
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRIES, Duration::from_millis(DEFAULT_PERIOD_MS))
    }
}

/// Runtime configuration from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub node_name: String,

    /// Empty for the root namespace
    pub namespace: String,

    pub service_name: String,

    /// Service availability polling
    pub discovery: Budget,

    /// Response readiness polling
    pub response: Budget,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            node_name: DEFAULT_NODE_NAME.to_string(),
            namespace: String::new(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            discovery: Budget::default(),
            response: Budget::default(),
            log_level: "info".to_string(),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = non_empty(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::debug!("[rcl] ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}

impl EnvConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let discovery = Budget::new(
            parsed(ENV_DISCOVERY_TRIES).unwrap_or(defaults.discovery.max_tries),
            parsed(ENV_DISCOVERY_PERIOD_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.discovery.period),
        );
        let response = Budget::new(
            parsed(ENV_RESPONSE_TRIES).unwrap_or(defaults.response.max_tries),
            parsed(ENV_RESPONSE_PERIOD_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.response.period),
        );

        Self {
            node_name: non_empty(ENV_NODE_NAME).unwrap_or(defaults.node_name),
            namespace: non_empty(ENV_NAMESPACE).unwrap_or(defaults.namespace),
            service_name: non_empty(ENV_SERVICE_NAME).unwrap_or(defaults.service_name),
            discovery,
            response,
            log_level: non_empty(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
        }
    }

    /// Check if any value differs from the defaults
    #[must_use]
    pub fn is_custom(&self) -> bool {
        *self != Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_var<F: FnOnce()>(key: &str, value: &str, f: F) {
        let prev = env::var(key).ok();
        env::set_var(key, value);
        f();
        if let Some(v) = prev {
            env::set_var(key, v);
        } else {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = EnvConfig::default();
        assert_eq!(config.node_name, "client_fixture_node");
        assert!(config.namespace.is_empty());
        assert_eq!(config.service_name, "add_two_ints");
        assert_eq!(config.discovery.max_tries, 1000);
        assert_eq!(config.response.period, Duration::from_millis(100));
        assert_eq!(config.log_level, "info");
        assert!(!config.is_custom());
    }

    #[test]
    fn test_from_env_service_name() {
        with_var(ENV_SERVICE_NAME, "multiply", || {
            let config = EnvConfig::from_env();
            assert_eq!(config.service_name, "multiply");
            assert!(config.is_custom());
        });
    }

    #[test]
    fn test_from_env_empty_node_name_is_default() {
        with_var(ENV_NODE_NAME, "", || {
            assert_eq!(EnvConfig::from_env().node_name, DEFAULT_NODE_NAME);
        });
    }

    #[test]
    fn test_from_env_discovery_budget() {
        with_var(ENV_DISCOVERY_TRIES, "25", || {
            with_var(ENV_DISCOVERY_PERIOD_MS, " 5 ", || {
                let config = EnvConfig::from_env();
                assert_eq!(
                    config.discovery,
                    Budget::new(25, Duration::from_millis(5))
                );
            });
        });
    }

    #[test]
    fn test_from_env_malformed_response_tries_is_default() {
        with_var(ENV_RESPONSE_TRIES, "-3", || {
            assert_eq!(EnvConfig::from_env().response.max_tries, DEFAULT_MAX_TRIES);
        });
    }

    #[test]
    fn test_budget_attempts_never_zero() {
        assert_eq!(Budget::new(0, Duration::ZERO).attempts(), 1);
        assert_eq!(Budget::new(7, Duration::ZERO).attempts(), 7);
    }
}
