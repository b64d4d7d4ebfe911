// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration for advertisement handling and tether operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ConnectionPriority;

/// Feature name under which tether channels are multiplexed.
pub const TETHER_FEATURE_NAME: &str = "magic_tether";

/// Default per-device response timeout of a message transfer operation.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 10;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Feature name must not be empty")]
    EmptyFeatureName,

    #[error("Default timeout must be at least one second")]
    ZeroTimeout,
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Whether remote devices may be identified from background advertisements
    pub background_advertising_supported: bool,

    /// Feature name passed to the secure channel client
    pub feature_name: String,

    /// Priority of tether connection requests
    pub connection_priority: ConnectionPriority,

    /// Response timeout for operations that do not set their own
    pub default_timeout_seconds: u32,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            background_advertising_supported: true,
            feature_name: TETHER_FEATURE_NAME.to_string(),
            connection_priority: ConnectionPriority::Low,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl TetherConfig {
    /// Parses and validates a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TetherConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feature_name.is_empty() {
            return Err(ConfigError::EmptyFeatureName);
        }
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Only foreground advertisements are identified
    pub fn without_background_advertising(mut self) -> Self {
        self.background_advertising_supported = false;
        self
    }

    pub fn with_feature_name(mut self, feature_name: &str) -> Self {
        self.feature_name = feature_name.to_string();
        self
    }

    pub fn with_connection_priority(mut self, priority: ConnectionPriority) -> Self {
        self.connection_priority = priority;
        self
    }

    pub fn with_default_timeout_seconds(mut self, seconds: u32) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }
}
