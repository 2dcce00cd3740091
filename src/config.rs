use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::FibonacciBackoff;
use crate::error::ConfigError;

// Default polling cadences. Messages move fast; rosters move slowly.
pub const DEFAULT_MESSAGE_POLL_MIN: Duration = Duration::from_secs(2);
pub const DEFAULT_MESSAGE_POLL_MAX: Duration = Duration::from_secs(60);
pub const DEFAULT_USER_POLL_MIN: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_POLL_MAX: Duration = Duration::from_secs(5 * 60);

/// Pacing bounds for one watch loop.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl PollerConfig {
    /// Defaults for the message loop.
    pub fn messages_default() -> Self {
        Self {
            min_interval: DEFAULT_MESSAGE_POLL_MIN,
            max_interval: DEFAULT_MESSAGE_POLL_MAX,
        }
    }

    /// Defaults for the roster loop.
    pub fn users_default() -> Self {
        Self {
            min_interval: DEFAULT_USER_POLL_MIN,
            max_interval: DEFAULT_USER_POLL_MAX,
        }
    }

    /// Validate the bounds and build this loop's backoff policy.
    pub fn backoff(&self) -> Result<FibonacciBackoff, ConfigError> {
        FibonacciBackoff::new(self.min_interval, self.max_interval)
    }
}

/// Configuration applied to every monitor a registry creates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    pub messages: PollerConfig,
    pub users: PollerConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            messages: PollerConfig::messages_default(),
            users: PollerConfig::users_default(),
        }
    }
}

impl WatchConfig {
    /// Check both loops' bounds up front so a bad configuration fails at
    /// monitor construction rather than mid-loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.messages.backoff()?;
        self.users.backoff()?;
        Ok(())
    }
}
