//! Error taxonomy for the watch core.
//!
//! Configuration problems are fatal and surface synchronously at
//! construction. Fetch and lock failures are transient: a poller logs them,
//! treats the cycle as "no change", and carries on. Cancellation is not an
//! error at all, just a normal terminal transition.

use std::time::Duration;

use thiserror::Error;

/// Invalid configuration, rejected before any loop starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid backoff bounds: min {min:?} must be positive and no greater than max {max:?}")]
    InvalidBackoffBounds { min: Duration, max: Duration },

    #[error("malformed room key: {0}")]
    MalformedRoomKey(String),
}

/// Transient failure reported by the external room-data service.
///
/// Never terminates a loop; the affected cycle is treated as having found
/// no change and the backoff step is left where it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected: {0}")]
    Auth(String),
}

/// A shared-map lock could not be acquired within its bounded wait.
///
/// Treated like a transient fetch failure: the operation is retried on the
/// next cycle, never escalated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("profile cache lock not acquired within {0:?}")]
    LockTimeout(Duration),
}

/// Errors surfaced by [`MonitorRegistry`](crate::registry::MonitorRegistry) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("registry lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
