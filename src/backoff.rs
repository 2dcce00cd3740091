//! Backoff policy for pacing poll cycles against a rate-sensitive service.

use std::time::Duration;

use crate::error::ConfigError;

/// Computes the wait before the next poll cycle.
///
/// The growth shape is a replaceable policy: pollers only depend on this
/// contract, not on any particular sequence.
pub trait BackoffPolicy: Send + Sync {
    /// `current` is the interval used for the previous wait (zero before the
    /// first cycle); `changed` reports whether the last poll found anything
    /// new. A change means the room is hot, so the result should drop back
    /// to the eager floor.
    fn next_interval(&self, current: Duration, changed: bool) -> Duration;
}

/// Fibonacci growth in whole seconds, clamped to `[min, max]`, reset to
/// `min` whenever a cycle finds a change.
///
/// Gentler than doubling near the floor, so a slightly-quiet room is not
/// punished with a huge jump, while dormant rooms still converge on the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Bounds must satisfy `0 < min <= max`; anything else is a
    /// configuration error at construction time, not at call time.
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min.is_zero() || min > max {
            return Err(ConfigError::InvalidBackoffBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl BackoffPolicy for FibonacciBackoff {
    fn next_interval(&self, current: Duration, changed: bool) -> Duration {
        if changed {
            return self.min;
        }
        if current >= self.max {
            return self.max;
        }

        // Walk the sequence to the first value strictly above the current
        // step, then clamp into bounds. A zero current lands on the floor.
        let current_secs = current.as_secs();
        let (mut a, mut b) = (0u64, 1u64);
        while a <= current_secs {
            let next = a + b;
            a = b;
            b = next;
        }
        Duration::from_secs(a).clamp(self.min, self.max)
    }
}
