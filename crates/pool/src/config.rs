//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which idle instance an acquire picks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PoolStrategy {
    /// Hand out the instance that has been idle the longest.
    #[default]
    Fifo,
    /// Hand out the most recently returned instance.
    Lifo,
}

/// Configuration for resource pooling
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of instances created up front (capped by `max_size`)
    pub min_size: usize,
    /// Maximum number of instances, idle and checked out together
    pub max_size: usize,
    /// How long an acquire waits when every instance is checked out.
    /// Rounded up to whole seconds.
    pub acquire_timeout: Duration,
    /// Idle instance selection order
    pub strategy: PoolStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 5,
            acquire_timeout: Duration::from_secs(10),
            strategy: PoolStrategy::Fifo,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    ///
    /// `min_size > max_size` is accepted: pre-population simply stops at
    /// `max_size`.
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(Error::configuration("min_size must be at least 1"));
        }
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be at least 1"));
        }
        if self.acquire_timeout < Duration::from_secs(1) {
            return Err(Error::configuration(format!(
                "acquire_timeout must be at least 1s, got {:?}",
                self.acquire_timeout
            )));
        }
        Ok(())
    }

    /// The total time a blocked acquire may wait: `acquire_timeout` rounded
    /// up to whole seconds.
    #[must_use]
    pub fn wait_budget(&self) -> Duration {
        let whole = self.acquire_timeout.as_secs();
        let partial = u64::from(self.acquire_timeout.subsec_nanos() > 0);
        Duration::from_secs(whole.saturating_add(partial))
    }

    /// Number of instances present right after construction.
    #[must_use]
    pub fn initial_size(&self) -> usize {
        self.min_size.min(self.max_size)
    }
}
