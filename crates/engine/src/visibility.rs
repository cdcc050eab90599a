//! Read-after-write visibility fence
//!
//! A write acknowledged by the store is not necessarily searchable yet.
//! Callers that need the next search to observe their write poll a cheap
//! check with exponential backoff until it passes or a deadline expires.

use esorm_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Polling schedule for [`VisibilityFence`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// First delay between polls in milliseconds (doubles each poll)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between polls in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Give up after this many milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    25
}

fn default_max_delay_ms() -> u64 {
    500
}

fn default_deadline_ms() -> u64 {
    5000
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl VisibilityConfig {
    /// Delay before poll `attempt + 1` (exponential backoff, capped)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Overall polling budget
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Bounded poll-until-visible primitive
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityFence {
    config: VisibilityConfig,
}

impl VisibilityFence {
    /// Fence with the given schedule
    pub fn new(config: VisibilityConfig) -> Self {
        VisibilityFence { config }
    }

    /// The polling schedule
    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// Poll `check` until it returns `true`
    ///
    /// Returns the time spent waiting. Errors from `check` abort the wait.
    /// When the deadline passes first, fails with `NotVisible` naming
    /// `collection`/`id`.
    pub fn wait_until<F>(&self, collection: &str, id: &str, mut check: F) -> Result<Duration>
    where
        F: FnMut() -> Result<bool>,
    {
        let start = Instant::now();
        let deadline = self.config.deadline();

        let mut attempt = 0;
        loop {
            if check()? {
                let waited = start.elapsed();
                debug!(target: "esorm::visibility", collection, id, attempt, ?waited, "Visible");
                return Ok(waited);
            }

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(Error::NotVisible {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    waited: elapsed,
                });
            }
            let delay = self.config.calculate_delay(attempt).min(deadline - elapsed);
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}
