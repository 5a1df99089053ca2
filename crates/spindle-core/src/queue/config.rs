use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpindleError};

/// Queue service configuration.
///
/// Every field has a serde default, so a partial JSON/TOML document
/// deserializes into a usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueServiceConfig {
    /// Workers spawned by `start`. 0 = available parallelism.
    #[serde(default)]
    pub min_workers: usize,
    /// Upper bound when growing under load. 0 = same as `min_workers`
    /// (fixed-size pool).
    #[serde(default)]
    pub max_workers: usize,
    /// Queue depth above which a busy pool gets another worker.
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: usize,
    /// Idle time after which a worker above the minimum retires.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Grace period for joining workers on stop. `None` = wait forever.
    #[serde(default)]
    pub shutdown_timeout_ms: Option<u64>,
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_scale_up_threshold() -> usize {
    8
}

fn default_idle_timeout_ms() -> u64 {
    5_000
}

fn default_thread_name_prefix() -> String {
    "spindle-worker".to_string()
}

fn saturating_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl Default for QueueServiceConfig {
    fn default() -> Self {
        Self {
            min_workers: 0,
            max_workers: 0,
            scale_up_threshold: default_scale_up_threshold(),
            idle_timeout_ms: default_idle_timeout_ms(),
            shutdown_timeout_ms: None,
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl QueueServiceConfig {
    /// Fixed-size pool of `workers` threads.
    pub fn fixed(workers: usize) -> Self {
        Self {
            min_workers: workers,
            max_workers: workers,
            ..Self::default()
        }
    }

    /// Pool growing from `min` up to `max` workers under load.
    pub fn bounded(min: usize, max: usize) -> Self {
        Self {
            min_workers: min,
            max_workers: max,
            ..Self::default()
        }
    }

    pub fn with_scale_up_threshold(mut self, depth: usize) -> Self {
        self.scale_up_threshold = depth;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = Some(saturating_millis(timeout));
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn resolved_min_workers(&self) -> usize {
        if self.min_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.min_workers
        }
    }

    pub fn resolved_max_workers(&self) -> usize {
        if self.max_workers == 0 {
            self.resolved_min_workers()
        } else {
            self.max_workers
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        let min = self.resolved_min_workers();
        let max = self.resolved_max_workers();
        if max < min {
            return Err(SpindleError::InvalidConfiguration(format!(
                "max_workers ({max}) is below min_workers ({min})"
            )));
        }
        if max > min && self.idle_timeout_ms == 0 {
            return Err(SpindleError::InvalidConfiguration(
                "idle_timeout_ms must be positive when the pool can grow".to_string(),
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(SpindleError::InvalidConfiguration(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
