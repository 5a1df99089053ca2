use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpindleError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Tick interval. Must be positive.
    pub interval_ms: u64,
    /// Subtract the callback duration from the next sleep.
    #[serde(default)]
    pub precise: bool,
    /// Start the timer thread on construction.
    #[serde(default)]
    pub autostart: bool,
    /// Stop by itself after this many ticks.
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "spindle-timer".to_string()
}

impl TimerConfig {
    /// Intervals longer than `u64::MAX` milliseconds saturate.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            precise: false,
            autostart: false,
            max_cycles: None,
            name: default_name(),
        }
    }

    pub fn with_precise(mut self, precise: bool) -> Self {
        self.precise = precise;
        self
    }

    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        interval_millis(self.interval())?;
        if self.max_cycles == Some(0) {
            return Err(SpindleError::InvalidConfiguration(
                "max_cycles must be positive".to_string(),
            ));
        }
        if self.name.is_empty() {
            return Err(SpindleError::InvalidConfiguration(
                "timer name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whole milliseconds of `interval`. Anything below 1ms, or too long for
/// a `u64` of milliseconds, is rejected.
pub(crate) fn interval_millis(interval: Duration) -> Result<u64> {
    let ms = u64::try_from(interval.as_millis()).map_err(|_| {
        SpindleError::InvalidConfiguration(format!("interval {interval:?} is out of range"))
    })?;
    if ms == 0 {
        return Err(SpindleError::InvalidConfiguration(
            "interval_ms must be positive".to_string(),
        ));
    }
    Ok(ms)
}
