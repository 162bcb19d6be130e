//! Configuration for the measurement engine

use crate::error::{Result, SpeedTestError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable parameters for a speed test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestConfig {
    /// Soft per-probe timeout; checked between reads, never a hard abort
    pub probe_timeout: Duration,
    /// Size of the reusable synthetic upload buffer
    pub transfer_buffer_bytes: usize,
    /// Number of ping waves per ranking pass
    pub ping_rounds: u32,
    /// Pause between ping waves after the first
    pub ping_wave_pause: Duration,
    /// Probe stage slower than this downgrades the confirming stage
    pub medium_threshold: Duration,
    /// Probe stage slower than this skips the confirming stage entirely
    pub super_slow_threshold: Duration,
    /// How long a reported server stays banned
    pub ban_cooldown: Duration,
    /// User-Agent header sent with every transfer probe
    pub user_agent: String,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            transfer_buffer_bytes: 5 * 1024 * 1024,
            ping_rounds: 2,
            ping_wave_pause: Duration::from_secs(2),
            medium_threshold: Duration::from_secs(5),
            super_slow_threshold: Duration::from_secs(10),
            ban_cooldown: Duration::from_secs(5 * 60),
            user_agent:
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:142.0) Gecko/20100101 Firefox/142.0"
                    .to_string(),
        }
    }
}

impl SpeedTestConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout.is_zero() {
            return Err(SpeedTestError::config("probe_timeout must be non-zero"));
        }
        if self.transfer_buffer_bytes == 0 {
            return Err(SpeedTestError::config(
                "transfer_buffer_bytes must be non-zero",
            ));
        }
        if self.ping_rounds == 0 {
            return Err(SpeedTestError::config("ping_rounds must be at least 1"));
        }
        if self.medium_threshold >= self.super_slow_threshold {
            return Err(SpeedTestError::config(
                "medium_threshold must be below super_slow_threshold",
            ));
        }
        if self.user_agent.is_empty() {
            return Err(SpeedTestError::config("user_agent must be non-empty"));
        }
        Ok(())
    }
}
