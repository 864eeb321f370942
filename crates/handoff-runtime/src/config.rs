//! Thread pool configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use handoff_runtime::config::PoolConfig;
//!
//! // Defaults with env overrides
//! let config = PoolConfig::from_env();
//!
//! // Or customize programmatically
//! let config = PoolConfig::new()
//!     .num_workers(8)
//!     .queue_capacity(4096);
//! ```

use handoff_core::env::{env_get, env_get_ms};
use std::time::Duration;
use thiserror::Error;

/// Library defaults
pub mod defaults {
    /// Queue slots per pool
    pub const QUEUE_CAPACITY: usize = 65536;
    /// Empty polls before an idle worker parks
    pub const IDLE_SPINS: u32 = 64;
    /// Upper bound on one park
    pub const PARK_TIMEOUT_MS: u64 = 10;
    /// Hard cap on worker threads
    pub const MAX_WORKERS: usize = 256;

    /// One worker per CPU
    pub fn num_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_WORKERS)
    }
}

/// Pool configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker threads started by `run_loop` / `Workers::spawn`
    pub num_workers: usize,
    /// Bounded queue size; submissions beyond it are rejected as saturated
    pub queue_capacity: usize,
    /// Empty polls before parking
    pub idle_spins: u32,
    /// Longest a parked worker sleeps before rechecking
    pub park_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Library defaults, no environment lookups.
    pub fn new() -> Self {
        Self {
            num_workers: defaults::num_workers(),
            queue_capacity: defaults::QUEUE_CAPACITY,
            idle_spins: defaults::IDLE_SPINS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
        }
    }

    /// Library defaults overridden by environment variables (all optional):
    /// - `HANDOFF_NUM_WORKERS`
    /// - `HANDOFF_QUEUE_CAPACITY`
    /// - `HANDOFF_IDLE_SPINS`
    /// - `HANDOFF_PARK_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            num_workers: env_get("HANDOFF_NUM_WORKERS", base.num_workers),
            queue_capacity: env_get("HANDOFF_QUEUE_CAPACITY", base.queue_capacity),
            idle_spins: env_get("HANDOFF_IDLE_SPINS", base.idle_spins),
            park_timeout: env_get_ms("HANDOFF_PARK_TIMEOUT_MS", base.park_timeout),
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > defaults::MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("queue_capacity must be > 0"));
        }
        if self.park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0"));
        }
        Ok(())
    }

    /// Dump the configuration at debug level.
    pub fn log(&self) {
        tracing::debug!(
            num_workers = self.num_workers,
            queue_capacity = self.queue_capacity,
            idle_spins = self.idle_spins,
            park_timeout = ?self.park_timeout,
            "handoff pool configuration"
        );
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}
