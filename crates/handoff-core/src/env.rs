//! Environment variable helpers used by the config layers
//!
//! # Usage
//!
//! ```ignore
//! use handoff_core::env::{env_get, env_get_ms};
//!
//! let workers: usize = env_get("HANDOFF_NUM_WORKERS", 4);
//! let park = env_get_ms("HANDOFF_PARK_TIMEOUT_MS", Duration::from_millis(1));
//! ```
//!
//! Unset or unparsable variables fall back to the default. Nothing here
//! caches: callers read the environment once while building their config
//! struct and pass the struct around.

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` if it is set and valid.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Milliseconds as a `Duration`, or `default`.
#[inline]
pub fn env_get_ms(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}
