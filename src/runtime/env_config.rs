//! Environment variable support for [`SchedulerConfig`].
//!
//! # Configuration Precedence
//!
//! 1. **Programmatic**: values set via the config setters after overrides
//! 2. **Environment variables**: values from `RESUMEF_*` env vars
//! 3. **Defaults**: built-in defaults from [`SchedulerConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `RESUMEF_SCHEDULER_NAME` | `String` | `name` |
//! | `RESUMEF_MAX_BATCH` | `usize` | `max_batch` |
//! | `RESUMEF_IDLE_PARK_MS` | `u64` | `idle_park` |
//! | `RESUMEF_READY_HINT` | `usize` | `ready_hint` |

use std::time::Duration;

use crate::runtime::config::SchedulerConfig;

/// Environment variable name for the scheduler name.
pub const ENV_SCHEDULER_NAME: &str = "RESUMEF_SCHEDULER_NAME";
/// Environment variable name for the per-batch resume limit.
pub const ENV_MAX_BATCH: &str = "RESUMEF_MAX_BATCH";
/// Environment variable name for the idle park interval in milliseconds.
pub const ENV_IDLE_PARK_MS: &str = "RESUMEF_IDLE_PARK_MS";
/// Environment variable name for the task table sizing hint.
pub const ENV_READY_HINT: &str = "RESUMEF_READY_HINT";

/// Error raised when an environment override cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The variable is set but does not hold an unsigned integer.
    #[error("invalid value for {var}: expected unsigned integer, got {value:?}")]
    InvalidInteger {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
    /// The variable is set but empty.
    #[error("invalid value for {var}: must not be empty")]
    Empty {
        /// Variable name.
        var: &'static str,
    },
}

/// Apply environment variable overrides to a [`SchedulerConfig`].
///
/// Only variables that are set in the environment are applied. Returns an
/// error if a variable is set but contains an unparseable value; the config
/// is left partially updated in that case.
pub fn apply_env_overrides(config: &mut SchedulerConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_SCHEDULER_NAME) {
        if val.trim().is_empty() {
            return Err(ConfigError::Empty {
                var: ENV_SCHEDULER_NAME,
            });
        }
        config.name = val;
    }
    if let Some(val) = read_env(ENV_MAX_BATCH) {
        config.max_batch = parse_usize(ENV_MAX_BATCH, &val)?;
    }
    if let Some(val) = read_env(ENV_IDLE_PARK_MS) {
        config.idle_park = Duration::from_millis(parse_u64(ENV_IDLE_PARK_MS, &val)?);
    }
    if let Some(val) = read_env(ENV_READY_HINT) {
        config.ready_hint = parse_usize(ENV_READY_HINT, &val)?;
    }
    Ok(())
}

/// Builds a config from defaults plus environment overrides.
pub fn config_from_env() -> Result<SchedulerConfig, ConfigError> {
    let mut config = SchedulerConfig::default();
    apply_env_overrides(&mut config)?;
    config.normalize();
    Ok(config)
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidInteger {
            var,
            value: val.to_string(),
        })
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidInteger {
            var,
            value: val.to_string(),
        })
}
