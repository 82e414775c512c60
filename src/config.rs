//! Environment configuration.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_SERVICE_NAME: &str = "com.apple.debugserver";

/// Tunables for one debugging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Argument of `QSetMaxPacketSize:`.
    pub max_packet_size: usize,
    /// Receive timeout while monitoring; bounds cancellation latency.
    pub poll_timeout: Duration,
    /// Receive timeout for the interrupt and kill commands.
    pub shutdown_timeout: Duration,
    /// Service name requested when starting the debug stub.
    pub service_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub session: SessionConfig,
    pub workers: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl BridgeConfig {
    /// Reads `DEVICEBRIDGE_*` variables; unset or blank values keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let session = SessionConfig {
            max_packet_size: env_usize("DEVICEBRIDGE_MAX_PACKET_SIZE")?
                .unwrap_or(defaults.session.max_packet_size),
            poll_timeout: env_millis("DEVICEBRIDGE_POLL_TIMEOUT_MS")?
                .unwrap_or(defaults.session.poll_timeout),
            shutdown_timeout: env_millis("DEVICEBRIDGE_SHUTDOWN_TIMEOUT_MS")?
                .unwrap_or(defaults.session.shutdown_timeout),
            service_name: env_string_opt("DEVICEBRIDGE_SERVICE_NAME")
                .unwrap_or(defaults.session.service_name),
        };
        let workers = env_usize("DEVICEBRIDGE_WORKERS")?.unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(ConfigError::Zero {
                key: "DEVICEBRIDGE_WORKERS",
            });
        }

        Ok(Self { session, workers })
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_usize(key: &'static str) -> Result<Option<usize>, ConfigError> {
    env_string_opt(key)
        .map(|value| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber { key, value })
        })
        .transpose()
}

fn env_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(millis) = env_usize(key)? else {
        return Ok(None);
    };
    if millis == 0 {
        return Err(ConfigError::Zero { key });
    }
    Ok(Some(Duration::from_millis(millis as u64)))
}
