//! Client configuration.
//!
//! DESIGN
//! ======
//! `ClientConfig` is an immutable value built once through
//! [`ClientConfig::builder`] (or [`ClientConfig::from_env`]) and handed to the
//! client at construction. The engine reads it but never writes it.

use std::time::Duration;

use frames::{DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_JITTER: Duration = Duration::from_millis(250);

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("min backoff {min:?} exceeds max backoff {max:?}")]
    BackoffRange { min: Duration, max: Duration },
    #[error("max frame size {0} is smaller than the {HEADER_SIZE}-byte frame header")]
    FrameSizeTooSmall(usize),
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    connect_timeout: Duration,
    request_timeout: Duration,
    heartbeat_interval: Duration,
    auto_reconnect: bool,
    min_backoff: Duration,
    max_backoff: Duration,
    reconnect_jitter: Duration,
    max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            auto_reconnect: true,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            reconnect_jitter: DEFAULT_RECONNECT_JITTER,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder { config: Self::default() }
    }

    /// Build config from environment variables, falling back to defaults for
    /// anything absent or unparseable.
    ///
    /// - `ECWS_CONNECT_TIMEOUT_MS`, `ECWS_REQUEST_TIMEOUT_MS`
    /// - `ECWS_HEARTBEAT_INTERVAL_MS` (0 disables heartbeats)
    /// - `ECWS_AUTO_RECONNECT` (`true`/`false`)
    /// - `ECWS_MIN_BACKOFF_MS`, `ECWS_MAX_BACKOFF_MS`, `ECWS_RECONNECT_JITTER_MS`
    /// - `ECWS_MAX_FRAME_SIZE` (bytes)
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the resulting values are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Self::builder()
            .connect_timeout(env_millis("ECWS_CONNECT_TIMEOUT_MS", defaults.connect_timeout))
            .request_timeout(env_millis("ECWS_REQUEST_TIMEOUT_MS", defaults.request_timeout))
            .heartbeat_interval(env_millis("ECWS_HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval))
            .auto_reconnect(env_parse("ECWS_AUTO_RECONNECT", defaults.auto_reconnect))
            .min_backoff(env_millis("ECWS_MIN_BACKOFF_MS", defaults.min_backoff))
            .max_backoff(env_millis("ECWS_MAX_BACKOFF_MS", defaults.max_backoff))
            .reconnect_jitter(env_millis("ECWS_RECONNECT_JITTER_MS", defaults.reconnect_jitter))
            .max_frame_size(env_parse("ECWS_MAX_FRAME_SIZE", defaults.max_frame_size))
            .build()
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Interval between outbound heartbeats. `None` when heartbeats are disabled.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (!self.heartbeat_interval.is_zero()).then_some(self.heartbeat_interval)
    }

    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    #[must_use]
    pub fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Exclusive upper bound of the random delay added to each reconnect backoff.
    #[must_use]
    pub fn reconnect_jitter(&self) -> Duration {
        self.reconnect_jitter
    }

    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

// =============================================================================
// BUILDER
// =============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the heartbeat interval. `Duration::ZERO` disables heartbeats.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub fn min_backoff(mut self, backoff: Duration) -> Self {
        self.config.min_backoff = backoff;
        self
    }

    #[must_use]
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.config.max_backoff = backoff;
        self
    }

    #[must_use]
    pub fn reconnect_jitter(mut self, jitter: Duration) -> Self {
        self.config.reconnect_jitter = jitter;
        self
    }

    #[must_use]
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.config.max_frame_size = bytes;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for zero timeouts, a zero minimum backoff, an
    /// inverted backoff range, or a frame size that cannot hold a header.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let config = self.config;
        if config.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("connect timeout"));
        }
        if config.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        if config.min_backoff.is_zero() {
            return Err(ConfigError::ZeroDuration("min backoff"));
        }
        if config.min_backoff > config.max_backoff {
            return Err(ConfigError::BackoffRange { min: config.min_backoff, max: config.max_backoff });
        }
        if config.max_frame_size < HEADER_SIZE {
            return Err(ConfigError::FrameSizeTooSmall(config.max_frame_size));
        }
        Ok(config)
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
