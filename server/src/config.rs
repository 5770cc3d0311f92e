//! Server configuration from the environment.

use frames::DEFAULT_MAX_FRAME_SIZE;

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Largest frame accepted or sent, in bytes.
    pub max_frame_size: usize,
    /// Answer each inbound HEARTBEAT with a HEARTBEAT.
    pub echo_heartbeats: bool,
    /// Forward each client EVENT to every other connected client.
    pub relay_events: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, max_frame_size: DEFAULT_MAX_FRAME_SIZE, echo_heartbeats: true, relay_events: true }
    }
}

impl ServerConfig {
    /// Read `PORT`, `ECWS_MAX_FRAME_SIZE`, `ECWS_ECHO_HEARTBEATS` and
    /// `ECWS_RELAY_EVENTS`, falling back to defaults for absent or
    /// unparseable values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT", defaults.port),
            max_frame_size: env_parse("ECWS_MAX_FRAME_SIZE", defaults.max_frame_size),
            echo_heartbeats: env_parse("ECWS_ECHO_HEARTBEATS", defaults.echo_heartbeats),
            relay_events: env_parse("ECWS_RELAY_EVENTS", defaults.relay_events),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
