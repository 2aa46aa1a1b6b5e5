//! Service configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: per service)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
/// - `DATABASE_URL`: PostgreSQL URL; unset means in-memory storage
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `NATS_URL`: broker URL (default: `"nats://localhost:4222"`)
/// - `BROKER_CONNECT_ATTEMPTS`: startup connection attempts (default: `10`)
/// - `BROKER_CONNECT_DELAY_SECS`: pause between attempts (default: `5`)
/// - `RELAY_BATCH_SIZE`: outbox records per relay cycle (default: `10`)
/// - `RELAY_INTERVAL_MS`: pause between relay cycles (default: `2000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: String,
    pub broker_connect_attempts: u32,
    pub broker_connect_delay: Duration,
    pub relay_batch_size: usize,
    pub relay_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(default_port: u16) -> Self {
        Self::from_lookup(default_port, |key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(default_port: u16, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::with_port(default_port);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            nats_url: lookup("NATS_URL").unwrap_or(defaults.nats_url),
            broker_connect_attempts: parse_var(&lookup, "BROKER_CONNECT_ATTEMPTS")
                .unwrap_or(defaults.broker_connect_attempts),
            broker_connect_delay: parse_var(&lookup, "BROKER_CONNECT_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.broker_connect_delay),
            relay_batch_size: parse_var(&lookup, "RELAY_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.relay_batch_size),
            relay_interval: parse_var(&lookup, "RELAY_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.relay_interval),
        }
    }

    /// Default configuration listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 5,
            nats_url: "nats://localhost:4222".to_string(),
            broker_connect_attempts: 10,
            broker_connect_delay: Duration::from_secs(5),
            relay_batch_size: 10,
            relay_interval: Duration::from_secs(2),
        }
    }
}
