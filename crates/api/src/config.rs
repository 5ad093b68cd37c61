use std::time::Duration;

use fieldops_core::rate_limit::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_SECS};
use fieldops_events::queue::{
    QueueConfig, DEFAULT_BATCH_SIZE, DEFAULT_DRAIN_INTERVAL_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_SEND_DELAY_MS,
};

use crate::auth::jwt::JwtConfig;

/// Default seconds without a heartbeat before a connection is dropped.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Default seconds between heartbeat sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

/// Default seconds between channel bridge probes.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Seconds to wait for background tasks during shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Notification delivery queue tuning.
    pub queue: QueueConfig,
    /// Real-time hub tuning.
    pub hub: HubConfig,
    /// Base URL of the messaging channel bridge. `None` disables delivery.
    pub channel_bridge_url: Option<String>,
    /// Seconds between bridge connectivity probes (default: `15`).
    pub channel_probe_interval_secs: u64,
}

/// Heartbeat and admission settings for the real-time hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            rate_limit_max: DEFAULT_MAX_ATTEMPTS,
            rate_limit_window: Duration::from_secs(DEFAULT_WINDOW_SECS as u64),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `HOST`                        | `0.0.0.0`               |
    /// | `PORT`                        | `3000`                  |
    /// | `CORS_ORIGINS`                | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                    |
    /// | `NOTIFY_DRAIN_INTERVAL_SECS`  | `30`                    |
    /// | `NOTIFY_BATCH_SIZE`           | `10`                    |
    /// | `NOTIFY_MAX_RETRIES`          | `3`                     |
    /// | `NOTIFY_SEND_DELAY_MS`        | `1000`                  |
    /// | `WS_HEARTBEAT_TIMEOUT_SECS`   | `30`                    |
    /// | `WS_SWEEP_INTERVAL_SECS`      | `5`                     |
    /// | `WS_RATE_LIMIT_MAX`           | `5`                     |
    /// | `WS_RATE_LIMIT_WINDOW_SECS`   | `60`                    |
    /// | `CHANNEL_BRIDGE_URL`          | unset                   |
    /// | `CHANNEL_PROBE_INTERVAL_SECS` | `15`                    |
    ///
    /// JWT settings are documented on [`JwtConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_parse("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_parse("SHUTDOWN_TIMEOUT_SECS", 30);

        let queue = queue_config_from_env();

        let hub = HubConfig {
            heartbeat_timeout: Duration::from_secs(env_parse(
                "WS_HEARTBEAT_TIMEOUT_SECS",
                DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            )),
            sweep_interval: Duration::from_secs(env_parse(
                "WS_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
            rate_limit_max: env_parse("WS_RATE_LIMIT_MAX", DEFAULT_MAX_ATTEMPTS),
            rate_limit_window: Duration::from_secs(env_parse(
                "WS_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_WINDOW_SECS as u64,
            )),
        };

        let channel_bridge_url = std::env::var("CHANNEL_BRIDGE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let channel_probe_interval_secs: u64 =
            env_parse("CHANNEL_PROBE_INTERVAL_SECS", DEFAULT_PROBE_INTERVAL_SECS);

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
            queue,
            hub,
            channel_bridge_url,
            channel_probe_interval_secs,
        }
    }
}

/// Delivery queue tuning from the `NOTIFY_*` variables.
///
/// A zero drain interval is accepted; the queue floors it when scheduling.
///
/// # Panics
///
/// Panics if `NOTIFY_BATCH_SIZE` or `NOTIFY_MAX_RETRIES` is below 1.
fn queue_config_from_env() -> QueueConfig {
    QueueConfig {
        drain_interval: Duration::from_secs(env_parse(
            "NOTIFY_DRAIN_INTERVAL_SECS",
            DEFAULT_DRAIN_INTERVAL_SECS,
        )),
        batch_size: env_parse_at_least("NOTIFY_BATCH_SIZE", DEFAULT_BATCH_SIZE, 1),
        max_retries: env_parse_at_least("NOTIFY_MAX_RETRIES", DEFAULT_MAX_RETRIES, 1),
        send_delay: Duration::from_millis(env_parse(
            "NOTIFY_SEND_DELAY_MS",
            DEFAULT_SEND_DELAY_MS,
        )),
    }
}

/// Like [`env_parse`], but rejects values below `min`.
///
/// # Panics
///
/// Panics if the variable does not parse or is below `min`.
fn env_parse_at_least<T>(name: &str, default: T, min: T) -> T
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = env_parse(name, default);
    assert!(value >= min, "{name} must be at least {min}, got {value}");
    value
}

/// Read and parse an env var, falling back to `default` when unset.
///
/// # Panics
///
/// Panics if the variable is set but does not parse.
fn env_parse<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Serializes tests that mutate the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Load the queue config with `vars` set, restoring them afterwards.
    fn queue_config_with(vars: &[(&str, &str)]) -> std::thread::Result<QueueConfig> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        let result = std::panic::catch_unwind(queue_config_from_env);
        for (name, _) in vars {
            std::env::remove_var(name);
        }
        result
    }

    fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
        payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_default()
    }

    #[test]
    fn env_parse_falls_back_when_unset() {
        let value: u64 = env_parse("FIELDOPS_TEST_SURELY_UNSET_VAR", 42);
        assert_eq!(value, 42);
    }

    // -----------------------------------------------------------------------
    // Queue tuning
    // -----------------------------------------------------------------------

    #[test]
    fn queue_config_reads_notify_vars() {
        let config = queue_config_with(&[
            ("NOTIFY_BATCH_SIZE", "25"),
            ("NOTIFY_MAX_RETRIES", "5"),
            ("NOTIFY_DRAIN_INTERVAL_SECS", "7"),
        ])
        .unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.drain_interval, Duration::from_secs(7));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = queue_config_with(&[("NOTIFY_BATCH_SIZE", "0")]).unwrap_err();
        assert_eq!(panic_message(err), "NOTIFY_BATCH_SIZE must be at least 1, got 0");
    }

    #[test]
    fn zero_max_retries_is_rejected() {
        let err = queue_config_with(&[("NOTIFY_MAX_RETRIES", "0")]).unwrap_err();
        assert_eq!(panic_message(err), "NOTIFY_MAX_RETRIES must be at least 1, got 0");
    }

    #[test]
    fn negative_max_retries_is_rejected() {
        let err = queue_config_with(&[("NOTIFY_MAX_RETRIES", "-2")]).unwrap_err();
        assert_eq!(panic_message(err), "NOTIFY_MAX_RETRIES must be at least 1, got -2");
    }

    #[test]
    fn zero_drain_interval_is_accepted() {
        let config = queue_config_with(&[("NOTIFY_DRAIN_INTERVAL_SECS", "0")]).unwrap();
        assert_eq!(config.drain_interval, Duration::ZERO);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn hub_defaults() {
        let hub = HubConfig::default();
        assert_eq!(hub.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(hub.sweep_interval, Duration::from_secs(5));
        assert_eq!(hub.rate_limit_max, 5);
        assert_eq!(hub.rate_limit_window, Duration::from_secs(60));
    }
}
