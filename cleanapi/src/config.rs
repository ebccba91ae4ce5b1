use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read once at startup from the environment (and a `.env`
/// file when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub broadcast_buffer_size: usize,
    pub heartbeat_interval: Duration,
    pub jobs_page_size: i64,
    /// Shared secret the tracking producer sends in the `apikey` header.
    pub tracking_api_key: Option<String>,
    pub simulator_enabled: bool,
    pub simulator_interval: Duration,
    pub simulator_steps: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8000,
            database_url: None,
            database_max_connections: 10,
            broadcast_buffer_size: 100,
            heartbeat_interval: Duration::from_secs(10),
            jobs_page_size: 10,
            tracking_api_key: None,
            simulator_enabled: false,
            simulator_interval: Duration::from_millis(3000),
            simulator_steps: 100,
        }
    }
}

impl Config {
    pub fn init() -> Config {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset, blank or unparsable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        Config {
            port: parse_or(get("PORT"), defaults.port),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(get("DATABASE_MAX_CONNECTIONS"), defaults.database_max_connections),
            broadcast_buffer_size: parse_or(get("BROADCAST_BUFFER_SIZE"), defaults.broadcast_buffer_size).max(1),
            heartbeat_interval: Duration::from_secs(parse_or(get("HEARTBEAT_INTERVAL_SECS"), 10u64).max(1)),
            jobs_page_size: parse_or(get("JOBS_PAGE_SIZE"), defaults.jobs_page_size).max(1),
            tracking_api_key: get("TRACKING_API_KEY"),
            simulator_enabled: parse_or(get("ENABLE_TRACKING_SIMULATOR"), false),
            simulator_interval: Duration::from_millis(parse_or(get("SIMULATOR_INTERVAL_MS"), 3000u64).max(1)),
            simulator_steps: parse_or(get("SIMULATOR_STEPS"), defaults.simulator_steps),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring invalid config value {:?}", raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.database_url, None);
        assert_eq!(config.broadcast_buffer_size, 100);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.jobs_page_size, 10);
        assert!(!config.simulator_enabled);
    }

    #[test]
    fn reads_values_and_ignores_garbage() {
        let config = config(&[
            ("PORT", "9090"),
            ("DATABASE_URL", "postgres://localhost/cleaning"),
            ("BROADCAST_BUFFER_SIZE", "lots"),
            ("JOBS_PAGE_SIZE", "0"),
            ("TRACKING_API_KEY", "  "),
            ("ENABLE_TRACKING_SIMULATOR", "true"),
            ("SIMULATOR_INTERVAL_MS", "250"),
        ]);
        assert_eq!(config.port, 9090);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cleaning"));
        assert_eq!(config.broadcast_buffer_size, 100);
        assert_eq!(config.jobs_page_size, 1);
        assert_eq!(config.tracking_api_key, None);
        assert!(config.simulator_enabled);
        assert_eq!(config.simulator_interval, Duration::from_millis(250));
    }
}
