//! Process configuration, read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | 8083 |
//! | `DATABASE_URL` | unset: in-memory store |
//! | `DATABASE_MAX_CONNECTIONS` | 10 |
//! | `STORE_TIMEOUT_MS` | 5000 |
//! | `REAPER_INTERVAL_SECS` | 3600 |
//! | `REAPER_MAX_BACKOFF_SECS` | 21600 |
//! | `STOCK_POLICY` | clamp |
//! | `NATS_URL` | unset: events are dropped |

use std::str::FromStr;
use std::time::Duration;

use crate::services::ReaperSettings;
use crate::store::StockPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_timeout: Duration,
    pub reaper_interval: Duration,
    pub reaper_max_backoff: Duration,
    pub stock_policy: StockPolicy,
    pub nats_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            store_timeout: Duration::from_millis(5000),
            reaper_interval: Duration::from_secs(3600),
            reaper_max_backoff: Duration::from_secs(21600),
            stock_policy: StockPolicy::Clamp,
            nats_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            port: parse_or_warn("PORT", text("PORT")).unwrap_or(defaults.port),
            database_url: text("DATABASE_URL"),
            database_max_connections: parse_or_warn("DATABASE_MAX_CONNECTIONS", text("DATABASE_MAX_CONNECTIONS")).unwrap_or(defaults.database_max_connections),
            store_timeout: parse_or_warn("STORE_TIMEOUT_MS", text("STORE_TIMEOUT_MS")).map(Duration::from_millis).unwrap_or(defaults.store_timeout),
            reaper_interval: parse_or_warn("REAPER_INTERVAL_SECS", text("REAPER_INTERVAL_SECS")).map(Duration::from_secs).unwrap_or(defaults.reaper_interval),
            reaper_max_backoff: parse_or_warn("REAPER_MAX_BACKOFF_SECS", text("REAPER_MAX_BACKOFF_SECS")).map(Duration::from_secs).unwrap_or(defaults.reaper_max_backoff),
            stock_policy: parse_or_warn("STOCK_POLICY", text("STOCK_POLICY")).unwrap_or(defaults.stock_policy),
            nats_url: text("NATS_URL"),
        }
    }

    pub fn reaper_settings(&self) -> ReaperSettings {
        ReaperSettings {
            interval: self.reaper_interval,
            max_backoff: self.reaper_max_backoff,
            ..ReaperSettings::default()
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparseable config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8083);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.store_timeout, Duration::from_secs(5));
        assert_eq!(cfg.stock_policy, StockPolicy::Clamp);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("STORE_TIMEOUT_MS", "250"),
            ("STOCK_POLICY", "Reject"),
            ("REAPER_INTERVAL_SECS", "soon"),
            ("NATS_URL", "  "),
        ]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
        assert_eq!(cfg.stock_policy, StockPolicy::Reject);
        assert_eq!(cfg.reaper_interval, Duration::from_secs(3600));
        assert!(cfg.nats_url.is_none());
        assert_eq!(cfg.reaper_settings().interval, Duration::from_secs(3600));
    }
}
