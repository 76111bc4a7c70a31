//! Environment-driven configuration (§6.4, §10.1). Follows the
//! `ASTRIA_<SERVICE>_`-prefixed env var convention, collapsed onto plain
//! `figment` since the internal `astria-config` derive macro has no
//! buildable source in this workspace (see DESIGN.md).

use figment::{
    providers::Env,
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

pub const PREFIX: &str = "AUCTION_PLATFORM_";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Socket address the HTTP surface (§6.1) binds to.
    pub http_address: String,
    /// `tracing_subscriber::EnvFilter` directive string.
    pub log_level: String,

    /// Postgres connection string for the durable store (§4.1).
    pub store_url: String,
    pub store_max_pool_size: u32,

    /// Kafka bootstrap servers for the event bus (§6.2).
    pub bus_brokers: String,
    pub bid_placed_topic: String,
    pub bid_result_topic: String,
    pub auction_ended_topic: String,
    pub consumer_group_id: String,

    /// Redis address backing both the distributed lock (§4.4) and the
    /// cache (§10.6). An empty string disables the cache (falls back to
    /// [`crate::cache::NoopCache`]); the lock always requires Redis.
    pub cache_addr: String,
    #[serde(default)]
    pub cache_password: Option<String>,
    #[serde(default)]
    pub cache_db: i64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: u32,
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_wait_ms")]
    pub retry_initial_wait_ms: u64,
    #[serde(default = "default_retry_max_wait_ms")]
    pub retry_max_wait_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default = "default_cb_max_requests")]
    pub cb_max_requests: u32,
    #[serde(default = "default_cb_interval_secs")]
    pub cb_interval_secs: u64,
    #[serde(default = "default_cb_timeout_secs")]
    pub cb_timeout_secs: u64,
    #[serde(default = "default_cb_min_requests")]
    pub cb_min_requests: u32,
    #[serde(default = "default_cb_failure_ratio")]
    pub cb_failure_ratio: f64,
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_rate_limit_rps() -> u32 {
    50
}

fn default_rate_limit_burst() -> u32 {
    100
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_initial_wait_ms() -> u64 {
    50
}

fn default_retry_max_wait_ms() -> u64 {
    2_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_cb_max_requests() -> u32 {
    3
}

fn default_cb_interval_secs() -> u64 {
    60
}

fn default_cb_timeout_secs() -> u64 {
    30
}

fn default_cb_min_requests() -> u32 {
    10
}

fn default_cb_failure_ratio() -> f64 {
    0.5
}

impl Config {
    /// Reads and validates configuration from `AUCTION_PLATFORM_`-prefixed
    /// environment variables. Unknown variables under the prefix are a hard
    /// error (`deny_unknown_fields`), catching typos before they silently
    /// fall back to a default.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::prefixed(PREFIX)).extract()
    }

    pub fn retry_config(&self) -> crate::resilience::RetryConfig {
        crate::resilience::RetryConfig {
            max_attempts: self.retry_max_attempts,
            initial_wait: std::time::Duration::from_millis(self.retry_initial_wait_ms),
            max_wait: std::time::Duration::from_millis(self.retry_max_wait_ms),
            multiplier: self.retry_multiplier,
        }
    }

    pub fn postgres_breaker_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            max_requests: self.cb_max_requests,
            timeout: std::time::Duration::from_secs(self.cb_timeout_secs),
            trip: crate::resilience::TripStrategy::Ratio {
                interval: std::time::Duration::from_secs(self.cb_interval_secs),
                min_requests: self.cb_min_requests,
                failure_ratio: self.cb_failure_ratio,
            },
        }
    }

    pub fn kafka_producer_breaker_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            max_requests: self.cb_max_requests,
            timeout: std::time::Duration::from_secs(self.cb_timeout_secs),
            trip: crate::resilience::TripStrategy::ConsecutiveFailures { threshold: 5 },
        }
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const EXAMPLE_ENV: &str = include_str!("../local.env.example");

    #[test]
    fn example_env_config_is_up_to_date() {
        Jail::expect_with(|jail| {
            for line in EXAMPLE_ENV.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, val)) = line.split_once('=') {
                    jail.set_env(key, val.trim_matches('"'));
                }
            }
            Config::from_env().unwrap();
            Ok(())
        });
    }

    #[test]
    fn unknown_var_under_prefix_is_rejected() {
        Jail::expect_with(|jail| {
            for line in EXAMPLE_ENV.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, val)) = line.split_once('=') {
                    jail.set_env(key, val.trim_matches('"'));
                }
            }
            jail.set_env(format!("{PREFIX}NOT_A_REAL_FIELD"), "oops");
            assert!(Config::from_env().is_err());
            Ok(())
        });
    }
}
