//! Configuration management for keyed limiters.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{
    IncrementalKeyedRateLimiter, Key, KeyedRateLimiter, ManualKeyedRateLimiter,
    TokenBucketKeyedRateLimiter,
};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "KEYED_LIMITER";

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Synthetic traffic configuration for the demo binary
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Replenishment policy of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Claims are released by the caller only
    Manual,
    /// Each admission is released one interval later
    TokenBucket,
    /// Claims are released one at a time at `interval / limit`
    Incremental,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Replenishment policy
    #[serde(default = "default_policy")]
    pub policy: Policy,

    /// Maximum outstanding claims per key
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Release interval in milliseconds (total window for the incremental policy)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Explicit per-claim cadence in milliseconds (incremental policy only)
    #[serde(default)]
    pub cadence_ms: Option<u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            limit: default_limit(),
            interval_ms: default_interval_ms(),
            cadence_ms: None,
        }
    }
}

fn default_policy() -> Policy {
    Policy::TokenBucket
}

fn default_limit() -> u64 {
    10
}

fn default_interval_ms() -> u64 {
    1000
}

impl LimiterConfig {
    /// Get the configured interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Build a limiter for this configuration.
    ///
    /// Timed policies must be built inside a tokio runtime.
    pub fn build<K: Key>(&self) -> Result<Box<dyn KeyedRateLimiter<K>>> {
        let limiter: Box<dyn KeyedRateLimiter<K>> = match self.policy {
            Policy::Manual => Box::new(ManualKeyedRateLimiter::new(self.limit)?),
            Policy::TokenBucket => {
                Box::new(TokenBucketKeyedRateLimiter::new(self.limit, self.interval())?)
            }
            Policy::Incremental => match self.cadence_ms {
                Some(cadence_ms) => Box::new(IncrementalKeyedRateLimiter::with_cadence(
                    self.limit,
                    Duration::from_millis(cadence_ms),
                )?),
                None => Box::new(IncrementalKeyedRateLimiter::new(self.limit, self.interval())?),
            },
        };

        info!(
            policy = ?self.policy,
            limit = self.limit,
            interval_ms = self.interval_ms,
            cadence_ms = ?self.cadence_ms,
            "Limiter built"
        );
        Ok(limiter)
    }
}

/// Synthetic traffic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of distinct keys requests are spread over
    #[serde(default = "default_keys")]
    pub keys: usize,

    /// Requests issued per second across all keys
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u64,

    /// How long to run, in seconds
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// How long an admitted request holds its claim under the manual policy
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            requests_per_second: default_requests_per_second(),
            duration_secs: default_duration_secs(),
            hold_ms: default_hold_ms(),
        }
    }
}

impl SimulationConfig {
    /// Get the delay between two synthetic requests.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for a zero rate or one above a request
    /// per nanosecond.
    pub fn request_period(&self) -> Result<Duration> {
        match self.requests_per_second {
            0 => Err(LimiterError::invalid(
                "requests_per_second",
                "must be greater than zero",
            )),
            rate if rate > NANOS_PER_SECOND => Err(LimiterError::invalid(
                "requests_per_second",
                format!("must not exceed {}", NANOS_PER_SECOND),
            )),
            rate => Ok(Duration::from_nanos(NANOS_PER_SECOND / rate)),
        }
    }
}

fn default_keys() -> usize {
    4
}

fn default_requests_per_second() -> u64 {
    50
}

fn default_duration_secs() -> u64 {
    10
}

fn default_hold_ms() -> u64 {
    250
}

impl Settings {
    /// Load configuration from a YAML file, applying environment overrides.
    ///
    /// Overrides use the `KEYED_LIMITER__` prefix with `__` between nested
    /// keys, e.g. `KEYED_LIMITER__LIMITER__LIMIT=20`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        config::Config::builder()
            .add_source(config::File::from_str(&contents, config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| LimiterError::Config(format!("Failed to load configuration: {}", e)))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.limiter.policy, Policy::TokenBucket);
        assert_eq!(settings.limiter.limit, 10);
        assert_eq!(settings.limiter.interval(), Duration::from_secs(1));
        assert_eq!(settings.simulation.keys, 4);
    }

    #[test]
    fn test_request_period_bounds() {
        let mut simulation = SimulationConfig::default();
        assert_eq!(
            simulation.request_period().unwrap(),
            Duration::from_millis(20)
        );

        simulation.requests_per_second = 1_000_000_000;
        assert_eq!(simulation.request_period().unwrap(), Duration::from_nanos(1));

        simulation.requests_per_second = 1_000_000_001;
        assert!(matches!(
            simulation.request_period(),
            Err(LimiterError::InvalidArgument { .. })
        ));

        simulation.requests_per_second = 0;
        assert_err!(simulation.request_period());
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
limiter:
  policy: incremental
  limit: 5
  cadence_ms: 200
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.limiter.policy, Policy::Incremental);
        assert_eq!(settings.limiter.limit, 5);
        assert_eq!(settings.limiter.cadence_ms, Some(200));
        assert_eq!(settings.limiter.interval_ms, 1000);
        assert_eq!(settings.simulation.duration_secs, 10);
    }

    #[test]
    fn test_parse_invalid_policy() {
        let yaml = r#"
limiter:
  policy: sliding_window
"#;
        assert!(matches!(
            Settings::from_yaml(yaml),
            Err(LimiterError::Config(_))
        ));
    }

    #[test]
    fn test_build_manual_without_runtime() {
        let config = LimiterConfig {
            policy: Policy::Manual,
            limit: 2,
            ..Default::default()
        };
        let limiter = config.build::<String>().unwrap();

        assert!(limiter.try_acquire("a".to_string()).unwrap());
        assert!(limiter.try_acquire("a".to_string()).unwrap());
        assert!(!limiter.try_acquire("a".to_string()).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_incremental_with_cadence() {
        let config = LimiterConfig {
            policy: Policy::Incremental,
            limit: 3,
            interval_ms: 60_000,
            cadence_ms: Some(100),
        };
        let limiter = config.build::<u64>().unwrap();
        assert!(limiter.try_increase(1, 3).unwrap());

        // The explicit cadence wins over the window
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.remaining(&1), 1);
    }

    #[tokio::test]
    async fn test_build_rejects_zero_limit() {
        let config = LimiterConfig {
            limit: 0,
            ..Default::default()
        };
        assert!(config.build::<u64>().is_err());
    }

    #[test]
    fn test_from_file_with_env_override() {
        let path = std::env::temp_dir().join(format!(
            "keyed-limiter-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "limiter:\n  policy: manual\n  limit: 3\nsimulation:\n  keys: 2\n",
        )
        .unwrap();

        std::env::set_var("KEYED_LIMITER__SIMULATION__KEYS", "7");
        let settings = Settings::from_file(&path).unwrap();
        std::env::remove_var("KEYED_LIMITER__SIMULATION__KEYS");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.limiter.policy, Policy::Manual);
        assert_eq!(settings.limiter.limit, 3);
        assert_eq!(settings.simulation.keys, 7);
    }

    #[test]
    fn test_from_missing_file() {
        assert_err!(Settings::from_file("/nonexistent/keyed-limiter.yaml"));
    }
}
