//! Harness configuration: retry schedule, receiver address, shared secret
//!
//! Configuration is an explicit immutable value handed to constructors.
//! `from_env` reads the same variables the shell tooling sets; CLI flags
//! override on top of it.

use crate::signing::SecretKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default backoff schedule in seconds
const DEFAULT_DELAYS: [f64; 4] = [0.5, 1.0, 2.0, 4.0];
/// Default per-attempt reply timeout in seconds
const DEFAULT_TIMEOUT_S: f64 = 2.0;
/// Default replay-acceptance window in seconds
const DEFAULT_REPLAY_WINDOW_S: u64 = 60;
/// Default receiver address
const DEFAULT_ADDR: &str = "127.0.0.1:5555";

/// Retry schedule for one request: an ordered sequence of backoff delays
/// plus a per-attempt reply timeout
///
/// The number of transmission attempts is `delays.len() + 1`; once the last
/// delay has been consumed without a reply, the request terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPlan {
    /// Backoff delays applied between attempts, in order
    pub delays: Vec<Duration>,

    /// How long each attempt waits for a reply
    pub attempt_timeout: Duration,
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self {
            delays: DEFAULT_DELAYS
                .iter()
                .map(|s| Duration::from_secs_f64(*s))
                .collect(),
            attempt_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_S),
        }
    }
}

impl RetryPlan {
    /// Create a plan from explicit delays and per-attempt timeout
    pub fn new(delays: Vec<Duration>, attempt_timeout: Duration) -> Self {
        Self {
            delays,
            attempt_timeout,
        }
    }

    /// Total transmission attempts, including the first
    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Parse a comma-separated delay schedule such as `"0.5,1,2,4"`
    pub fn parse_delays(s: &str) -> Result<Vec<Duration>, ConfigError> {
        let mut delays = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let secs: f64 = part
                .parse()
                .map_err(|_| ConfigError::InvalidDelays(format!("not a number: {part}")))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::InvalidDelays(format!(
                    "delay must be positive and finite, got {part}"
                )));
            }
            delays.push(Duration::from_secs_f64(secs));
        }
        Ok(delays)
    }

    /// Validate the plan
    ///
    /// An empty delay list is legal (single attempt, no retries); a zero
    /// timeout or zero delay is not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "attempt timeout must be positive".into(),
            ));
        }
        if self.delays.iter().any(|d| d.is_zero()) {
            return Err(ConfigError::InvalidDelays(
                "backoff delays must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Process-wide harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Receiver address, `host:port`
    pub receiver_addr: String,

    /// Shared signing secret
    pub secret: SecretKey,

    /// Retry/backoff schedule
    pub retry_plan: RetryPlan,

    /// Replay-acceptance window the receiver is assumed to enforce
    pub replay_window: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            receiver_addr: DEFAULT_ADDR.to_string(),
            secret: SecretKey::from("demo-key"),
            retry_plan: RetryPlan::default(),
            replay_window: Duration::from_secs(DEFAULT_REPLAY_WINDOW_S),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from the environment, falling back to defaults
    ///
    /// Variables: `GC_ADDR`, `SECRET_KEY`, `PS_TIMEOUT` (seconds),
    /// `PS_BACKOFF` (comma-separated seconds), `PS_REPLAY_WINDOW` (seconds).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GC_ADDR") {
            config.receiver_addr = addr;
        }
        if let Ok(secret) = std::env::var("SECRET_KEY") {
            config.secret = SecretKey::from(secret.as_str());
        }
        if let Ok(timeout) = std::env::var("PS_TIMEOUT") {
            let secs: f64 = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(format!("PS_TIMEOUT: {timeout}")))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::InvalidTimeout(format!("PS_TIMEOUT: {timeout}")));
            }
            config.retry_plan.attempt_timeout = Duration::from_secs_f64(secs);
        }
        if let Ok(backoff) = std::env::var("PS_BACKOFF") {
            config.retry_plan.delays = RetryPlan::parse_delays(&backoff)?;
        }
        if let Ok(window) = std::env::var("PS_REPLAY_WINDOW") {
            let secs: u64 = window.parse().map_err(|_| {
                ConfigError::InvalidWindow(format!("PS_REPLAY_WINDOW: {window}"))
            })?;
            config.replay_window = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the receiver address
    pub fn with_receiver_addr(mut self, addr: impl Into<String>) -> Self {
        self.receiver_addr = addr.into();
        self
    }

    /// Set the retry plan
    pub fn with_retry_plan(mut self, plan: RetryPlan) -> Self {
        self.retry_plan = plan;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receiver_addr.is_empty() {
            return Err(ConfigError::InvalidAddr("receiver address is empty".into()));
        }
        self.retry_plan.validate()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid receiver address
    #[error("invalid receiver address: {0}")]
    InvalidAddr(String),

    /// Invalid per-attempt timeout
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    /// Invalid backoff schedule
    #[error("invalid backoff delays: {0}")]
    InvalidDelays(String),

    /// Invalid replay window
    #[error("invalid replay window: {0}")]
    InvalidWindow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan() {
        let plan = RetryPlan::default();
        assert_eq!(plan.delays.len(), 4);
        assert_eq!(plan.attempts(), 5);
        assert_eq!(plan.delays[0], Duration::from_millis(500));
        assert_eq!(plan.attempt_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_delays() {
        let delays = RetryPlan::parse_delays("0.5,1,2,4").unwrap();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[3], Duration::from_secs(4));
    }

    #[test]
    fn test_parse_delays_trims_and_skips_empty() {
        let delays = RetryPlan::parse_delays(" 0.5 , 1 ,").unwrap();
        assert_eq!(delays.len(), 2);
    }

    #[test]
    fn test_parse_delays_rejects_garbage() {
        assert!(RetryPlan::parse_delays("fast,slow").is_err());
        assert!(RetryPlan::parse_delays("-1").is_err());
        assert!(RetryPlan::parse_delays("0").is_err());
    }

    #[test]
    fn test_empty_delays_is_single_attempt() {
        let plan = RetryPlan::new(Vec::new(), Duration::from_secs(1));
        assert!(plan.validate().is_ok());
        assert_eq!(plan.attempts(), 1);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let plan = RetryPlan::new(Vec::new(), Duration::ZERO);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_config_validate() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());

        let config = HarnessConfig::default().with_receiver_addr("");
        assert!(config.validate().is_err());
    }
}
