//! Harness configuration with environment overrides.

mod env;

pub use env::{EnvError, EnvParser};

use anyhow::{Context, Result};
use std::time::Duration;

/// Bounds for the surface-finisher retry protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinisherConfig {
    /// Maximum teardown rounds before the finisher logs the remainder
    /// and gives up. Finishing one surface can spawn another, so one
    /// round is not always enough.
    pub max_rounds: u32,
    /// How long a single round waits for a destroyed-notification.
    pub destroy_wait: Duration,
}

impl Default for FinisherConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            destroy_wait: Duration::from_secs(10),
        }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub finisher: FinisherConfig,
    /// How long the test thread waits for work marshaled onto the
    /// privileged thread to complete.
    pub marshal_timeout: Duration,
}

impl HarnessConfig {
    /// Build the default configuration with `PROCTOR_*` environment
    /// overrides applied. All parse errors are collected and reported
    /// together.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut parser = EnvParser::new();

        let max_rounds = parser.get_u32_range("FINISHER_ROUNDS", defaults.finisher.max_rounds, 1, 20);
        let destroy_wait = parser.get_duration("FINISHER_WAIT", defaults.finisher.destroy_wait);
        let marshal_timeout = parser.get_duration("MARSHAL_TIMEOUT", defaults.marshal_timeout);

        if parser.has_errors() {
            let details: Vec<String> = parser.take_errors().iter().map(|e| e.to_string()).collect();
            return Err(anyhow::anyhow!(details.join("; ")))
                .context("invalid PROCTOR_* environment configuration");
        }

        Ok(Self {
            finisher: FinisherConfig {
                max_rounds,
                destroy_wait,
            },
            marshal_timeout,
        })
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            finisher: FinisherConfig::default(),
            marshal_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.finisher.max_rounds, 5);
        assert_eq!(config.finisher.destroy_wait, Duration::from_secs(10));
        assert_eq!(config.marshal_timeout, Duration::from_secs(10));
    }
}
