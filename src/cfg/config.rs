// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::logger::{LogFileConfig, Output},
    ratelimit::{MIN_BURST, MIN_RATE_PER_SEC, RateLimitConfig},
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Token-bucket rate limiting parameters.
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    /// Logging and metrics parameters.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

fn default_burst_capacity() -> f64 {
    10.0
}
fn default_sustained_rate() -> f64 {
    2.0
}
fn default_cleanup_interval_secs() -> u64 {
    300
}
fn default_session_max_age_secs() -> u64 {
    3600
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Token-bucket limits, one bucket per session. Values below the documented
/// floors are not rejected; they are clamped during
/// [`Config::validate_and_normalize`] with a logged warning.
pub struct RateLimitSection {
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: f64,
    #[serde(default = "default_sustained_rate")]
    pub sustained_rate: f64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            burst_capacity: default_burst_capacity(),
            sustained_rate: default_sustained_rate(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            session_max_age_secs: default_session_max_age_secs(),
        }
    }
}

impl RateLimitSection {
    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            capacity: self.burst_capacity,
            refill_per_sec: self.sustained_rate,
            reap_interval: Duration::from_secs(self.cleanup_interval_secs),
            idle_ttl: Duration::from_secs(self.session_max_age_secs),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TelemetrySection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub output: Output,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    #[serde(default)]
    pub file: Option<LogFileConfig>,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: Output::default(),
            metrics_enabled: default_metrics_enabled(),
            file: None,
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize();
        Ok(cfg)
    }

    /// Clamps rate-limit values to their documented floors. The floors are
    /// hard minimums, not validation failures, so this never errors -- a
    /// misconfigured value is corrected and a warning is logged.
    pub fn validate_and_normalize(&mut self) {
        if self.rate_limit.burst_capacity < MIN_BURST {
            tracing::warn!(
                configured = self.rate_limit.burst_capacity,
                floor = MIN_BURST,
                "burst_capacity below floor, clamping"
            );
            self.rate_limit.burst_capacity = MIN_BURST;
        }
        if self.rate_limit.sustained_rate < MIN_RATE_PER_SEC {
            tracing::warn!(
                configured = self.rate_limit.sustained_rate,
                floor = MIN_RATE_PER_SEC,
                "sustained_rate below floor, clamping"
            );
            self.rate_limit.sustained_rate = MIN_RATE_PER_SEC;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config {
            rate_limit: RateLimitSection::default(),
            telemetry: TelemetrySection::default(),
        };
        assert_eq!(cfg.rate_limit.burst_capacity, 10.0);
        assert_eq!(cfg.rate_limit.sustained_rate, 2.0);
        assert_eq!(cfg.rate_limit.cleanup_interval_secs, 300);
        assert_eq!(cfg.rate_limit.session_max_age_secs, 3600);
    }

    #[test]
    fn out_of_range_values_are_clamped_not_rejected() {
        let mut cfg = Config {
            rate_limit: RateLimitSection {
                burst_capacity: 0.0,
                sustained_rate: 0.0,
                ..RateLimitSection::default()
            },
            telemetry: TelemetrySection::default(),
        };
        cfg.validate_and_normalize();
        assert_eq!(cfg.rate_limit.burst_capacity, MIN_BURST);
        assert_eq!(cfg.rate_limit.sustained_rate, MIN_RATE_PER_SEC);
    }
}
