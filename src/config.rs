//! Engine configuration (§6.4).
//!
//! Defaults match the spec table; `EngineConfig::from_env` layers environment
//! variables over them the way the teacher's `AppConfig::load()` layers
//! `config::Config` over defaults before returning a typed struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Uniform fairness delay `D` imposed between order acceptance and
    /// match eligibility, in milliseconds.
    pub fairness_delay_ms: u64,

    /// Heartbeat tick period, in milliseconds.
    pub heartbeat_tick_ms: u64,

    /// Initial available credit granted on first reference to a user.
    pub initial_balance: i64,

    /// User id assigned to orders missing one.
    pub default_user: String,

    /// Consecutive healthy telemetry updates required for automatic resume.
    pub healthy_streak_for_resume: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fairness_delay_ms: 3_000,
            heartbeat_tick_ms: 100,
            initial_balance: 1_000_000,
            default_user: "demo_user_1".to_string(),
            healthy_streak_for_resume: 3,
        }
    }
}

impl EngineConfig {
    pub fn fairness_delay(&self) -> Duration {
        Duration::from_millis(self.fairness_delay_ms)
    }

    pub fn heartbeat_tick(&self) -> Duration {
        Duration::from_millis(self.heartbeat_tick_ms)
    }

    /// Load defaults overlaid with `ENGINE_*` environment variables, e.g.
    /// `ENGINE_FAIRNESS_DELAY_MS=0`. Falls back to pure defaults if no
    /// environment overrides are present or parseable.
    pub fn from_env() -> Self {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default()).unwrap_or_default())
            .add_source(config::Environment::with_prefix("ENGINE"));

        match builder.build() {
            Ok(cfg) => cfg.try_deserialize().unwrap_or_default(),
            Err(_) => EngineConfig::default(),
        }
    }
}
