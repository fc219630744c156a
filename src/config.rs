//! Configuration loading for DvaraNav
//!
//! The TOML layer mirrors each component's plain config struct; embeddings
//! load one file and hand each component its section.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DvaraError, Result};
use crate::executor::ExecutorConfig;
use crate::inference::InferenceConfig;
use crate::interaction::InteractionConfig;
use crate::planning::PlannerConfig;
use crate::registry::RegistryConfig;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DvaraConfig {
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub interaction: InteractionSection,
    #[serde(default)]
    pub inference: InferenceSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub executor: ExecutorSection,
}

/// Path planner settings
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerSection {
    /// Search iterations before a plan fails (default: 10000)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Added cost for edges through a barrier needing interaction
    #[serde(default = "default_interaction_penalty")]
    pub interaction_penalty: f32,
}

/// Interaction controller settings
#[derive(Clone, Debug, Deserialize)]
pub struct InteractionSection {
    /// Timeout for approach moves in milliseconds (default: 5000)
    #[serde(default = "default_approach_timeout_ms")]
    pub approach_timeout_ms: u64,

    /// Arrival tolerance for approach moves (default: 0.5)
    #[serde(default = "default_approach_tolerance")]
    pub approach_tolerance: f32,

    /// Verification polls per attempt (default: 10)
    #[serde(default = "default_verify_max_polls")]
    pub verify_max_polls: u32,

    /// Interval between verification polls in milliseconds (default: 100)
    #[serde(default = "default_verify_poll_interval_ms")]
    pub verify_poll_interval_ms: u64,

    /// Cooldown before re-toggling in milliseconds (default: 250)
    #[serde(default = "default_retry_cooldown_ms")]
    pub retry_cooldown_ms: u64,

    /// Re-describe the barrier on arrival instead of trusting the TTL
    #[serde(default = "default_verify_on_arrival")]
    pub verify_on_arrival: bool,
}

/// Passive inference settings
#[derive(Clone, Debug, Deserialize)]
pub struct InferenceSection {
    /// Assumed-open TTL in milliseconds (default: 5000)
    #[serde(default = "default_assumed_open_ttl_ms")]
    pub assumed_open_ttl_ms: u64,
}

/// Obstacle registry settings
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrySection {
    /// Interaction attempts before an obstacle is blocked (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Idle seconds after which attempt counters reset (default: 60)
    #[serde(default = "default_idle_attempt_reset_secs")]
    pub idle_attempt_reset_secs: u64,
}

/// Execution loop settings
#[derive(Clone, Debug, Deserialize)]
pub struct ExecutorSection {
    /// Timeout for a waypoint move in milliseconds (default: 10000)
    #[serde(default = "default_move_timeout_ms")]
    pub move_timeout_ms: u64,

    /// Arrival tolerance for intermediate waypoints (default: 0.5)
    #[serde(default = "default_waypoint_tolerance")]
    pub waypoint_tolerance: f32,

    /// Obstacle discovery sweep radius in cells (default: 32)
    #[serde(default = "default_discovery_radius")]
    pub discovery_radius: i32,

    /// Obstacles fetched per discovery sweep (default: 16)
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: usize,

    /// Replans allowed per request (default: 1)
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    /// Stationary waypoints tolerated before replanning (default: 3)
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,
}

// Default value functions
fn default_max_iterations() -> usize {
    10_000
}
fn default_interaction_penalty() -> f32 {
    2.0
}
fn default_approach_timeout_ms() -> u64 {
    5000
}
fn default_approach_tolerance() -> f32 {
    0.5
}
fn default_verify_max_polls() -> u32 {
    10
}
fn default_verify_poll_interval_ms() -> u64 {
    100
}
fn default_retry_cooldown_ms() -> u64 {
    250
}
fn default_verify_on_arrival() -> bool {
    false
}
fn default_assumed_open_ttl_ms() -> u64 {
    5000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_idle_attempt_reset_secs() -> u64 {
    60
}
fn default_move_timeout_ms() -> u64 {
    10_000
}
fn default_waypoint_tolerance() -> f32 {
    0.5
}
fn default_discovery_radius() -> i32 {
    32
}
fn default_discovery_limit() -> usize {
    16
}
fn default_max_replans() -> u32 {
    1
}
fn default_stall_limit() -> u32 {
    3
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            interaction_penalty: default_interaction_penalty(),
        }
    }
}

impl Default for InteractionSection {
    fn default() -> Self {
        Self {
            approach_timeout_ms: default_approach_timeout_ms(),
            approach_tolerance: default_approach_tolerance(),
            verify_max_polls: default_verify_max_polls(),
            verify_poll_interval_ms: default_verify_poll_interval_ms(),
            retry_cooldown_ms: default_retry_cooldown_ms(),
            verify_on_arrival: default_verify_on_arrival(),
        }
    }
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            assumed_open_ttl_ms: default_assumed_open_ttl_ms(),
        }
    }
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            idle_attempt_reset_secs: default_idle_attempt_reset_secs(),
        }
    }
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            move_timeout_ms: default_move_timeout_ms(),
            waypoint_tolerance: default_waypoint_tolerance(),
            discovery_radius: default_discovery_radius(),
            discovery_limit: default_discovery_limit(),
            max_replans: default_max_replans(),
            stall_limit: default_stall_limit(),
        }
    }
}

impl DvaraConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DvaraError::Config(format!("Failed to read config file: {}", e)))?;
        let config: DvaraConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            max_iterations: self.planner.max_iterations,
            interaction_penalty: self.planner.interaction_penalty,
        }
    }

    pub fn interaction_config(&self) -> InteractionConfig {
        InteractionConfig {
            approach_timeout: Duration::from_millis(self.interaction.approach_timeout_ms),
            approach_tolerance: self.interaction.approach_tolerance,
            verify_max_polls: self.interaction.verify_max_polls,
            verify_poll_interval: Duration::from_millis(self.interaction.verify_poll_interval_ms),
            retry_cooldown: Duration::from_millis(self.interaction.retry_cooldown_ms),
            verify_on_arrival: self.interaction.verify_on_arrival,
        }
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            assumed_open_ttl: Duration::from_millis(self.inference.assumed_open_ttl_ms),
            ..Default::default()
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_attempts: self.registry.max_attempts,
            idle_attempt_reset: Duration::from_secs(self.registry.idle_attempt_reset_secs),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            move_timeout: Duration::from_millis(self.executor.move_timeout_ms),
            waypoint_tolerance: self.executor.waypoint_tolerance,
            discovery_radius: self.executor.discovery_radius,
            discovery_limit: self.executor.discovery_limit,
            max_replans: self.executor.max_replans,
            stall_limit: self.executor.stall_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = DvaraConfig::default();
        assert_eq!(
            config.planner_config().max_iterations,
            PlannerConfig::default().max_iterations
        );
        assert_eq!(
            config.interaction_config().verify_max_polls,
            InteractionConfig::default().verify_max_polls
        );
        assert_eq!(
            config.registry_config().max_attempts,
            RegistryConfig::default().max_attempts
        );
        assert_eq!(
            config.inference_config().assumed_open_ttl,
            InferenceConfig::default().assumed_open_ttl
        );
        assert_eq!(
            config.executor_config().max_replans,
            ExecutorConfig::default().max_replans
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: DvaraConfig = toml::from_str(
            r#"
            [interaction]
            verify_max_polls = 4
            retry_cooldown_ms = 50

            [registry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.interaction.verify_max_polls, 4);
        assert_eq!(config.interaction.retry_cooldown_ms, 50);
        assert_eq!(config.registry.max_attempts, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.planner.max_iterations, 10_000);
        assert_eq!(config.executor.max_replans, 1);
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let result: Result<DvaraConfig> =
            toml::from_str("planner = 3").map_err(DvaraError::from);
        assert!(matches!(result, Err(DvaraError::Config(_))));
    }
}
