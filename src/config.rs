//! Flat key/value planner-property defaults: loadable
//! from a TOML file, or built programmatically. Callers read the fields they
//! need out of a shared `EngineConfig` and pass them into the relevant
//! planner's constructor or `set_quality_bounds`/`set_beta_bounds`, rather
//! than threading a dozen standalone arguments through by hand.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub goal_bias_percent: f64,
    pub step_epsilon: f64,
    pub max_distance: f64,
    pub max_neighbors: usize,
    pub goal_threshold: f64,

    pub min_quality: f64,
    pub max_quality: f64,
    pub quality_improvement: f64,

    pub initial_beta: f64,
    pub final_beta: f64,
    pub step_beta: f64,

    pub position_threshold: f64,
    pub online_lookahead_waypoints: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_iterations: 2000,
            goal_bias_percent: 5.0,
            step_epsilon: 50.0,
            max_distance: 200.0,
            max_neighbors: 10,
            goal_threshold: 10.0,

            min_quality: 1.0,
            max_quality: 2.5,
            quality_improvement: 0.1,

            initial_beta: 0.0,
            final_beta: 1.0,
            step_beta: 0.1,

            position_threshold: 10.0,
            online_lookahead_waypoints: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<EngineConfig> {
        toml::from_str(s).map_err(|e| PlannerError::InvalidParameter {
            name: "config",
            reason: e.to_string(),
        })
    }

    /// Validates the `AnytimePlanner` invariants: `0 <= min <= max <=
    /// 1`-scaled inflation bounds and `0 < step`.
    pub fn validate_anytime(&self) -> Result<()> {
        if !(self.min_quality <= self.max_quality) {
            return Err(PlannerError::InvalidParameter {
                name: "min_quality/max_quality",
                reason: "min_quality must be <= max_quality".into(),
            });
        }
        if self.quality_improvement <= 0.0 {
            return Err(PlannerError::InvalidParameter {
                name: "quality_improvement",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }

    pub fn validate_beta(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_beta) || !(0.0..=1.0).contains(&self.final_beta) {
            return Err(PlannerError::InvalidParameter {
                name: "initial_beta/final_beta",
                reason: "beta bounds must lie in [0,1]".into(),
            });
        }
        if self.initial_beta > self.final_beta {
            return Err(PlannerError::InvalidParameter {
                name: "initial_beta",
                reason: "initial_beta must be <= final_beta".into(),
            });
        }
        if self.step_beta <= 0.0 {
            return Err(PlannerError::InvalidParameter {
                name: "step_beta",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate_anytime().is_ok());
        assert!(cfg.validate_beta().is_ok());
    }

    #[test]
    fn invalid_inflation_bounds_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.min_quality = 3.0;
        cfg.max_quality = 1.0;
        assert!(cfg.validate_anytime().is_err());
    }

    #[test]
    fn from_toml_round_trips_overridden_fields() {
        let cfg = EngineConfig::from_toml_str("max_iterations = 500\ngoal_bias_percent = 10.0\n").unwrap();
        assert_eq!(cfg.max_iterations, 500);
        assert_eq!(cfg.goal_bias_percent, 10.0);
        assert_eq!(cfg.max_distance, EngineConfig::default().max_distance);
    }
}
