//! The aircraft performance model is an external collaborator; this
//! crate only depends on the narrow interface it exposes.

use chrono::Duration;

use crate::interval_tree::Instant;
use crate::position::{Globe, Position};

/// Reduced aircraft performance model: given a leg and a departure instant,
/// estimate time of arrival and whether the leg is flyable at all.
pub trait AircraftCapabilities {
    /// Estimated instant of arrival at `to`, departing `from` at `start`.
    fn get_estimated_time(&self, from: &Position, to: &Position, start: Instant) -> Instant;

    /// Whether the straight leg `from -> to` is within the aircraft's flight
    /// envelope (speed, climb/descent rate, turn radius). Infeasible legs are
    /// skipped by planners, never treated as a hard error.
    fn is_feasible(&self, from: &Position, to: &Position) -> bool;

    /// Lateral separation radius used by sampling-environment collision
    /// checks.
    fn separation_radius(&self) -> f64;
}

/// A constant-cruise-speed stand-in, adequate for exercising the planning
/// engine without a real performance model plugged in.
#[derive(Clone, Copy, Debug)]
pub struct ConstantSpeedAircraft {
    pub cruise_speed_mps: f64,
    pub max_climb_rate_mps: f64,
    pub separation_radius_m: f64,
    pub globe: Globe,
}

impl Default for ConstantSpeedAircraft {
    fn default() -> Self {
        ConstantSpeedAircraft {
            cruise_speed_mps: 50.0,
            max_climb_rate_mps: 10.0,
            separation_radius_m: 25.0,
            globe: Globe::default(),
        }
    }
}

impl AircraftCapabilities for ConstantSpeedAircraft {
    fn get_estimated_time(&self, from: &Position, to: &Position, start: Instant) -> Instant {
        let d = from.distance(to, &self.globe);
        let seconds = d / self.cruise_speed_mps;
        start + Duration::milliseconds((seconds * 1000.0) as i64)
    }

    fn is_feasible(&self, from: &Position, to: &Position) -> bool {
        let horizontal = from.distance(to, &self.globe).max(1e-9);
        let vertical = (to.elevation - from.elevation).abs();
        let time = horizontal / self.cruise_speed_mps;
        let achievable_climb = self.max_climb_rate_mps * time;
        vertical <= achievable_climb
    }

    fn separation_radius(&self) -> f64 {
        self.separation_radius_m
    }
}
