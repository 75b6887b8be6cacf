//! Environment abstraction. A tagged sum of two concrete
//! variants behind one trait, rather than runtime downcasting.

pub mod grid_env;
pub mod roadmap_env;

use crate::geometry::Obstacle;
use crate::interval_tree::{CostInterval, CostPolicy, Instant, RiskPolicy};
use crate::planners::EnvironmentKind;
use crate::position::{Globe, Position};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObstacleId(pub usize);

/// Combines a list of per-cell/per-interval costs under a step-cost
/// policy.
pub fn combine(costs: &[f64], policy: CostPolicy) -> f64 {
    if costs.is_empty() {
        return 0.0;
    }
    match policy {
        CostPolicy::Minimum => costs.iter().cloned().fold(f64::INFINITY, f64::min),
        CostPolicy::Maximum => costs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        CostPolicy::Average => costs.iter().sum::<f64>() / costs.len() as f64,
    }
}

/// Shared interface implemented by both `PlanningGrid` and
/// `PlanningRoadmap`.
pub trait Environment {
    fn kind(&self) -> EnvironmentKind;

    fn globe(&self) -> &Globe;
    fn set_globe(&mut self, globe: Globe);

    fn now(&self) -> Instant;
    fn set_time(&mut self, t: Instant);

    fn add_cost_interval(&mut self, interval: CostInterval);
    fn remove_cost_interval(&mut self, id: u64) -> bool;

    fn embed(&mut self, obstacle: Obstacle) -> ObstacleId;
    fn unembed(&mut self, id: ObstacleId) -> bool;
    fn unembed_all(&mut self);

    fn contains(&self, p: &Position) -> bool;

    fn distance(&self, a: &Position, b: &Position) -> f64 {
        a.distance(b, self.globe())
    }
    fn normalized_distance(&self, a: &Position, b: &Position) -> f64;

    fn neighbors(&self, p: &Position) -> Vec<Position>;
    fn are_neighbors(&self, a: &Position, b: &Position) -> bool;

    fn get_step_cost(
        &self,
        a: &Position,
        b: &Position,
        start: Instant,
        end: Instant,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64;

    fn get_leg_cost(
        &self,
        a: &Position,
        b: &Position,
        start: Instant,
        end: Instant,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64;

    /// Terrain/obstacle conflict test for a single point.
    fn check_conflict(&self, p: &Position) -> bool;

    /// Terrain/obstacle conflict test for a segment, honoring the aircraft's
    /// lateral separation radius.
    fn check_conflict_segment(&self, a: &Position, b: &Position, separation_radius: f64) -> bool;
}
