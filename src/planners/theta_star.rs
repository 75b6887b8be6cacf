//! Theta*: Forward A* plus any-angle parent relaxation. The shared
//! search loop is duplicated from `astar.rs` rather than inherited (there is
//! no base class to extend in Rust); the only behavioral difference is
//! `compute_cost`, which also tries the `parent(src) -> tgt` shortcut.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::aircraft::AircraftCapabilities;
use crate::environment::Environment;
use crate::interval_tree::{CostPolicy, Instant, RiskPolicy};
use crate::position::{Globe, Position};
use crate::trajectory::{PlanRevisionListener, RevisionListeners, Trajectory, TrajectoryPoint};
use crate::waypoint::{Waypoint, WaypointArena, WaypointId};

use super::{EnvironmentKind, OpenQueue, Planner};

const POSITION_EPS: f64 = 1e-3;

fn quantize(p: &Position, globe: &Globe) -> (i64, i64, i64) {
    let c = p.to_cartesian(globe);
    (
        (c[0] / POSITION_EPS).round() as i64,
        (c[1] / POSITION_EPS).round() as i64,
        (c[2] / POSITION_EPS).round() as i64,
    )
}

pub struct ThetaStar<'a> {
    pub environment: &'a dyn Environment,
    pub aircraft: &'a dyn AircraftCapabilities,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,

    arena: WaypointArena,
    index: HashMap<(i64, i64, i64), WaypointId>,
    listeners: RevisionListeners,
}

impl<'a> ThetaStar<'a> {
    pub fn new(environment: &'a dyn Environment, aircraft: &'a dyn AircraftCapabilities) -> Self {
        ThetaStar {
            environment,
            aircraft,
            cost_policy: CostPolicy::Average,
            risk_policy: RiskPolicy::Ignorance,
            arena: WaypointArena::new(),
            index: HashMap::new(),
            listeners: RevisionListeners::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn PlanRevisionListener>) {
        self.listeners.subscribe(listener);
    }

    fn heuristic(&self, p: &Position, goal: &Position) -> f64 {
        self.environment.normalized_distance(p, goal)
    }

    fn waypoint_id(&mut self, p: Position, goal: &Position) -> WaypointId {
        let key = quantize(&p, self.environment.globe());
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let mut wp = Waypoint::new(p);
        wp.h = self.heuristic(&p, goal);
        let id = self.arena.insert(wp);
        self.index.insert(key, id);
        id
    }

    fn candidate_targets(&self, source: &Position, goal: &Position) -> Vec<Position> {
        let globe = self.environment.globe();
        let mut targets = self.environment.neighbors(source);
        let already_present = targets.iter().any(|t| t.almost_equal(goal, globe, POSITION_EPS));
        let in_goal_region = self.environment.are_neighbors(source, goal)
            || targets.iter().any(|t| self.environment.are_neighbors(t, goal));
        if in_goal_region && !already_present {
            targets.push(*goal);
        }
        targets
    }

    /// Relax `tgt` through the ordinary edge `src -> tgt`.
    fn relax_direct(&mut self, src: WaypointId, tgt: WaypointId) {
        let src_pos = self.arena.get(src).position;
        let src_eto = self.arena.get(src).eto.unwrap();
        let src_g = self.arena.get(src).g;
        let tgt_pos = self.arena.get(tgt).position;

        if !self.aircraft.is_feasible(&src_pos, &tgt_pos) {
            return;
        }
        let eto = self.aircraft.get_estimated_time(&src_pos, &tgt_pos, src_eto);
        let step = self.environment.get_step_cost(
            &src_pos,
            &tgt_pos,
            src_eto,
            eto,
            self.cost_policy,
            self.risk_policy,
        );
        if step.is_infinite() {
            return;
        }
        let g = src_g + step;
        if g < self.arena.get(tgt).g {
            let w = self.arena.get_mut(tgt);
            w.g = g;
            w.parent = Some(src);
            w.eto = Some(eto);
        }
    }

    /// Relax `tgt` through the any-angle shortcut `parent(src) -> tgt`, if
    /// `src` has a parent. "Line of sight" is taken to mean exactly what
    /// `Environment::get_leg_cost` already means: a finite-cost, unobstructed
    /// direct leg — there is no separate ray-cast predicate in this engine.
    /// The shortcut is only attempted when the parent itself is reachable,
    /// so an unreachable parent can never win the relaxation below;
    /// `get_leg_cost` is the sole arbiter of visibility.
    fn relax_shortcut(&mut self, src: WaypointId, tgt: WaypointId) {
        let parent = match self.arena.get(src).parent {
            Some(p) => p,
            None => return,
        };
        let parent_pos = self.arena.get(parent).position;
        let parent_eto = self.arena.get(parent).eto.unwrap();
        let parent_g = self.arena.get(parent).g;
        let tgt_pos = self.arena.get(tgt).position;

        if !self.aircraft.is_feasible(&parent_pos, &tgt_pos) {
            return;
        }
        let eto = self.aircraft.get_estimated_time(&parent_pos, &tgt_pos, parent_eto);
        let leg = self.environment.get_leg_cost(
            &parent_pos,
            &tgt_pos,
            parent_eto,
            eto,
            self.cost_policy,
            self.risk_policy,
        );
        if leg.is_infinite() {
            return;
        }
        let g = parent_g + leg;
        if g < self.arena.get(tgt).g {
            let w = self.arena.get_mut(tgt);
            w.g = g;
            w.parent = Some(parent);
            w.eto = Some(eto);
        }
    }

    fn compute_cost(&mut self, src: WaypointId, tgt: WaypointId) {
        self.relax_direct(src, tgt);
        self.relax_shortcut(src, tgt);
    }

    fn build_trajectory(&self, goal: WaypointId, destination: &Position) -> Trajectory {
        let path = self.arena.reconstruct_path(goal);
        let mut points: Vec<TrajectoryPoint> = path
            .into_iter()
            .map(|id| {
                let w = self.arena.get(id);
                TrajectoryPoint {
                    position: w.position,
                    eto: w.eto.unwrap(),
                    accumulated_cost: w.g,
                    distance_to_go: self.environment.distance(&w.position, destination),
                    time_to_go_seconds: 0.0,
                }
            })
            .collect();
        if let Some(last_eto) = points.last().map(|p| p.eto) {
            for p in points.iter_mut() {
                p.time_to_go_seconds = (last_eto - p.eto).num_milliseconds() as f64 / 1000.0;
            }
        }
        Trajectory { points }
    }

    fn plan_single(&mut self, origin: Position, destination: Position, etd: Instant) -> Trajectory {
        self.arena.clear();
        self.index.clear();

        let start_id = self.waypoint_id(origin, &destination);
        {
            let w = self.arena.get_mut(start_id);
            w.g = 0.0;
            w.eto = Some(etd);
        }
        let goal_id = self.waypoint_id(destination, &destination);

        let mut open = OpenQueue::new();
        let mut closed: HashSet<WaypointId> = HashSet::new();
        open.push(start_id, self.arena.get(start_id).f());

        while let Some((current, priority)) = open.pop() {
            if priority.is_infinite() {
                break;
            }
            if current == goal_id {
                return self.build_trajectory(current, &destination);
            }
            if !closed.insert(current) {
                continue;
            }

            let source_pos = self.arena.get(current).position;
            for target_pos in self.candidate_targets(&source_pos, &destination) {
                let target_id = self.waypoint_id(target_pos, &destination);
                if closed.contains(&target_id) {
                    continue;
                }
                self.compute_cost(current, target_id);
                let f = self.arena.get(target_id).f();
                if f.is_finite() {
                    open.push(target_id, f);
                }
            }
        }

        Trajectory::empty()
    }
}

impl<'a> Planner for ThetaStar<'a> {
    fn plan_via(
        &mut self,
        origin: Position,
        destination: Position,
        via: &[Position],
        etd: Instant,
    ) -> Trajectory {
        let mut waypoints = Vec::with_capacity(via.len() + 2);
        waypoints.push(origin);
        waypoints.extend_from_slice(via);
        waypoints.push(destination);

        let mut points: Vec<TrajectoryPoint> = Vec::new();
        let mut leg_start = etd;
        let mut cost_offset = 0.0;

        for pair in waypoints.windows(2) {
            let leg = self.plan_single(pair[0], pair[1], leg_start);
            if leg.is_empty() {
                let trajectory = Trajectory::empty();
                self.listeners.publish(&trajectory);
                return trajectory;
            }
            let last = leg.points.last().cloned().unwrap();
            leg_start = last.eto;
            let skip_first = !points.is_empty();
            for (i, mut p) in leg.points.into_iter().enumerate() {
                if skip_first && i == 0 {
                    continue;
                }
                p.accumulated_cost += cost_offset;
                points.push(p);
            }
            cost_offset += last.accumulated_cost;
        }

        let trajectory = Trajectory { points };
        self.listeners.publish(&trajectory);
        trajectory
    }

    fn supports_environment(&self, kind: EnvironmentKind) -> bool {
        matches!(kind, EnvironmentKind::Grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::ConstantSpeedAircraft;
    use crate::environment::grid_env::PlanningGrid;
    use crate::geometry::grid::CubicGrid;
    use crate::geometry::Aabb3;
    use crate::planners::astar::ForwardAStar;
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.timestamp(0, 0)
    }

    fn grid_env() -> PlanningGrid {
        let root = Aabb3::new([1000.0, 1000.0, 1000.0], [1010.0, 1010.0, 1010.0]);
        let grid = CubicGrid::new(root, (10, 10, 10));
        PlanningGrid::new(grid, Globe::default(), now())
    }

    /// Any-angle shortcuts should never lengthen the path relative to
    /// grid-constrained A* on the same instance.
    #[test]
    fn theta_star_path_is_no_longer_than_grid_astar() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();

        let origin = Position::from_cartesian([1000.5, 1000.5, 1000.5], &Globe::default());
        let destination = Position::from_cartesian([1009.5, 1009.5, 1009.5], &Globe::default());

        let mut theta = ThetaStar::new(&env, &aircraft);
        let theta_plan = theta.plan(origin, destination, now());

        let mut astar = ForwardAStar::new(&env, &aircraft);
        let astar_plan = astar.plan(origin, destination, now());

        assert!(!theta_plan.is_empty());
        assert!(!astar_plan.is_empty());
        assert!(theta_plan.total_cost() <= astar_plan.total_cost() + 1e-9);
    }

    #[test]
    fn start_equals_goal_returns_single_point_trajectory() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = ThetaStar::new(&env, &aircraft);

        let p = Position::from_cartesian([1005.0, 1005.0, 1005.0], &Globe::default());
        let trajectory = planner.plan(p, p, now());

        assert_eq!(trajectory.points.len(), 1);
    }
}
