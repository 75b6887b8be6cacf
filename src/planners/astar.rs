//! Forward A*: priority-queue-driven best-first graph search,
//! grounded on the `osmgraphing` `GenericAstar`/`CostNode` pattern — a
//! `BinaryHeap` ordered so the lowest `f` wins, re-insertion instead of
//! `decrease_key`, reconstruction by walking `parent` links.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::aircraft::AircraftCapabilities;
use crate::environment::Environment;
use crate::interval_tree::{CostPolicy, Instant, RiskPolicy};
use crate::position::{Globe, Position};
use crate::trajectory::{PlanRevisionListener, RevisionListeners, Trajectory, TrajectoryPoint};
use crate::waypoint::{Waypoint, WaypointArena, WaypointId};

use super::{EnvironmentKind, OpenQueue, Planner};

/// Two positions closer than this (in the environment's Cartesian frame) are
/// the same graph node.
const POSITION_EPS: f64 = 1e-3;

fn quantize(p: &Position, globe: &Globe) -> (i64, i64, i64) {
    let c = p.to_cartesian(globe);
    (
        (c[0] / POSITION_EPS).round() as i64,
        (c[1] / POSITION_EPS).round() as i64,
        (c[2] / POSITION_EPS).round() as i64,
    )
}

/// Plain best-first search over `Environment::neighbors`. Supports only the
/// `Grid` variant: a `PlanningRoadmap` has no implicit adjacency (its
/// `neighbors()` is intentionally empty, see `roadmap_env.rs`) and is instead
/// searched directly over its explicit edge list by the PRM query phase.
pub struct ForwardAStar<'a> {
    pub environment: &'a dyn Environment,
    pub aircraft: &'a dyn AircraftCapabilities,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,

    arena: WaypointArena,
    index: HashMap<(i64, i64, i64), WaypointId>,
    listeners: RevisionListeners,
}

impl<'a> ForwardAStar<'a> {
    pub fn new(environment: &'a dyn Environment, aircraft: &'a dyn AircraftCapabilities) -> Self {
        ForwardAStar {
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

    /// Returns the existing waypoint at `p` (within `POSITION_EPS`) or
    /// creates a fresh one with `h` pinned to the distance to `goal`.
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

    /// Environment neighbours of `source`, plus `goal` itself when `source`
    /// sits in the goal region.
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

    /// Estimate the leg's ETO via the aircraft model, price it through the
    /// environment, and relax `tgt` through `src` if the result is strictly
    /// cheaper. Infeasible legs and infinite-risk steps are skipped, never
    /// surfaced as errors.
    fn compute_cost(&mut self, src: WaypointId, tgt: WaypointId) {
        let src_pos = self.arena.get(src).position;
        // `g` is only finite once `eto` has been set (by `plan_single`'s
        // start initialization or by an earlier `compute_cost` relaxation),
        // and callers only reach here for waypoints with finite `g`.
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

    /// Single-leg search between two positions; the shared core reused by
    /// `plan_via`'s leg-by-leg traversal and by `ThetaStar`, which overrides
    /// `compute_cost` with the any-angle shortcut.
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
                // Every remaining entry is at least this costly: open is
                // exhausted of reachable nodes; no plan exists.
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

impl<'a> Planner for ForwardAStar<'a> {
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
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.timestamp(0, 0)
    }

    fn grid_env() -> PlanningGrid {
        let root = Aabb3::new([1000.0, 1000.0, 1000.0], [1010.0, 1010.0, 1010.0]);
        let grid = CubicGrid::new(root, (10, 10, 10));
        PlanningGrid::new(grid, Globe::default(), now())
    }

    #[test]
    fn finds_monotone_cost_path_on_uniform_grid() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = ForwardAStar::new(&env, &aircraft);

        let origin = Position::from_cartesian([1000.5, 1000.5, 1000.5], &Globe::default());
        let destination = Position::from_cartesian([1009.5, 1009.5, 1009.5], &Globe::default());

        let trajectory = planner.plan(origin, destination, now());
        assert!(!trajectory.is_empty());

        let mut prev_cost = -1.0;
        let mut prev_eto = trajectory.points[0].eto;
        for p in &trajectory.points {
            assert!(p.accumulated_cost >= prev_cost);
            assert!(p.eto >= prev_eto);
            prev_cost = p.accumulated_cost;
            prev_eto = p.eto;
        }
        assert!(trajectory
            .points
            .last()
            .unwrap()
            .position
            .almost_equal(&destination, &Globe::default(), 1.0));
    }

    #[test]
    fn start_equals_goal_returns_single_point_trajectory() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = ForwardAStar::new(&env, &aircraft);

        let p = Position::from_cartesian([1005.0, 1005.0, 1005.0], &Globe::default());
        let trajectory = planner.plan(p, p, now());

        assert_eq!(trajectory.points.len(), 1);
        assert_eq!(trajectory.total_cost(), 0.0);
    }

    #[test]
    fn unreachable_goal_outside_environment_yields_no_plan() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = ForwardAStar::new(&env, &aircraft);

        let origin = Position::from_cartesian([1000.5, 1000.5, 1000.5], &Globe::default());
        let destination = Position::from_cartesian([50_000.0, 50_000.0, 50_000.0], &Globe::default());

        let trajectory = planner.plan(origin, destination, now());
        assert!(trajectory.is_empty());
    }

    #[test]
    fn supports_only_grid_environments() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let planner = ForwardAStar::new(&env, &aircraft);

        assert!(planner.supports_environment(EnvironmentKind::Grid));
        assert!(!planner.supports_environment(EnvironmentKind::Roadmap));
    }
}
