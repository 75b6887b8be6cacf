//! ARA*: anytime weighted-A*. A single run of `ForwardAStar`-style
//! search repeated with a monotonically shrinking inflation factor `epsilon`,
//! reusing the previous pass's `g`-values as a warm start and publishing a
//! trajectory after every pass.
//!
//! **Design decision**: the bounds are named `min_quality`/`max_quality`.
//! Since inflation only ever helps by starting large and shrinking towards 1,
//! epsilon runs from `max_quality` down to `min_quality` across passes.
//! `EngineConfig::validate_anytime` requires `min_quality <= max_quality`, so
//! this crate takes `max_quality` as the first pass's (fastest, least
//! optimal) epsilon and `min_quality` as the terminal (most optimal) epsilon,
//! consistent with the textbook ARA* algorithm this is grounded on.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::aircraft::AircraftCapabilities;
use crate::environment::Environment;
use crate::error::{PlannerError, Result};
use crate::interval_tree::{CostPolicy, Instant, RiskPolicy};
use crate::position::{Globe, Position};
use crate::trajectory::{PlanRevisionListener, RevisionListeners, Trajectory, TrajectoryPoint};
use crate::waypoint::{Waypoint, WaypointArena, WaypointId};

use super::{AnytimePlanner, EnvironmentKind, OpenQueue, Planner};

const POSITION_EPS: f64 = 1e-3;

fn quantize(p: &Position, globe: &Globe) -> (i64, i64, i64) {
    let c = p.to_cartesian(globe);
    (
        (c[0] / POSITION_EPS).round() as i64,
        (c[1] / POSITION_EPS).round() as i64,
        (c[2] / POSITION_EPS).round() as i64,
    )
}

pub struct ARAStar<'a> {
    pub environment: &'a dyn Environment,
    pub aircraft: &'a dyn AircraftCapabilities,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,
    /// Caller-supplied wall-clock cutoff, checked between passes.
    pub deadline: Option<Instant>,

    min_quality: f64,
    max_quality: f64,
    quality_improvement: f64,

    arena: WaypointArena,
    index: HashMap<(i64, i64, i64), WaypointId>,
    listeners: RevisionListeners,
}

impl<'a> ARAStar<'a> {
    pub fn new(environment: &'a dyn Environment, aircraft: &'a dyn AircraftCapabilities) -> Self {
        ARAStar {
            environment,
            aircraft,
            cost_policy: CostPolicy::Average,
            risk_policy: RiskPolicy::Ignorance,
            deadline: None,
            min_quality: 1.0,
            max_quality: 2.5,
            quality_improvement: 0.1,
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

    fn compute_cost(&mut self, src: WaypointId, tgt: WaypointId) {
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

    /// One weighted-A* pass with `f = g + epsilon * h`, warm-started from
    /// whatever `g`-values the arena already holds.
    fn pass(&mut self, goal_id: WaypointId, destination: &Position, epsilon: f64) -> Option<WaypointId> {
        let mut open = OpenQueue::new();
        let mut closed: HashSet<WaypointId> = HashSet::new();

        for (id, w) in self.arena.iter() {
            if w.g.is_finite() {
                open.push(id, w.g + epsilon * w.h);
            }
        }

        while let Some((current, priority)) = open.pop() {
            if priority.is_infinite() {
                break;
            }
            if current == goal_id {
                return Some(current);
            }
            if !closed.insert(current) {
                continue;
            }

            let source_pos = self.arena.get(current).position;
            for target_pos in self.candidate_targets(&source_pos, destination) {
                let target_id = self.waypoint_id(target_pos, destination);
                if closed.contains(&target_id) {
                    continue;
                }
                self.compute_cost(current, target_id);
                let w = self.arena.get(target_id);
                let f = w.g + epsilon * w.h;
                if f.is_finite() {
                    open.push(target_id, f);
                }
            }
        }
        None
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

        let mut epsilon = self.max_quality;
        let mut best = Trajectory::empty();

        loop {
            if let Some(deadline) = self.deadline {
                if etd >= deadline {
                    break;
                }
            }
            if let Some(goal) = self.pass(goal_id, &destination, epsilon) {
                best = self.build_trajectory(goal, &destination);
                self.listeners.publish(&best);
            } else {
                // No plan reachable at this inflation level; finer passes
                // over the same arena won't find one either.
                break;
            }
            if epsilon <= self.min_quality {
                break;
            }
            epsilon = (epsilon - self.quality_improvement).max(self.min_quality);
        }

        best
    }
}

impl<'a> Planner for ARAStar<'a> {
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

        Trajectory { points }
    }

    fn supports_environment(&self, kind: EnvironmentKind) -> bool {
        matches!(kind, EnvironmentKind::Grid)
    }
}

impl<'a> AnytimePlanner for ARAStar<'a> {
    fn min_quality(&self) -> f64 {
        self.min_quality
    }

    fn max_quality(&self) -> f64 {
        self.max_quality
    }

    fn quality_improvement(&self) -> f64 {
        self.quality_improvement
    }

    fn set_quality_bounds(&mut self, min: f64, max: f64, improvement: f64) -> Result<()> {
        if !(min <= max) {
            return Err(PlannerError::InvalidParameter {
                name: "min_quality/max_quality",
                reason: "min_quality must be <= max_quality".into(),
            });
        }
        if improvement <= 0.0 {
            return Err(PlannerError::InvalidParameter {
                name: "quality_improvement",
                reason: "must be > 0".into(),
            });
        }
        self.min_quality = min;
        self.max_quality = max;
        self.quality_improvement = improvement;
        Ok(())
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

    /// Successive anytime passes never raise the cost of the plan on a
    /// static, obstacle-free environment.
    #[test]
    fn successive_passes_do_not_increase_cost() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder(Rc<RefCell<Vec<f64>>>);
        impl PlanRevisionListener for Recorder {
            fn on_plan_revised(&mut self, trajectory: &Trajectory) {
                if !trajectory.is_empty() {
                    self.0.borrow_mut().push(trajectory.total_cost());
                }
            }
        }

        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = ARAStar::new(&env, &aircraft);
        planner.set_quality_bounds(1.0, 3.0, 0.5).unwrap();

        let costs = Rc::new(RefCell::new(Vec::new()));
        planner.subscribe(Box::new(Recorder(Rc::clone(&costs))));

        let origin = Position::from_cartesian([1000.5, 1000.5, 1000.5], &Globe::default());
        let destination = Position::from_cartesian([1009.5, 1009.5, 1009.5], &Globe::default());
        let trajectory = planner.plan(origin, destination, now());

        assert!(!trajectory.is_empty());
        let recorded = costs.borrow();
        assert!(!recorded.is_empty());
        for pair in recorded.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9);
        }
    }

    #[test]
    fn rejects_inverted_quality_bounds() {
        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = ARAStar::new(&env, &aircraft);
        assert!(planner.set_quality_bounds(3.0, 1.0, 0.1).is_err());
    }

    #[test]
    fn final_pass_matches_forward_astar_cost() {
        use crate::planners::astar::ForwardAStar;

        let env = grid_env();
        let aircraft = ConstantSpeedAircraft::default();
        let origin = Position::from_cartesian([1000.5, 1000.5, 1000.5], &Globe::default());
        let destination = Position::from_cartesian([1009.5, 1009.5, 1009.5], &Globe::default());

        let mut ara = ARAStar::new(&env, &aircraft);
        ara.set_quality_bounds(1.0, 2.0, 0.5).unwrap();
        let ara_plan = ara.plan(origin, destination, now());

        let mut astar = ForwardAStar::new(&env, &aircraft);
        let astar_plan = astar.plan(origin, destination, now());

        assert!(!ara_plan.is_empty());
        assert!((ara_plan.total_cost() - astar_plan.total_cost()).abs() < 1e-6);
    }
}
