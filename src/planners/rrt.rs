//! RRT family: `RRT`, `HRRT`, `ARRT`, `RRTStar`, `DRRT`, `ADRRT`. One
//! tree-growth core parameterized by `RrtVariant`, grounded on `oxmpl`'s RRT
//! shape (sample, nearest, steer, collision-check, insert) but re-derived
//! for position-indexed waypoints with ETO rather than arbitrary
//! state/control dynamics, and reusing this crate's `WaypointArena` for
//! parent-link storage instead of a second tree type.

use std::collections::{HashMap, HashSet};

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::aircraft::AircraftCapabilities;
use crate::environment::roadmap_env::PlanningRoadmap;
use crate::environment::Environment;
use crate::error::{PlannerError, Result};
use crate::interval_tree::{CostPolicy, Instant, RiskPolicy};
use crate::position::Position;
use crate::trajectory::{PlanRevisionListener, RevisionListeners, Trajectory, TrajectoryPoint};
use crate::waypoint::{Waypoint, WaypointArena, WaypointId};

use super::{AnytimePlanner, EnvironmentKind, Planner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RrtVariant {
    /// Basic RRT.
    Plain,
    /// Heuristic-biased nearest selection over a k-nearest candidate set.
    Heuristic,
    /// Anytime RRT: shrinking cost bound `cmax` between solutions.
    Anytime,
    /// RRT*: rewires nearby nodes through every newly inserted one.
    Star,
    /// Repairs the tree by invalidating subtrees under newly conflicting
    /// edges, then regrows.
    Dynamic,
    /// `Dynamic` plus `Anytime`'s cost-bound improvement.
    AnytimeDynamic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionKind {
    Linear,
    /// Rejects a step the aircraft cannot fly.
    Feasible,
}

pub struct Rrt<'a> {
    pub roadmap: &'a mut PlanningRoadmap,
    pub aircraft: &'a dyn AircraftCapabilities,
    pub variant: RrtVariant,
    pub extension: ExtensionKind,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,

    pub max_iterations: u32,
    pub goal_bias_percent: f64,
    pub step_epsilon: f64,
    pub goal_threshold: f64,
    /// k for `Heuristic`'s candidate set, and the rewire-neighbor count for
    /// `Star`.
    pub max_neighbors: usize,
    pub prob_floor: f64,

    min_quality: f64,
    max_quality: f64,
    quality_improvement: f64,
    current_cmax: Option<f64>,

    arena: WaypointArena,
    rng: ThreadRng,
    listeners: RevisionListeners,
}

impl<'a> Rrt<'a> {
    pub fn new(roadmap: &'a mut PlanningRoadmap, aircraft: &'a dyn AircraftCapabilities, variant: RrtVariant) -> Self {
        Rrt {
            roadmap,
            aircraft,
            variant,
            extension: ExtensionKind::Linear,
            cost_policy: CostPolicy::Average,
            risk_policy: RiskPolicy::Ignorance,
            max_iterations: 2000,
            goal_bias_percent: 5.0,
            step_epsilon: 50.0,
            goal_threshold: 10.0,
            max_neighbors: 10,
            prob_floor: 0.1,
            min_quality: 1.0,
            max_quality: 2.5,
            quality_improvement: 0.1,
            current_cmax: None,
            arena: WaypointArena::new(),
            rng: rand::thread_rng(),
            listeners: RevisionListeners::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn PlanRevisionListener>) {
        self.listeners.subscribe(listener);
    }

    /// Current tree root, present once `plan()` has been called at least
    /// once; needed by `repair` to know which node `invalidate` must spare.
    pub fn root(&self) -> Option<WaypointId> {
        self.arena.iter().find(|(_, w)| w.parent.is_none()).map(|(id, _)| id)
    }

    fn sample(&mut self, goal: &Position) -> Position {
        let roll: f64 = self.rng.gen_range(0.0, 100.0);
        if roll < self.goal_bias_percent {
            *goal
        } else {
            self.roadmap.sample_random_position(&mut self.rng)
        }
    }

    fn nearest(&self, sample: &Position) -> WaypointId {
        self.arena
            .iter()
            .min_by(|(_, a), (_, b)| {
                self.roadmap
                    .normalized_distance(&a.position, sample)
                    .partial_cmp(&self.roadmap.normalized_distance(&b.position, sample))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| id)
            .expect("tree always has at least the root")
    }

    fn k_nearest(&self, sample: &Position, k: usize) -> Vec<WaypointId> {
        let mut ids: Vec<WaypointId> = self.arena.iter().map(|(id, _)| id).collect();
        ids.sort_by(|&a, &b| {
            let da = self.roadmap.normalized_distance(&self.arena.get(a).position, sample);
            let db = self.roadmap.normalized_distance(&self.arena.get(b).position, sample);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        ids.truncate(k.max(1));
        ids
    }

    /// HRRT: bias the candidate chosen among the k-nearest by a quality
    /// score `q(wp) = 1 - (f(wp) - f_min)/(f_max - f_min)`, accepting a
    /// candidate with probability `max(q, prob_floor)`.
    fn pick_parent(&mut self, sample: &Position) -> WaypointId {
        if !matches!(self.variant, RrtVariant::Heuristic) {
            return self.nearest(sample);
        }
        let candidates = self.k_nearest(sample, self.max_neighbors);
        let fs: Vec<f64> = candidates.iter().map(|&id| self.arena.get(id).f()).collect();
        let f_min = fs.iter().cloned().fold(f64::INFINITY, f64::min);
        let f_max = fs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = (f_max - f_min).max(1e-9);

        for &id in &candidates {
            let f = self.arena.get(id).f();
            let q = 1.0 - (f - f_min) / span;
            let threshold = q.max(self.prob_floor);
            let roll: f64 = self.rng.gen_range(0.0, 1.0);
            if roll <= threshold {
                return id;
            }
        }
        candidates[0]
    }

    /// Move from `from` towards `toward`, clamped to `step_epsilon` (Cartesian
    /// lerp, same frame the environment's distance/collision math uses).
    fn steer(&self, from: &Position, toward: &Position) -> Position {
        let globe = self.roadmap.globe();
        let d = from.distance(toward, globe);
        if d <= self.step_epsilon {
            *toward
        } else {
            from.lerp(toward, self.step_epsilon / d)
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
                    distance_to_go: self.roadmap.distance(&w.position, destination),
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

    /// RRT*'s rewire step: for every existing node within the rewire
    /// radius of `new_id`, switch its parent to `new_id` if that strictly
    /// lowers its accumulated cost.
    fn rewire(&mut self, new_id: WaypointId) {
        let new_pos = self.arena.get(new_id).position;
        let new_g = self.arena.get(new_id).g;
        let new_eto = self.arena.get(new_id).eto.unwrap();
        let radius = self.step_epsilon * 2.0;

        let candidates: Vec<WaypointId> = self
            .arena
            .iter()
            .filter(|(id, _)| *id != new_id)
            .filter(|(_, w)| self.roadmap.distance(&w.position, &new_pos) <= radius)
            .map(|(id, _)| id)
            .collect();

        for n in candidates {
            let n_pos = self.arena.get(n).position;
            if !self.aircraft.is_feasible(&new_pos, &n_pos) {
                continue;
            }
            if self
                .roadmap
                .check_conflict_segment(&new_pos, &n_pos, self.aircraft.separation_radius())
            {
                continue;
            }
            let arrival = self.aircraft.get_estimated_time(&new_pos, &n_pos, new_eto);
            let step = self
                .roadmap
                .get_leg_cost(&new_pos, &n_pos, new_eto, arrival, self.cost_policy, self.risk_policy);
            if step.is_infinite() {
                continue;
            }
            let candidate_g = new_g + step;
            if candidate_g < self.arena.get(n).g {
                let w = self.arena.get_mut(n);
                w.parent = Some(new_id);
                w.g = candidate_g;
                w.eto = Some(arrival);
            }
        }
    }

    fn children_map(&self) -> HashMap<WaypointId, Vec<WaypointId>> {
        let mut m: HashMap<WaypointId, Vec<WaypointId>> = HashMap::new();
        for (id, w) in self.arena.iter() {
            if let Some(p) = w.parent {
                m.entry(p).or_insert_with(Vec::new).push(id);
            }
        }
        m
    }

    /// DRRT/ADRRT: invalidate every subtree rooted at a waypoint whose
    /// incoming edge is now in conflict with the (possibly updated)
    /// environment, sparing `root`.
    pub fn invalidate_on_obstacle(&mut self, root: WaypointId) {
        let children = self.children_map();
        let mut newly_invalid = Vec::new();
        for (id, w) in self.arena.iter() {
            if id == root {
                continue;
            }
            if let Some(p) = w.parent {
                let pp = self.arena.get(p).position;
                if self
                    .roadmap
                    .check_conflict_segment(&pp, &w.position, self.aircraft.separation_radius())
                {
                    newly_invalid.push(id);
                }
            }
        }

        let mut stack = newly_invalid;
        let mut dead: HashSet<WaypointId> = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == root || !dead.insert(id) {
                continue;
            }
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().cloned());
            }
        }

        for id in dead {
            let w = self.arena.get_mut(id);
            w.parent = None;
            w.g = f64::INFINITY;
            w.eto = None;
        }
    }

    /// Regrows the tree after `invalidate_on_obstacle` by resuming sampling
    /// from its surviving nodes.
    pub fn repair(&mut self, destination: Position, etd: Instant) -> Trajectory {
        let root = match self.root() {
            Some(r) => r,
            None => return Trajectory::empty(),
        };
        self.invalidate_on_obstacle(root);
        self.grow(root, destination, etd)
    }

    fn grow(&mut self, _root: WaypointId, destination: Position, etd: Instant) -> Trajectory {
        let mut best_cost = f64::INFINITY;
        let mut best_goal: Option<WaypointId> = None;

        for (id, w) in self.arena.iter() {
            if w.g.is_finite() && self.roadmap.distance(&w.position, &destination) < self.goal_threshold {
                best_cost = w.g;
                best_goal = Some(id);
            }
        }

        let anytime = matches!(self.variant, RrtVariant::Anytime | RrtVariant::AnytimeDynamic);
        if anytime {
            self.current_cmax = if best_cost.is_finite() { Some(best_cost) } else { None };
        }

        let mut iter = 0;
        while iter < self.max_iterations {
            iter += 1;
            let sample = self.sample(&destination);
            let near = self.pick_parent(&sample);
            let near_pos = self.arena.get(near).position;
            let near_g = self.arena.get(near).g;
            if !near_g.is_finite() {
                continue;
            }
            let new_pos = self.steer(&near_pos, &sample);

            if matches!(self.extension, ExtensionKind::Feasible) && !self.aircraft.is_feasible(&near_pos, &new_pos) {
                continue;
            }
            if self.roadmap.check_conflict(&new_pos) {
                continue;
            }
            if self
                .roadmap
                .check_conflict_segment(&near_pos, &new_pos, self.aircraft.separation_radius())
            {
                continue;
            }

            if anytime {
                if let Some(bound) = self.current_cmax {
                    let h = self.roadmap.normalized_distance(&new_pos, &destination);
                    let optimistic = near_g + self.roadmap.distance(&near_pos, &new_pos) + h;
                    if optimistic >= bound {
                        continue;
                    }
                }
            }

            let near_eto = self.arena.get(near).eto.unwrap();
            let arrival = self.aircraft.get_estimated_time(&near_pos, &new_pos, near_eto);
            let step = self
                .roadmap
                .get_leg_cost(&near_pos, &new_pos, near_eto, arrival, self.cost_policy, self.risk_policy);
            if step.is_infinite() {
                continue;
            }

            let mut new_wp = Waypoint::new(new_pos);
            new_wp.parent = Some(near);
            new_wp.g = near_g + step;
            new_wp.eto = Some(arrival);
            new_wp.h = self.roadmap.normalized_distance(&new_pos, &destination);
            let new_id = self.arena.insert(new_wp);

            if matches!(self.variant, RrtVariant::Star | RrtVariant::Dynamic | RrtVariant::AnytimeDynamic) {
                self.rewire(new_id);
            }

            if self.roadmap.distance(&new_pos, &destination) < self.goal_threshold {
                let g = self.arena.get(new_id).g;
                if g < best_cost {
                    best_cost = g;
                    best_goal = Some(new_id);
                    let trajectory = self.build_trajectory(new_id, &destination);
                    self.listeners.publish(&trajectory);
                    if anytime {
                        self.current_cmax = Some(g);
                    } else if !matches!(self.variant, RrtVariant::Star) {
                        return trajectory;
                    }
                }
            }
        }
        let _ = etd;

        match best_goal {
            Some(id) => self.build_trajectory(id, &destination),
            None => Trajectory::empty(),
        }
    }

    fn plan_single(&mut self, origin: Position, destination: Position, etd: Instant) -> Trajectory {
        self.arena.clear();
        self.current_cmax = None;

        let mut root_wp = Waypoint::new(origin);
        root_wp.g = 0.0;
        root_wp.eto = Some(etd);
        root_wp.h = self.roadmap.normalized_distance(&origin, &destination);
        let root = self.arena.insert(root_wp);

        self.grow(root, destination, etd)
    }
}

impl<'a> Planner for Rrt<'a> {
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
                return Trajectory::empty();
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
        matches!(kind, EnvironmentKind::Roadmap)
    }
}

impl<'a> AnytimePlanner for Rrt<'a> {
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
    use crate::geometry::Aabb3;
    use crate::position::Globe;
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.timestamp(0, 0)
    }

    fn roadmap() -> PlanningRoadmap {
        let bound = Aabb3::new([0.0, 0.0, 0.0], [1000.0, 1000.0, 1000.0]);
        PlanningRoadmap::new(bound, Globe::default(), now())
    }

    /// RRT with a goal bias of 5%, step epsilon 50, and 2000 max iterations
    /// on an obstacle-free 1000^3 box succeeds on the large majority of runs.
    #[test]
    fn rrt_finds_a_plan_on_an_obstacle_free_box() {
        let globe = Globe::default();
        let origin = Position::from_cartesian([10.0, 10.0, 10.0], &globe);
        let destination = Position::from_cartesian([990.0, 990.0, 990.0], &globe);

        let mut successes = 0;
        for _ in 0..20 {
            let mut roadmap = roadmap();
            let aircraft = ConstantSpeedAircraft::default();
            let mut rrt = Rrt::new(&mut roadmap, &aircraft, RrtVariant::Plain);
            rrt.max_iterations = 2000;
            rrt.goal_bias_percent = 5.0;
            rrt.step_epsilon = 50.0;
            rrt.goal_threshold = 10.0;

            let trajectory = rrt.plan(origin, destination, now());
            if !trajectory.is_empty() {
                successes += 1;
            }
        }
        assert!(successes >= 18, "expected >=90% success, got {}/20", successes);
    }

    #[test]
    fn rrt_star_rewire_never_raises_recorded_cost() {
        let globe = Globe::default();
        let origin = Position::from_cartesian([10.0, 10.0, 10.0], &globe);
        let destination = Position::from_cartesian([500.0, 500.0, 500.0], &globe);

        let mut roadmap = roadmap();
        let aircraft = ConstantSpeedAircraft::default();
        let mut rrt = Rrt::new(&mut roadmap, &aircraft, RrtVariant::Star);
        rrt.max_iterations = 1500;
        rrt.goal_threshold = 15.0;

        let trajectory = rrt.plan(origin, destination, now());
        assert!(!trajectory.is_empty());

        let mut prev = -1.0;
        for p in &trajectory.points {
            assert!(p.accumulated_cost >= prev);
            prev = p.accumulated_cost;
        }
    }

    #[test]
    fn invalidate_on_obstacle_clears_descendants_not_root() {
        let mut roadmap = roadmap();
        let aircraft = ConstantSpeedAircraft::default();
        let mut rrt = Rrt::new(&mut roadmap, &aircraft, RrtVariant::Dynamic);

        let globe = Globe::default();
        let root_wp = Waypoint::new(Position::from_cartesian([0.0, 0.0, 0.0], &globe));
        let root = rrt.arena.insert(root_wp);
        rrt.arena.get_mut(root).g = 0.0;
        rrt.arena.get_mut(root).eto = Some(now());

        let mut child_wp = Waypoint::new(Position::from_cartesian([10.0, 0.0, 0.0], &globe));
        child_wp.parent = Some(root);
        child_wp.g = 10.0;
        child_wp.eto = Some(now());
        let child = rrt.arena.insert(child_wp);

        let mut grandchild_wp = Waypoint::new(Position::from_cartesian([20.0, 0.0, 0.0], &globe));
        grandchild_wp.parent = Some(child);
        grandchild_wp.g = 20.0;
        grandchild_wp.eto = Some(now());
        let grandchild = rrt.arena.insert(grandchild_wp);

        // No obstacles embedded: nothing should actually invalidate, but the
        // root itself must never be touched by the pass regardless.
        rrt.invalidate_on_obstacle(root);
        assert_eq!(rrt.arena.get(root).g, 0.0);
        assert!(rrt.arena.get(child).g.is_finite());
        assert!(rrt.arena.get(grandchild).g.is_finite());
    }
}
