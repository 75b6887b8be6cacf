//! FAPRM / FADPRM / OFADPRM / RADPRM: roadmap growth interleaved with a
//! density-weighted open queue, anytime
//! `beta` inflation, online start relocation, and correction propagation.
//! Grounded on the same arena/`WaypointId` shape as `astar.rs`/`prm.rs`, but
//! the roadmap it searches is grown lazily by its own `expand()` rather than
//! pre-built (`prm.rs`) or implicit (`astar.rs`'s `Environment::neighbors`).
//! `Waypoint::density`/`beta`/`search` and `Edge` exist in `waypoint.rs`
//! specifically for this family; this is their only user in the crate.

use std::collections::HashMap;

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::aircraft::AircraftCapabilities;
use crate::datalink::AircraftLink;
use crate::environment::roadmap_env::PlanningRoadmap;
use crate::environment::Environment;
use crate::interval_tree::{CostPolicy, Instant, IntervalTree, RiskPolicy};
use crate::position::{Globe, Position};
use crate::trajectory::{PlanRevisionListener, RevisionListeners, Trajectory, TrajectoryPoint};
use crate::waypoint::{Edge, Waypoint, WaypointArena, WaypointId, WaypointSnapshot};

use super::{AnytimePlanner, EnvironmentKind, OnlinePlanner, OpenQueue, Planner};

const POSITION_EPS: f64 = 1e-3;

fn quantize(p: &Position, globe: &Globe) -> (i64, i64, i64) {
    let c = p.to_cartesian(globe);
    (
        (c[0] / POSITION_EPS).round() as i64,
        (c[1] / POSITION_EPS).round() as i64,
        (c[2] / POSITION_EPS).round() as i64,
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaprmVariant {
    /// The base algorithm: density-weighted anytime roadmap search, no
    /// repair, no online relocation.
    Static,
    /// Adds `propagate_corrections` repair when an edge is invalidated.
    Dynamic,
    /// `Dynamic` plus `update_start`'s online cycle.
    OnlineDynamic,
    /// **Design decision**: taken here as `Dynamic`'s repair behavior paired
    /// with a stricter default `RiskPolicy::Avoidance`, since this is the one
    /// axis of this engine already named "risk" and not yet tied to a PRM
    /// variant.
    Risk,
}

pub struct Faprm<'a> {
    pub roadmap: &'a mut PlanningRoadmap,
    pub aircraft: &'a dyn AircraftCapabilities,
    pub variant: FaprmVariant,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,

    pub max_iterations: u32,
    pub goal_bias_percent: f64,
    pub max_distance: f64,
    pub max_neighbors: usize,
    pub goal_threshold: f64,

    initial_beta: f64,
    final_beta: f64,
    step_beta: f64,
    beta: f64,

    online: bool,
    position_threshold: f64,
    pub online_lookahead_waypoints: usize,
    last_known_position: Option<Position>,

    origin: Position,
    arena: WaypointArena,
    index: HashMap<(i64, i64, i64), WaypointId>,
    edges: Vec<Edge>,
    start_id: Option<WaypointId>,
    goal_id: Option<WaypointId>,

    rng: ThreadRng,
    listeners: RevisionListeners,
}

impl<'a> Faprm<'a> {
    pub fn new(roadmap: &'a mut PlanningRoadmap, aircraft: &'a dyn AircraftCapabilities, variant: FaprmVariant) -> Self {
        let risk_policy = if matches!(variant, FaprmVariant::Risk) {
            RiskPolicy::Avoidance
        } else {
            RiskPolicy::Ignorance
        };
        Faprm {
            roadmap,
            aircraft,
            variant,
            cost_policy: CostPolicy::Average,
            risk_policy,
            max_iterations: 2000,
            goal_bias_percent: 10.0,
            max_distance: 200.0,
            max_neighbors: 10,
            goal_threshold: 10.0,
            initial_beta: 0.0,
            final_beta: 1.0,
            step_beta: 0.1,
            beta: 0.0,
            online: false,
            position_threshold: 10.0,
            online_lookahead_waypoints: 3,
            last_known_position: None,
            origin: Position::new(0.0, 0.0, 0.0),
            arena: WaypointArena::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            start_id: None,
            goal_id: None,
            rng: rand::thread_rng(),
            listeners: RevisionListeners::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn PlanRevisionListener>) {
        self.listeners.subscribe(listener);
    }

    pub fn set_beta_bounds(&mut self, initial: f64, final_: f64, step: f64) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&initial) || !(0.0..=1.0).contains(&final_) {
            return Err(crate::error::PlannerError::InvalidParameter {
                name: "initial_beta/final_beta",
                reason: "beta bounds must lie in [0,1]".into(),
            });
        }
        if initial > final_ {
            return Err(crate::error::PlannerError::InvalidParameter {
                name: "initial_beta",
                reason: "initial_beta must be <= final_beta".into(),
            });
        }
        if step <= 0.0 {
            return Err(crate::error::PlannerError::InvalidParameter {
                name: "step_beta",
                reason: "must be > 0".into(),
            });
        }
        self.initial_beta = initial;
        self.final_beta = final_;
        self.step_beta = step;
        Ok(())
    }

    fn heuristic(&self, p: &Position, goal: &Position) -> f64 {
        self.roadmap.normalized_distance(p, goal)
    }

    fn waypoint_id(&mut self, p: Position, goal: &Position) -> WaypointId {
        let key = quantize(&p, self.roadmap.globe());
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let mut wp = Waypoint::new(p);
        wp.h = self.heuristic(&p, goal);
        wp.beta = self.beta;
        let id = self.arena.insert(wp);
        self.index.insert(key, id);
        id
    }

    /// Priority key: `(1-β)/max(density,1) + β·f(w)` with `f = (g+h)/2`,
    /// lower wins (`OpenQueue` is already min-first, so no inversion needed
    /// beyond that). Ties are nudged towards higher `h` by a sub-epsilon
    /// perturbation rather than changing the shared queue's comparator.
    fn key(&self, id: WaypointId) -> f64 {
        let w = self.arena.get(id);
        let f = (w.g + w.h) / 2.0;
        let density_term = (1.0 - self.beta) / (w.density.max(1) as f64);
        density_term + self.beta * f - 1e-9 * w.h
    }

    fn neighbors_of(&self, id: WaypointId) -> Vec<WaypointId> {
        self.edges
            .iter()
            .filter_map(|e| {
                if e.from == id {
                    Some(e.to)
                } else if e.to == id {
                    Some(e.from)
                } else {
                    None
                }
            })
            .collect()
    }

    fn leg_candidate(&self, src: WaypointId, tgt: WaypointId) -> Option<(f64, Instant)> {
        let src_g = self.arena.get(src).g;
        if !src_g.is_finite() {
            return None;
        }
        let src_pos = self.arena.get(src).position;
        let src_eto = self.arena.get(src).eto?;
        let tgt_pos = self.arena.get(tgt).position;

        if !self.aircraft.is_feasible(&src_pos, &tgt_pos) {
            return None;
        }
        let arrival = self.aircraft.get_estimated_time(&src_pos, &tgt_pos, src_eto);
        let raw = self
            .roadmap
            .get_leg_cost(&src_pos, &tgt_pos, src_eto, arrival, self.cost_policy, self.risk_policy);
        if raw.is_infinite() {
            return None;
        }
        let desirability = self.roadmap.edge_desirability(&src_pos, &tgt_pos);
        let edge = Edge {
            from: src,
            to: tgt,
            cost_intervals: IntervalTree::new(),
            desirability,
            lambda: 0.5,
        };
        Some((src_g + edge.blended_cost(raw), arrival))
    }

    /// Relax `tgt` through `src`; returns whether it improved.
    fn relax(&mut self, src: WaypointId, tgt: WaypointId) -> bool {
        if let Some((g, arrival)) = self.leg_candidate(src, tgt) {
            if g < self.arena.get(tgt).g {
                let w = self.arena.get_mut(tgt);
                w.g = g;
                w.parent = Some(src);
                w.eto = Some(arrival);
                return true;
            }
        }
        false
    }

    fn add_edge(&mut self, a: WaypointId, b: WaypointId, desirability: f64) {
        self.edges.push(Edge {
            from: a,
            to: b,
            cost_intervals: IntervalTree::new(),
            desirability,
            lambda: 0.5,
        });
    }

    fn density_within(&self, id: WaypointId) -> u32 {
        let pos = self.arena.get(id).position;
        self.arena
            .iter()
            .filter(|&(other, w)| other != id && self.roadmap.distance(&w.position, &pos) < self.max_distance)
            .count() as u32
    }

    /// Recomputes `density` for `id` and every waypoint within `max_distance`
    /// of it.
    fn refresh_density_near(&mut self, id: WaypointId) {
        let pos = self.arena.get(id).position;
        let nearby: Vec<WaypointId> = self
            .arena
            .iter()
            .filter(|(_, w)| self.roadmap.distance(&w.position, &pos) < self.max_distance)
            .map(|(i, _)| i)
            .collect();
        for n in nearby {
            let d = self.density_within(n);
            self.arena.get_mut(n).density = d;
        }
        let d = self.density_within(id);
        self.arena.get_mut(id).density = d;
    }

    /// Bias-sample towards the goal or within a cube around `source`, reject
    /// infeasible/conflicting draws, wire the new waypoint into the growing
    /// roadmap.
    fn expand(&mut self, source: WaypointId, destination: &Position) -> Option<WaypointId> {
        let source_pos = self.arena.get(source).position;
        let globe = *self.roadmap.globe();

        let mut candidate = None;
        for _ in 0..20 {
            let roll: f64 = self.rng.gen_range(0.0, 100.0);
            let draw = if roll < self.goal_bias_percent {
                let d = source_pos.distance(destination, &globe);
                if d <= self.max_distance {
                    *destination
                } else {
                    source_pos.lerp(destination, self.max_distance / d)
                }
            } else {
                let half = self.max_distance / 3.0_f64.sqrt();
                let base = source_pos.to_cartesian(&globe);
                let x = base[0] + self.rng.gen_range(-half, half);
                let y = base[1] + self.rng.gen_range(-half, half);
                let z = base[2] + self.rng.gen_range(-half, half);
                Position::from_cartesian([x, y, z], &globe)
            };

            if !self.roadmap.contains(&draw) {
                continue;
            }
            if self.roadmap.check_conflict(&draw) {
                continue;
            }
            if !self.aircraft.is_feasible(&source_pos, &draw) {
                continue;
            }
            candidate = Some(draw);
            break;
        }
        let draw = candidate?;

        let new_id = self.waypoint_id(draw, destination);
        let desirability = self.roadmap.edge_desirability(&source_pos, &draw);
        self.add_edge(source, new_id, desirability);

        let neighbor_candidates: Vec<WaypointId> = {
            let mut ids: Vec<WaypointId> = self.arena.iter().map(|(id, _)| id).collect();
            ids.sort_by(|&a, &b| {
                let da = self.roadmap.distance(&self.arena.get(a).position, &draw);
                let db = self.roadmap.distance(&self.arena.get(b).position, &draw);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
            ids
        };

        let mut connected = 0;
        for n in neighbor_candidates {
            if connected >= self.max_neighbors {
                break;
            }
            if n == new_id || n == source {
                continue;
            }
            let n_pos = self.arena.get(n).position;
            if self.roadmap.distance(&draw, &n_pos) > self.max_distance {
                continue;
            }
            if self
                .roadmap
                .check_conflict_segment(&draw, &n_pos, self.aircraft.separation_radius())
            {
                continue;
            }
            let d = self.roadmap.edge_desirability(&draw, &n_pos);
            self.add_edge(new_id, n, d);
            connected += 1;
        }

        self.refresh_density_near(new_id);
        Some(new_id)
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

    /// Pop best-key `source`; try a direct `source -> goal` shortcut first,
    /// else grow the roadmap with `expand`; re-evaluate `source`'s
    /// neighbours before closing it.
    fn compute_or_improve_path(&mut self, destination: Position) -> Option<WaypointId> {
        let goal_id = self.goal_id.unwrap();
        let start_id = self.start_id.unwrap();

        let mut open = OpenQueue::new();
        let mut closed: std::collections::HashSet<WaypointId> = std::collections::HashSet::new();
        open.push(start_id, self.key(start_id));

        let mut iterations = 0;
        while let Some((source, _)) = open.pop() {
            if source == goal_id {
                return Some(source);
            }
            iterations += 1;
            if iterations > self.max_iterations {
                return None;
            }
            if !closed.insert(source) {
                continue;
            }

            let source_pos = self.arena.get(source).position;
            let direct = self.roadmap.distance(&source_pos, &destination) <= self.max_distance
                && self.aircraft.is_feasible(&source_pos, &destination)
                && !self
                    .roadmap
                    .check_conflict_segment(&source_pos, &destination, self.aircraft.separation_radius());

            if direct {
                let d = self.roadmap.edge_desirability(&source_pos, &destination);
                self.add_edge(source, goal_id, d);
                if self.relax(source, goal_id) {
                    open.push(goal_id, self.key(goal_id));
                }
            } else if let Some(new_id) = self.expand(source, &destination) {
                if self.relax(source, new_id) {
                    open.push(new_id, self.key(new_id));
                }
            }

            for n in self.neighbors_of(source) {
                if closed.contains(&n) {
                    continue;
                }
                if self.relax(source, n) {
                    open.push(n, self.key(n));
                }
            }
        }
        None
    }

    /// Step `beta` towards `final_beta`, propagate it to every waypoint, and
    /// re-run the search from the (unchanged) roadmap.
    fn advance_beta(&mut self) {
        self.beta = (self.beta + self.step_beta).min(self.final_beta);
        let ids: Vec<WaypointId> = self.arena.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.arena.get_mut(id).beta = self.beta;
        }
    }

    fn plan_single(&mut self, origin: Position, destination: Position, etd: Instant) -> Trajectory {
        self.origin = origin;
        self.arena.clear();
        self.edges.clear();
        self.index.clear();
        self.beta = self.initial_beta;

        let start_id = self.waypoint_id(origin, &destination);
        {
            let w = self.arena.get_mut(start_id);
            w.g = 0.0;
            w.eto = Some(etd);
            w.density = 1;
        }
        self.start_id = Some(start_id);
        let goal_id = self.waypoint_id(destination, &destination);
        self.goal_id = Some(goal_id);

        let mut best = Trajectory::empty();
        let mut rollback: WaypointSnapshot = self.arena.snapshot();

        loop {
            match self.compute_or_improve_path(destination) {
                Some(goal) => {
                    best = self.build_trajectory(goal, &destination);
                    self.listeners.publish(&best);
                    rollback = self.arena.snapshot();
                }
                None => {
                    self.arena.restore(&rollback);
                    break;
                }
            }
            if self.beta >= self.final_beta - 1e-12 {
                break;
            }
            self.advance_beta();
        }

        best
    }

    /// An edge has gone invalid (obstacle appeared). Invalidate the endpoint
    /// whose `parent` was exactly that edge, then cascade: each child tries
    /// its other neighbours via `relax`, or is itself invalidated if none
    /// work.
    pub fn propagate_corrections(&mut self, removed_edge: (WaypointId, WaypointId)) {
        self.edges
            .retain(|e| !((e.from == removed_edge.0 && e.to == removed_edge.1) || (e.from == removed_edge.1 && e.to == removed_edge.0)));

        let (a, b) = removed_edge;
        let mut stack = Vec::new();
        if self.arena.get(b).parent == Some(a) {
            stack.push(b);
        }
        if self.arena.get(a).parent == Some(b) {
            stack.push(a);
        }

        while let Some(id) = stack.pop() {
            if !self.arena.get(id).g.is_finite() {
                continue;
            }
            {
                let w = self.arena.get_mut(id);
                w.g = f64::INFINITY;
                w.parent = None;
            }

            let children: Vec<WaypointId> = self
                .arena
                .iter()
                .filter(|(_, w)| w.parent == Some(id))
                .map(|(cid, _)| cid)
                .collect();

            for child in children {
                let neighbors = self.neighbors_of(child);
                let mut best: Option<(f64, Instant, WaypointId)> = None;
                for n in neighbors {
                    if n == id {
                        continue;
                    }
                    if let Some((g, eto)) = self.leg_candidate(n, child) {
                        if best.map(|(bg, _, _)| g < bg).unwrap_or(true) {
                            best = Some((g, eto, n));
                        }
                    }
                }
                match best {
                    Some((g, eto, parent)) => {
                        let w = self.arena.get_mut(child);
                        w.g = g;
                        w.eto = Some(eto);
                        w.parent = Some(parent);
                    }
                    None => stack.push(child),
                }
            }
        }
    }

    /// Scans every live edge for a now-blocked segment and repairs it. Used
    /// by `Dynamic`/`OnlineDynamic`/`Risk`; `Static` callers instead replan
    /// from scratch with `plan()`.
    pub fn repair(&mut self, destination: Position) -> Trajectory {
        let blocked: Vec<(WaypointId, WaypointId)> = self
            .edges
            .iter()
            .filter(|e| {
                self.roadmap.check_conflict_segment(
                    &self.arena.get(e.from).position,
                    &self.arena.get(e.to).position,
                    self.aircraft.separation_radius(),
                )
            })
            .map(|e| (e.from, e.to))
            .collect();
        for edge in blocked {
            self.propagate_corrections(edge);
        }

        match self.compute_or_improve_path(destination) {
            Some(goal) => {
                let trajectory = self.build_trajectory(goal, &destination);
                self.listeners.publish(&trajectory);
                trajectory
            }
            None => Trajectory::empty(),
        }
    }

    /// One `OnlinePlanner` step, driven by the caller's own poll loop (this
    /// engine never suspends inside `plan()`): reads the link once,
    /// and if the aircraft has advanced past `plan[i]` with
    /// `i + online_lookahead_waypoints` still ahead, relocates the start and
    /// resumes the search.
    pub fn poll_online(&mut self, link: &dyn AircraftLink, plan: &Trajectory, destination: Position) -> Option<Trajectory> {
        if !self.online {
            return None;
        }
        let tp = link.get_aircraft_timed_position()?;
        self.last_known_position = Some(tp.position);

        if self.roadmap.distance(&tp.position, &destination) < self.position_threshold {
            self.online = false;
            return None;
        }

        let i = link.get_next_waypoint_index();
        if i < 0 {
            return None;
        }
        let lookahead = i as usize + self.online_lookahead_waypoints;
        if lookahead >= plan.points.len() {
            return None;
        }

        let target_pos = plan.points[lookahead].position;
        let target_id = self.waypoint_id(target_pos, &destination);
        self.update_start(target_id);

        self.compute_or_improve_path(destination).map(|goal| {
            let trajectory = self.build_trajectory(goal, &destination);
            self.listeners.publish(&trajectory);
            trajectory
        })
    }
}

impl<'a> Planner for Faprm<'a> {
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

impl<'a> AnytimePlanner for Faprm<'a> {
    fn min_quality(&self) -> f64 {
        self.initial_beta
    }

    fn max_quality(&self) -> f64 {
        self.final_beta
    }

    fn quality_improvement(&self) -> f64 {
        self.step_beta
    }

    fn set_quality_bounds(&mut self, min: f64, max: f64, improvement: f64) -> crate::error::Result<()> {
        self.set_beta_bounds(min, max, improvement)
    }
}

impl<'a> OnlinePlanner for Faprm<'a> {
    fn online_status(&self) -> bool {
        self.online
    }

    fn set_online_status(&mut self, on: bool) {
        self.online = on;
    }

    fn position_threshold(&self) -> f64 {
        self.position_threshold
    }

    fn aircraft_timed_position(&self) -> Option<Position> {
        self.last_known_position
    }

    /// Reset every waypoint's cost/parent, reconnect a fresh start to its
    /// `max_neighbors` nearest existing waypoints.
    fn update_start(&mut self, new_start: WaypointId) {
        let ids: Vec<WaypointId> = self.arena.iter().map(|(id, _)| id).collect();
        for id in ids {
            if id == new_start {
                continue;
            }
            let w = self.arena.get_mut(id);
            w.g = f64::INFINITY;
            w.parent = None;
        }
        {
            let now = self.roadmap.now();
            let w = self.arena.get_mut(new_start);
            w.g = 0.0;
            w.eto = Some(now);
        }
        self.start_id = Some(new_start);

        let pos = self.arena.get(new_start).position;
        let mut ids: Vec<WaypointId> = self.arena.iter().map(|(id, _)| id).collect();
        ids.sort_by(|&a, &b| {
            let da = self.roadmap.distance(&self.arena.get(a).position, &pos);
            let db = self.roadmap.distance(&self.arena.get(b).position, &pos);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut connected = 0;
        for n in ids {
            if connected >= self.max_neighbors {
                break;
            }
            if n == new_start {
                continue;
            }
            let n_pos = self.arena.get(n).position;
            if self.roadmap.distance(&pos, &n_pos) > self.max_distance {
                continue;
            }
            if self
                .roadmap
                .check_conflict_segment(&pos, &n_pos, self.aircraft.separation_radius())
            {
                continue;
            }
            let d = self.roadmap.edge_desirability(&pos, &n_pos);
            self.add_edge(new_start, n, d);
            connected += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::ConstantSpeedAircraft;
    use crate::geometry::Aabb3;
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.timestamp(0, 0)
    }

    fn roadmap() -> PlanningRoadmap {
        let bound = Aabb3::new([0.0, 0.0, 0.0], [1000.0, 1000.0, 1000.0]);
        PlanningRoadmap::new(bound, Globe::default(), now())
    }

    /// Successive beta-stepped passes never raise the trajectory cost on a
    /// static, obstacle-free environment.
    #[test]
    fn successive_beta_passes_do_not_increase_cost() {
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

        let mut roadmap = roadmap();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = Faprm::new(&mut roadmap, &aircraft, FaprmVariant::Static);
        planner.set_beta_bounds(0.0, 1.0, 0.25).unwrap();
        planner.max_distance = 150.0;
        planner.max_iterations = 1500;

        let costs = Rc::new(RefCell::new(Vec::new()));
        planner.subscribe(Box::new(Recorder(Rc::clone(&costs))));

        let globe = Globe::default();
        let origin = Position::from_cartesian([10.0, 10.0, 10.0], &globe);
        let destination = Position::from_cartesian([400.0, 400.0, 400.0], &globe);
        let trajectory = planner.plan(origin, destination, now());

        assert!(!trajectory.is_empty());
        let recorded = costs.borrow();
        assert!(!recorded.is_empty());
        for pair in recorded.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9);
        }
    }

    #[test]
    fn update_start_clears_unrelated_waypoints_and_reconnects() {
        let mut roadmap = roadmap();
        let aircraft = ConstantSpeedAircraft::default();
        let mut planner = Faprm::new(&mut roadmap, &aircraft, FaprmVariant::OnlineDynamic);
        planner.max_distance = 150.0;

        let globe = Globe::default();
        let origin = Position::from_cartesian([10.0, 10.0, 10.0], &globe);
        let destination = Position::from_cartesian([300.0, 300.0, 300.0], &globe);
        let trajectory = planner.plan(origin, destination, now());
        assert!(!trajectory.is_empty());

        let mid = trajectory.points[trajectory.points.len() / 2].position;
        let mid_id = planner.waypoint_id(mid, &destination);
        planner.update_start(mid_id);

        assert_eq!(planner.arena.get(mid_id).g, 0.0);
        assert_eq!(planner.start_id, Some(mid_id));
    }

    #[test]
    fn risk_variant_defaults_to_avoidance_policy() {
        let mut roadmap = roadmap();
        let aircraft = ConstantSpeedAircraft::default();
        let planner = Faprm::new(&mut roadmap, &aircraft, FaprmVariant::Risk);
        assert_eq!(planner.risk_policy, RiskPolicy::Avoidance);
    }
}
