//! `PlanningRoadmap`: a single oriented box containing an ordered list of
//! sampled waypoints and explicit edges, used by the PRM and FAPRM planner
//! families (continuous-space, multi-query).

use std::collections::HashMap;

use rand::Rng;
use zpatial::implement::bvh_median::Bvh;
use zpatial::interface::i_spatial_accel::ISpatialAccel;

use super::{combine, Environment, ObstacleId};
use crate::geometry::{position_to_line, Aabb3, DesirabilityZone, Obstacle};
use crate::interval_tree::{CostInterval, CostPolicy, Instant, IntervalTree, RiskPolicy};
use crate::position::{Globe, Position};

pub struct PlanningRoadmap {
    pub bound: Aabb3,
    globe: Globe,
    now: Instant,

    obstacles: HashMap<usize, Obstacle>,
    next_obstacle_idx: usize,
    obstacle_bvh: Bvh<usize>,

    intervals: IntervalTree,

    pub desirability_zones: Vec<DesirabilityZone>,

    /// roadmap graph: waypoint positions and the edges connecting them. Kept
    /// separately from any one planner's per-call `WaypointArena` because a
    /// roadmap is multi-query (built once, queried many times).
    pub waypoints: Vec<Position>,
    pub edges: Vec<(usize, usize)>,
}

impl PlanningRoadmap {
    pub fn new(bound: Aabb3, globe: Globe, now: Instant) -> Self {
        PlanningRoadmap {
            bound,
            globe,
            now,
            obstacles: HashMap::new(),
            next_obstacle_idx: 0,
            obstacle_bvh: Bvh::init(10),
            intervals: IntervalTree::new(),
            desirability_zones: Vec::new(),
            waypoints: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn rebuild_bvh(&mut self) {
        let bounds: Vec<(usize, zpatial::mazth::bound::AxisAlignedBBox<f64>)> = self
            .obstacles
            .iter()
            .map(|(idx, obs)| (*idx, obs.get_bound()))
            .collect();
        self.obstacle_bvh = Bvh::init(10);
        let _ = self.obstacle_bvh.build_all(&bounds[..]);
    }

    pub fn sample_random_position<R: Rng>(&self, rng: &mut R) -> Position {
        let x = rng.gen_range(self.bound.min[0], self.bound.max[0]);
        let y = rng.gen_range(self.bound.min[1], self.bound.max[1]);
        let z = rng.gen_range(self.bound.min[2], self.bound.max[2]);
        Position::from_cartesian([x, y, z], &self.globe)
    }

    fn obstacle_blocks_segment(&self, a: &Position, b: &Position) -> bool {
        let line = position_to_line(&self.globe, a, b);
        let candidates = match self.obstacle_bvh.query_intersect(&line._bound) {
            Ok(c) => c,
            Err(_) => return false,
        };
        candidates
            .iter()
            .any(|idx| match self.obstacles.get(idx) {
                Some(obs) => obs.intersects_segment(&line),
                None => false,
            })
    }

    /// Edge-local interval tree obtained by intersecting the segment with
    /// embedded obstacles' validity periods.
    /// Obstacles don't carry their own cost magnitude in this engine (that's
    /// the job of environment-level cost intervals) so this walks the global
    /// table and keeps whichever intervals are active for any obstacle this
    /// segment actually crosses.
    pub fn embed_interval_tree(&self, a: &Position, b: &Position) -> IntervalTree {
        let mut tree = IntervalTree::new();
        if self.obstacle_blocks_segment(a, b) {
            for interval in self.intervals.search_range(self.now, self.now) {
                tree.add(interval.clone());
            }
        }
        tree
    }

    /// Desirability of the edge `a -> b`: mean of intersecting zones'
    /// desirability, or `0.5` if none intersect.
    pub fn edge_desirability(&self, a: &Position, b: &Position) -> f64 {
        let a3 = a.to_cartesian(&self.globe);
        let b3 = b.to_cartesian(&self.globe);
        let hits: Vec<f64> = self
            .desirability_zones
            .iter()
            .filter(|z| z.intersects_segment(a3, b3))
            .map(|z| z.desirability)
            .collect();
        if hits.is_empty() {
            0.5
        } else {
            hits.iter().sum::<f64>() / hits.len() as f64
        }
    }

    /// Stable sort of the roadmap's waypoint indices by normalized distance
    /// to `p`.
    pub fn sort_nearest(&self, p: &Position) -> Vec<usize> {
        let mut idxs: Vec<usize> = (0..self.waypoints.len()).collect();
        idxs.sort_by(|&i, &j| {
            let di = self.normalized_distance(&self.waypoints[i], p);
            let dj = self.normalized_distance(&self.waypoints[j], p);
            di.partial_cmp(&dj).unwrap_or(std::cmp::Ordering::Equal)
        });
        idxs
    }

    /// The `k` nearest roadmap waypoints to `p`.
    pub fn find_nearest(&self, p: &Position, k: usize) -> Vec<usize> {
        self.sort_nearest(p).into_iter().take(k).collect()
    }

    pub fn add_waypoint(&mut self, p: Position) -> usize {
        self.waypoints.push(p);
        self.waypoints.len() - 1
    }

    pub fn add_edge(&mut self, a: usize, b: usize) {
        self.edges.push((a, b));
    }
}

impl Environment for PlanningRoadmap {
    fn kind(&self) -> crate::planners::EnvironmentKind {
        crate::planners::EnvironmentKind::Roadmap
    }

    fn globe(&self) -> &Globe {
        &self.globe
    }
    fn set_globe(&mut self, globe: Globe) {
        self.globe = globe;
    }
    fn now(&self) -> Instant {
        self.now
    }
    fn set_time(&mut self, t: Instant) {
        self.now = t;
    }

    fn add_cost_interval(&mut self, interval: CostInterval) {
        self.intervals.add(interval);
    }

    fn remove_cost_interval(&mut self, id: u64) -> bool {
        self.intervals.remove(id)
    }

    fn embed(&mut self, obstacle: Obstacle) -> ObstacleId {
        let idx = self.next_obstacle_idx;
        self.next_obstacle_idx += 1;
        self.obstacles.insert(idx, obstacle);
        self.rebuild_bvh();
        ObstacleId(idx)
    }

    fn unembed(&mut self, id: ObstacleId) -> bool {
        let removed = self.obstacles.remove(&id.0).is_some();
        if removed {
            self.rebuild_bvh();
        }
        removed
    }

    fn unembed_all(&mut self) {
        self.obstacles.clear();
        self.rebuild_bvh();
    }

    fn contains(&self, p: &Position) -> bool {
        self.bound.contains_point(p.to_cartesian(&self.globe))
    }

    fn normalized_distance(&self, a: &Position, b: &Position) -> f64 {
        self.distance(a, b) / self.bound.longest_edge()
    }

    fn neighbors(&self, _p: &Position) -> Vec<Position> {
        // The roadmap has no implicit grid adjacency; callers use the
        // explicit `edges` list instead.
        Vec::new()
    }

    fn are_neighbors(&self, _a: &Position, _b: &Position) -> bool {
        false
    }

    fn get_step_cost(
        &self,
        a: &Position,
        b: &Position,
        start: Instant,
        end: Instant,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        self.get_leg_cost(a, b, start, end, cost_policy, risk_policy)
    }

    fn get_leg_cost(
        &self,
        a: &Position,
        b: &Position,
        start: Instant,
        end: Instant,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        if self.obstacle_blocks_segment(a, b) {
            return f64::INFINITY;
        }
        let tree = self.embed_interval_tree(a, b);
        // The leg cost must track geodesic length, not just hazard load, or
        // the A* search over the roadmap minimizes hop count instead of
        // distance (a long detour and a short direct hop would otherwise
        // price identically).
        let length = self.distance(a, b);
        let costs = vec![length * (1.0 + tree.aggregate_cost(start, end))];
        risk_policy.admit(combine(&costs, cost_policy))
    }

    fn check_conflict(&self, p: &Position) -> bool {
        let point = p.to_cartesian(&self.globe);
        self.obstacles.values().any(|o| {
            use zpatial::mazth::i_bound::IBound;
            let b = o.get_bound();
            Aabb3::new(b.get_min(), b.get_max()).contains_point(point)
        })
    }

    fn check_conflict_segment(&self, a: &Position, b: &Position, separation_radius: f64) -> bool {
        if self.obstacle_blocks_segment(a, b) {
            return true;
        }
        let a3 = a.to_cartesian(&self.globe);
        let b3 = b.to_cartesian(&self.globe);
        self.obstacles.values().any(|o| {
            use zpatial::mazth::i_bound::IBound;
            let bb = o.get_bound();
            Aabb3::new(bb.get_min(), bb.get_max()).intersects_cylinder(a3, b3, separation_radius)
        })
    }
}

/// Extends the roadmap with `start`/`goal`, connecting each to its nearest
/// neighbours under the same rule used during construction.
pub fn connect_into_roadmap(
    roadmap: &mut PlanningRoadmap,
    position: Position,
    max_neighbors: usize,
    max_distance: f64,
) -> usize {
    let candidates = roadmap.find_nearest(&position, max_neighbors * 4);
    let idx = roadmap.add_waypoint(position);
    let mut connected = 0;
    for c in candidates {
        if connected >= max_neighbors {
            break;
        }
        let d = roadmap.distance(&roadmap.waypoints[idx], &roadmap.waypoints[c]);
        if d > max_distance {
            continue;
        }
        if roadmap.check_conflict_segment(&roadmap.waypoints[idx], &roadmap.waypoints[c], 0.0) {
            continue;
        }
        roadmap.add_edge(idx, c);
        connected += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.timestamp(0, 0)
    }

    fn roadmap() -> PlanningRoadmap {
        let bound = Aabb3::new([1000.0, 1000.0, 1000.0], [2000.0, 2000.0, 2000.0]);
        PlanningRoadmap::new(bound, Globe::default(), now())
    }

    fn p(x: f64, y: f64, z: f64) -> Position {
        Position::from_cartesian([x, y, z], &Globe::default())
    }

    #[test]
    fn sort_nearest_orders_by_normalized_distance() {
        let mut env = roadmap();
        let far = env.add_waypoint(p(1900.0, 1000.0, 1000.0));
        let near = env.add_waypoint(p(1010.0, 1000.0, 1000.0));
        let mid = env.add_waypoint(p(1100.0, 1000.0, 1000.0));

        let order = env.sort_nearest(&p(1000.0, 1000.0, 1000.0));
        assert_eq!(order, vec![near, mid, far]);
    }

    #[test]
    fn find_nearest_truncates_to_k() {
        let mut env = roadmap();
        for i in 1..=5 {
            env.add_waypoint(p(1000.0 + i as f64 * 10.0, 1000.0, 1000.0));
        }
        assert_eq!(env.find_nearest(&p(1000.0, 1000.0, 1000.0), 2).len(), 2);
    }

    #[test]
    fn sample_random_position_stays_within_bound() {
        let env = roadmap();
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let sample = env.sample_random_position(&mut rng);
            assert!(env.contains(&sample));
        }
    }

    #[test]
    fn edge_desirability_defaults_to_half_with_no_zones() {
        let env = roadmap();
        assert_eq!(env.edge_desirability(&p(1000.0, 1000.0, 1000.0), &p(1010.0, 1000.0, 1000.0)), 0.5);
    }

    #[test]
    fn edge_desirability_averages_intersecting_zones() {
        let mut env = roadmap();
        env.desirability_zones.push(DesirabilityZone {
            bound: Aabb3::new([1000.0, 999.0, 999.0], [1020.0, 1001.0, 1001.0]),
            desirability: 0.2,
        });
        env.desirability_zones.push(DesirabilityZone {
            bound: Aabb3::new([1000.0, 999.0, 999.0], [1020.0, 1001.0, 1001.0]),
            desirability: 0.8,
        });
        let d = env.edge_desirability(&p(1000.0, 1000.0, 1000.0), &p(1010.0, 1000.0, 1000.0));
        assert!((d - 0.5).abs() < 1e-9);
    }

    #[test]
    fn connect_into_roadmap_respects_max_distance_and_neighbor_count() {
        let mut env = roadmap();
        env.add_waypoint(p(1000.0, 1000.0, 1000.0));
        for i in 1..=5 {
            env.add_waypoint(p(1000.0 + i as f64 * 10.0, 1000.0, 1000.0));
        }
        let idx = connect_into_roadmap(&mut env, p(1500.0, 1000.0, 1000.0), 2, 5.0);
        // 1500 is far from every existing sample (max gap is 50), so nothing
        // connects within `max_distance`.
        assert_eq!(env.edges.iter().filter(|(a, b)| *a == idx || *b == idx).count(), 0);
    }
}
