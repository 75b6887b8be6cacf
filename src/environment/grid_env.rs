//! `PlanningGrid`: hierarchical cubic subdivision with embedded obstacles and
//! per-cell aggregated cost.

use std::collections::HashMap;

use zpatial::implement::bvh_median::Bvh;
use zpatial::interface::i_spatial_accel::ISpatialAccel;

use super::{combine, Environment, ObstacleId};
use crate::geometry::grid::{CellIndex, CubicGrid};
use crate::geometry::{position_to_line, Aabb3, Obstacle};
use crate::interval_tree::{CostInterval, CostPolicy, Instant, IntervalTree, RiskPolicy};
use crate::position::{Globe, Position};

pub struct PlanningGrid {
    pub grid: CubicGrid,
    globe: Globe,
    now: Instant,

    obstacles: HashMap<usize, Obstacle>,
    obstacle_affected_cells: HashMap<usize, Vec<CellIndex>>,
    next_obstacle_idx: usize,
    obstacle_bvh: Bvh<usize>,

    /// global cost-interval table, keyed by interval id.
    intervals: IntervalTree,
    /// per-cell membership into the global table, populated by `embed`-style
    /// spatial registration (mirrors the obstacle affected-cells map).
    cell_interval_ids: HashMap<CellIndex, Vec<u64>>,
    interval_affected_cells: HashMap<u64, Vec<CellIndex>>,
}

impl PlanningGrid {
    pub fn new(grid: CubicGrid, globe: Globe, now: Instant) -> Self {
        PlanningGrid {
            grid,
            globe,
            now,
            obstacles: HashMap::new(),
            obstacle_affected_cells: HashMap::new(),
            next_obstacle_idx: 0,
            obstacle_bvh: Bvh::init(10),
            intervals: IntervalTree::new(),
            cell_interval_ids: HashMap::new(),
            interval_affected_cells: HashMap::new(),
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

    /// Spatially-scoped cost-interval registration: the interval applies to
    /// every cell whose box intersects `bound` (S2's "cost interval ...
    /// covering the plane z=5").
    pub fn add_cost_interval_in(&mut self, bound: Aabb3, interval: CostInterval) {
        let id = interval.id;
        let affected = self.grid.lookup_cells(&bound);
        self.intervals.add(interval);
        for cell in &affected {
            self.cell_interval_ids.entry(*cell).or_insert_with(Vec::new).push(id);
        }
        self.interval_affected_cells.insert(id, affected);
    }

    /// Aggregate active cost at a cell: `1 + sum of unique active interval
    /// costs`.
    pub fn cell_cost(&self, cell: CellIndex, start: Instant, end: Instant) -> f64 {
        let ids = match self.cell_interval_ids.get(&cell) {
            Some(ids) => ids,
            None => return 1.0,
        };
        let mut seen = std::collections::HashSet::new();
        let mut total = 0.0;
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(interval) = self.intervals.search_range(start, end).into_iter().find(|i| i.id == *id) {
                total += match interval.weight {
                    Some(w) => interval.cost * w,
                    None => interval.cost,
                };
            }
        }
        1.0 + total
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

    /// Step cost between two grid positions: requires `p`/`q` to be grid neighbours, combines
    /// the cost of shared adjacent cells under `cost_policy`, then applies
    /// `risk_policy`.
    fn step_cost_impl(
        &self,
        a: &Position,
        b: &Position,
        start: Instant,
        end: Instant,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        let ca = match self.grid.lookup_cell(a.to_cartesian(&self.globe)) {
            Some(c) => c,
            None => return f64::INFINITY,
        };
        let cb = match self.grid.lookup_cell(b.to_cartesian(&self.globe)) {
            Some(c) => c,
            None => return f64::INFINITY,
        };
        if !self.grid.are_neighbors(ca, cb) {
            return f64::INFINITY;
        }
        if self.obstacle_blocks_segment(a, b) {
            return f64::INFINITY;
        }

        let shared: Vec<CellIndex> = self
            .grid
            .neighbors(ca)
            .into_iter()
            .filter(|c| *c == cb || self.grid.are_neighbors(*c, cb))
            .chain(std::iter::once(ca))
            .chain(std::iter::once(cb))
            .collect();

        let costs: Vec<f64> = shared
            .iter()
            .map(|c| self.cell_cost(*c, start, end))
            .collect();
        let combined = combine(&costs, cost_policy);
        risk_policy.admit(combined)
    }
}

impl Environment for PlanningGrid {
    fn kind(&self) -> crate::planners::EnvironmentKind {
        crate::planners::EnvironmentKind::Grid
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
        // Environment-wide interval with no spatial footprint affects every
        // cell; spatially scoped registration goes through
        // `add_cost_interval_in`.
        let bound = self.grid.root;
        self.add_cost_interval_in(bound, interval);
    }

    fn remove_cost_interval(&mut self, id: u64) -> bool {
        if let Some(cells) = self.interval_affected_cells.remove(&id) {
            for cell in cells {
                if let Some(ids) = self.cell_interval_ids.get_mut(&cell) {
                    ids.retain(|x| *x != id);
                }
            }
        }
        self.intervals.remove(id)
    }

    fn embed(&mut self, obstacle: Obstacle) -> ObstacleId {
        let idx = self.next_obstacle_idx;
        self.next_obstacle_idx += 1;
        let bound = obstacle.get_bound();
        let cells = self.grid.lookup_cells(&Aabb3::new(
            [bound_min(&bound)[0], bound_min(&bound)[1], bound_min(&bound)[2]],
            [bound_max(&bound)[0], bound_max(&bound)[1], bound_max(&bound)[2]],
        ));
        self.obstacles.insert(idx, obstacle);
        self.obstacle_affected_cells.insert(idx, cells);
        self.rebuild_bvh();
        ObstacleId(idx)
    }

    fn unembed(&mut self, id: ObstacleId) -> bool {
        self.obstacle_affected_cells.remove(&id.0);
        let removed = self.obstacles.remove(&id.0).is_some();
        if removed {
            self.rebuild_bvh();
        }
        removed
    }

    fn unembed_all(&mut self) {
        self.obstacles.clear();
        self.obstacle_affected_cells.clear();
        self.rebuild_bvh();
    }

    fn contains(&self, p: &Position) -> bool {
        self.grid.root.contains_point(p.to_cartesian(&self.globe))
    }

    fn normalized_distance(&self, a: &Position, b: &Position) -> f64 {
        self.distance(a, b) / self.grid.normalizer()
    }

    fn neighbors(&self, p: &Position) -> Vec<Position> {
        let cell = match self.grid.lookup_cell(p.to_cartesian(&self.globe)) {
            Some(c) => c,
            None => return Vec::new(),
        };
        self.grid
            .neighbors(cell)
            .into_iter()
            .map(|c| {
                let b = self.grid.cell_bound(c);
                Position::from_cartesian(b.center(), &self.globe)
            })
            .collect()
    }

    fn are_neighbors(&self, a: &Position, b: &Position) -> bool {
        match (
            self.grid.lookup_cell(a.to_cartesian(&self.globe)),
            self.grid.lookup_cell(b.to_cartesian(&self.globe)),
        ) {
            (Some(ca), Some(cb)) => self.grid.are_neighbors(ca, cb),
            _ => false,
        }
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
        self.step_cost_impl(a, b, start, end, cost_policy, risk_policy)
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
        // A leg may span multiple cells. Only the cells the segment actually
        // crosses count; averaging the whole bounding box would price a
        // short hop and a long detour the same on a uniform grid. Scaling
        // the combined cost by the number of crossed cells keeps this in
        // the same unit `get_step_cost` accrues per single-cell hop, so a
        // Theta* shortcut is comparable to the multi-step path it replaces.
        let a3 = a.to_cartesian(&self.globe);
        let b3 = b.to_cartesian(&self.globe);
        let lo = [a3[0].min(b3[0]), a3[1].min(b3[1]), a3[2].min(b3[2])];
        let hi = [a3[0].max(b3[0]), a3[1].max(b3[1]), a3[2].max(b3[2])];
        let bound = Aabb3::new(lo, hi);
        if self.obstacle_blocks_segment(a, b) {
            return f64::INFINITY;
        }
        let crossed: Vec<CellIndex> = self
            .grid
            .lookup_cells(&bound)
            .into_iter()
            .filter(|c| self.grid.cell_bound(*c).intersects_segment(a3, b3))
            .collect();
        let costs: Vec<f64> = crossed.iter().map(|c| self.cell_cost(*c, start, end)).collect();
        let representative = combine(&costs, cost_policy);
        let traversed = costs.len().max(1) as f64;
        risk_policy.admit(representative * traversed)
    }

    fn check_conflict(&self, p: &Position) -> bool {
        let point = p.to_cartesian(&self.globe);
        self.obstacles.values().any(|o| {
            let b = o.get_bound();
            Aabb3::new(bound_min(&b), bound_max(&b)).contains_point(point)
        })
    }

    fn check_conflict_segment(&self, a: &Position, b: &Position, _separation_radius: f64) -> bool {
        self.obstacle_blocks_segment(a, b)
    }
}

// `zpatial::mazth::bound::AxisAlignedBBox` is treated as an opaque token everywhere
// else in this crate (passed straight to the BVH); these two accessors are
// the only place grid embedding needs to read it back to translate it into
// our own `Aabb3` for cell-lookup purposes.
fn bound_min(b: &zpatial::mazth::bound::AxisAlignedBBox<f64>) -> [f64; 3] {
    use zpatial::mazth::i_bound::IBound;
    b.get_min()
}
fn bound_max(b: &zpatial::mazth::bound::AxisAlignedBBox<f64>) -> [f64; 3] {
    use zpatial::mazth::i_bound::IBound;
    b.get_max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.timestamp(0, 0)
    }

    fn grid() -> PlanningGrid {
        let root = Aabb3::new([1000.0, 1000.0, 1000.0], [1010.0, 1010.0, 1010.0]);
        PlanningGrid::new(CubicGrid::new(root, (10, 10, 10)), Globe::default(), now())
    }

    fn p(x: f64, y: f64, z: f64) -> Position {
        Position::from_cartesian([x, y, z], &Globe::default())
    }

    /// S2: a cost interval of magnitude 100 covering the plane z=5 strictly
    /// increases step cost under `Average`, but `Ignorance` still admits it
    /// while `Avoidance` (threshold 50) rejects it.
    #[test]
    fn cost_interval_increases_step_cost_and_risk_policy_gates_it() {
        let mut env = grid();
        let baseline = env.get_step_cost(&p(1004.5, 1004.5, 1004.5), &p(1005.5, 1004.5, 1004.5), now(), now(), CostPolicy::Average, RiskPolicy::Ignorance);

        env.add_cost_interval_in(
            Aabb3::new([1000.0, 1000.0, 1005.0], [1010.0, 1010.0, 1006.0]),
            CostInterval {
                id: 1,
                start: now(),
                end: now(),
                cost: 100.0,
                weight: None,
            },
        );

        let hazard_start = p(1004.5, 1004.5, 1005.5);
        let hazard_end = p(1005.5, 1004.5, 1005.5);
        let loaded = env.get_step_cost(&hazard_start, &hazard_end, now(), now(), CostPolicy::Average, RiskPolicy::Ignorance);
        assert!(loaded > baseline);

        let under_avoidance = env.get_step_cost(&hazard_start, &hazard_end, now(), now(), CostPolicy::Average, RiskPolicy::Avoidance);
        assert_eq!(under_avoidance, f64::INFINITY);
    }

    #[test]
    fn remove_cost_interval_restores_baseline_cost() {
        let mut env = grid();
        let a = p(1004.5, 1004.5, 1005.5);
        let b = p(1005.5, 1004.5, 1005.5);
        let baseline = env.get_step_cost(&a, &b, now(), now(), CostPolicy::Average, RiskPolicy::Ignorance);

        env.add_cost_interval_in(
            Aabb3::new([1000.0, 1000.0, 1005.0], [1010.0, 1010.0, 1006.0]),
            CostInterval {
                id: 7,
                start: now(),
                end: now(),
                cost: 40.0,
                weight: None,
            },
        );
        assert!(env.remove_cost_interval(7));

        let restored = env.get_step_cost(&a, &b, now(), now(), CostPolicy::Average, RiskPolicy::Ignorance);
        assert_eq!(restored, baseline);
    }

    #[test]
    fn neighbors_are_within_one_axis_step_and_distance_is_nonnegative() {
        let env = grid();
        let center = p(1005.5, 1005.5, 1005.5);
        let neighbors = env.neighbors(&center);
        assert!(!neighbors.is_empty());
        for n in &neighbors {
            assert!(env.are_neighbors(&center, n));
            assert!(env.distance(&center, n) >= 0.0);
        }
    }

    #[test]
    fn normalized_distance_scales_by_root_normalizer() {
        let env = grid();
        let a = p(1000.5, 1000.5, 1000.5);
        let b = p(1009.5, 1000.5, 1000.5);
        let normalized = env.normalized_distance(&a, &b);
        assert!((normalized - env.distance(&a, &b) / 10.0).abs() < 1e-9);
    }
}
