//! [`Waypoint`]s and [`Edge`]s, stored in an arena and referenced by integer
//! handle rather than by pointer — avoiding cyclic parent/neighbor object
//! graphs. This is what makes the anytime-planner backup/restore cycle a
//! plain slice copy instead of a graph clone with pointer rewiring.

use std::collections::HashSet;

use crate::interval_tree::{Instant, IntervalTree};
use crate::position::Position;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaypointId(pub usize);

/// A node in a plan or roadmap. Not every planner populates every field —
/// grid/A* family uses `g`/`h`/`parent`; PRM/FAPRM also use `density`/`beta`/
/// `search`; tree planners use `parent` only and leave `neighbors` empty.
#[derive(Clone, Debug)]
pub struct Waypoint {
    pub position: Position,
    pub eto: Option<Instant>,

    pub parent: Option<WaypointId>,
    pub neighbors: HashSet<WaypointId>,

    /// accumulated cost from start; `+inf` means unreached.
    pub g: f64,
    /// heuristic estimate to goal.
    pub h: f64,
    /// planner-specific objective, may differ from `g` (FAPRM key blends g/h).
    pub cost: f64,

    pub distance_to_goal: f64,
    pub ttg_seconds: f64,
    pub dtg: f64,

    /// neighbour count within `maxDistance`, maintained by FAPRM-family expand().
    pub density: u32,
    /// current anytime inflation weight for this waypoint (FAPRM family).
    pub beta: f64,
    /// identifier of the search pass that last touched this waypoint, used to
    /// tell "stale from a previous pass" apart from "already visited this pass".
    pub search: u64,
}

impl Waypoint {
    pub fn new(position: Position) -> Self {
        Waypoint {
            position,
            eto: None,
            parent: None,
            neighbors: HashSet::new(),
            g: f64::INFINITY,
            h: 0.0,
            cost: f64::INFINITY,
            distance_to_goal: f64::INFINITY,
            ttg_seconds: f64::INFINITY,
            dtg: f64::INFINITY,
            density: 0,
            beta: 0.0,
            search: 0,
        }
    }

    pub fn f(&self) -> f64 {
        self.g + self.h
    }
}

/// Ordered pair plus the geometric/cost-interval annotations attached to it.
#[derive(Clone, Debug)]
pub struct Edge {
    pub from: WaypointId,
    pub to: WaypointId,
    /// interval tree obtained by intersecting the segment with environment
    /// obstacles/cost fields (edge-local).
    pub cost_intervals: IntervalTree,
    pub desirability: f64,
    pub lambda: f64,
}

impl Edge {
    pub fn new(from: WaypointId, to: WaypointId) -> Self {
        Edge {
            from,
            to,
            cost_intervals: IntervalTree::new(),
            desirability: 0.5,
            lambda: 0.5,
        }
    }

    /// Blends a raw step/leg cost with `(1 - desirability)`, weighted by
    /// `lambda`.
    pub fn blended_cost(&self, raw_cost: f64) -> f64 {
        raw_cost + self.lambda * (1.0 - self.desirability)
    }
}

/// Owns every waypoint created during a planner's lifetime. Waypoints persist
/// across anytime passes so re-expansion can reuse them; they are cleared
/// only on the next fresh `plan()` call.
#[derive(Clone, Debug, Default)]
pub struct WaypointArena {
    waypoints: Vec<Waypoint>,
}

/// Deep snapshot of the arena, retaken before every anytime inflation pass so
/// a prior pass's trajectory can be restored if a later pass fails to improve
/// on it.
#[derive(Clone, Debug)]
pub struct WaypointSnapshot {
    waypoints: Vec<Waypoint>,
}

impl WaypointArena {
    pub fn new() -> Self {
        WaypointArena {
            waypoints: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.waypoints.clear();
    }

    pub fn insert(&mut self, wp: Waypoint) -> WaypointId {
        let id = WaypointId(self.waypoints.len());
        self.waypoints.push(wp);
        id
    }

    pub fn get(&self, id: WaypointId) -> &Waypoint {
        &self.waypoints[id.0]
    }

    pub fn get_mut(&mut self, id: WaypointId) -> &mut Waypoint {
        &mut self.waypoints[id.0]
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaypointId, &Waypoint)> {
        self.waypoints
            .iter()
            .enumerate()
            .map(|(i, w)| (WaypointId(i), w))
    }

    /// Parent links form a DAG rooted at `root`; returns `false` if following
    /// `parent` pointers from any waypoint would cycle back on itself.
    pub fn is_acyclic(&self, root: WaypointId) -> bool {
        for (id, _) in self.iter() {
            let mut seen = HashSet::new();
            let mut cur = id;
            loop {
                if !seen.insert(cur) {
                    return false;
                }
                if cur == root {
                    break;
                }
                match self.get(cur).parent {
                    Some(p) => cur = p,
                    None => break,
                }
            }
        }
        true
    }

    /// Walks `parent` links from `id` back to the root, producing the plan in
    /// start-to-goal order.
    pub fn reconstruct_path(&self, id: WaypointId) -> Vec<WaypointId> {
        let mut path = vec![id];
        let mut cur = id;
        while let Some(p) = self.get(cur).parent {
            path.push(p);
            cur = p;
        }
        path.reverse();
        path
    }

    pub fn snapshot(&self) -> WaypointSnapshot {
        WaypointSnapshot {
            waypoints: self.waypoints.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &WaypointSnapshot) {
        self.waypoints = snapshot.waypoints.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: f64) -> Position {
        Position::new(x, 0.0, 0.0)
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut arena = WaypointArena::new();
        let a = arena.insert(Waypoint::new(pos(0.0)));
        arena.get_mut(a).g = 1.0;
        let snap = arena.snapshot();

        arena.get_mut(a).g = 99.0;
        arena.restore(&snap);
        assert_eq!(arena.get(a).g, 1.0);
    }

    #[test]
    fn acyclic_detects_self_parent() {
        let mut arena = WaypointArena::new();
        let a = arena.insert(Waypoint::new(pos(0.0)));
        let b = arena.insert(Waypoint::new(pos(1.0)));
        arena.get_mut(b).parent = Some(a);
        assert!(arena.is_acyclic(a));

        arena.get_mut(a).parent = Some(b);
        assert!(!arena.is_acyclic(a));
    }

    #[test]
    fn reconstruct_path_is_start_to_goal_order() {
        let mut arena = WaypointArena::new();
        let a = arena.insert(Waypoint::new(pos(0.0)));
        let b = arena.insert(Waypoint::new(pos(1.0)));
        let c = arena.insert(Waypoint::new(pos(2.0)));
        arena.get_mut(b).parent = Some(a);
        arena.get_mut(c).parent = Some(b);

        assert_eq!(arena.reconstruct_path(c), vec![a, b, c]);
    }
}
