//! A [`Trajectory`] is the externally visible result of a plan: an ordered
//! sequence of waypoints carrying ETO, accumulated cost, distance-to-go, and
//! time-to-go.

use crate::interval_tree::Instant;
use crate::position::Position;

#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryPoint {
    pub position: Position,
    pub eto: Instant,
    pub accumulated_cost: f64,
    pub distance_to_go: f64,
    pub time_to_go_seconds: f64,
}

/// Ordered start-to-goal sequence. An empty trajectory communicates that no
/// plan was found: it is never an error, just an absence of waypoints.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn empty() -> Self {
        Trajectory { points: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total_cost(&self) -> f64 {
        self.points.last().map(|p| p.accumulated_cost).unwrap_or(0.0)
    }
}

/// Fired synchronously at every emission point: each completed anytime pass,
/// each online start-shift, each repair, the final result, and on timeout.
pub trait PlanRevisionListener {
    fn on_plan_revised(&mut self, trajectory: &Trajectory);
}

/// The registry a planner core holds and notifies; a plain `Vec` of boxed
/// listeners invoked in registration order, no global event bus.
#[derive(Default)]
pub struct RevisionListeners {
    listeners: Vec<Box<dyn PlanRevisionListener>>,
}

impl RevisionListeners {
    pub fn new() -> Self {
        RevisionListeners {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn PlanRevisionListener>) {
        self.listeners.push(listener);
    }

    pub fn publish(&mut self, trajectory: &Trajectory) {
        for l in self.listeners.iter_mut() {
            l.on_plan_revised(trajectory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point(cost: f64) -> TrajectoryPoint {
        TrajectoryPoint {
            position: Position::new(0.0, 0.0, 0.0),
            eto: Utc.timestamp(0, 0),
            accumulated_cost: cost,
            distance_to_go: 0.0,
            time_to_go_seconds: 0.0,
        }
    }

    #[test]
    fn total_cost_is_last_points_accumulated_cost() {
        let trajectory = Trajectory {
            points: vec![point(1.0), point(2.0), point(5.0)],
        };
        assert_eq!(trajectory.total_cost(), 5.0);
        assert_eq!(Trajectory::empty().total_cost(), 0.0);
    }

    #[test]
    fn publish_fires_every_subscribed_listener() {
        let mut listeners = RevisionListeners::new();
        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        struct SharedRecorder(std::rc::Rc<std::cell::RefCell<Vec<usize>>>);
        impl PlanRevisionListener for SharedRecorder {
            fn on_plan_revised(&mut self, trajectory: &Trajectory) {
                self.0.borrow_mut().push(trajectory.points.len());
            }
        }

        listeners.subscribe(Box::new(SharedRecorder(std::rc::Rc::clone(&calls))));
        listeners.subscribe(Box::new(SharedRecorder(std::rc::Rc::clone(&calls))));

        listeners.publish(&Trajectory {
            points: vec![point(1.0)],
        });

        assert_eq!(*calls.borrow(), vec![1, 1]);
    }
}
