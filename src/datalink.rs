//! Datalink / aircraft adapter. The real
//! datalink to the vehicle is an external collaborator; this module
//! ships only the trait contract plus a simulated implementation so the
//! `OnlinePlanner` code path is exercisable without real hardware.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use crate::interval_tree::Instant;
use crate::position::Position;
use crate::trajectory::Trajectory;

#[derive(Clone, Debug, PartialEq)]
pub struct TimedPosition {
    pub position: Position,
    pub eto: Instant,
}

pub trait TrackListener: Send {
    fn on_track_update(&mut self, sample: &TimedPosition);
}

pub trait AircraftLink {
    fn connect(&mut self) -> bool;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;

    fn get_aircraft_timed_position(&self) -> Option<TimedPosition>;
    /// `-1` when unknown.
    fn get_next_waypoint_index(&self) -> i32;

    fn upload_flight_path(&mut self, trajectory: &Trajectory);

    fn start_monitoring(&mut self, period: StdDuration);
    fn stop_monitoring(&mut self);

    fn subscribe_track(&mut self, listener: Box<dyn TrackListener>);
}

struct SharedState {
    connected: bool,
    current: Option<TimedPosition>,
    next_waypoint_index: i32,
    uploaded: Option<Trajectory>,
}

/// A simulated aircraft link: a dedicated single-thread scheduled poller
/// publishes `TimedPosition` samples over an `mpsc` channel to subscribers.
pub struct SimulatedAircraftLink {
    state: Arc<Mutex<SharedState>>,
    listeners: Arc<Mutex<Vec<Box<dyn TrackListener>>>>,
    monitor_handle: Option<thread::JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    source: Arc<Mutex<dyn FnMut() -> TimedPosition + Send>>,
}

impl SimulatedAircraftLink {
    pub fn new<F>(source: F) -> Self
    where
        F: FnMut() -> TimedPosition + Send + 'static,
    {
        SimulatedAircraftLink {
            state: Arc::new(Mutex::new(SharedState {
                connected: false,
                current: None,
                next_waypoint_index: -1,
                uploaded: None,
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
            monitor_handle: None,
            stop_tx: None,
            source: Arc::new(Mutex::new(source)),
        }
    }

    pub fn set_next_waypoint_index(&mut self, idx: i32) {
        self.state.lock().unwrap().next_waypoint_index = idx;
    }
}

impl AircraftLink for SimulatedAircraftLink {
    fn connect(&mut self) -> bool {
        self.state.lock().unwrap().connected = true;
        true
    }

    fn disconnect(&mut self) {
        self.stop_monitoring();
        self.state.lock().unwrap().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn get_aircraft_timed_position(&self) -> Option<TimedPosition> {
        self.state.lock().unwrap().current.clone()
    }

    fn get_next_waypoint_index(&self) -> i32 {
        self.state.lock().unwrap().next_waypoint_index
    }

    fn upload_flight_path(&mut self, trajectory: &Trajectory) {
        self.state.lock().unwrap().uploaded = Some(trajectory.clone());
    }

    fn start_monitoring(&mut self, period: StdDuration) {
        self.stop_monitoring();
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = channel();
        self.stop_tx = Some(stop_tx);

        let state = Arc::clone(&self.state);
        let listeners = Arc::clone(&self.listeners);
        let source = Arc::clone(&self.source);

        self.monitor_handle = Some(thread::spawn(move || loop {
            if stop_rx.recv_timeout(period).is_ok() {
                break;
            }
            let sample = (source.lock().unwrap())();
            state.lock().unwrap().current = Some(sample.clone());
            for l in listeners.lock().unwrap().iter_mut() {
                l.on_track_update(&sample);
            }
        }));
    }

    fn stop_monitoring(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.monitor_handle.take() {
            let _ = h.join();
        }
    }

    fn subscribe_track(&mut self, listener: Box<dyn TrackListener>) {
        self.listeners.lock().unwrap().push(listener);
    }
}

impl Drop for SimulatedAircraftLink {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Globe;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn timed(x: f64) -> TimedPosition {
        TimedPosition {
            position: Position::from_cartesian([1000.0 + x, 1000.0, 1000.0], &Globe::default()),
            eto: Utc.timestamp(0, 0),
        }
    }

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    impl TrackListener for CountingListener {
        fn on_track_update(&mut self, _sample: &TimedPosition) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn connect_disconnect_toggles_is_connected() {
        let mut link = SimulatedAircraftLink::new(|| timed(0.0));
        assert!(!link.is_connected());
        assert!(link.connect());
        assert!(link.is_connected());
        link.disconnect();
        assert!(!link.is_connected());
    }

    #[test]
    fn next_waypoint_index_defaults_to_unknown() {
        let mut link = SimulatedAircraftLink::new(|| timed(0.0));
        assert_eq!(link.get_next_waypoint_index(), -1);
        link.set_next_waypoint_index(5);
        assert_eq!(link.get_next_waypoint_index(), 5);
    }

    #[test]
    fn monitoring_publishes_track_updates_to_subscribers() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut link = SimulatedAircraftLink::new(|| timed(100.0));
        link.subscribe_track(Box::new(CountingListener { count: Arc::clone(&count) }));
        link.start_monitoring(StdDuration::from_millis(10));

        thread::sleep(StdDuration::from_millis(60));
        link.stop_monitoring();

        assert!(count.load(Ordering::SeqCst) > 0);
        assert!(link.get_aircraft_timed_position().is_some());
    }
}
