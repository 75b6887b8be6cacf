//! Anytime/online 3D trajectory planning engine over a dynamic, partially
//! known airspace.
//!
//! This crate is a trajectory planning engine: the spatio-temporal
//! environment model (interval-tree cost aggregation, obstacle embedding),
//! the waypoint/edge graph shared by every planner, and the planner family
//! itself (`ForwardAStar`/`ThetaStar`, `ARAStar`, the `BasicPRM`/`LazyPRM`/
//! `RigidPRM` family, the `RRT` family, and the `FAPRM`/`FADPRM`/`OFADPRM`/
//! `RADPRM` family). The renderer, the real aircraft performance model, the
//! XML/bulletin loaders, the vehicle datalink wire protocol, and the GUI
//! session/registry layer are external collaborators this crate exposes
//! narrow traits for rather than implementing.
//!
//! `init_logging()` wires up a `log`/`pretty_env_logger` backend; call it
//! once from a binary or test harness that wants planner iteration/pass
//! logging on stderr.

pub mod aircraft;
pub mod config;
pub mod datalink;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod instrumentation;
pub mod interval_tree;
pub mod planners;
pub mod position;
pub mod trajectory;
pub mod waypoint;

pub use error::{PlannerError, Result};
pub use instrumentation::init_logging;
pub use trajectory::{PlanRevisionListener, Trajectory, TrajectoryPoint};
pub use waypoint::{Edge, Waypoint, WaypointArena, WaypointId};
