//! Error kinds surfaced synchronously by the engine.
//!
//! `InfeasibleLeg` and `ConcurrentObstacleUpdate` are deliberately absent here: the
//! former is swallowed inside planners (candidate discarded, never surfaced), the
//! latter is benign and resolved by re-reading on the next iteration. `NoPlan` is
//! communicated as an empty [`crate::trajectory::Trajectory`], not an error.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("planner does not support this environment/waypoint set: {reason}")]
    Unsupported { reason: String },
}

pub type Result<T> = std::result::Result<T, PlannerError>;
