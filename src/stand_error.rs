//! Error taxonomy for stand motion and pose computation.
//!
//! Everything that can be detected before hardware is touched (range,
//! degenerate geometry, failed convergence) is reported without issuing a
//! single move; once motion has been committed, failures are surfaced but
//! never rolled back automatically.

use crate::axis::AxisError;
use std::fmt;

#[derive(Debug)]
pub enum StandError {
    /// A computed axis target exceeds the travel range reported by the axis
    /// adapter. Raised during pre-flight validation, before any motion.
    OutOfRange { axis: String, target: f64, min: f64, max: f64 },
    /// The three joint positions are colinear or coincident, so the stand
    /// plane and therefore its orientation are undefined.
    DegenerateGeometry { cross_norm: f64 },
    /// The iterative inverse solver did not reach tolerance within the
    /// iteration cap. No motion has been issued.
    Convergence { iterations: usize, translation_error: f64, rotation_error: f64 },
    /// The requested joint coordinates cannot be realized by the stage
    /// configuration (for example a lateral move on a joint without a slide).
    Unreachable(String),
    /// Hardware-level failure surfaced as-is from the axis adapter.
    Axis(AxisError),
}

impl fmt::Display for StandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StandError::OutOfRange { ref axis, target, min, max } =>
                write!(f, "Axis {} target {} is outside travel range [{}, {}]",
                       axis, target, min, max),
            StandError::DegenerateGeometry { cross_norm } =>
                write!(f, "Joint positions are colinear or coincident \
                           (cross product norm {:.3e}); orientation is undefined", cross_norm),
            StandError::Convergence { iterations, translation_error, rotation_error } =>
                write!(f, "Inverse solver did not converge after {} iterations \
                           (translation error {:.3e}, rotation error {:.3e})",
                       iterations, translation_error, rotation_error),
            StandError::Unreachable(ref message) =>
                write!(f, "Unreachable joint target: {}", message),
            StandError::Axis(ref err) =>
                write!(f, "Axis adapter error: {}", err),
        }
    }
}

impl std::error::Error for StandError {}

impl From<AxisError> for StandError {
    fn from(err: AxisError) -> Self {
        StandError::Axis(err)
    }
}
