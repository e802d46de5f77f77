//! The axis adapter capability: the minimal surface this crate needs from the
//! underlying motor-control layer. A physical motor exposes an absolute
//! position, an absolute move, and its travel limits; everything else (homing,
//! status, retries) stays on the other side of this trait.

use std::cell::Cell;
use std::fmt;

/// Capability handle for one physical motor. Implementations wrap the real
/// positioning substrate; joints hold them as `Arc<dyn Axis>` and never own
/// the hardware.
pub trait Axis {
    /// Identity of the motor, used in error messages and logs.
    fn name(&self) -> &str;

    /// Current absolute position in device units (settled encoder reading).
    fn position(&self) -> Result<f64, AxisError>;

    /// Issue an absolute move and block until the motion has settled.
    fn move_to(&self, target: f64) -> Result<(), AxisError>;

    /// Reported travel range as (min, max), in the same units as `position`.
    fn travel_limits(&self) -> (f64, f64);
}

/// Errors surfaced by the axis adapter. Hardware failures are reported as-is
/// and are fatal to the current operation; any retry policy belongs to the
/// adapter or its caller, not to this crate.
#[derive(Debug, Clone)]
pub enum AxisError {
    /// The commanded target is outside the travel range of the motor.
    Limit { axis: String, target: f64, min: f64, max: f64 },
    /// Axis fault or communication loss.
    Fault { axis: String, message: String },
}

impl fmt::Display for AxisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AxisError::Limit { ref axis, target, min, max } =>
                write!(f, "Axis {}: target {} outside travel range [{}, {}]",
                       axis, target, min, max),
            AxisError::Fault { ref axis, ref message } =>
                write!(f, "Axis {}: {}", axis, message),
        }
    }
}

impl std::error::Error for AxisError {}

/// In-memory positioner. Stands assembled from soft axes behave exactly like
/// real ones minus the hardware, which makes them useful for models, dry runs
/// and tests.
pub struct SoftAxis {
    name: String,
    position: Cell<f64>,
    limits: (f64, f64),
    moves: Cell<usize>,
}

impl SoftAxis {
    /// A soft axis with unlimited travel.
    pub fn new(name: &str, position: f64) -> Self {
        SoftAxis {
            name: name.to_string(),
            position: Cell::new(position),
            limits: (f64::NEG_INFINITY, f64::INFINITY),
            moves: Cell::new(0),
        }
    }

    /// A soft axis that rejects moves outside the given travel range.
    pub fn with_limits(name: &str, position: f64, min: f64, max: f64) -> Self {
        SoftAxis { limits: (min, max), ..SoftAxis::new(name, position) }
    }

    /// Number of accepted moves since construction.
    pub fn moves(&self) -> usize {
        self.moves.get()
    }
}

impl Axis for SoftAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Result<f64, AxisError> {
        Ok(self.position.get())
    }

    fn move_to(&self, target: f64) -> Result<(), AxisError> {
        let (min, max) = self.limits;
        if target < min || target > max {
            return Err(AxisError::Limit { axis: self.name.clone(), target, min, max });
        }
        self.position.set(target);
        self.moves.set(self.moves.get() + 1);
        Ok(())
    }

    fn travel_limits(&self) -> (f64, f64) {
        self.limits
    }
}
