//! One support joint: a lift stage, an optional slide stage and the coupling
//! geometry that relates them to the displacement of the ball they carry.
//!
//! The motors do not move along the joint-local axes. Commanding a purely
//! horizontal or purely vertical displacement generally requires moving both
//! stages; [`Joint::set_xy`] performs that decoupling through the inverse of
//! the coupling map, so callers reason in joint-local coordinates and never
//! about individual motors.

use crate::axis::Axis;
use crate::geometry::JointGeometry;
use crate::stand_error::StandError;
use nalgebra::Vector3;
use std::sync::Arc;

/// A commanded slide displacement below this bound is treated as zero when
/// the joint has no slide stage fitted.
const SLIDE_FREE_TOLERANCE: f64 = 1e-9;

/// Validated axis targets for one joint, produced by [`Joint::targets`] and
/// issued by [`Joint::apply`]. Splitting validation from motion lets the
/// stand check every joint before any motor moves.
#[derive(Debug, Clone, Copy)]
pub struct JointTargets {
    pub slide: Option<f64>,
    pub lift: f64,
}

/// A support joint of the stand. The cone, flat and vee joints share this
/// type; they differ only in geometry, rest offset and fitted stages.
pub struct Joint {
    lift: Arc<dyn Axis>,
    slide: Option<Arc<dyn Axis>>,
    geometry: JointGeometry,
    offset: Vector3<f64>,
}

impl Joint {
    /// Creates a joint from its stages, coupling geometry and the rest
    /// position of its ball in stand coordinates.
    pub fn new(
        lift: Arc<dyn Axis>,
        slide: Option<Arc<dyn Axis>>,
        geometry: JointGeometry,
        offset: Vector3<f64>,
    ) -> Self {
        Joint { lift, slide, geometry, offset }
    }

    /// Rest position of the ball, with both stages at zero.
    pub fn offset(&self) -> Vector3<f64> {
        self.offset
    }

    pub fn geometry(&self) -> &JointGeometry {
        &self.geometry
    }

    pub fn has_slide(&self) -> bool {
        self.slide.is_some()
    }

    /// Current stage readings as (slide, lift); a missing slide reads zero.
    pub fn displacement(&self) -> Result<(f64, f64), StandError> {
        let slide = match &self.slide {
            Some(axis) => axis.position()?,
            None => 0.0,
        };
        Ok((slide, self.lift.position()?))
    }

    /// Current joint-local (x, y) displacement of the ball.
    pub fn get_xy(&self) -> Result<(f64, f64), StandError> {
        let (slide, lift) = self.displacement()?;
        Ok(self.geometry.local_xy(slide, lift))
    }

    /// Current ball position in stand coordinates.
    pub fn position(&self) -> Result<Vector3<f64>, StandError> {
        let (slide, lift) = self.displacement()?;
        Ok(self.offset + self.geometry.displacement(slide, lift))
    }

    /// Resolves a joint-local (x, y) displacement into stage targets without
    /// moving anything. Fails when the geometry cannot produce the requested
    /// displacement, when a slide-less joint would need slide motion, or when
    /// a target falls outside a stage's travel.
    pub fn targets(&self, x: f64, y: f64) -> Result<JointTargets, StandError> {
        let (slide, lift) = self.geometry.axes_for(x, y).ok_or_else(|| {
            StandError::Unreachable(format!(
                "the joint geometry cannot produce the local displacement ({:.4}, {:.4})",
                x, y
            ))
        })?;

        let slide = match &self.slide {
            Some(axis) => {
                self.check_range(axis.as_ref(), slide)?;
                Some(slide)
            }
            None => {
                if slide.abs() > SLIDE_FREE_TOLERANCE {
                    return Err(StandError::Unreachable(format!(
                        "the displacement ({:.4}, {:.4}) needs a slide motion of {:.4} \
                         but no slide stage is fitted",
                        x, y, slide
                    )));
                }
                None
            }
        };
        self.check_range(self.lift.as_ref(), lift)?;
        Ok(JointTargets { slide, lift })
    }

    fn check_range(&self, axis: &dyn Axis, target: f64) -> Result<(), StandError> {
        let (min, max) = axis.travel_limits();
        if target < min || target > max {
            return Err(StandError::OutOfRange {
                axis: axis.name().to_string(),
                target,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Issues previously validated targets to the stages.
    pub(crate) fn apply(&mut self, targets: &JointTargets) -> Result<(), StandError> {
        if let (Some(axis), Some(target)) = (&self.slide, targets.slide) {
            axis.move_to(target)?;
        }
        self.lift.move_to(targets.lift)?;
        Ok(())
    }

    /// Moves the ball to the given joint-local (x, y) displacement.
    pub fn set_xy(&mut self, x: f64, y: f64) -> Result<(), StandError> {
        let targets = self.targets(x, y)?;
        self.apply(&targets)
    }
}
