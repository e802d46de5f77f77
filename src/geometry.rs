//! Coupling geometry of a single angled joint stage.
//!
//! Each corner of the stand is driven by a horizontal slide and a lift whose
//! axis is tilted off the vertical by a fixed wedge angle, so one motor's
//! motion couples into more than one Cartesian direction. The coupling is a
//! fixed linear map from the raw motor displacements to a Cartesian
//! displacement; it is derived once from calibration and never recomputed at
//! runtime. Inverting it for a single joint is a well-conditioned closed-form
//! 2x2 problem, in contrast to the whole-stand inversion handled in
//! [`crate::solver`].

use nalgebra::{Matrix2, Matrix3x2, Vector2, Vector3};

/// Off-axis angle of the standard lifting stages, in radians (15 degrees).
pub const DEFAULT_ALPHA: f64 = 0.261799387;

/// Fixed linear map between the raw axis displacements (slide, lift) of one
/// joint and the Cartesian displacement of its ball.
///
/// The third row of the map is the parasitic component: the part of the lift
/// motion that leaks along the axis a joint cannot be commanded in. It is part
/// of the coupling, not a separate knob, and it is what makes the whole-stand
/// inversion ill-conditioned.
#[derive(Debug, Clone, Copy)]
pub struct JointGeometry {
    map: Matrix3x2<f64>,
    /// Closed-form inverse of the in-plane (x, y) part of the map.
    /// `None` when the stage is oriented so that plane collapses.
    local_inverse: Option<Matrix2<f64>>,
}

impl JointGeometry {
    /// Builds the coupling map from the unit directions of the two stages.
    pub fn from_directions(slide: Vector3<f64>, lift: Vector3<f64>) -> Self {
        let map = Matrix3x2::from_columns(&[slide, lift]);
        let local_inverse = map.fixed_view::<2, 2>(0, 0).into_owned().try_inverse();
        JointGeometry { map, local_inverse }
    }

    /// The front (cone) stage: the lift is tilted in the horizontal plane, so
    /// its motion splits between x and y with no component along the beam.
    pub fn cone(alpha: f64) -> Self {
        Self::from_directions(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(alpha.cos(), alpha.sin(), 0.0),
        )
    }

    /// A rear (flat or vee) stage: the lift is tilted in the vertical plane,
    /// producing the requested y together with a large parasitic displacement
    /// along the beam axis.
    pub fn angled(alpha: f64) -> Self {
        Self::from_directions(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, alpha.sin(), -alpha.cos()),
        )
    }

    /// Cartesian displacement of the ball for the given raw axis positions.
    pub fn displacement(&self, slide: f64, lift: f64) -> Vector3<f64> {
        self.map * Vector2::new(slide, lift)
    }

    /// Local simplified coordinates (x, y) for the given raw axis positions.
    pub fn local_xy(&self, slide: f64, lift: f64) -> (f64, f64) {
        let displacement = self.displacement(slide, lift);
        (displacement.x, displacement.y)
    }

    /// Raw axis positions realizing the requested local (x, y), or `None`
    /// when the in-plane part of the map is singular.
    pub fn axes_for(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let axes = self.local_inverse? * Vector2::new(x, y);
        Some((axes.x, axes.y))
    }
}
