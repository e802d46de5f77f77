//! Iterative inverse solver: target pose to joint axis positions.
//!
//! An exact analytic inverse of the forward transform exists on paper but is
//! numerically unstable in service: small encoder/readback discrepancies
//! compound across sequential relative moves into millimeter-scale drift.
//! Instead of inverting once, the solver runs a Newton refinement that uses
//! the forward transform as its evaluation function, always starting from the
//! *current* encoder readings rather than a model prediction. The Jacobian is
//! estimated numerically per axis and the step is solved with the matrix
//! inverse, falling back to the SVD pseudoinverse when the system is singular
//! or rectangular; the pseudoinverse picks the minimum-norm correction, so of
//! several pose-equivalent configurations the one nearest the current axis
//! positions wins.
//!
//! The solver only touches a numeric model. Physical motion is issued by
//! [`crate::stand::Stand`] after, and only after, a self-consistent solution
//! passed the travel-limit checks.

use crate::frames::{pose_from_joints, Pose};
use crate::geometry::JointGeometry;
use crate::stand_error::StandError;
use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector, Vector3};
use tracing::{debug, warn};

/// Tuning of the inverse solver. The defaults are conservative; both
/// tolerances and the cap are operational parameters and should be validated
/// against the encoder noise of the actual installation.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    /// Convergence tolerance on the translation residual, in length units.
    pub translation_tolerance: f64,
    /// Convergence tolerance on the rotation residual, in radians.
    pub rotation_tolerance: f64,
    /// Iteration cap; exceeding it fails the move with no motion issued.
    pub max_iterations: usize,
    /// Perturbation used for numeric differentiation of the forward transform.
    pub jacobian_epsilon: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            translation_tolerance: 1e-4,
            rotation_tolerance: 1e-6,
            max_iterations: 50,
            jacobian_epsilon: 1e-6,
        }
    }
}

/// Numeric stand-in for one joint: its coupling geometry, rest offset and
/// whether a slide stage is fitted.
pub(crate) struct JointModel {
    pub geometry: JointGeometry,
    pub offset: Vector3<f64>,
    pub has_slide: bool,
}

/// Pure numeric model of the whole stand, detached from any hardware. The
/// axis vector concatenates, per joint in (cone, flat, vee) order, the slide
/// position (when fitted) followed by the lift position.
pub(crate) struct StandModel {
    pub joints: [JointModel; 3],
}

impl StandModel {
    pub fn axis_count(&self) -> usize {
        self.joints.iter().map(|joint| if joint.has_slide { 2 } else { 1 }).sum()
    }

    fn raw_axes(&self, axes: &DVector<f64>, index: usize) -> (f64, f64) {
        let cursor: usize = self.joints[..index]
            .iter()
            .map(|joint| if joint.has_slide { 2 } else { 1 })
            .sum();
        if self.joints[index].has_slide {
            (axes[cursor], axes[cursor + 1])
        } else {
            (0.0, axes[cursor])
        }
    }

    /// Ball positions of the three joints for the given axis vector.
    pub fn positions(&self, axes: &DVector<f64>) -> [Vector3<f64>; 3] {
        let mut positions = [Vector3::zeros(); 3];
        for index in 0..3 {
            let (slide, lift) = self.raw_axes(axes, index);
            let joint = &self.joints[index];
            positions[index] = joint.offset + joint.geometry.displacement(slide, lift);
        }
        positions
    }

    /// Forward transform of the modelled stand.
    pub fn pose(&self, axes: &DVector<f64>) -> Result<Pose, StandError> {
        let rest = [self.joints[0].offset, self.joints[1].offset, self.joints[2].offset];
        pose_from_joints(&rest, &self.positions(axes))
    }

    /// Joint-local (x, y) displacements for the given axis vector; the bridge
    /// from a solved axis vector back to per-joint `set_xy` targets.
    pub fn locals(&self, axes: &DVector<f64>) -> [(f64, f64); 3] {
        let mut locals = [(0.0, 0.0); 3];
        for index in 0..3 {
            let (slide, lift) = self.raw_axes(axes, index);
            locals[index] = self.joints[index].geometry.local_xy(slide, lift);
        }
        locals
    }
}

/// Pose discrepancy as a 6-vector: translation difference followed by the
/// scaled axis of the relative rotation.
fn pose_error(target: &Pose, current: &Pose) -> DVector<f64> {
    let translation = target.translation.vector - current.translation.vector;
    let rotation = (target.rotation * current.rotation.inverse()).scaled_axis();
    DVector::from_column_slice(&[
        translation.x, translation.y, translation.z,
        rotation.x, rotation.y, rotation.z,
    ])
}

/// Numeric Jacobian of the forward transform at the given axis vector. Each
/// column is the pose change per unit motion of one axis.
fn compute_jacobian(
    model: &StandModel,
    axes: &DVector<f64>,
    current: &Pose,
    epsilon: f64,
) -> Result<DMatrix<f64>, StandError> {
    let count = model.axis_count();
    let mut jacobian = DMatrix::zeros(6, count);
    for index in 0..count {
        let mut perturbed = axes.clone();
        perturbed[index] += epsilon;
        let pose = model.pose(&perturbed)?;

        let delta_position = (pose.translation.vector - current.translation.vector) / epsilon;
        let delta_orientation = (pose.rotation * current.rotation.inverse()).scaled_axis() / epsilon;
        jacobian.column_mut(index).copy_from(&DVector::from_column_slice(&[
            delta_position.x, delta_position.y, delta_position.z,
            delta_orientation.x, delta_orientation.y, delta_orientation.z,
        ]));
    }
    Ok(jacobian)
}

/// Refines the axis vector until the modelled pose matches the target within
/// tolerance, starting from `start` (the live encoder readings). Returns the
/// solved axis vector; fails with [`StandError::Convergence`] when the cap is
/// reached, in which case the caller must not move anything.
pub(crate) fn solve(
    model: &StandModel,
    start: &DVector<f64>,
    target: &Pose,
    settings: &SolverSettings,
) -> Result<DVector<f64>, StandError> {
    let mut axes = start.clone();
    let mut translation_error = f64::INFINITY;
    let mut rotation_error = f64::INFINITY;

    for iteration in 0..settings.max_iterations {
        let pose = model.pose(&axes)?;
        let error = pose_error(target, &pose);
        translation_error = error.rows(0, 3).norm();
        rotation_error = error.rows(3, 3).norm();
        debug!(
            "solver iteration {}: translation error {:.3e}, rotation error {:.3e}",
            iteration, translation_error, rotation_error
        );
        if translation_error < settings.translation_tolerance
            && rotation_error < settings.rotation_tolerance
        {
            return Ok(axes);
        }

        let jacobian = compute_jacobian(model, &axes, &pose, settings.jacobian_epsilon)?;
        let step = if jacobian.is_square() {
            jacobian.clone().try_inverse().map(|inverse| &inverse * &error)
        } else {
            None
        };
        let step = match step {
            Some(step) => step,
            None => {
                let svd = SVD::new(jacobian, true, true);
                match svd.pseudo_inverse(settings.jacobian_epsilon) {
                    Ok(pseudo_inverse) => &pseudo_inverse * &error,
                    Err(_) => {
                        warn!("unable to compute the pseudoinverse of the stand Jacobian");
                        return Err(StandError::Convergence {
                            iterations: iteration,
                            translation_error,
                            rotation_error,
                        });
                    }
                }
            }
        };
        axes += step;
    }

    warn!(
        "inverse solver did not converge after {} iterations \
         (translation error {:.3e}, rotation error {:.3e})",
        settings.max_iterations, translation_error, rotation_error
    );
    Err(StandError::Convergence {
        iterations: settings.max_iterations,
        translation_error,
        rotation_error,
    })
}
