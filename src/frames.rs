//! Pose representation and the analytic forward transform.
//!
//! The stand is viewed through two frames. The *base* (rest) frame ignores any
//! rotation and translation: every joint sits at its calibration offset, with
//! the cone joint as the origin of rotation. The *room* frame is where poses
//! are reported and motion requests are expressed; a fixed calibration
//! rotation relates the two. A [`Pose`] maps base-frame rest coordinates of a
//! body point to its current coordinates, so a stand at rest has the identity
//! pose.
//!
//! The forward transform (three joint positions to a pose) is direct and
//! analytic: the cone defines the translation, and the vee-to-cone and
//! flat-to-cone vectors span the stand plane from which an orthonormal basis
//! and the rotation are built. Only the reverse direction needs iteration, see
//! [`crate::solver`].

use crate::stand_error::StandError;
use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Rigid-body pose of the stand: rotation plus translation, mapping rest
/// coordinates to current coordinates.
pub type Pose = Isometry3<f64>;

/// Relative tolerance below which the joint triangle is considered collapsed.
pub const COLINEARITY_TOLERANCE: f64 = 1e-9;

/// Rotation for the given pitch (about x), yaw (about y) and roll (about z),
/// composed as Rz(roll) * Ry(yaw) * Rx(pitch).
pub fn rotation_from_angles(pitch: f64, yaw: f64, roll: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(pitch, yaw, roll)
}

/// Extracts (pitch, yaw, roll) from a pose, inverse of [`rotation_from_angles`].
pub fn pitch_yaw_roll(pose: &Pose) -> (f64, f64, f64) {
    pose.rotation.euler_angles()
}

/// The forward transform: the pose of the rigid body given the rest offsets
/// and the current positions of the three joints, both ordered (cone, flat,
/// vee). Fails when either triangle is colinear or coincident, in which case
/// the orientation is undefined and must not be silently computed.
pub fn pose_from_joints(
    rest: &[Vector3<f64>; 3],
    current: &[Vector3<f64>; 3],
) -> Result<Pose, StandError> {
    // In-plane directions from the cone to the two rear joints.
    let v1 = rest[2] - rest[0];
    let v2 = rest[1] - rest[0];
    let w1 = current[2] - current[0];
    let w2 = current[1] - current[0];

    let rest_normal = v1.cross(&v2);
    let current_normal = w1.cross(&w2);
    if rest_normal.norm() <= COLINEARITY_TOLERANCE * v1.norm() * v2.norm()
        || current_normal.norm() <= COLINEARITY_TOLERANCE * w1.norm() * w2.norm()
    {
        return Err(StandError::DegenerateGeometry {
            cross_norm: current_normal.norm().min(rest_normal.norm()),
        });
    }

    // Orthonormal bases spanned by the stand plane, before and after.
    let b1 = v1.normalize();
    let b2 = rest_normal.normalize();
    let b3 = b1.cross(&b2);

    let d1 = w1.normalize();
    let d2 = current_normal.normalize();
    let d3 = d1.cross(&d2);

    let rotation = Matrix3::from_columns(&[d1, d2, d3])
        * Matrix3::from_columns(&[b1, b2, b3]).transpose();
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));

    let translation = current[0] - rotation * rest[0];
    Ok(Pose::from_parts(Translation3::from(translation), rotation))
}

/// Composes an incremental rotation onto a pose while keeping the image of
/// the given rest-frame pivot point fixed.
pub fn rotate_about(pose: &Pose, pivot: Vector3<f64>, rotation: &UnitQuaternion<f64>) -> Pose {
    let fixed = pose.transform_point(&Point3::from(pivot));
    let new_rotation = rotation * pose.rotation;
    let translation = fixed.coords - new_rotation * pivot;
    Pose::from_parts(Translation3::from(translation), new_rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_recovers_rigid_motion_exactly() {
        let rest = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(-10.0, 0.0, -20.0),
            Vector3::new(10.0, 0.0, -20.0),
        ];
        let rotation = rotation_from_angles(0.02, -0.03, 0.05);
        let shift = Vector3::new(0.5, -0.2, 0.1);
        let current = [
            rotation * rest[0] + shift,
            rotation * rest[1] + shift,
            rotation * rest[2] + shift,
        ];

        let pose = pose_from_joints(&rest, &current).unwrap();
        let (pitch, yaw, roll) = pitch_yaw_roll(&pose);
        assert!((pitch - 0.02).abs() < EPSILON);
        assert!((yaw + 0.03).abs() < EPSILON);
        assert!((roll - 0.05).abs() < EPSILON);
        assert!((pose.translation.vector - shift).norm() < EPSILON);
    }

    #[test]
    fn test_quarter_turn_with_translation() {
        // 90 degree rotation around z plus a shift by (1, 2, 0); a fourth
        // point transformed by the recovered pose must land accordingly.
        let rest = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let current = [
            Vector3::new(1.0, 2.0, 0.0),
            Vector3::new(1.0, 3.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
        ];

        let pose = pose_from_joints(&rest, &current).unwrap();
        assert!((pose.translation.vector - Vector3::new(1.0, 2.0, 0.0)).norm() < EPSILON);
        let (_, _, roll) = pitch_yaw_roll(&pose);
        assert!((roll - FRAC_PI_2).abs() < EPSILON);

        let probe = pose.transform_point(&Point3::new(1.0, 1.0, 0.0));
        assert!((probe - Point3::new(0.0, 3.0, 0.0)).norm() < EPSILON);
    }

    #[test]
    fn test_colinear_joints_are_degenerate() {
        let rest = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ];
        let result = pose_from_joints(&rest, &rest);
        assert!(matches!(result, Err(StandError::DegenerateGeometry { .. })));
    }

    #[test]
    fn test_coincident_joints_are_degenerate() {
        let rest = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(-10.0, 0.0, -20.0),
            Vector3::new(10.0, 0.0, -20.0),
        ];
        let current = [Vector3::zeros(), Vector3::zeros(), Vector3::zeros()];
        let result = pose_from_joints(&rest, &current);
        assert!(matches!(result, Err(StandError::DegenerateGeometry { .. })));
    }

    #[test]
    fn test_angle_convention_round_trip() {
        let rotation = rotation_from_angles(0.1, -0.2, 0.3);
        let pose = Pose::from_parts(Translation3::identity(), rotation);
        let (pitch, yaw, roll) = pitch_yaw_roll(&pose);
        assert!((pitch - 0.1).abs() < EPSILON);
        assert!((yaw + 0.2).abs() < EPSILON);
        assert!((roll - 0.3).abs() < EPSILON);
    }

    #[test]
    fn test_rotate_about_holds_pivot() {
        let pose = Pose::from_parts(
            Translation3::new(0.3, -0.1, 0.2),
            rotation_from_angles(0.05, 0.02, -0.04),
        );
        let pivot = Vector3::new(0.0, 0.0, -1.0);
        let before = pose.transform_point(&Point3::from(pivot));

        let rotated = rotate_about(&pose, pivot, &rotation_from_angles(0.1, -0.05, 0.02));
        let after = rotated.transform_point(&Point3::from(pivot));
        assert!((after - before).norm() < EPSILON);
    }
}
