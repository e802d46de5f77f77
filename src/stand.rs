//! The assembled stand: three joints, a room calibration rotation and the
//! motion operations built on the solver.
//!
//! All motion goes through one funnel, [`Stand::move_to_pose`]: express the
//! request as a target pose, solve for the axis vector starting from the live
//! encoder readings, validate every stage target, and only then move. The
//! encoder-anchored start is what keeps sequential relative moves from
//! accumulating model drift, and the all-or-nothing validation is what keeps a
//! half-moved stand from ever being the failure mode of a rejected request.

use crate::frames::{self, pitch_yaw_roll, rotation_from_angles, Pose};
use crate::joints::Joint;
use crate::solver::{solve, JointModel, SolverSettings, StandModel};
use crate::stand_error::StandError;
use nalgebra::{DVector, Point3, Translation3, UnitQuaternion, Vector3};
use tracing::debug;

/// Minimum lever arm between the alignment pivot and the steered point.
const ALIGN_LEVER_TOLERANCE: f64 = 1e-6;

/// Correction rounds of the alignment small-angle seed.
const ALIGN_REFINEMENTS: usize = 3;

/// A detector stand suspended on a cone, a flat and a vee joint.
///
/// Poses and motion requests are expressed in the room frame; the fixed
/// `stand_to_room` rotation (identity for a stand installed square to the
/// room) converts between the two. The joints themselves always live in the
/// stand base frame.
pub struct Stand {
    cone: Joint,
    flat: Joint,
    vee: Joint,
    stand_to_room: UnitQuaternion<f64>,
    settings: SolverSettings,
}

impl Stand {
    /// Assembles a stand from its three joints, installed square to the room
    /// and with default solver settings.
    pub fn new(cone: Joint, flat: Joint, vee: Joint) -> Self {
        Stand {
            cone,
            flat,
            vee,
            stand_to_room: UnitQuaternion::identity(),
            settings: SolverSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the calibration rotation from the stand base frame to the room.
    pub fn with_stand_to_room(mut self, rotation: UnitQuaternion<f64>) -> Self {
        self.stand_to_room = rotation;
        self
    }

    pub fn cone(&self) -> &Joint {
        &self.cone
    }

    pub fn flat(&self) -> &Joint {
        &self.flat
    }

    pub fn vee(&self) -> &Joint {
        &self.vee
    }

    fn joints(&self) -> [&Joint; 3] {
        [&self.cone, &self.flat, &self.vee]
    }

    fn model(&self) -> StandModel {
        let joint_model = |joint: &Joint| JointModel {
            geometry: *joint.geometry(),
            offset: joint.offset(),
            has_slide: joint.has_slide(),
        };
        StandModel {
            joints: [
                joint_model(&self.cone),
                joint_model(&self.flat),
                joint_model(&self.vee),
            ],
        }
    }

    /// Live encoder readings concatenated in solver axis order.
    fn read_axes(&self) -> Result<DVector<f64>, StandError> {
        let mut axes = Vec::with_capacity(6);
        for joint in self.joints() {
            let (slide, lift) = joint.displacement()?;
            if joint.has_slide() {
                axes.push(slide);
            }
            axes.push(lift);
        }
        Ok(DVector::from_vec(axes))
    }

    /// Current ball positions of the three joints, in the base frame.
    pub fn positions(&self) -> Result<[Vector3<f64>; 3], StandError> {
        Ok([
            self.cone.position()?,
            self.flat.position()?,
            self.vee.position()?,
        ])
    }

    /// Current pose in the stand base frame, from the live encoder readings.
    fn base_pose(&self) -> Result<Pose, StandError> {
        let rest = [self.cone.offset(), self.flat.offset(), self.vee.offset()];
        frames::pose_from_joints(&rest, &self.positions()?)
    }

    fn room(&self) -> Pose {
        Pose::from_parts(Translation3::identity(), self.stand_to_room)
    }

    /// Current pose in the room frame.
    pub fn pose(&self) -> Result<Pose, StandError> {
        let room = self.room();
        Ok(room * self.base_pose()? * room.inverse())
    }

    /// Current (pitch, yaw, roll) of the stand in the room frame.
    pub fn angles(&self) -> Result<(f64, f64, f64), StandError> {
        Ok(pitch_yaw_roll(&self.pose()?))
    }

    /// Moves the stand to the given room-frame pose. Nothing moves unless the
    /// solver converged and every stage target passed validation.
    pub fn move_to_pose(&mut self, target: &Pose) -> Result<(), StandError> {
        let room = self.room();
        self.move_to_base_pose(&(room.inverse() * target * room))
    }

    fn move_to_base_pose(&mut self, target: &Pose) -> Result<(), StandError> {
        let model = self.model();
        let start = self.read_axes()?;
        let solved = solve(&model, &start, target, &self.settings)?;
        let locals = model.locals(&solved);
        debug!(
            "moving to base pose {:?}, joint locals {:?}",
            target, locals
        );

        // Validate every joint before the first motor moves.
        let cone = self.cone.targets(locals[0].0, locals[0].1)?;
        let flat = self.flat.targets(locals[1].0, locals[1].1)?;
        let vee = self.vee.targets(locals[2].0, locals[2].1)?;

        self.cone.apply(&cone)?;
        self.flat.apply(&flat)?;
        self.vee.apply(&vee)?;
        Ok(())
    }

    /// Translates the stand by (dx, dy, dz) in the room frame, keeping its
    /// orientation. A component along the beam axis of a standard stand is
    /// beyond the stages and fails with [`StandError::Convergence`].
    pub fn translate(&mut self, dx: f64, dy: f64, dz: f64) -> Result<(), StandError> {
        let current = self.base_pose()?;
        let shift = self.stand_to_room.inverse() * Vector3::new(dx, dy, dz);
        let target = Pose::from_parts(
            Translation3::from(current.translation.vector + shift),
            current.rotation,
        );
        self.move_to_base_pose(&target)
    }

    /// Rotates the stand by the given room-frame angle increments about the
    /// cone joint, the natural pivot of the kinematics.
    pub fn rotate(&mut self, pitch: f64, yaw: f64, roll: f64) -> Result<(), StandError> {
        let pivot = self.cone.offset();
        self.rotate_about(pivot, pitch, yaw, roll)
    }

    /// Rotates the stand by the given room-frame angle increments, keeping
    /// the image of the given base-frame pivot point fixed.
    pub fn rotate_about(
        &mut self,
        pivot: Vector3<f64>,
        pitch: f64,
        yaw: f64,
        roll: f64,
    ) -> Result<(), StandError> {
        let rotation = self.stand_to_room.inverse()
            * rotation_from_angles(pitch, yaw, roll)
            * self.stand_to_room;
        let target = frames::rotate_about(&self.base_pose()?, pivot, &rotation);
        self.move_to_base_pose(&target)
    }

    /// Steers the point at `(0, 0, z)` on the stand axis by (dx, dy) while
    /// holding the image of `(0, 0, origin)` fixed, both in the base frame.
    /// This is the survey operation: pivot about a reference near the stand
    /// and walk a far point of the detector axis onto the beam.
    ///
    /// The rotation is seeded from the small-angle approximation and refined
    /// a few rounds against the exact poses, with the cone held on the plane
    /// its stages can reach.
    pub fn align(&mut self, z: f64, dx: f64, dy: f64, origin: f64) -> Result<(), StandError> {
        let lever = z - origin;
        if lever.abs() < ALIGN_LEVER_TOLERANCE {
            return Err(StandError::Unreachable(format!(
                "cannot steer the point at z = {} while pivoting about z = {}",
                z, origin
            )));
        }

        let current = self.base_pose()?;
        let pivot = Vector3::new(0.0, 0.0, origin);
        let probe = Point3::new(0.0, 0.0, z);
        let start = current.transform_point(&probe);

        let mut pitch = -dy / lever;
        let mut yaw = dx / lever;
        let mut target = self.aligned_candidate(&current, pivot, pitch, yaw)?;
        for _ in 0..ALIGN_REFINEMENTS {
            let achieved = target.transform_point(&probe) - start;
            pitch -= (dy - achieved.y) / lever;
            yaw += (dx - achieved.x) / lever;
            target = self.aligned_candidate(&current, pivot, pitch, yaw)?;
        }
        self.move_to_base_pose(&target)
    }

    /// A candidate alignment pose, shifted along the beam axis so the cone
    /// ball keeps its current z. The cone stages span only the x-y plane, so
    /// any pose that takes the cone off that plane is unreachable as a whole.
    fn aligned_candidate(
        &self,
        current: &Pose,
        pivot: Vector3<f64>,
        pitch: f64,
        yaw: f64,
    ) -> Result<Pose, StandError> {
        let rotation = rotation_from_angles(pitch, yaw, 0.0);
        let mut target = frames::rotate_about(current, pivot, &rotation);
        let cone_rest = Point3::from(self.cone.offset());
        let cone_z = self.cone.position()?.z;
        target.translation.vector.z += cone_z - target.transform_point(&cone_rest).z;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{Axis, AxisError, SoftAxis};
    use crate::geometry::{JointGeometry, DEFAULT_ALPHA};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::RefCell;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::sync::Arc;

    fn cone_offset() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, 0.0)
    }

    fn flat_offset() -> Vector3<f64> {
        Vector3::new(-10.0, 0.0, -20.0)
    }

    fn vee_offset() -> Vector3<f64> {
        Vector3::new(10.0, 0.0, -20.0)
    }

    fn joint(
        geometry: JointGeometry,
        offset: Vector3<f64>,
        slide: Option<Arc<dyn Axis>>,
        lift: Arc<dyn Axis>,
    ) -> Joint {
        Joint::new(lift, slide, geometry, offset)
    }

    /// A six-axis stand at rest, returning the soft axes for inspection in
    /// (cone slide, cone lift, flat slide, flat lift, vee slide, vee lift)
    /// order.
    fn soft_stand() -> (Stand, Vec<Arc<SoftAxis>>) {
        let names = [
            "cone_slide", "cone_lift", "flat_slide", "flat_lift", "vee_slide", "vee_lift",
        ];
        let axes: Vec<Arc<SoftAxis>> = names
            .iter()
            .map(|name| Arc::new(SoftAxis::new(name, 0.0)))
            .collect();
        let stand = Stand::new(
            joint(
                JointGeometry::cone(DEFAULT_ALPHA),
                cone_offset(),
                Some(axes[0].clone() as Arc<dyn Axis>),
                axes[1].clone() as Arc<dyn Axis>,
            ),
            joint(
                JointGeometry::angled(DEFAULT_ALPHA),
                flat_offset(),
                Some(axes[2].clone() as Arc<dyn Axis>),
                axes[3].clone() as Arc<dyn Axis>,
            ),
            joint(
                JointGeometry::angled(DEFAULT_ALPHA),
                vee_offset(),
                Some(axes[4].clone() as Arc<dyn Axis>),
                axes[5].clone() as Arc<dyn Axis>,
            ),
        );
        (stand, axes)
    }

    fn axis_values(axes: &[Arc<SoftAxis>]) -> Vec<f64> {
        axes.iter().map(|axis| axis.position().unwrap()).collect()
    }

    #[test]
    fn test_rest_pose_is_identity() {
        let (stand, _) = soft_stand();
        let pose = stand.pose().unwrap();
        assert!(pose.translation.vector.norm() < 1e-12);
        assert!(pose.rotation.angle() < 1e-12);
    }

    #[test]
    fn test_translate_and_return() {
        let (mut stand, axes) = soft_stand();
        stand.translate(1.0, 2.0, 0.0).unwrap();

        let pose = stand.pose().unwrap();
        assert!((pose.translation.vector - Vector3::new(1.0, 2.0, 0.0)).norm() < 1e-3);
        assert!(pose.rotation.angle() < 1e-5);
        // The lift alone realizes the vertical part, the slide compensates
        // the horizontal leak of the tilted lift.
        assert!((axes[1].position().unwrap() - 7.7274).abs() < 1e-3);
        assert!((axes[0].position().unwrap() + 6.4641).abs() < 1e-3);

        stand.translate(-1.0, -2.0, 0.0).unwrap();
        let pose = stand.pose().unwrap();
        assert!(pose.translation.vector.norm() < 1e-3);
        for value in axis_values(&axes) {
            assert!(value.abs() < 1e-3);
        }
    }

    #[test]
    fn test_rotate_about_the_cone() {
        let (mut stand, axes) = soft_stand();
        let (pitch, yaw, roll) = (PI / 180.0, PI / 60.0, PI / 90.0);
        stand.rotate(pitch, yaw, roll).unwrap();

        let (p, y, r) = stand.angles().unwrap();
        assert!((p - pitch).abs() < 1e-5);
        assert!((y - yaw).abs() < 1e-5);
        assert!((r - roll).abs() < 1e-5);
        // A rotation about the cone must not spend any cone stage motion.
        assert!(axes[0].position().unwrap().abs() < 1e-6);
        assert!(axes[1].position().unwrap().abs() < 1e-6);

        // Finite rotations do not commute, so reversing the increments only
        // returns to rest within a second-order residual.
        stand.rotate(-pitch, -yaw, -roll).unwrap();
        let (p, y, r) = stand.angles().unwrap();
        assert!(p.abs() < PI / 180.0);
        assert!(y.abs() < PI / 180.0);
        assert!(r.abs() < PI / 180.0);
    }

    #[test]
    fn test_move_to_current_pose_is_idempotent() {
        let (mut stand, axes) = soft_stand();
        stand.translate(0.5, 1.0, 0.0).unwrap();
        let before = axis_values(&axes);

        let pose = stand.pose().unwrap();
        stand.move_to_pose(&pose).unwrap();
        let after = axis_values(&axes);
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_out_of_travel_rejected_before_any_motion() {
        let names = [
            "cone_slide", "cone_lift", "flat_slide", "flat_lift", "vee_slide", "vee_lift",
        ];
        let axes: Vec<Arc<SoftAxis>> = names
            .iter()
            .map(|name| {
                if *name == "cone_lift" {
                    Arc::new(SoftAxis::with_limits(name, 0.0, -5.0, 5.0))
                } else {
                    Arc::new(SoftAxis::new(name, 0.0))
                }
            })
            .collect();
        let mut stand = Stand::new(
            joint(
                JointGeometry::cone(DEFAULT_ALPHA),
                cone_offset(),
                Some(axes[0].clone() as Arc<dyn Axis>),
                axes[1].clone() as Arc<dyn Axis>,
            ),
            joint(
                JointGeometry::angled(DEFAULT_ALPHA),
                flat_offset(),
                Some(axes[2].clone() as Arc<dyn Axis>),
                axes[3].clone() as Arc<dyn Axis>,
            ),
            joint(
                JointGeometry::angled(DEFAULT_ALPHA),
                vee_offset(),
                Some(axes[4].clone() as Arc<dyn Axis>),
                axes[5].clone() as Arc<dyn Axis>,
            ),
        );

        // Needs a cone lift of about 7.7, past the 5.0 travel limit.
        let result = stand.translate(1.0, 2.0, 0.0);
        assert!(matches!(result, Err(StandError::OutOfRange { .. })));
        for axis in &axes {
            assert_eq!(axis.moves(), 0);
        }
    }

    #[test]
    fn test_beam_translation_fails_without_motion() {
        let (mut stand, axes) = soft_stand();
        let result = stand.translate(0.0, 0.0, 1.0);
        assert!(matches!(result, Err(StandError::Convergence { .. })));
        for axis in &axes {
            assert_eq!(axis.moves(), 0);
        }
    }

    /// Wraps a soft axis so every accepted move lands slightly off target,
    /// the way a real stage settles within its deadband.
    struct NoisyAxis {
        inner: SoftAxis,
        rng: RefCell<StdRng>,
        amplitude: f64,
    }

    impl Axis for NoisyAxis {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn position(&self) -> Result<f64, AxisError> {
            self.inner.position()
        }

        fn move_to(&self, target: f64) -> Result<(), AxisError> {
            let noise = self.rng.borrow_mut().random_range(-self.amplitude..self.amplitude);
            self.inner.move_to(target + noise)
        }

        fn travel_limits(&self) -> (f64, f64) {
            self.inner.travel_limits()
        }
    }

    #[test]
    fn test_noisy_axes_do_not_accumulate_drift() {
        let names = [
            "cone_slide", "cone_lift", "flat_slide", "flat_lift", "vee_slide", "vee_lift",
        ];
        let axes: Vec<Arc<NoisyAxis>> = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                Arc::new(NoisyAxis {
                    inner: SoftAxis::new(name, 0.0),
                    rng: RefCell::new(StdRng::seed_from_u64(7 + index as u64)),
                    amplitude: 1e-3,
                })
            })
            .collect();
        let mut stand = Stand::new(
            joint(
                JointGeometry::cone(DEFAULT_ALPHA),
                cone_offset(),
                Some(axes[0].clone() as Arc<dyn Axis>),
                axes[1].clone() as Arc<dyn Axis>,
            ),
            joint(
                JointGeometry::angled(DEFAULT_ALPHA),
                flat_offset(),
                Some(axes[2].clone() as Arc<dyn Axis>),
                axes[3].clone() as Arc<dyn Axis>,
            ),
            joint(
                JointGeometry::angled(DEFAULT_ALPHA),
                vee_offset(),
                Some(axes[4].clone() as Arc<dyn Axis>),
                axes[5].clone() as Arc<dyn Axis>,
            ),
        );

        // Each move starts from the latest readback, so readback noise stays
        // bounded instead of compounding across the cycles.
        for _ in 0..10 {
            stand.translate(1.0, 0.0, 0.0).unwrap();
            stand.translate(-1.0, 0.0, 0.0).unwrap();
        }
        let pose = stand.pose().unwrap();
        assert!(pose.translation.vector.norm() < 1e-2);
        assert!(pose.rotation.angle() < 1e-2);
    }

    #[test]
    fn test_room_rotation_maps_requests_into_the_base() {
        let (mut stand, _) = soft_stand();
        stand = stand.with_stand_to_room(rotation_from_angles(0.0, 0.0, FRAC_PI_2));

        stand.translate(1.0, 0.0, 0.0).unwrap();
        let pose = stand.pose().unwrap();
        assert!((pose.translation.vector - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-3);
        // A room x request is a base -y displacement under a quarter turn.
        let cone = stand.cone().position().unwrap();
        assert!((cone - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-3);
    }

    #[test]
    fn test_five_axis_stand_round_trip() {
        let build = |values: [f64; 5]| {
            let slides = [
                Arc::new(SoftAxis::new("cone_slide", values[0])),
                Arc::new(SoftAxis::new("vee_slide", values[3])),
            ];
            let lifts = [
                Arc::new(SoftAxis::new("cone_lift", values[1])),
                Arc::new(SoftAxis::new("flat_lift", values[2])),
                Arc::new(SoftAxis::new("vee_lift", values[4])),
            ];
            let stand = Stand::new(
                joint(
                    JointGeometry::cone(DEFAULT_ALPHA),
                    cone_offset(),
                    Some(slides[0].clone() as Arc<dyn Axis>),
                    lifts[0].clone() as Arc<dyn Axis>,
                ),
                joint(
                    JointGeometry::angled(DEFAULT_ALPHA),
                    flat_offset(),
                    None,
                    lifts[1].clone() as Arc<dyn Axis>,
                ),
                joint(
                    JointGeometry::angled(DEFAULT_ALPHA),
                    vee_offset(),
                    Some(slides[1].clone() as Arc<dyn Axis>),
                    lifts[2].clone() as Arc<dyn Axis>,
                ),
            );
            (stand, slides, lifts)
        };

        let reached = [0.4, -0.2, 0.3, 0.1, 0.25];
        let (recorded, _, _) = build(reached);
        let target = recorded.pose().unwrap();

        let (mut stand, slides, lifts) = build([2.0, 1.0, -1.0, 0.5, -0.5]);
        stand.move_to_pose(&target).unwrap();
        let solved = [
            slides[0].position().unwrap(),
            lifts[0].position().unwrap(),
            lifts[1].position().unwrap(),
            slides[1].position().unwrap(),
            lifts[2].position().unwrap(),
        ];
        for (a, b) in solved.iter().zip(reached.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_align_steers_the_far_point_about_the_pivot() {
        let (mut stand, _) = soft_stand();
        let probe = Point3::new(0.0, 0.0, -150.0);
        let pivot = Point3::new(0.0, 0.0, -1.0);
        let start = stand.pose().unwrap().transform_point(&probe);

        stand.align(-150.0, 2.0, 3.0, -1.0).unwrap();
        let pose = stand.pose().unwrap();
        let moved = pose.transform_point(&probe) - start;
        assert!((moved.x - 2.0).abs() < 0.01);
        assert!((moved.y - 3.0).abs() < 0.01);
        let held = pose.transform_point(&pivot) - Point3::new(0.0, 0.0, -1.0);
        assert!(held.x.abs() < 0.01);
        assert!(held.y.abs() < 0.01);

        // A second alignment accumulates on top of the first.
        stand.align(-150.0, -4.0, 6.0, -1.0).unwrap();
        let moved = stand.pose().unwrap().transform_point(&probe) - start;
        assert!((moved.x + 2.0).abs() < 0.01);
        assert!((moved.y - 9.0).abs() < 0.01);
    }

    #[test]
    fn test_align_at_the_pivot_is_rejected() {
        let (mut stand, _) = soft_stand();
        let result = stand.align(-1.0, 1.0, 0.0, -1.0);
        assert!(matches!(result, Err(StandError::Unreachable(_))));
    }
}
