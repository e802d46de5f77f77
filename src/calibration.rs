//! Calibration records: the measured geometry of an installed stand, kept
//! separate from the motor handles so one survey serves any axis substrate
//! (live hardware, a soft model, a replay).

use crate::geometry::{JointGeometry, DEFAULT_ALPHA};
use crate::joints::Joint;
use crate::solver::SolverSettings;
use crate::stand::Stand;
use crate::axis::Axis;
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::Arc;

/// Surveyed geometry of one joint: its coupling map and the rest position of
/// its ball in stand coordinates.
#[derive(Debug, Clone, Copy)]
pub struct JointCalibration {
    pub geometry: JointGeometry,
    pub offset: Vector3<f64>,
}

impl JointCalibration {
    /// Binds the calibration to motor handles, yielding a usable joint.
    pub fn attach(&self, lift: Arc<dyn Axis>, slide: Option<Arc<dyn Axis>>) -> Joint {
        Joint::new(lift, slide, self.geometry, self.offset)
    }
}

/// Full survey of a stand. `stand_to_room` is the installed orientation of
/// the stand base relative to the room it reports poses in.
#[derive(Debug, Clone, Copy)]
pub struct StandCalibration {
    pub cone: JointCalibration,
    pub flat: JointCalibration,
    pub vee: JointCalibration,
    pub stand_to_room: UnitQuaternion<f64>,
    pub solver: SolverSettings,
}

impl StandCalibration {
    /// The common symmetric layout: the cone at the origin, the flat and vee
    /// joints mirrored across the beam axis at the given half width, raised
    /// by `rise` and set back by `depth`, all stages tilted by `alpha`.
    pub fn symmetric(alpha: f64, half_width: f64, rise: f64, depth: f64) -> Self {
        StandCalibration {
            cone: JointCalibration {
                geometry: JointGeometry::cone(alpha),
                offset: Vector3::zeros(),
            },
            flat: JointCalibration {
                geometry: JointGeometry::angled(alpha),
                offset: Vector3::new(-half_width, rise, -depth),
            },
            vee: JointCalibration {
                geometry: JointGeometry::angled(alpha),
                offset: Vector3::new(half_width, rise, -depth),
            },
            stand_to_room: UnitQuaternion::identity(),
            solver: SolverSettings::default(),
        }
    }

    /// Assembles the calibrated stand from motor handles, given per joint as
    /// (lift, optional slide).
    pub fn assemble(
        &self,
        cone: (Arc<dyn Axis>, Option<Arc<dyn Axis>>),
        flat: (Arc<dyn Axis>, Option<Arc<dyn Axis>>),
        vee: (Arc<dyn Axis>, Option<Arc<dyn Axis>>),
    ) -> Stand {
        Stand::new(
            self.cone.attach(cone.0, cone.1),
            self.flat.attach(flat.0, flat.1),
            self.vee.attach(vee.0, vee.1),
        )
        .with_stand_to_room(self.stand_to_room)
        .with_settings(self.solver)
    }
}

impl Default for StandCalibration {
    /// The survey of the reference installation: a 685.8 wide stand with the
    /// rear joints raised 361.404 and set back 609.6508 behind the cone.
    fn default() -> Self {
        StandCalibration::symmetric(DEFAULT_ALPHA, 342.9, 361.404, 609.6508)
    }
}
