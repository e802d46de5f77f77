//! Kinematic abstraction for a detector stand suspended on three angled
//! motor stages.
//!
//! The stand rests on a cone, a flat and a vee joint. Each joint is carried
//! by a horizontal slide and a lift whose axis is tilted off the vertical, so
//! a single motor never moves the detector along a single Cartesian axis.
//! This crate hides that coupling behind two layers:
//!
//! - per joint, [`joints::Joint::set_xy`] decouples the two stages through
//!   the closed-form inverse of the coupling map, so callers command
//!   joint-local displacements instead of motors;
//! - per stand, [`stand::Stand`] exposes whole-body operations (translate,
//!   rotate, steer a far point of the detector axis) through one funnel that
//!   solves a target pose into axis positions and validates every stage
//!   target before anything moves.
//!
//! The forward direction (three joint positions to a pose) is analytic. The
//! reverse direction is deliberately not: the solver in [`solver`] iterates a
//! Newton refinement anchored at the live encoder readings, which keeps long
//! sequences of relative moves from accumulating the model drift an open-loop
//! analytic inverse would collect, and picks the minimum-motion configuration
//! when the stand has a redundant degree of freedom.
//!
//! # Example
//!
//! A fully software-backed stand, lifted by 2 and shifted sideways by 1:
//!
//! ```
//! use nalgebra::Vector3;
//! use std::sync::Arc;
//! use stand_kinematics::axis::{Axis, SoftAxis};
//! use stand_kinematics::calibration::StandCalibration;
//!
//! fn main() -> Result<(), stand_kinematics::stand_error::StandError> {
//!     let axis = |name: &str| Arc::new(SoftAxis::new(name, 0.0)) as Arc<dyn Axis>;
//!     let mut stand = StandCalibration::default().assemble(
//!         (axis("cone_lift"), Some(axis("cone_slide"))),
//!         (axis("flat_lift"), None),
//!         (axis("vee_lift"), Some(axis("vee_slide"))),
//!     );
//!
//!     stand.translate(1.0, 2.0, 0.0)?;
//!     let pose = stand.pose()?;
//!     assert!((pose.translation.vector - Vector3::new(1.0, 2.0, 0.0)).norm() < 1e-3);
//!     Ok(())
//! }
//! ```

pub mod axis;
pub mod calibration;
pub mod frames;
pub mod geometry;
pub mod joints;
pub mod solver;
pub mod stand;
pub mod stand_error;
pub mod utils;
