use std::f64::consts::PI;
use std::sync::Arc;

use stand_kinematics::axis::{Axis, SoftAxis};
use stand_kinematics::calibration::StandCalibration;
use stand_kinematics::utils::dump_pose;

/// Usage example: a software-backed stand walked through the motion surface.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let axis = |name: &str| Arc::new(SoftAxis::new(name, 0.0)) as Arc<dyn Axis>;
    let mut stand = StandCalibration::default().assemble(
        (axis("cone_lift"), Some(axis("cone_slide"))),
        (axis("flat_lift"), None),
        (axis("vee_lift"), Some(axis("vee_slide"))),
    );

    println!("At rest:");
    dump_pose(&stand.pose()?);

    println!("\nTranslated by (5, 10, 0):");
    stand.translate(5.0, 10.0, 0.0)?;
    dump_pose(&stand.pose()?);

    println!("\nPitched by 0.5 degrees about the cone:");
    stand.rotate(0.5 * PI / 180.0, 0.0, 0.0)?;
    dump_pose(&stand.pose()?);

    println!("\nFar point at z = -3000 steered by (1, 2) about z = -100:");
    stand.align(-3000.0, 1.0, 2.0, -100.0)?;
    dump_pose(&stand.pose()?);

    println!("\nJoint readings (local x, y):");
    for (name, joint) in [
        ("cone", stand.cone()),
        ("flat", stand.flat()),
        ("vee", stand.vee()),
    ] {
        let (x, y) = joint.get_xy()?;
        println!("  {:4}  x {:8.3}  y {:8.3}", name, x, y);
    }
    Ok(())
}
