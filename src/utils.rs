//! Small console helpers for interactive sessions and the demo binary.

use crate::frames::{pitch_yaw_roll, Pose};

/// Prints a pose as a position plus angles, converting radians to degrees.
pub fn dump_pose(pose: &Pose) {
    let translation = pose.translation.vector;
    let (pitch, yaw, roll) = pitch_yaw_roll(pose);
    println!(
        "Position: x {:8.3}, y {:8.3}, z {:8.3}",
        translation.x, translation.y, translation.z
    );
    println!(
        "Angles:   pitch {:7.4}, yaw {:7.4}, roll {:7.4} (degrees)",
        pitch.to_degrees(),
        yaw.to_degrees(),
        roll.to_degrees()
    );
}
