// Joystick-frame to wheel-frame geometry and omni-wheel mixing for the 4-wheel base.
//
// The wheels sit at 45 degrees to the chassis forward axis, so every joystick vector is
// rotated by a fixed quarter-pi offset (plus the robot heading in bird's-eye mode) before
// it is split across the two wheel pairs.
//
//          +Y (fwd)
//       M3 pair drives y, M1/M2 pair drives x
//       twist z is split +/- z/2 across each pair

use std::f64::consts::FRAC_PI_4;

use crate::messages::{JoystickSample, TeleopMode, WheelSpeedSet};

/// Fixed mechanical offset between chassis axes and wheel pairs
pub const MOUNT_OFFSET: f64 = FRAC_PI_4;

/// Cartesian to polar: (r, theta)
pub fn to_polar(x: f64, y: f64) -> (f64, f64) {
    (x.hypot(y), y.atan2(x))
}

/// Polar to cartesian: (x, y)
pub fn from_polar(r: f64, theta: f64) -> (f64, f64) {
    (r * theta.cos(), r * theta.sin())
}

/// Rotation applied to the joystick vector for the given mode and heading
pub fn rotation_angle(heading: f64, mode: TeleopMode) -> f64 {
    match mode {
        TeleopMode::Bev => MOUNT_OFFSET + heading,
        TeleopMode::Fpv => MOUNT_OFFSET,
    }
}

/// Express a joystick vector in the wheel-pair frame.
///
/// `heading` is the robot orientation in radians; it only matters in [`TeleopMode::Bev`].
/// The origin maps to the origin for every heading.
pub fn rotate(x: f64, y: f64, heading: f64, mode: TeleopMode) -> (f64, f64) {
    let (r, theta) = to_polar(x, y);
    from_polar(r, theta - rotation_angle(heading, mode))
}

/// Mix a rotated translation with the raw twist into four wheel speeds.
///
/// Values are truncated toward zero and are not clamped.
pub fn mix(x: f64, y: f64, z: f64) -> WheelSpeedSet {
    let half_z = z / 2.0;
    WheelSpeedSet {
        s1: (x + half_z) as i32,
        s2: (x - half_z) as i32,
        s3: (y - half_z) as i32,
        s4: (y + half_z) as i32,
    }
}

/// Full joystick-to-wheels path for one cycle
pub fn joystick_to_wheels(sample: JoystickSample, heading: f64, mode: TeleopMode) -> WheelSpeedSet {
    let (x, y) = rotate(sample.x as f64, sample.y as f64, heading, mode);
    mix(x, y, sample.z as f64)
}

/// Scale a speed set uniformly so its largest magnitude fits within `radius`
pub fn shrink_to_circle(speeds: WheelSpeedSet, radius: i32) -> WheelSpeedSet {
    let max = speeds.max_magnitude();
    if max <= radius {
        return speeds;
    }
    let [s1, s2, s3, s4] = speeds
        .as_array()
        .map(|s| (s as i64 * radius as i64 / max as i64) as i32);
    WheelSpeedSet::new(s1, s2, s3, s4)
}
