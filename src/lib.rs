//! Joystick teleop for a four-wheel omni robot.
//!
//! A wireless joystick beacon is read once per cycle, its vector is rotated into the
//! wheel-pair frame (optionally compensating the robot heading), mixed with the twist
//! axis into four wheel speeds and written to the motors as direction + PWM duty.

pub mod config;
pub mod link;
pub mod messages;
pub mod motor;
pub mod pose;
pub mod runtime;
