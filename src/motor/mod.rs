// Motor control module for the four-wheel omni base
//
// Provides:
// - Joystick frame rotation and omni-wheel mixing
// - DC motor duty mapping with deadband
// - Serial pin bridge protocol
// - Four-wheel base driver

pub mod bridge;
mod dc_motor;
mod driver;
pub mod kinematics;

pub use bridge::{BridgeError, PinBridge};
pub use dc_motor::{DcMotor, Direction, DutyMapper, MotorCommand, MotorOutputs, SimulatedOutputs};
pub use driver::{OmniBase, DISPATCH_ORDER};
pub use kinematics::{joystick_to_wheels, mix, rotate, shrink_to_circle};
