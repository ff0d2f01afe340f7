// Message types shared by the link, the mixer and the state publishers

use serde::{Deserialize, Serialize};

/// Number of bytes in a joystick payload: three i32 values
pub const JOYSTICK_PAYLOAD_LEN: usize = 12;

/// One joystick reading from the beacon: lateral, forward/back, twist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoystickSample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl JoystickSample {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Decode a beacon payload (three little-endian i32).
    /// Returns `None` when the payload is not exactly 12 bytes.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != JOYSTICK_PAYLOAD_LEN {
            return None;
        }
        let word = |i: usize| i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Some(Self::new(word(0), word(4), word(8)))
    }

    /// Encode as the beacon sends it
    pub fn encode(&self) -> [u8; JOYSTICK_PAYLOAD_LEN] {
        let mut out = [0u8; JOYSTICK_PAYLOAD_LEN];
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.z.to_le_bytes());
        out
    }
}

/// Robot pose from the tracking sensor (meters, radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Reference frame used to interpret the joystick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TeleopMode {
    /// Bird's-eye view: forward is a fixed world direction
    Bev,
    /// First-person view: forward follows the robot's nose
    Fpv,
}

/// Per-wheel speed commands, nominally within +/-100 but not clamped by the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WheelSpeedSet {
    pub s1: i32,
    pub s2: i32,
    pub s3: i32,
    pub s4: i32,
}

impl WheelSpeedSet {
    pub fn new(s1: i32, s2: i32, s3: i32, s4: i32) -> Self {
        Self { s1, s2, s3, s4 }
    }

    /// Speeds as array [s1, s2, s3, s4]
    pub fn as_array(&self) -> [i32; 4] {
        [self.s1, self.s2, self.s3, self.s4]
    }

    pub fn max_magnitude(&self) -> i32 {
        self.as_array().iter().map(|s| s.abs()).max().unwrap_or(0)
    }
}

/// Link health published by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LinkHealth {
    Searching,
    Streaming,
    Faulted { reason: String },
}
