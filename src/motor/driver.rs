// Four-wheel omni base: four DC motors sharing one set of outputs
//
// Combines kinematics and the per-motor duty mapping behind a simple API
// for the teleop loop.

use tracing::{debug, info, warn};

use super::dc_motor::{DcMotor, DutyMapper, MotorCommand, MotorOutputs};
use crate::messages::WheelSpeedSet;

/// Order in which wheel commands are written each cycle (motor numbers)
pub const DISPATCH_ORDER: [usize; 4] = [4, 3, 2, 1];

pub struct OmniBase<O: MotorOutputs> {
    outputs: O,
    motors: [DcMotor; 4], // motors 1..=4
}

impl<O: MotorOutputs> OmniBase<O> {
    /// Build the base from wheel channels for motors 1..=4
    pub fn new(outputs: O, channels: [u8; 4], mapper: DutyMapper) -> Self {
        info!("Omni base on channels {:?}", channels);
        Self {
            outputs,
            motors: channels.map(|channel| DcMotor::new(channel, mapper)),
        }
    }

    /// Drive all four wheels back-to-back in [`DISPATCH_ORDER`].
    ///
    /// Returns the commands applied to motors 1..=4.
    pub fn drive(&mut self, speeds: WheelSpeedSet) -> Result<[MotorCommand; 4], O::Error> {
        debug!(
            "Driving wheels: s1={}, s2={}, s3={}, s4={}",
            speeds.s1, speeds.s2, speeds.s3, speeds.s4
        );
        let wheel_speeds = speeds.as_array();
        let mut applied = [MotorCommand::STOP; 4];
        for number in DISPATCH_ORDER {
            let i = number - 1;
            applied[i] = self.motors[i].drive(&mut self.outputs, wheel_speeds[i])?;
        }
        Ok(applied)
    }

    /// Stop every motor, attempting all four even if one write fails
    pub fn stop_all(&mut self) -> Result<(), O::Error> {
        let mut first_err = None;
        for number in DISPATCH_ORDER {
            if let Err(e) = self.motors[number - 1].stop(&mut self.outputs) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn toggle_indicator(&mut self) -> Result<(), O::Error> {
        self.outputs.toggle_indicator()
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    /// Channels for motors 1..=4
    pub fn channels(&self) -> [u8; 4] {
        [0, 1, 2, 3].map(|i| self.motors[i].channel())
    }
}

impl<O: MotorOutputs> Drop for OmniBase<O> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
