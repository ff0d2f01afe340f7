// Brushed DC motor behind an H-bridge (enable PWM + two direction inputs)
//
// Speed commands map to a direction and a 16-bit duty. Commands inside the deadband stop the
// motor; anything else is lifted above the stall duty so the motor never buzzes without turning.

use std::collections::HashMap;
use std::convert::Infallible;

use tracing::debug;

use crate::config::{MAX_DUTY, MAX_SPD_CMD, MIN_DUTY, MIN_SPD_CMD};

/// H-bridge direction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Forward,
    Reverse,
    #[default]
    Stopped,
}

impl Direction {
    /// Levels for the (in1, in2) direction inputs
    pub fn pins(self) -> (bool, bool) {
        match self {
            Direction::Forward => (true, false),
            Direction::Reverse => (false, true),
            Direction::Stopped => (false, false),
        }
    }
}

/// One hardware write for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorCommand {
    pub direction: Direction,
    pub duty: u16,
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand {
        direction: Direction::Stopped,
        duty: 0,
    };
}

/// Speed command to duty cycle mapping with deadband
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyMapper {
    pub min_spd_cmd: i32,
    pub max_spd_cmd: i32,
    pub min_duty: u16,
    pub max_duty: u16,
}

impl Default for DutyMapper {
    fn default() -> Self {
        Self {
            min_spd_cmd: MIN_SPD_CMD,
            max_spd_cmd: MAX_SPD_CMD,
            min_duty: MIN_DUTY,
            max_duty: MAX_DUTY,
        }
    }
}

impl DutyMapper {
    /// Map a non-negative speed linearly onto [min_duty, max_duty], saturating above max_spd_cmd
    pub fn duty_cycle(&self, speed: i32) -> u16 {
        if speed > self.max_spd_cmd {
            return self.max_duty;
        }
        let span = (self.max_duty - self.min_duty) as f64;
        let duty = self.min_duty as f64 + span * (speed as f64 / self.max_spd_cmd as f64);
        duty as u16
    }

    /// Direction and duty for a signed speed
    pub fn command(&self, speed: i32) -> MotorCommand {
        if speed.saturating_abs() < self.min_spd_cmd {
            MotorCommand::STOP
        } else if speed < 0 {
            MotorCommand {
                direction: Direction::Reverse,
                duty: self.duty_cycle(speed.saturating_neg()),
            }
        } else {
            MotorCommand {
                direction: Direction::Forward,
                duty: self.duty_cycle(speed),
            }
        }
    }
}

/// Pin/PWM outputs shared by the four motors
pub trait MotorOutputs {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply direction pins and duty for one motor channel
    fn write(&mut self, channel: u8, command: MotorCommand) -> Result<(), Self::Error>;

    /// Flip the liveness indicator
    fn toggle_indicator(&mut self) -> Result<(), Self::Error>;
}

/// A single motor on an output channel
#[derive(Debug, Clone)]
pub struct DcMotor {
    channel: u8,
    mapper: DutyMapper,
}

impl DcMotor {
    pub fn new(channel: u8, mapper: DutyMapper) -> Self {
        Self { channel, mapper }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Drive with a signed speed command (roughly -127..=127)
    pub fn drive<O: MotorOutputs>(&self, outputs: &mut O, speed: i32) -> Result<MotorCommand, O::Error> {
        let command = self.mapper.command(speed);
        outputs.write(self.channel, command)?;
        Ok(command)
    }

    /// Zero duty, both direction inputs low
    pub fn stop<O: MotorOutputs>(&self, outputs: &mut O) -> Result<(), O::Error> {
        outputs.write(self.channel, MotorCommand::STOP)
    }
}

/// In-memory outputs for running without hardware
#[derive(Debug, Default)]
pub struct SimulatedOutputs {
    commands: HashMap<u8, MotorCommand>,
    writes: Vec<(u8, MotorCommand)>,
    indicator: bool,
}

impl SimulatedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last command written to a channel (stopped if never written)
    pub fn command(&self, channel: u8) -> MotorCommand {
        self.commands.get(&channel).copied().unwrap_or(MotorCommand::STOP)
    }

    /// Every write in order
    pub fn writes(&self) -> &[(u8, MotorCommand)] {
        &self.writes
    }

    pub fn indicator(&self) -> bool {
        self.indicator
    }
}

impl MotorOutputs for SimulatedOutputs {
    type Error = Infallible;

    fn write(&mut self, channel: u8, command: MotorCommand) -> Result<(), Infallible> {
        debug!("sim motor {}: {:?} duty={}", channel, command.direction, command.duty);
        self.commands.insert(channel, command);
        self.writes.push((channel, command));
        Ok(())
    }

    fn toggle_indicator(&mut self) -> Result<(), Infallible> {
        self.indicator = !self.indicator;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadband_stops() {
        let motor = DcMotor::new(2, DutyMapper::default());
        let mut out = SimulatedOutputs::new();
        let cmd = motor.drive(&mut out, 5).unwrap();
        assert_eq!(cmd, MotorCommand::STOP);
        assert_eq!(out.command(2).duty, 0);
        assert_eq!(out.command(2).direction.pins(), (false, false));

        assert_eq!(motor.drive(&mut out, -9).unwrap(), MotorCommand::STOP);
    }

    #[test]
    fn test_deadband_edge_drives() {
        let mapper = DutyMapper::default();
        let cmd = mapper.command(10);
        assert_eq!(cmd.direction, Direction::Forward);
        assert!(cmd.duty > MIN_DUTY);
    }

    #[test]
    fn test_full_speed_is_max_duty() {
        let mapper = DutyMapper::default();
        assert_eq!(mapper.command(127).duty, MAX_DUTY);
        assert_eq!(mapper.command(200).duty, MAX_DUTY);
        assert_eq!(mapper.command(-300).duty, MAX_DUTY);
    }

    #[test]
    fn test_reverse_direction() {
        let mapper = DutyMapper::default();
        let cmd = mapper.command(-50);
        assert_eq!(cmd.direction, Direction::Reverse);
        assert_eq!(cmd.direction.pins(), (false, true));
        assert!(cmd.duty > MIN_DUTY && cmd.duty < MAX_DUTY);
        // mirror of the forward command
        assert_eq!(cmd.duty, mapper.command(50).duty);
    }

    #[test]
    fn test_duty_is_monotonic() {
        let mapper = DutyMapper::default();
        let duties: Vec<u16> = (10..=127).map(|s| mapper.duty_cycle(s)).collect();
        assert!(duties.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(mapper.duty_cycle(0), MIN_DUTY);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let motor = DcMotor::new(0, DutyMapper::default());
        let mut out = SimulatedOutputs::new();
        motor.drive(&mut out, 80).unwrap();
        motor.stop(&mut out).unwrap();
        motor.stop(&mut out).unwrap();
        assert_eq!(out.command(0), MotorCommand::STOP);
        assert_eq!(out.writes().len(), 3);
    }

    #[test]
    fn test_extreme_speed_does_not_overflow() {
        let mapper = DutyMapper::default();
        assert_eq!(mapper.command(i32::MIN).direction, Direction::Reverse);
        assert_eq!(mapper.command(i32::MIN).duty, MAX_DUTY);
    }
}
