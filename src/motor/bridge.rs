// Serial pin bridge: a small co-processor that owns the H-bridge pins and PWM timers
//
// Packet format: [0xFF, 0xFF, Channel, Length, Instruction, Params..., Checksum]
// The bridge acknowledges every packet with [0xFF, 0xFF, Channel, 2, Status, Checksum].

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::dc_motor::{MotorCommand, MotorOutputs};

/// Default serial configuration for the bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Channel used for bridge-wide instructions (indicator LED)
pub const SYSTEM_CHANNEL: u8 = 0xFE;

/// Highest motor channel the bridge exposes
pub const MAX_CHANNEL: u8 = 7;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    SetFrequency = 0x10, // u16 LE, Hz
    SetDuty = 0x11,      // u16 LE
    SetDirection = 0x12, // in1, in2
    ToggleLed = 0x13,
}

/// Error types for bridge communication
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid channel {0}")]
    InvalidChannel(u8),

    #[error("Invalid response on channel {channel}: {reason}")]
    InvalidResponse { channel: u8, reason: String },

    #[error("Checksum mismatch on channel {channel}")]
    ChecksumMismatch { channel: u8 },

    #[error("Bridge rejected packet on channel {channel}: status 0x{status:02X}")]
    Rejected { channel: u8, status: u8 },

    #[error("Timeout waiting for bridge on channel {channel}")]
    Timeout { channel: u8 },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Motor pin bridge on a serial port
pub struct PinBridge {
    port: Box<dyn SerialPort>,
}

impl PinBridge {
    /// Open the bridge and set the PWM frequency on the given motor channels
    pub fn open(port_name: &str, channels: &[u8], pwm_freq_hz: u16) -> Result<Self> {
        let port = serialport::new(port_name, DEFAULT_BAUDRATE)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        let mut bridge = Self { port };
        for &channel in channels {
            bridge.set_frequency(channel, pwm_freq_hz)?;
            bridge.write_command(channel, MotorCommand::STOP)?;
        }
        Ok(bridge)
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(channel: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(channel);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);

        packet
    }

    fn transact(&mut self, channel: u8, instruction: Instruction, params: &[u8]) -> Result<()> {
        if channel > MAX_CHANNEL && channel != SYSTEM_CHANNEL {
            return Err(BridgeError::InvalidChannel(channel));
        }
        let packet = Self::build_packet(channel, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_ack(channel)
    }

    fn read_ack(&mut self, channel: u8) -> Result<()> {
        let mut ack = [0u8; 6];
        self.port.read_exact(&mut ack).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BridgeError::Timeout { channel }
            } else {
                BridgeError::Io(e)
            }
        })?;
        Self::check_ack(channel, &ack)
    }

    fn check_ack(channel: u8, ack: &[u8; 6]) -> Result<()> {
        if ack[..2] != HEADER {
            return Err(BridgeError::InvalidResponse {
                channel,
                reason: format!("Invalid header: {:02X?}", &ack[..2]),
            });
        }
        if ack[2] != channel {
            return Err(BridgeError::InvalidResponse {
                channel,
                reason: format!("Channel mismatch: got {}", ack[2]),
            });
        }
        if Self::checksum(&ack[2..5]) != ack[5] {
            return Err(BridgeError::ChecksumMismatch { channel });
        }
        match ack[4] {
            0 => Ok(()),
            status => Err(BridgeError::Rejected { channel, status }),
        }
    }

    pub fn set_frequency(&mut self, channel: u8, hz: u16) -> Result<()> {
        debug!("Bridge channel {}: pwm {} Hz", channel, hz);
        self.transact(channel, Instruction::SetFrequency, &hz.to_le_bytes())
    }

    fn write_command(&mut self, channel: u8, command: MotorCommand) -> Result<()> {
        let (in1, in2) = command.direction.pins();
        // zero the duty before flipping direction pins so the bridge never sees a live reversal
        if command.duty == 0 {
            self.transact(channel, Instruction::SetDuty, &0u16.to_le_bytes())?;
            self.transact(channel, Instruction::SetDirection, &[in1 as u8, in2 as u8])
        } else {
            self.transact(channel, Instruction::SetDirection, &[in1 as u8, in2 as u8])?;
            self.transact(channel, Instruction::SetDuty, &command.duty.to_le_bytes())
        }
    }
}

impl MotorOutputs for PinBridge {
    type Error = BridgeError;

    fn write(&mut self, channel: u8, command: MotorCommand) -> Result<()> {
        self.write_command(channel, command)
    }

    fn toggle_indicator(&mut self) -> Result<()> {
        self.transact(SYSTEM_CHANNEL, Instruction::ToggleLed, &[])
    }
}
