// Defaults, topics and command-line configuration
use std::time::Duration;

use clap::Parser;

use crate::link::{LinkConfig, Uuid16};
use crate::messages::TeleopMode;
use crate::motor::DutyMapper;

// Beacon discovery
pub const BEACON_NAME: &str = "3axis_joystk";
pub const SERVICE_UUID: Uuid16 = Uuid16(0x1812);
pub const CHARACTERISTIC_UUID: Uuid16 = Uuid16(0x2A4D);

// Link timing
pub const SCAN_WINDOW: Duration = Duration::from_millis(5000);
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DISCOVER_TIMEOUT: Duration = Duration::from_millis(2000);
pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);

// Control loop period (~10 Hz)
pub const CYCLE_PERIOD: Duration = Duration::from_millis(100);

// Motor command and PWM scaling
pub const MIN_SPD_CMD: i32 = 10; // deadband
pub const MAX_SPD_CMD: i32 = 127;
pub const MIN_DUTY: u16 = 30_000; // stall threshold
pub const MAX_DUTY: u16 = 65_535;
pub const PWM_FREQ_HZ: u16 = 1_000;

// Wheel speed circle radius used when shrinking is enabled
pub const SPEED_CIRCLE_RADIUS: i32 = 100;

// Zenoh key expressions
pub const BEACON_PREFIX: &str = "omni/beacon"; // joystick beacon protocol
pub const TOPIC_POSE: &str = "omni/state/pose"; // odometry input
pub const TOPIC_HEALTH: &str = "omni/state/health"; // link health
pub const TOPIC_WHEELS: &str = "omni/rt/wheels"; // per-cycle wheel speeds

/// Wheel channels on the pin bridge, motors 1..=4
pub const WHEEL_CHANNELS: [u8; 4] = [0, 1, 2, 3];

#[derive(Debug, Parser)]
#[command(name = "omni-teleop", about = "Joystick teleop for a four-wheel omni robot")]
pub struct Args {
    /// Reference frame for joystick input
    #[arg(long, value_enum, default_value = "bev")]
    pub mode: TeleopMode,

    /// Advertised name of the joystick beacon
    #[arg(long, default_value = BEACON_NAME)]
    pub beacon_name: String,

    /// 16-bit service UUID the beacon must advertise
    #[arg(long, default_value = "0x1812", value_parser = parse_uuid16)]
    pub service_uuid: Uuid16,

    /// 16-bit UUID of the joystick characteristic
    #[arg(long, default_value = "0x2A4D", value_parser = parse_uuid16)]
    pub characteristic_uuid: Uuid16,

    #[arg(long, default_value_t = SCAN_WINDOW.as_millis() as u64)]
    pub scan_window_ms: u64,

    #[arg(long, default_value_t = CONNECT_TIMEOUT.as_millis() as u64)]
    pub connect_timeout_ms: u64,

    #[arg(long, default_value_t = READ_TIMEOUT.as_millis() as u64)]
    pub read_timeout_ms: u64,

    #[arg(long, default_value_t = CYCLE_PERIOD.as_millis() as u64)]
    pub cycle_ms: u64,

    /// Serial port of the motor pin bridge (simulated outputs when omitted)
    #[arg(long)]
    pub port: Option<String>,

    /// Ignore odometry and use a fixed zero heading
    #[arg(long)]
    pub no_pose: bool,

    /// Shrink wheel speed sets that leave the +/-100 circle
    #[arg(long)]
    pub clamp_to_circle: bool,
}

/// Parse a 16-bit UUID written as `0x1812` or `1812`
pub fn parse_uuid16(s: &str) -> Result<Uuid16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16)
        .map(Uuid16)
        .map_err(|e| format!("invalid 16-bit UUID {:?}: {}", s, e))
}

/// Library-side configuration for one teleop session
#[derive(Debug, Clone)]
pub struct TeleopConfig {
    pub mode: TeleopMode,
    pub link: LinkConfig,
    pub duty: DutyMapper,
    pub cycle_period: Duration,
    pub clamp_to_circle: bool,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            mode: TeleopMode::Bev,
            link: LinkConfig::default(),
            duty: DutyMapper::default(),
            cycle_period: CYCLE_PERIOD,
            clamp_to_circle: false,
        }
    }
}

impl From<&Args> for TeleopConfig {
    fn from(args: &Args) -> Self {
        Self {
            mode: args.mode,
            link: LinkConfig {
                beacon_name: args.beacon_name.clone(),
                service: args.service_uuid,
                characteristic: args.characteristic_uuid,
                scan_window: Duration::from_millis(args.scan_window_ms),
                connect_timeout: Duration::from_millis(args.connect_timeout_ms),
                discover_timeout: DISCOVER_TIMEOUT,
                read_timeout: Duration::from_millis(args.read_timeout_ms),
            },
            duty: DutyMapper::default(),
            cycle_period: Duration::from_millis(args.cycle_ms),
            clamp_to_circle: args.clamp_to_circle,
        }
    }
}
