// Wireless link to the joystick beacon
//
// Provides:
// - The scan/connect/discover/stream state machine (LinkSession)
// - The radio traits the state machine is written against
// - A zenoh transport speaking the beacon protocol

#[cfg(test)]
pub(crate) mod mock;
mod session;
pub mod zenoh_radio;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    BEACON_NAME, CHARACTERISTIC_UUID, CONNECT_TIMEOUT, DISCOVER_TIMEOUT, READ_TIMEOUT, SCAN_WINDOW,
    SERVICE_UUID,
};

pub use session::{LinkSession, LinkState};
pub use zenoh_radio::ZenohRadio;

/// 16-bit assigned-number UUID (e.g. 0x1812 HID service)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uuid16(pub u16);

impl fmt::Display for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Opaque handle of a discovered beacon
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a beacon advertises while discoverable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub name: String,
    pub services: Vec<Uuid16>,
    pub device: DeviceId,
}

/// One service and its characteristics as reported by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GattService {
    pub uuid: Uuid16,
    pub characteristics: Vec<Uuid16>,
}

/// Beacon matching and link timing
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub beacon_name: String,
    pub service: Uuid16,
    pub characteristic: Uuid16,
    pub scan_window: Duration,
    pub connect_timeout: Duration,
    pub discover_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            beacon_name: BEACON_NAME.to_string(),
            service: SERVICE_UUID,
            characteristic: CHARACTERISTIC_UUID,
            scan_window: SCAN_WINDOW,
            connect_timeout: CONNECT_TIMEOUT,
            discover_timeout: DISCOVER_TIMEOUT,
            read_timeout: READ_TIMEOUT,
        }
    }
}

impl LinkConfig {
    /// Name and service filter applied to advertisements
    pub fn matches(&self, adv: &Advertisement) -> bool {
        adv.name == self.beacon_name && adv.services.contains(&self.service)
    }
}

/// Link failures. Every one of them sends the session back to scanning.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Beacon {name:?} not found within scan window")]
    BeaconNotFound { name: String },

    #[error("Connection to {device} timed out")]
    ConnectTimeout { device: DeviceId },

    #[error("Timeout discovering services on {device}")]
    DiscoverTimeout { device: DeviceId },

    #[error("Service {0} not offered by beacon")]
    ServiceNotFound(Uuid16),

    #[error("Characteristic {0} not offered by beacon")]
    CharacteristicNotFound(Uuid16),

    #[error("Characteristic read timed out")]
    ReadTimeout,

    #[error("Expected 12-byte joystick payload, got {len} bytes")]
    Decode { len: usize },

    #[error("No response from {key}")]
    NoResponse { key: String },

    #[error("Link not streaming")]
    NotStreaming,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Radio able to scan for beacons and open connections to them
#[allow(async_fn_in_trait)]
pub trait BeaconRadio {
    type Connection: BeaconConnection;

    /// Listen until an advertisement passes `filter` or `window` elapses
    async fn scan(
        &mut self,
        filter: &LinkConfig,
        window: Duration,
    ) -> Result<Option<Advertisement>, LinkError>;

    async fn connect(&mut self, device: &DeviceId) -> Result<Self::Connection, LinkError>;

    /// Best-effort release of a connection whose handle never reached the caller
    async fn disconnect(&mut self, device: &DeviceId);
}

/// An open connection to one beacon
#[allow(async_fn_in_trait)]
pub trait BeaconConnection {
    fn device(&self) -> &DeviceId;

    /// Resolve the beacon's services and characteristics
    async fn discover(&mut self) -> Result<Vec<GattService>, LinkError>;

    /// Single read of a characteristic value
    async fn read(&mut self, service: Uuid16, characteristic: Uuid16) -> Result<Vec<u8>, LinkError>;

    /// Release the connection
    async fn close(&mut self);
}
