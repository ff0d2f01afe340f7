// Beacon link state machine
//
// Idle -> Scanning -> Connecting -> Discovering -> Streaming
// Any failure tears the connection down and lands back in Scanning. There is no attempt
// counter and no backoff: the caller simply establishes again.

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{BeaconConnection, BeaconRadio, DeviceId, LinkConfig, LinkError};
use crate::messages::JoystickSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Streaming,
}

pub struct LinkSession<R: BeaconRadio> {
    radio: R,
    config: LinkConfig,
    state: LinkState,
    // only ever Some while Connecting/Discovering/Streaming
    connection: Option<R::Connection>,
}

impl<R: BeaconRadio> LinkSession<R> {
    pub fn new(radio: R, config: LinkConfig) -> Self {
        Self {
            radio,
            config,
            state: LinkState::Idle,
            connection: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == LinkState::Streaming
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            debug!("Link {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// One pass of scan, connect and discover. On success the link is streaming.
    pub async fn establish(&mut self) -> Result<(), LinkError> {
        self.teardown().await;
        self.set_state(LinkState::Scanning);

        info!("Scanning for beacon named {:?}...", self.config.beacon_name);
        let device = self.scan().await?;

        self.set_state(LinkState::Connecting);
        info!("Connecting to {}", device);
        let connected = timeout(self.config.connect_timeout, self.radio.connect(&device)).await;
        let connection = match connected {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return self.fail(e).await,
            Err(_) => {
                // the beacon may have accepted after we gave up waiting
                self.radio.disconnect(&device).await;
                return self.fail(LinkError::ConnectTimeout { device }).await;
            }
        };
        self.connection = Some(connection);

        self.set_state(LinkState::Discovering);
        if let Err(e) = self.discover(&device).await {
            return self.fail(e).await;
        }

        self.set_state(LinkState::Streaming);
        info!(
            "Streaming {} / {} from {}",
            self.config.service, self.config.characteristic, device
        );
        Ok(())
    }

    async fn scan(&mut self) -> Result<DeviceId, LinkError> {
        let found = self.radio.scan(&self.config, self.config.scan_window).await?;
        found
            .map(|adv| adv.device)
            .ok_or_else(|| LinkError::BeaconNotFound {
                name: self.config.beacon_name.clone(),
            })
    }

    async fn discover(&mut self, device: &DeviceId) -> Result<(), LinkError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(LinkError::NotStreaming);
        };
        let services = timeout(self.config.discover_timeout, connection.discover())
            .await
            .map_err(|_| LinkError::DiscoverTimeout {
                device: device.clone(),
            })??;

        let service = services
            .iter()
            .find(|s| s.uuid == self.config.service)
            .ok_or(LinkError::ServiceNotFound(self.config.service))?;
        if !service.characteristics.contains(&self.config.characteristic) {
            return Err(LinkError::CharacteristicNotFound(self.config.characteristic));
        }
        Ok(())
    }

    /// Read the next joystick sample. Any failure drops the link back to scanning.
    pub async fn read_sample(&mut self) -> Result<JoystickSample, LinkError> {
        let (service, characteristic) = (self.config.service, self.config.characteristic);
        let result = match (self.state, self.connection.as_mut()) {
            (LinkState::Streaming, Some(connection)) => {
                match timeout(self.config.read_timeout, connection.read(service, characteristic)).await {
                    Ok(Ok(data)) => {
                        JoystickSample::decode(&data).ok_or(LinkError::Decode { len: data.len() })
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(LinkError::ReadTimeout),
                }
            }
            _ => Err(LinkError::NotStreaming),
        };

        match result {
            Ok(sample) => Ok(sample),
            Err(e) => self.fail(e).await,
        }
    }

    async fn fail<T>(&mut self, err: LinkError) -> Result<T, LinkError> {
        warn!("Link failure while {:?}: {}", self.state, err);
        self.teardown().await;
        self.set_state(LinkState::Scanning);
        Err(err)
    }

    /// Close the live connection, if any
    pub async fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            info!("Closing connection to {}", connection.device());
            connection.close().await;
        }
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }
}
