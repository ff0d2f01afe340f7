// Scripted in-memory radio for link and controller tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    Advertisement, BeaconConnection, BeaconRadio, DeviceId, GattService, LinkConfig, LinkError,
    Uuid16,
};
use crate::config::{BEACON_NAME, CHARACTERISTIC_UUID, SERVICE_UUID};
use crate::messages::JoystickSample;

/// What the next characteristic read does
#[derive(Debug, Clone)]
pub(crate) enum ReadScript {
    Data(Vec<u8>),
    Fail,
    Hang,
}

#[derive(Debug, Default)]
struct MockState {
    advertisements: Vec<Advertisement>,
    gatt: Vec<GattService>,
    reads: VecDeque<ReadScript>,
    connect_delay: Option<Duration>,
    open_connections: usize,
    connects: usize,
    scans: usize,
    disconnects: Vec<DeviceId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockRadio {
    state: Arc<Mutex<MockState>>,
}

impl MockRadio {
    /// A radio that hears one matching joystick beacon
    pub(crate) fn with_beacon() -> Self {
        let radio = Self::default();
        {
            let mut state = radio.state.lock().unwrap();
            state.advertisements.push(Advertisement {
                name: BEACON_NAME.to_string(),
                services: vec![Uuid16(0x180F), SERVICE_UUID],
                device: DeviceId("beacon-1".into()),
            });
            state.gatt.push(GattService {
                uuid: SERVICE_UUID,
                characteristics: vec![CHARACTERISTIC_UUID],
            });
        }
        radio
    }

    pub(crate) fn set_advertised_services(&self, services: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for adv in &mut state.advertisements {
            adv.services = services.iter().map(|&s| Uuid16(s)).collect();
        }
    }

    pub(crate) fn set_gatt(&self, service: Uuid16, characteristics: &[u16]) {
        self.state.lock().unwrap().gatt = vec![GattService {
            uuid: service,
            characteristics: characteristics.iter().map(|&c| Uuid16(c)).collect(),
        }];
    }

    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().unwrap().connect_delay = Some(delay);
    }

    pub(crate) fn push_read(&self, read: ReadScript) {
        self.state.lock().unwrap().reads.push_back(read);
    }

    pub(crate) fn push_sample(&self, sample: JoystickSample) {
        self.push_read(ReadScript::Data(sample.encode().to_vec()));
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.state.lock().unwrap().open_connections
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub(crate) fn scans(&self) -> usize {
        self.state.lock().unwrap().scans
    }

    /// Devices released through `BeaconRadio::disconnect`
    pub(crate) fn disconnects(&self) -> Vec<DeviceId> {
        self.state.lock().unwrap().disconnects.clone()
    }
}

impl BeaconRadio for MockRadio {
    type Connection = MockConnection;

    async fn scan(
        &mut self,
        filter: &LinkConfig,
        window: Duration,
    ) -> Result<Option<Advertisement>, LinkError> {
        let found = {
            let mut state = self.state.lock().unwrap();
            state.scans += 1;
            state.advertisements.iter().find(|adv| filter.matches(adv)).cloned()
        };
        // nothing matching: listen out the whole window like a real radio
        if found.is_none() {
            tokio::time::sleep(window).await;
        }
        Ok(found)
    }

    async fn connect(&mut self, device: &DeviceId) -> Result<MockConnection, LinkError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().open_connections += 1;
        Ok(MockConnection {
            device: device.clone(),
            state: self.state.clone(),
            open: true,
        })
    }

    async fn disconnect(&mut self, device: &DeviceId) {
        self.state.lock().unwrap().disconnects.push(device.clone());
    }
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    device: DeviceId,
    state: Arc<Mutex<MockState>>,
    open: bool,
}

impl BeaconConnection for MockConnection {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    async fn discover(&mut self) -> Result<Vec<GattService>, LinkError> {
        Ok(self.state.lock().unwrap().gatt.clone())
    }

    async fn read(&mut self, _service: Uuid16, _characteristic: Uuid16) -> Result<Vec<u8>, LinkError> {
        let next = self.state.lock().unwrap().reads.pop_front();
        match next {
            Some(ReadScript::Data(data)) => Ok(data),
            Some(ReadScript::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LinkError::ReadTimeout)
            }
            Some(ReadScript::Fail) | None => Err(LinkError::Transport("beacon went away".into())),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().unwrap().open_connections -= 1;
        }
    }
}
