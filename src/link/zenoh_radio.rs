// Beacon protocol over zenoh queries
//
// The joystick beacon (see demos/joystick_beacon.rs) answers on:
//   <prefix>/adv/<name>                 advertisement JSON
//   <prefix>/dev/<id>/connect           "ok"
//   <prefix>/dev/<id>/disconnect        "ok"
//   <prefix>/dev/<id>/gatt              service table JSON
//   <prefix>/dev/<id>/chr/<svc>/<chr>   12-byte joystick payload

use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, warn};
use zenoh::Session;

use super::{
    Advertisement, BeaconConnection, BeaconRadio, DeviceId, GattService, LinkConfig, LinkError,
    Uuid16,
};

/// Pause between advertisement queries while no matching beacon answers
const SCAN_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on waiting for the beacon to acknowledge a disconnect
const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub fn advertisement_key(prefix: &str, name: &str) -> String {
    format!("{}/adv/{}", prefix, name)
}

pub fn device_key(prefix: &str, device: &DeviceId) -> String {
    format!("{}/dev/{}", prefix, device)
}

pub fn characteristic_key(device_key: &str, service: Uuid16, characteristic: Uuid16) -> String {
    format!("{}/chr/{:04x}/{:04x}", device_key, service.0, characteristic.0)
}

/// Run a query and return every successful reply payload
async fn query(session: &Session, key: &str) -> Result<Vec<Vec<u8>>, LinkError> {
    let replies = session
        .get(key)
        .await
        .map_err(|e| LinkError::Transport(e.to_string()))?;

    let mut payloads = Vec::new();
    while let Ok(reply) = replies.recv_async().await {
        match reply.result() {
            Ok(sample) => payloads.push(sample.payload().to_bytes().into_owned()),
            Err(err) => debug!("Error reply on {}: {:?}", key, err),
        }
    }
    Ok(payloads)
}

/// Run a query that must be answered by exactly one responder
async fn query_one(session: &Session, key: &str) -> Result<Vec<u8>, LinkError> {
    query(session, key)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| LinkError::NoResponse { key: key.to_string() })
}

/// Ask the beacon to drop the central, without waiting long for the answer
async fn send_disconnect(session: &Session, device_key: &str, device: &DeviceId) {
    let key = format!("{}/disconnect", device_key);
    match timeout(DISCONNECT_TIMEOUT, query_one(session, &key)).await {
        Ok(Ok(_)) => debug!("Disconnected from {}", device),
        Ok(Err(e)) => debug!("Disconnect from {} not acknowledged: {}", device, e),
        Err(_) => debug!("Disconnect from {} timed out", device),
    }
}

pub struct ZenohRadio {
    session: Session,
    prefix: String,
}

impl ZenohRadio {
    pub fn new(session: Session, prefix: impl Into<String>) -> Self {
        Self {
            session,
            prefix: prefix.into(),
        }
    }
}

impl BeaconRadio for ZenohRadio {
    type Connection = ZenohConnection;

    async fn scan(
        &mut self,
        filter: &LinkConfig,
        window: Duration,
    ) -> Result<Option<Advertisement>, LinkError> {
        let key = advertisement_key(&self.prefix, "*");
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let payloads = match timeout(remaining, query(&self.session, &key)).await {
                Ok(payloads) => payloads?,
                Err(_) => return Ok(None),
            };
            for payload in payloads {
                match serde_json::from_slice::<Advertisement>(&payload) {
                    Ok(adv) if filter.matches(&adv) => return Ok(Some(adv)),
                    Ok(adv) => debug!("Ignoring beacon {:?} at {}", adv.name, adv.device),
                    Err(e) => warn!("Ignoring malformed advertisement: {}", e),
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(SCAN_RETRY_INTERVAL.min(remaining)).await;
        }
    }

    async fn connect(&mut self, device: &DeviceId) -> Result<ZenohConnection, LinkError> {
        let key = device_key(&self.prefix, device);
        query_one(&self.session, &format!("{}/connect", key)).await?;
        Ok(ZenohConnection {
            session: self.session.clone(),
            device: device.clone(),
            key,
        })
    }

    async fn disconnect(&mut self, device: &DeviceId) {
        send_disconnect(&self.session, &device_key(&self.prefix, device), device).await;
    }
}

pub struct ZenohConnection {
    session: Session,
    device: DeviceId,
    key: String,
}

impl BeaconConnection for ZenohConnection {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    async fn discover(&mut self) -> Result<Vec<GattService>, LinkError> {
        let payload = query_one(&self.session, &format!("{}/gatt", self.key)).await?;
        serde_json::from_slice(&payload)
            .map_err(|e| LinkError::Transport(format!("malformed service table: {}", e)))
    }

    async fn read(&mut self, service: Uuid16, characteristic: Uuid16) -> Result<Vec<u8>, LinkError> {
        query_one(&self.session, &characteristic_key(&self.key, service, characteristic)).await
    }

    async fn close(&mut self) {
        send_disconnect(&self.session, &self.key, &self.device).await;
    }
}
