// Robot pose input for heading compensation

use tracing::{debug, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use crate::messages::Pose2D;

/// Supplies the current robot pose; called once per cycle and never blocks
pub trait PoseSource {
    fn get_pose(&mut self) -> Pose2D;
}

impl<P: PoseSource + ?Sized> PoseSource for Box<P> {
    fn get_pose(&mut self) -> Pose2D {
        (**self).get_pose()
    }
}

/// Constant pose, used when no odometry is available
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPose(pub Pose2D);

impl PoseSource for FixedPose {
    fn get_pose(&mut self) -> Pose2D {
        self.0
    }
}

/// Parse one pose sample (JSON `Pose2D`)
pub fn parse_pose(payload: &[u8]) -> Result<Pose2D, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Latest pose published by the odometry sensor node
pub struct PoseFeed {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    latest: Pose2D,
}

impl PoseFeed {
    pub async fn subscribe(session: &zenoh::Session, topic: &str) -> zenoh::Result<Self> {
        let subscriber = session.declare_subscriber(topic).await?;
        Ok(Self {
            subscriber,
            latest: Pose2D::default(),
        })
    }
}

impl PoseSource for PoseFeed {
    fn get_pose(&mut self) -> Pose2D {
        // Drain all pending samples (non-blocking), keep latest
        while let Ok(Some(sample)) = self.subscriber.try_recv() {
            match parse_pose(&sample.payload().to_bytes()) {
                Ok(pose) => self.latest = pose,
                Err(e) => warn!("Failed to parse pose: {}", e),
            }
        }
        debug!("Pose: {:?}", self.latest);
        self.latest
    }
}
