// Teleop control loop: one cooperative task, ~10 Hz
//
// Each cycle: pose -> joystick sample -> frame rotation -> mixing -> four motor writes.
// Nothing escalates. Link failures rescan, actuation failures retry on the next cycle.

use std::error::Error;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{
    Args, BEACON_PREFIX, PWM_FREQ_HZ, SPEED_CIRCLE_RADIUS, TOPIC_HEALTH, TOPIC_POSE, TOPIC_WHEELS,
    TeleopConfig, WHEEL_CHANNELS,
};
use crate::link::{BeaconRadio, LinkError, LinkSession, ZenohRadio};
use crate::messages::{JoystickSample, LinkHealth, Pose2D, TeleopMode, WheelSpeedSet};
use crate::motor::{
    joystick_to_wheels, shrink_to_circle, MotorCommand, MotorOutputs, OmniBase, PinBridge,
    SimulatedOutputs,
};
use crate::pose::{FixedPose, PoseFeed, PoseSource};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("link: {0}")]
    Link(#[from] LinkError),

    #[error("actuation: {0}")]
    Actuation(#[source] BoxError),
}

/// Everything one successful cycle saw and did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub pose: Pose2D,
    pub sample: JoystickSample,
    pub speeds: WheelSpeedSet,
    pub commands: [MotorCommand; 4],
}

/// Outcome of one pass through the outer loop
#[derive(Debug)]
pub enum Step {
    Linked,
    LinkFailed(LinkError),
    Cycled(CycleReport),
    CycleFailed(CycleError),
}

impl Step {
    /// Health implied by this outcome
    pub fn health(&self) -> LinkHealth {
        match self {
            Step::Linked | Step::Cycled(_) => LinkHealth::Streaming,
            Step::LinkFailed(e) | Step::CycleFailed(CycleError::Link(e)) => match e {
                LinkError::BeaconNotFound { .. } => LinkHealth::Searching,
                e => LinkHealth::Faulted {
                    reason: e.to_string(),
                },
            },
            Step::CycleFailed(e) => LinkHealth::Faulted {
                reason: e.to_string(),
            },
        }
    }
}

pub struct TeleopController<R: BeaconRadio, P: PoseSource, O: MotorOutputs> {
    link: LinkSession<R>,
    pose: P,
    base: OmniBase<O>,
    mode: TeleopMode,
    clamp_to_circle: bool,
}

impl<R: BeaconRadio, P: PoseSource, O: MotorOutputs> TeleopController<R, P, O> {
    pub fn new(link: LinkSession<R>, pose: P, base: OmniBase<O>, config: &TeleopConfig) -> Self {
        Self {
            link,
            pose,
            base,
            mode: config.mode,
            clamp_to_circle: config.clamp_to_circle,
        }
    }

    pub fn link(&self) -> &LinkSession<R> {
        &self.link
    }

    pub fn base(&self) -> &OmniBase<O> {
        &self.base
    }

    /// Run one control cycle against a streaming link
    pub async fn cycle(&mut self) -> Result<CycleReport, CycleError> {
        let pose = self.pose.get_pose();

        let sample = match self.link.read_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                // never leave the wheels running on a stale command
                self.halt();
                return Err(e.into());
            }
        };
        debug!("Joystick values: {:?}", sample);

        let mut speeds = joystick_to_wheels(sample, pose.heading, self.mode);
        if self.clamp_to_circle {
            speeds = shrink_to_circle(speeds, SPEED_CIRCLE_RADIUS);
        }
        debug!(
            "Speed values: {}, {}, {}, {}",
            speeds.s1, speeds.s2, speeds.s3, speeds.s4
        );

        let commands = self
            .base
            .drive(speeds)
            .map_err(|e| CycleError::Actuation(Box::new(e)))?;

        Ok(CycleReport {
            pose,
            sample,
            speeds,
            commands,
        })
    }

    /// One pass of the outer loop: establish the link if needed, otherwise cycle
    pub async fn step(&mut self) -> Step {
        if !self.link.is_streaming() {
            return match self.link.establish().await {
                Ok(()) => Step::Linked,
                Err(e) => Step::LinkFailed(e),
            };
        }
        match self.cycle().await {
            Ok(report) => Step::Cycled(report),
            Err(e) => Step::CycleFailed(e),
        }
    }

    /// Flip the liveness indicator
    pub fn heartbeat(&mut self) {
        if let Err(e) = self.base.toggle_indicator() {
            warn!("Failed to toggle indicator: {}", e);
        }
    }

    fn halt(&mut self) {
        if let Err(e) = self.base.stop_all() {
            warn!("Failed to stop motors: {}", e);
        }
    }
}

/// Remembers the last health sent so that only changes go out
#[derive(Debug, Default)]
pub struct HealthTracker {
    last: Option<LinkHealth>,
}

impl HealthTracker {
    /// Returns the health to publish, or `None` when it repeats the last one
    pub fn update(&mut self, health: LinkHealth) -> Option<&LinkHealth> {
        if self.last.as_ref() == Some(&health) {
            return None;
        }
        self.last = Some(health);
        self.last.as_ref()
    }
}

/// Drive the controller forever, publishing health and wheel speeds
async fn drive_loop<R, P, O>(
    mut controller: TeleopController<R, P, O>,
    config: &TeleopConfig,
    session: &zenoh::Session,
) -> Result<(), BoxError>
where
    R: BeaconRadio,
    P: PoseSource,
    O: MotorOutputs,
{
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_wheels = session.declare_publisher(TOPIC_WHEELS).await?;
    let mut health = HealthTracker::default();

    info!(
        "Teleop started: {:?} mode, {}ms cycle",
        config.mode,
        config.cycle_period.as_millis()
    );
    info!("Publishing to: {}, {}", TOPIC_HEALTH, TOPIC_WHEELS);

    loop {
        let step = controller.step().await;

        if let Some(changed) = health.update(step.health()) {
            let health_json = serde_json::to_string(changed)?;
            if let Err(e) = pub_health.put(health_json).await {
                warn!("Failed to publish health: {}", e);
            }
        }

        match step {
            Step::Linked => {}
            Step::LinkFailed(e) => warn!("{}", e),
            Step::Cycled(report) => {
                let wheels_json = serde_json::to_string(&report.speeds)?;
                if let Err(e) = pub_wheels.put(wheels_json).await {
                    warn!("Failed to publish wheel speeds: {}", e);
                }
                controller.heartbeat();
                sleep(config.cycle_period).await;
            }
            Step::CycleFailed(e) => warn!("Error: {}", e),
        }
    }
}

async fn run_with_outputs<O: MotorOutputs>(
    args: &Args,
    config: &TeleopConfig,
    session: &zenoh::Session,
    outputs: O,
) -> Result<(), BoxError> {
    let radio = ZenohRadio::new(session.clone(), BEACON_PREFIX);
    let link = LinkSession::new(radio, config.link.clone());
    let base = OmniBase::new(outputs, WHEEL_CHANNELS, config.duty);

    let pose: Box<dyn PoseSource> = if args.no_pose {
        info!("Odometry disabled, heading fixed at 0");
        Box::new(FixedPose::default())
    } else {
        info!("Subscribed to: {}", TOPIC_POSE);
        Box::new(PoseFeed::subscribe(session, TOPIC_POSE).await?)
    };

    let controller = TeleopController::new(link, pose, base, config);
    drive_loop(controller, config, session).await
}

pub async fn run(args: Args) -> Result<(), BoxError> {
    let config = TeleopConfig::from(&args);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    match &args.port {
        Some(port) => {
            info!("Opening motor bridge on {}", port);
            let bridge = PinBridge::open(port, &WHEEL_CHANNELS, PWM_FREQ_HZ)?;
            run_with_outputs(&args, &config, &session, bridge).await
        }
        None => {
            warn!("No motor port given, running with simulated outputs");
            run_with_outputs(&args, &config, &session, SimulatedOutputs::new()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::{MockRadio, ReadScript};
    use crate::link::{LinkConfig, LinkState};
    use crate::motor::{Direction, DutyMapper};
    use std::f64::consts::FRAC_PI_2;
    use std::time::Duration;

    type TestController = TeleopController<MockRadio, FixedPose, SimulatedOutputs>;

    fn controller(radio: &MockRadio, heading: f64, mode: TeleopMode, clamp: bool) -> TestController {
        let config = TeleopConfig {
            mode,
            clamp_to_circle: clamp,
            link: LinkConfig {
                scan_window: Duration::from_millis(10),
                read_timeout: Duration::from_millis(30),
                ..LinkConfig::default()
            },
            ..TeleopConfig::default()
        };
        let link = LinkSession::new(radio.clone(), config.link.clone());
        let pose = FixedPose(Pose2D {
            heading,
            ..Pose2D::default()
        });
        let base = OmniBase::new(SimulatedOutputs::new(), [0, 1, 2, 3], DutyMapper::default());
        TeleopController::new(link, pose, base, &config)
    }

    #[tokio::test]
    async fn test_strafe_end_to_end() {
        let radio = MockRadio::with_beacon();
        radio.push_sample(JoystickSample::new(100, 0, 0));
        let mut teleop = controller(&radio, 0.0, TeleopMode::Bev, false);

        assert!(matches!(teleop.step().await, Step::Linked));
        let Step::Cycled(report) = teleop.step().await else {
            panic!("expected a cycle");
        };
        assert_eq!(report.speeds, WheelSpeedSet::new(70, 70, -70, -70));
        assert_eq!(report.commands[0].direction, Direction::Forward);
        assert_eq!(report.commands[3].direction, Direction::Reverse);
        assert_eq!(teleop.base().outputs().command(2), report.commands[2]);
    }

    #[tokio::test]
    async fn test_bev_uses_heading_fpv_does_not() {
        let radio = MockRadio::with_beacon();
        radio.push_sample(JoystickSample::new(0, 100, 0));
        let mut bev = controller(&radio, FRAC_PI_2, TeleopMode::Bev, false);
        bev.step().await;
        let Step::Cycled(bev_report) = bev.step().await else {
            panic!("expected a cycle");
        };

        let radio = MockRadio::with_beacon();
        radio.push_sample(JoystickSample::new(0, 100, 0));
        let mut fpv = controller(&radio, FRAC_PI_2, TeleopMode::Fpv, false);
        fpv.step().await;
        let Step::Cycled(fpv_report) = fpv.step().await else {
            panic!("expected a cycle");
        };

        // world-forward with the robot turned left is a strafe right
        assert_eq!(bev_report.speeds, WheelSpeedSet::new(70, 70, -70, -70));
        assert_eq!(fpv_report.speeds, WheelSpeedSet::new(70, 70, 70, 70));
    }

    #[tokio::test]
    async fn test_read_failure_stops_motors_and_rescans() {
        let radio = MockRadio::with_beacon();
        radio.push_sample(JoystickSample::new(0, 100, 0));
        radio.push_read(ReadScript::Fail);
        let mut teleop = controller(&radio, 0.0, TeleopMode::Fpv, false);

        teleop.step().await;
        assert!(matches!(teleop.step().await, Step::Cycled(_)));
        assert_ne!(teleop.base().outputs().command(2), MotorCommand::STOP);

        let step = teleop.step().await;
        assert!(matches!(step, Step::CycleFailed(CycleError::Link(_))));
        assert!(matches!(step.health(), LinkHealth::Faulted { .. }));
        assert_eq!(teleop.link().state(), LinkState::Scanning);
        assert_eq!(radio.open_connections(), 0);
        for channel in 0..4 {
            assert_eq!(teleop.base().outputs().command(channel), MotorCommand::STOP);
        }

        // next pass reconnects
        assert!(matches!(teleop.step().await, Step::Linked));
        assert_eq!(radio.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_no_beacon_reports_searching() {
        let radio = MockRadio::default();
        let mut teleop = controller(&radio, 0.0, TeleopMode::Bev, false);
        let step = teleop.step().await;
        assert!(matches!(step, Step::LinkFailed(LinkError::BeaconNotFound { .. })));
        assert_eq!(step.health(), LinkHealth::Searching);
        assert!(teleop.base().outputs().writes().is_empty());
    }

    #[tokio::test]
    async fn test_clamp_to_circle() {
        let radio = MockRadio::with_beacon();
        radio.push_sample(JoystickSample::new(0, 100, 100));
        radio.push_sample(JoystickSample::new(0, 100, 100));

        let mut unclamped = controller(&radio, 0.0, TeleopMode::Fpv, false);
        unclamped.step().await;
        let Step::Cycled(raw) = unclamped.step().await else {
            panic!("expected a cycle");
        };
        assert!(raw.speeds.max_magnitude() > 100);

        let mut clamped = controller(&radio, 0.0, TeleopMode::Fpv, true);
        clamped.step().await;
        let Step::Cycled(report) = clamped.step().await else {
            panic!("expected a cycle");
        };
        assert_eq!(report.speeds.max_magnitude(), 100);
    }

    #[tokio::test]
    async fn test_heartbeat_toggles_indicator() {
        let radio = MockRadio::with_beacon();
        let mut teleop = controller(&radio, 0.0, TeleopMode::Bev, false);
        teleop.heartbeat();
        assert!(teleop.base().outputs().indicator());
        teleop.heartbeat();
        assert!(!teleop.base().outputs().indicator());
    }

    #[tokio::test]
    async fn test_health_published_only_on_change() {
        let radio = MockRadio::default();
        let mut teleop = controller(&radio, 0.0, TeleopMode::Fpv, false);
        let mut health = HealthTracker::default();

        // repeated scan misses are one Searching message
        let first = teleop.step().await.health();
        assert_eq!(health.update(first), Some(&LinkHealth::Searching));
        let second = teleop.step().await.health();
        assert_eq!(health.update(second), None);

        assert_eq!(health.update(LinkHealth::Streaming), Some(&LinkHealth::Streaming));
        assert_eq!(health.update(LinkHealth::Streaming), None);
        let lost = LinkHealth::Faulted {
            reason: "read timed out".into(),
        };
        assert_eq!(health.update(lost.clone()), Some(&lost));
        assert_eq!(health.update(LinkHealth::Searching), Some(&LinkHealth::Searching));
    }
}
