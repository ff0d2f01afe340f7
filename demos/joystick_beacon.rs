// Keyboard joystick beacon: WASD move, Z/X twist, R/F speed, Q quit
//
// Serves the beacon protocol the teleop runtime scans for, with the current
// key state as the 3-axis joystick value.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use omni_teleop::config::{BEACON_NAME, BEACON_PREFIX, CHARACTERISTIC_UUID, SERVICE_UUID};
use omni_teleop::link::zenoh_radio::{advertisement_key, characteristic_key, device_key};
use omni_teleop::link::{Advertisement, DeviceId, GattService, Uuid16};
use omni_teleop::messages::JoystickSample;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const LEVELS: [i32; 3] = [40, 70, 100]; // joystick units
const INPUT_TIMEOUT_MS: u64 = 150; // Recenter the stick after this much time with no input
const DEVICE_ID: &str = "kbd-joystick";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let stick = Arc::new(Mutex::new(JoystickSample::default()));
    let server = tokio::spawn(serve_beacon(session.clone(), stick.clone()));

    info!("Beacon {:?} advertising {}", BEACON_NAME, SERVICE_UUID);
    info!("Controls: WASD=move, Z/X=twist, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_keyboard(&stick).await;
    disable_raw_mode()?;

    server.abort();
    result
}

async fn serve_beacon(session: zenoh::Session, stick: Arc<Mutex<JoystickSample>>) -> Result<(), BoxError> {
    let device = DeviceId(DEVICE_ID.to_string());
    let adv_key = advertisement_key(BEACON_PREFIX, BEACON_NAME);
    let dev_key = device_key(BEACON_PREFIX, &device);
    let chr_key = characteristic_key(&dev_key, SERVICE_UUID, CHARACTERISTIC_UUID);

    let advertisement = serde_json::to_vec(&Advertisement {
        name: BEACON_NAME.to_string(),
        services: vec![SERVICE_UUID],
        device,
    })?;
    let gatt = serde_json::to_vec(&vec![
        GattService {
            uuid: Uuid16(0x180F), // battery
            characteristics: vec![Uuid16(0x2A19)],
        },
        GattService {
            uuid: SERVICE_UUID,
            characteristics: vec![CHARACTERISTIC_UUID],
        },
    ])?;

    let adv_queryable = session.declare_queryable(adv_key.as_str()).await?;
    let dev_queryable = session.declare_queryable(format!("{}/**", dev_key)).await?;

    loop {
        tokio::select! {
            Ok(query) = adv_queryable.recv_async() => {
                query.reply(adv_key.as_str(), advertisement.clone()).await?;
            }
            Ok(query) = dev_queryable.recv_async() => {
                let key = query.key_expr().as_str().to_string();
                let payload = match key.strip_prefix(dev_key.as_str()) {
                    Some("/connect") => {
                        info!("Central connected");
                        b"ok".to_vec()
                    }
                    Some("/disconnect") => {
                        info!("Central disconnected");
                        b"ok".to_vec()
                    }
                    Some("/gatt") => gatt.clone(),
                    _ if key == chr_key => {
                        let sample = *stick.lock().map_err(|e| e.to_string())?;
                        sample.encode().to_vec()
                    }
                    _ => {
                        warn!("Unknown attribute {}", key);
                        continue;
                    }
                };
                query.reply(key.as_str(), payload).await?;
            }
            else => break,
        }
    }

    Ok(())
}

async fn run_keyboard(stick: &Mutex<JoystickSample>) -> Result<(), BoxError> {
    let mut level_idx: usize = 0;

    // Persistent stick state
    let mut x = 0;
    let mut y = 0;
    let mut z = 0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let level = LEVELS[level_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        y = level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        y = -level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        x = -level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        x = level;
                        last_movement_input = Instant::now();
                    }

                    // Twist
                    KeyCode::Char('z') if pressed => {
                        z = -level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        z = level;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        level_idx = (level_idx + 1).min(2);
                        print_speed(level_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        level_idx = level_idx.saturating_sub(1);
                        print_speed(level_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Recenter if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x = 0;
            y = 0;
            z = 0;
        }

        *stick.lock().map_err(|e| e.to_string())? = JoystickSample::new(x, y, z);
        tokio::task::yield_now().await;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
