// Keyboard teleop for the drivetrain runtime
//
// W/S drive, A/D steer, R/F throttle scale, T toggle autonomous origin,
// O reset odometry, Q/Esc quit. A held key is seen as a stream of repeats;
// once they stop for INPUT_HOLD the command falls back to neutral.
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use diffdrive_runtime::config::{LOOP_HZ, TOPIC_CMD_DRIVE, TOPIC_CMD_RESET};
use diffdrive_runtime::drive::CommandOrigin;
use diffdrive_runtime::messages::{CommandEnvelope, DriveCommand};
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::info;

const INPUT_HOLD: Duration = Duration::from_millis(100);
const SCALE_STEP: f64 = 0.25;
// Steering is gentler than throttle at the same scale
const STEER_RATIO: f64 = 0.5;

#[derive(Debug, PartialEq)]
enum KeyAction {
    Drive,
    Reset,
    Quit,
    Ignored,
}

struct Teleop {
    scale: f64,
    speed: f64,
    steer: f64,
    origin: CommandOrigin,
    last_input: Instant,
}

impl Teleop {
    fn new(now: Instant) -> Self {
        Self {
            scale: SCALE_STEP,
            speed: 0.0,
            steer: 0.0,
            origin: CommandOrigin::Manual,
            last_input: now,
        }
    }

    fn handle_key(&mut self, code: KeyCode, now: Instant) -> KeyAction {
        let (speed, steer) = match code {
            KeyCode::Char('w') => (1.0, 0.0),
            KeyCode::Char('s') => (-1.0, 0.0),
            KeyCode::Char('a') => (0.0, -1.0),
            KeyCode::Char('d') => (0.0, 1.0),
            KeyCode::Char('r') | KeyCode::Char('f') => {
                let step = if code == KeyCode::Char('r') { SCALE_STEP } else { -SCALE_STEP };
                self.scale = (self.scale + step).clamp(SCALE_STEP, 1.0);
                info!("Throttle scale: {:.2}", self.scale);
                return KeyAction::Ignored;
            }
            KeyCode::Char('t') => {
                self.origin = match self.origin {
                    CommandOrigin::Manual => CommandOrigin::Autonomous,
                    CommandOrigin::Autonomous => CommandOrigin::Manual,
                };
                info!("Command origin: {:?}", self.origin);
                return KeyAction::Ignored;
            }
            KeyCode::Char('o') => return KeyAction::Reset,
            KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
            _ => return KeyAction::Ignored,
        };

        // Each key sets only its own axis, so W + D together drive an arc
        if speed != 0.0 {
            self.speed = speed * self.scale;
        }
        if steer != 0.0 {
            self.steer = steer * self.scale * STEER_RATIO;
        }
        self.last_input = now;
        KeyAction::Drive
    }

    fn command(&mut self, now: Instant) -> CommandEnvelope {
        if now.duration_since(self.last_input) > INPUT_HOLD {
            self.speed = 0.0;
            self.steer = 0.0;
        }
        CommandEnvelope {
            command: DriveCommand::Arcade {
                speed: self.speed,
                steer: self.steer,
            },
            origin: self.origin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let reset = session.declare_publisher(TOPIC_CMD_RESET).await?;

    info!("Controls: W/S=drive, A/D=steer, R/F=scale, T=origin, O=reset odometry, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher, &reset).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
    reset: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::new(Instant::now());
    // Publish at the runtime's loop rate so its watchdog stays satisfied
    let mut tick = interval(Duration::from_secs(1) / LOOP_HZ as u32);

    loop {
        tick.tick().await;

        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            match teleop.handle_key(key.code, Instant::now()) {
                KeyAction::Reset => {
                    info!("Requesting odometry reset");
                    reset.put("reset").await?;
                }
                KeyAction::Quit => return Ok(()),
                KeyAction::Drive | KeyAction::Ignored => {}
            }
        }

        let cmd = teleop.command(Instant::now());
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }
}
