// Fixed-rate host loop with command watchdog
// Note: the watchdog stops the robot when commands stop arriving, eg. if the
// teleop process crashes the drivetrain ramps to neutral instead of driving on.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, DriveConfig, LEFT_MASTER_ID, RIGHT_MASTER_ID, TOPIC_CMD_DRIVE, TOPIC_CMD_RESET,
    TOPIC_HEALTH, TOPIC_POSE, TOPIC_TELEMETRY,
};
use crate::drive::{
    Actuator, ChannelTelemetry, CommandOrigin, Drivetrain, HeadingSensor, TelemetrySample,
    TelemetrySink,
};
use crate::messages::{CommandEnvelope, DriveCommand, DriveHealth, RuntimeHealth};
use crate::sim::SimBus;

pub struct Runtime<A: Actuator, H: HeadingSensor, T: TelemetrySink> {
    drivetrain: Drivetrain<A, H, T>,
    latest_cmd: Option<CommandEnvelope>,
    cmd_received_at: Instant,
    cmd_timeout: Duration,
    health: RuntimeHealth,
}

impl<A: Actuator, H: HeadingSensor, T: TelemetrySink> Runtime<A, H, T> {
    pub fn new(drivetrain: Drivetrain<A, H, T>) -> Self {
        Self::with_timeout(drivetrain, CMD_TIMEOUT)
    }

    pub fn with_timeout(drivetrain: Drivetrain<A, H, T>, cmd_timeout: Duration) -> Self {
        Self {
            drivetrain,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            cmd_timeout,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: CommandEnvelope) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    pub fn on_reset(&mut self) {
        info!("Resetting odometry");
        if let Err(e) = self.drivetrain.reset() {
            warn!("Reset incomplete: {}", e);
        }
    }

    /// One control cycle: apply the command the watchdog allows, then
    /// advance odometry
    pub fn cycle(&mut self) {
        let cmd_age = self.cmd_received_at.elapsed();

        let (command, origin) = match self.latest_cmd {
            Some(cmd) if cmd_age <= self.cmd_timeout => {
                self.health = RuntimeHealth::Ok;
                (cmd.command, cmd.origin)
            }
            Some(_) => {
                // Watchdog triggered - ramp to neutral
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                (DriveCommand::neutral(), CommandOrigin::Manual)
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                (DriveCommand::neutral(), CommandOrigin::Manual)
            }
        };

        self.drivetrain.drive(command, origin);
        self.drivetrain.periodic_update();

        if self.drivetrain.health() == DriveHealth::Degraded {
            self.health = RuntimeHealth::Degraded;
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drivetrain(&self) -> &Drivetrain<A, H, T> {
        &self.drivetrain
    }

    pub fn drivetrain_mut(&mut self) -> &mut Drivetrain<A, H, T> {
        &mut self.drivetrain
    }
}

/// Publish every queued reading through `put`
///
/// Readings are best effort: a failed publish is logged and the rest are
/// still sent. Returns how many were dropped.
async fn forward_telemetry<F, Fut, E>(
    rx: &mut mpsc::UnboundedReceiver<TelemetrySample>,
    mut put: F,
) -> usize
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut dropped = 0;
    while let Ok(sample) = rx.try_recv() {
        let payload = match serde_json::to_string(&sample) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode telemetry {}: {}", sample.key, e);
                dropped += 1;
                continue;
            }
        };
        if let Err(e) = put(payload).await {
            warn!("Failed to publish telemetry {}: {}", sample.key, e);
            dropped += 1;
        }
    }
    dropped
}

/// Run the simulated drivetrain, driven over zenoh, until Ctrl+C
pub async fn run(config: DriveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_reset = session.declare_subscriber(TOPIC_CMD_RESET).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;

    let period_seconds = config.period_seconds();
    let loop_hz = config.loop_hz;
    let bus = SimBus::new(LEFT_MASTER_ID, RIGHT_MASTER_ID, config.distance_per_pulse);
    let (telemetry_tx, mut telemetry_rx) = mpsc::unbounded_channel();
    let drivetrain = Drivetrain::new(
        bus.drive_hardware(),
        ChannelTelemetry::new(telemetry_tx),
        config,
    )?;
    let mut runtime = Runtime::new(drivetrain);
    let mut tick = interval(Duration::from_secs_f64(period_seconds));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        loop_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_DRIVE, TOPIC_CMD_RESET);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_POSE, TOPIC_HEALTH, TOPIC_TELEMETRY
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<CommandEnvelope>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
        while let Ok(Some(_)) = sub_reset.try_recv() {
            runtime.on_reset();
        }

        // 2. Advance the simulated robot by the last period, then run the cycle
        bus.step(period_seconds);
        runtime.cycle();

        // 3. Forward telemetry readings
        let publisher = &pub_telemetry;
        forward_telemetry(&mut telemetry_rx, move |payload| async move {
            publisher.put(payload).await
        })
        .await;

        // 4. Publish pose and health
        let pose_json = serde_json::to_string(&runtime.drivetrain().pose())?;
        pub_pose.put(pose_json).await?;
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }

    runtime.drivetrain_mut().stop();
    Ok(())
}
