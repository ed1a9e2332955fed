// High-level drivetrain core
//
// Owns the four drive motors and the gyro, turns drive commands into motor
// set points and keeps the odometry pose current. All state changes happen
// through `&mut self`, so a caller can never observe a half-updated pose.

use tracing::{debug, info, warn};

use super::encoder::EncoderConverter;
use super::hal::{
    self, Actuator, ActuatorId, FollowerInversion, HalError, HeadingSensor, NeutralMode,
    TelemetrySink,
};
use super::heading::normalize_degrees;
use super::mixer::{self, WheelOutputs};
use super::odometry::{OdometryEstimator, Pose};
use super::slew::{CommandOrigin, RampConfig, SlewRateLimiter, finite_or_zero};
use crate::config::DriveConfig;
use crate::messages::{DriveCommand, DriveHealth, WheelSpeeds};

/// Error types for the drivetrain core
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to {stage} on actuator {id}: {source}")]
    ActuatorConfiguration {
        stage: &'static str,
        id: ActuatorId,
        #[source]
        source: HalError,
    },

    #[error("Communication fault: {0}")]
    Communication(#[from] HalError),
}

/// Hardware handed to the drivetrain at construction
pub struct DriveHardware<A, H> {
    pub left: A,
    pub right: A,
    /// Mirrors `left`
    pub left_follower: A,
    /// Mirrors `right`
    pub right_follower: A,
    pub heading: H,
}

/// Last good readings, reused when a read fails
#[derive(Debug, Clone, Copy, Default)]
struct SensorSnapshot {
    heading_degrees: f64,
    left_ticks: f64,
    right_ticks: f64,
    left_ticks_per_second: f64,
    right_ticks_per_second: f64,
}

/// Counts consecutive cycles that saw a communication fault
#[derive(Debug)]
struct FaultMonitor {
    threshold: u32,
    consecutive: u32,
    total: u64,
    faulted_this_cycle: bool,
    health: DriveHealth,
}

impl FaultMonitor {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            total: 0,
            faulted_this_cycle: false,
            health: DriveHealth::Ok,
        }
    }

    fn record(&mut self, what: &str, err: &HalError) {
        warn!("Communication fault ({}): {}", what, err);
        self.total += 1;
        self.faulted_this_cycle = true;
    }

    fn end_cycle(&mut self) {
        if self.faulted_this_cycle {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.faulted_this_cycle = false;

        let health = if self.consecutive >= self.threshold {
            DriveHealth::Degraded
        } else {
            DriveHealth::Ok
        };
        if health != self.health {
            match health {
                DriveHealth::Degraded => warn!(
                    "Drivetrain degraded: {} consecutive faulted cycles",
                    self.consecutive
                ),
                DriveHealth::Ok => info!("Drivetrain communication recovered"),
            }
            self.health = health;
        }
    }
}

/// Differential drivetrain with dead-reckoning odometry
pub struct Drivetrain<A: Actuator, H: HeadingSensor, T: TelemetrySink> {
    left: A,
    right: A,
    /// Held so nothing else can command the followers; they only mirror
    _followers: [A; 2],
    heading_sensor: H,
    telemetry: T,
    encoder: EncoderConverter,
    limiter: SlewRateLimiter,
    odometry: OdometryEstimator,
    config: DriveConfig,
    last: SensorSnapshot,
    faults: FaultMonitor,
}

impl<A: Actuator, H: HeadingSensor, T: TelemetrySink> Drivetrain<A, H, T> {
    /// Configure the hardware and zero the odometry
    ///
    /// Nothing is driven until every configuration step has succeeded; the
    /// first failure is returned and the drivetrain is not created.
    pub fn new(
        hardware: DriveHardware<A, H>,
        telemetry: T,
        config: DriveConfig,
    ) -> Result<Self, DriveError> {
        config.validate()?;
        let encoder = EncoderConverter::new(config.distance_per_pulse)?;

        let DriveHardware {
            mut left,
            mut right,
            mut left_follower,
            mut right_follower,
            heading,
        } = hardware;

        info!(
            "Configuring drivetrain: left {} (+{}), right {} (+{})",
            left.id(),
            left_follower.id(),
            right.id(),
            right_follower.id()
        );

        // Left gearbox is mounted mirrored; its inversion lives here and only here
        configure_master(&mut left, true)?;
        configure_master(&mut right, false)?;
        configure_follower(&mut left_follower, left.id())?;
        configure_follower(&mut right_follower, right.id())?;

        let mut drivetrain = Self {
            left,
            right,
            _followers: [left_follower, right_follower],
            heading_sensor: heading,
            telemetry,
            encoder,
            limiter: SlewRateLimiter::new(config.ramp),
            odometry: OdometryEstimator::new(0.0, 0.0, 0.0),
            faults: FaultMonitor::new(config.fault_threshold),
            config,
            last: SensorSnapshot::default(),
        };

        drivetrain
            .reset()
            .map_err(|e| DriveError::Configuration(format!("initial reset failed: {}", e)))?;

        info!("Drivetrain ready, heading {:.1}deg", drivetrain.pose().heading_degrees);
        Ok(drivetrain)
    }

    /// Advance odometry by one control cycle and publish the raw readings
    pub fn periodic_update(&mut self) {
        let heading = self.read_heading();
        let left_ticks = self.read_left_ticks();
        let right_ticks = self.read_right_ticks();

        let pose = self.odometry.update(
            heading,
            self.encoder.to_distance(left_ticks),
            self.encoder.to_distance(right_ticks),
        );

        self.telemetry.publish("Left Encoder", left_ticks);
        self.telemetry.publish("Right Encoder", right_ticks);
        self.telemetry.publish("Heading", heading);
        self.telemetry.publish("Pose X", pose.x);
        self.telemetry.publish("Pose Y", pose.y);
        if self.faults.faulted_this_cycle {
            self.telemetry
                .publish("Comm Faults", self.faults.total as f64);
        }

        self.faults.end_cycle();
    }

    /// Apply a command; normalized commands are ramped by `origin`'s ramp
    pub fn drive(&mut self, command: DriveCommand, origin: CommandOrigin) {
        let shaping = self.config.input_shaping();
        match command {
            DriveCommand::Arcade { speed, steer } => {
                self.drive_normalized(mixer::arcade(speed, steer, shaping), origin)
            }
            DriveCommand::Tank { left, right } => {
                self.drive_normalized(mixer::tank(left, right, shaping), origin)
            }
            DriveCommand::DirectVoltage {
                left_volts,
                right_volts,
            } => self.drive_voltage(left_volts, right_volts),
        }
    }

    /// Operator arcade drive (open-loop ramp)
    pub fn drive_arcade(&mut self, speed: f64, steer: f64) {
        self.drive(DriveCommand::Arcade { speed, steer }, CommandOrigin::Manual);
    }

    /// Operator tank drive (open-loop ramp)
    pub fn drive_tank(&mut self, left: f64, right: f64) {
        self.drive(DriveCommand::Tank { left, right }, CommandOrigin::Manual);
    }

    /// Apply voltages directly, bypassing mixing and ramping
    ///
    /// Used by trajectory followers that compute their own feedforward. The
    /// motor safety watchdog is fed here because the normal output path is
    /// skipped; the caller must keep calling this (or another drive method)
    /// every cycle or the motor layer will fault-stop the outputs.
    ///
    /// A non-finite voltage is treated as 0 V.
    pub fn drive_voltage(&mut self, left_volts: f64, right_volts: f64) {
        let left_volts = finite_or_zero(left_volts);
        let right_volts = finite_or_zero(right_volts);
        if let Err(e) = self.left.set_voltage(left_volts) {
            self.faults.record("left voltage", &e);
        }
        if let Err(e) = self.right.set_voltage(right_volts) {
            self.faults.record("right voltage", &e);
        }
        self.feed_safety();

        let nominal = self.config.nominal_voltage;
        self.limiter.sync(WheelOutputs::new(
            (left_volts / nominal).clamp(-1.0, 1.0),
            (right_volts / nominal).clamp(-1.0, 1.0),
        ));
    }

    /// Neutral output on both sides immediately, no ramp
    pub fn stop(&mut self) {
        info!("Stopping drivetrain");
        self.apply_outputs(WheelOutputs::zero());
        self.limiter.sync(WheelOutputs::zero());
    }

    /// Zero encoders, gyro and pose as one step
    ///
    /// On a hardware failure the pose is still moved to the origin, with the
    /// references taken from whatever the hardware now reports, and the
    /// fault is returned.
    pub fn reset(&mut self) -> Result<(), DriveError> {
        let results = [
            ("left encoder reset", self.left.set_cumulative_position(0.0)),
            ("right encoder reset", self.right.set_cumulative_position(0.0)),
            ("gyro reset", self.heading_sensor.reset_zero()),
        ];

        let mut first_error = None;
        for (what, result) in results {
            if let Err(e) = result {
                self.faults.record(what, &e);
                first_error.get_or_insert(e);
            }
        }

        let heading = self.read_heading();
        let left_ticks = self.read_left_ticks();
        let right_ticks = self.read_right_ticks();
        self.odometry.reset(
            heading,
            self.encoder.to_distance(left_ticks),
            self.encoder.to_distance(right_ticks),
        );
        debug!("Odometry reset, heading {:.2}deg", heading);

        match first_error {
            Some(e) => Err(DriveError::Communication(e)),
            None => Ok(()),
        }
    }

    /// Change the operator ramp; applies from the next command
    pub fn set_open_loop_ramp_seconds(&mut self, seconds: f64) -> Result<(), DriveError> {
        self.limiter.set_open_loop_seconds(seconds)?;
        info!("Open-loop ramp set to {}s", seconds);
        Ok(())
    }

    pub fn ramp(&self) -> RampConfig {
        self.limiter.ramp()
    }

    pub fn pose(&self) -> Pose {
        self.odometry.pose()
    }

    pub fn health(&self) -> DriveHealth {
        self.faults.health
    }

    /// Current gyro heading in degrees, [-180, 180]
    pub fn heading(&mut self) -> f64 {
        self.read_heading()
    }

    /// Left wheel distance since the last reset (m)
    pub fn left_distance(&mut self) -> f64 {
        let ticks = self.read_left_ticks();
        self.encoder.to_distance(ticks)
    }

    /// Right wheel distance since the last reset (m)
    pub fn right_distance(&mut self) -> f64 {
        let ticks = self.read_right_ticks();
        self.encoder.to_distance(ticks)
    }

    pub fn wheel_speeds(&mut self) -> WheelSpeeds {
        match hal::finite_reading("left velocity", self.left.velocity()) {
            Ok(v) => self.last.left_ticks_per_second = v,
            Err(e) => self.faults.record("left velocity", &e),
        }
        match hal::finite_reading("right velocity", self.right.velocity()) {
            Ok(v) => self.last.right_ticks_per_second = v,
            Err(e) => self.faults.record("right velocity", &e),
        }
        WheelSpeeds {
            left: self.encoder.to_velocity(self.last.left_ticks_per_second),
            right: self.encoder.to_velocity(self.last.right_ticks_per_second),
        }
    }

    fn drive_normalized(&mut self, target: WheelOutputs, origin: CommandOrigin) {
        let dt = self.config.period_seconds();
        let outputs = self.limiter.step(target, origin, dt);
        self.apply_outputs(outputs);
    }

    fn apply_outputs(&mut self, outputs: WheelOutputs) {
        if let Err(e) = self.left.set_normalized_output(outputs.left) {
            self.faults.record("left output", &e);
        }
        if let Err(e) = self.right.set_normalized_output(outputs.right) {
            self.faults.record("right output", &e);
        }
        self.feed_safety();
    }

    fn feed_safety(&mut self) {
        self.left.feed_safety();
        self.right.feed_safety();
    }

    fn read_heading(&mut self) -> f64 {
        let reading = self.heading_sensor.cumulative_angle_degrees();
        match hal::finite_reading("gyro angle", reading) {
            Ok(raw) => self.last.heading_degrees = normalize_degrees(raw),
            Err(e) => self.faults.record("gyro angle", &e),
        }
        self.last.heading_degrees
    }

    fn read_left_ticks(&mut self) -> f64 {
        match hal::finite_reading("left position", self.left.cumulative_position()) {
            Ok(ticks) => self.last.left_ticks = ticks,
            Err(e) => self.faults.record("left position", &e),
        }
        self.last.left_ticks
    }

    fn read_right_ticks(&mut self) -> f64 {
        match hal::finite_reading("right position", self.right.cumulative_position()) {
            Ok(ticks) => self.last.right_ticks = ticks,
            Err(e) => self.faults.record("right position", &e),
        }
        self.last.right_ticks
    }
}

fn config_error(stage: &'static str, id: ActuatorId) -> impl FnOnce(HalError) -> DriveError {
    move |source| DriveError::ActuatorConfiguration { stage, id, source }
}

fn configure_master<A: Actuator>(actuator: &mut A, inverted: bool) -> Result<(), DriveError> {
    let id = actuator.id();
    let stage = |stage: &'static str| config_error(stage, id);

    actuator
        .configure_defaults()
        .map_err(stage("restore defaults"))?;
    actuator
        .set_inverted(inverted)
        .map_err(stage("set inversion"))?;
    actuator
        .set_neutral_mode(NeutralMode::Brake)
        .map_err(stage("set neutral mode"))?;
    // Ramping is done in software, so the controller's own ramp stays off
    actuator
        .configure_ramp(RampConfig::disabled())
        .map_err(stage("configure ramp"))?;
    debug!("Master {} configured (inverted={})", id, inverted);
    Ok(())
}

fn configure_follower<A: Actuator>(actuator: &mut A, master: ActuatorId) -> Result<(), DriveError> {
    let id = actuator.id();
    let stage = |stage: &'static str| config_error(stage, id);

    actuator
        .set_neutral_mode(NeutralMode::Brake)
        .map_err(stage("set neutral mode"))?;
    actuator
        .configure_follower(master, FollowerInversion::FollowMaster)
        .map_err(stage("follow master"))?;
    debug!("Follower {} following {}", id, master);
    Ok(())
}

impl<A: Actuator, H: HeadingSensor, T: TelemetrySink> Drop for Drivetrain<A, H, T> {
    fn drop(&mut self) {
        // Try to leave the motors at neutral when the core goes away
        let results: [hal::Result<()>; 2] = [
            self.left.set_normalized_output(0.0),
            self.right.set_normalized_output(0.0),
        ];
        for e in results.into_iter().filter_map(Result::err) {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
