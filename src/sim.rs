// Simulated drivetrain hardware
//
// All devices share one `SimBus`. Masters integrate their output into encoder
// ticks, followers physically take their master's output, and the gyro
// integrates the left/right speed difference. Used by the host runtime when no
// hardware is attached and by the tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::config::{
    DISTANCE_PER_PULSE, LEFT_FOLLOWER_ID, LEFT_MASTER_ID, NOMINAL_VOLTAGE, RIGHT_FOLLOWER_ID,
    RIGHT_MASTER_ID,
};
use crate::drive::hal::{
    Actuator, ActuatorId, FollowerInversion, HalError, HeadingSensor, NeutralMode, Result,
};
use crate::drive::{DriveHardware, RampConfig};

/// Ground speed of a wheel at full output (m/s)
pub const SIM_MAX_SPEED: f64 = 4.0;

/// Distance between left and right wheels (m)
pub const SIM_TRACK_WIDTH: f64 = 0.6;

/// State of one simulated motor controller
#[derive(Debug, Clone)]
pub struct SimMotor {
    pub inverted: bool,
    pub neutral_mode: NeutralMode,
    pub follow: Option<(ActuatorId, FollowerInversion)>,
    pub ramp: Option<RampConfig>,
    /// Logical output in [-1, 1], before inversion
    pub output: f64,
    pub position_ticks: f64,
    pub velocity_ticks: f64,
    pub safety_feeds: u64,
    pub configured: bool,
}

impl Default for SimMotor {
    fn default() -> Self {
        Self {
            inverted: false,
            neutral_mode: NeutralMode::Coast,
            follow: None,
            ramp: None,
            output: 0.0,
            position_ticks: 0.0,
            velocity_ticks: 0.0,
            safety_feeds: 0,
            configured: false,
        }
    }
}

#[derive(Debug)]
struct SimState {
    motors: HashMap<ActuatorId, SimMotor>,
    left: ActuatorId,
    right: ActuatorId,
    /// Accumulated yaw, counter-clockwise positive
    yaw_degrees: f64,
    yaw_zero: f64,
    distance_per_pulse: f64,
    /// Remaining calls that will fail with a timeout
    pending_faults: u32,
}

/// Shared handle to the simulated bus
#[derive(Debug, Clone)]
pub struct SimBus {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new(LEFT_MASTER_ID, RIGHT_MASTER_ID, DISTANCE_PER_PULSE)
    }
}

impl SimBus {
    /// Bus whose drive sides are the masters `left` and `right`
    pub fn new(left: ActuatorId, right: ActuatorId, distance_per_pulse: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                motors: HashMap::new(),
                left,
                right,
                yaw_degrees: 0.0,
                yaw_zero: 0.0,
                distance_per_pulse,
                pending_faults: 0,
            })),
        }
    }

    /// Handle for the motor at `id`
    pub fn actuator(&self, id: ActuatorId) -> SimActuator {
        self.state.borrow_mut().motors.entry(id).or_default();
        SimActuator {
            id,
            bus: self.clone(),
        }
    }

    pub fn heading_sensor(&self) -> SimHeadingSensor {
        SimHeadingSensor { bus: self.clone() }
    }

    /// Four motors and a gyro wired with the default ids
    pub fn drive_hardware(&self) -> DriveHardware<SimActuator, SimHeadingSensor> {
        DriveHardware {
            left: self.actuator(LEFT_MASTER_ID),
            right: self.actuator(RIGHT_MASTER_ID),
            left_follower: self.actuator(LEFT_FOLLOWER_ID),
            right_follower: self.actuator(RIGHT_FOLLOWER_ID),
            heading: self.heading_sensor(),
        }
    }

    /// Make the next `count` device calls fail with a timeout
    pub fn inject_faults(&self, count: u32) {
        self.state.borrow_mut().pending_faults = count;
    }

    pub fn motor(&self, id: ActuatorId) -> Option<SimMotor> {
        self.state.borrow().motors.get(&id).cloned()
    }

    /// Direction the motor shaft is actually driven, in [-1, 1]
    pub fn applied_output(&self, id: ActuatorId) -> f64 {
        let state = self.state.borrow();
        applied_output(&state.motors, id)
    }

    /// Set the gyro's raw accumulated angle directly
    pub fn set_yaw_degrees(&self, degrees: f64) {
        self.state.borrow_mut().yaw_degrees = degrees;
    }

    /// Move the simulated robot forward by `dt` seconds
    pub fn step(&self, dt: f64) {
        let mut state = self.state.borrow_mut();
        let dpp = state.distance_per_pulse;

        for motor in state.motors.values_mut() {
            if motor.follow.is_some() {
                continue;
            }
            // Encoder counts in the logical direction, so inversion is not applied
            motor.velocity_ticks = motor.output * SIM_MAX_SPEED / dpp;
            motor.position_ticks += motor.velocity_ticks * dt;
        }

        let speed = |id: ActuatorId| {
            state
                .motors
                .get(&id)
                .map(|m| m.velocity_ticks * dpp)
                .unwrap_or(0.0)
        };
        let yaw_rate = (speed(state.right) - speed(state.left)) / SIM_TRACK_WIDTH;
        state.yaw_degrees += yaw_rate.to_degrees() * dt;
        debug!("Sim step: yaw={:.2}deg", state.yaw_degrees);
    }

    fn check_fault(&self, what: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.pending_faults > 0 {
            state.pending_faults -= 1;
            return Err(HalError::Timeout {
                what: what.to_string(),
            });
        }
        Ok(())
    }

    fn with_motor<R>(&self, id: ActuatorId, f: impl FnOnce(&mut SimMotor) -> R) -> R {
        let mut state = self.state.borrow_mut();
        f(state.motors.entry(id).or_default())
    }
}

fn applied_output(motors: &HashMap<ActuatorId, SimMotor>, id: ActuatorId) -> f64 {
    let Some(motor) = motors.get(&id) else {
        return 0.0;
    };
    match motor.follow {
        // Followers never chain, so one level of lookup is enough
        Some((master, inversion)) => motors
            .get(&master)
            .map(|m| signed(m.output, m.inverted) * inversion.sign())
            .unwrap_or(0.0),
        None => signed(motor.output, motor.inverted),
    }
}

fn signed(output: f64, inverted: bool) -> f64 {
    if inverted { -output } else { output }
}

/// Simulated motor controller
#[derive(Debug, Clone)]
pub struct SimActuator {
    id: ActuatorId,
    bus: SimBus,
}

impl SimActuator {
    /// Set points are only taken by configured masters
    fn require_master(&self) -> Result<()> {
        let (configured, following) = self
            .bus
            .with_motor(self.id, |m| (m.configured, m.follow.is_some()));
        if !configured {
            return Err(HalError::NotConfigured(self.id));
        }
        if following {
            return Err(HalError::Bus(format!(
                "{} is a follower and takes no set point",
                self.id
            )));
        }
        Ok(())
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> ActuatorId {
        self.id
    }

    fn configure_defaults(&mut self) -> Result<()> {
        self.bus.check_fault("configure defaults")?;
        self.bus.with_motor(self.id, |m| {
            *m = SimMotor {
                position_ticks: m.position_ticks,
                configured: true,
                ..SimMotor::default()
            }
        });
        Ok(())
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<()> {
        self.bus.check_fault("set inverted")?;
        self.bus.with_motor(self.id, |m| m.inverted = inverted);
        Ok(())
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()> {
        self.bus.check_fault("set neutral mode")?;
        self.bus.with_motor(self.id, |m| m.neutral_mode = mode);
        Ok(())
    }

    fn configure_follower(
        &mut self,
        master: ActuatorId,
        inversion: FollowerInversion,
    ) -> Result<()> {
        self.bus.check_fault("configure follower")?;
        self.bus.with_motor(self.id, |m| {
            m.follow = Some((master, inversion));
            m.configured = true;
        });
        Ok(())
    }

    fn configure_ramp(&mut self, ramp: RampConfig) -> Result<()> {
        self.bus.check_fault("configure ramp")?;
        self.bus.with_motor(self.id, |m| m.ramp = Some(ramp));
        Ok(())
    }

    fn set_normalized_output(&mut self, value: f64) -> Result<()> {
        self.bus.check_fault("set output")?;
        self.require_master()?;
        self.bus
            .with_motor(self.id, |m| m.output = value.clamp(-1.0, 1.0));
        Ok(())
    }

    fn set_voltage(&mut self, volts: f64) -> Result<()> {
        self.bus.check_fault("set voltage")?;
        self.require_master()?;
        self.bus.with_motor(self.id, |m| {
            m.output = (volts / NOMINAL_VOLTAGE).clamp(-1.0, 1.0)
        });
        Ok(())
    }

    fn cumulative_position(&mut self) -> Result<f64> {
        self.bus.check_fault("position")?;
        Ok(self.bus.with_motor(self.id, |m| m.position_ticks))
    }

    fn velocity(&mut self) -> Result<f64> {
        self.bus.check_fault("velocity")?;
        Ok(self.bus.with_motor(self.id, |m| m.velocity_ticks))
    }

    fn set_cumulative_position(&mut self, ticks: f64) -> Result<()> {
        self.bus.check_fault("set position")?;
        self.bus.with_motor(self.id, |m| m.position_ticks = ticks);
        Ok(())
    }

    fn feed_safety(&mut self) {
        self.bus.with_motor(self.id, |m| m.safety_feeds += 1);
    }
}

/// Simulated gyro, reports accumulated yaw relative to its last zeroing
#[derive(Debug, Clone)]
pub struct SimHeadingSensor {
    bus: SimBus,
}

impl HeadingSensor for SimHeadingSensor {
    fn reset_zero(&mut self) -> Result<()> {
        self.bus.check_fault("gyro reset")?;
        let mut state = self.bus.state.borrow_mut();
        state.yaw_zero = state.yaw_degrees;
        Ok(())
    }

    fn cumulative_angle_degrees(&mut self) -> Result<f64> {
        self.bus.check_fault("gyro angle")?;
        let state = self.bus.state.borrow();
        Ok(state.yaw_degrees - state.yaw_zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follower_takes_master_direction() {
        let bus = SimBus::default();
        let mut master = bus.actuator(LEFT_MASTER_ID);
        let mut follower = bus.actuator(LEFT_FOLLOWER_ID);

        master.configure_defaults().unwrap();
        master.set_inverted(true).unwrap();
        follower
            .configure_follower(LEFT_MASTER_ID, FollowerInversion::FollowMaster)
            .unwrap();
        master.set_normalized_output(0.5).unwrap();

        assert_eq!(bus.applied_output(LEFT_MASTER_ID), -0.5);
        assert_eq!(bus.applied_output(LEFT_FOLLOWER_ID), -0.5);
        assert!(follower.set_normalized_output(1.0).is_err());
    }

    #[test]
    fn test_step_integrates_encoders_and_yaw() {
        let bus = SimBus::new(ActuatorId(1), ActuatorId(2), 0.001);
        let mut left = bus.actuator(ActuatorId(1));
        let mut right = bus.actuator(ActuatorId(2));
        let mut gyro = bus.heading_sensor();
        left.configure_defaults().unwrap();
        right.configure_defaults().unwrap();

        left.set_normalized_output(0.5).unwrap();
        right.set_normalized_output(0.5).unwrap();
        bus.step(1.0);
        // 2 m/s for 1 s at 1 mm per tick
        assert!((left.cumulative_position().unwrap() - 2000.0).abs() < 1e-6);
        assert!(gyro.cumulative_angle_degrees().unwrap().abs() < 1e-9);

        right.set_normalized_output(-0.5).unwrap();
        bus.step(0.1);
        assert!(gyro.cumulative_angle_degrees().unwrap() < 0.0);
    }

    #[test]
    fn test_unconfigured_motor_rejects_set_points() {
        let bus = SimBus::default();
        let mut motor = bus.actuator(RIGHT_MASTER_ID);
        assert_eq!(
            motor.set_voltage(6.0),
            Err(HalError::NotConfigured(RIGHT_MASTER_ID))
        );
        assert_eq!(bus.motor(RIGHT_MASTER_ID).unwrap().output, 0.0);

        motor.configure_defaults().unwrap();
        motor.set_voltage(6.0).unwrap();
        assert_eq!(bus.motor(RIGHT_MASTER_ID).unwrap().output, 0.5);
    }

    #[test]
    fn test_injected_faults_are_consumed() {
        let bus = SimBus::default();
        let mut gyro = bus.heading_sensor();
        bus.inject_faults(2);
        assert!(gyro.cumulative_angle_degrees().is_err());
        assert!(gyro.reset_zero().is_err());
        assert!(gyro.cumulative_angle_degrees().is_ok());
    }
}
