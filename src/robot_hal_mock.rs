use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, trace};

use crate::config::SimConfig;
use crate::robot_hal::{
    clamp_duty, DistanceSensor, DriveMotors, HalError, HalResult, LiftDirection, RobotHardware,
    StepperDriver,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MotorCommand {
    Drive { left: i32, right: i32 },
    Stop,
}

/// Records every command it is sent.  Clones share the record so a test can keep one handle
/// while the drivetrain owns the other.
#[derive(Debug, Default, Clone)]
pub struct MockDriveMotors {
    history: Rc<RefCell<Vec<MotorCommand>>>,
    disconnected: Rc<Cell<bool>>,
}

impl MockDriveMotors {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn history(&self) -> Vec<MotorCommand> {
        self.history.borrow().clone()
    }

    pub fn drive_commands(&self) -> Vec<(i32, i32)> {
        self.history
            .borrow()
            .iter()
            .filter_map(|c| match c {
                MotorCommand::Drive { left, right } => Some((*left, *right)),
                MotorCommand::Stop => None,
            })
            .collect()
    }

    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.set(disconnected);
    }

    fn check_connected(&self) -> HalResult<()> {
        if self.disconnected.get() {
            return Err(HalError::DeviceNotConnected("drive motors not connected".to_owned()));
        }
        Ok(())
    }
}

impl DriveMotors for MockDriveMotors {
    fn drive(&mut self, left_duty: i32, right_duty: i32) -> HalResult<()> {
        self.check_connected()?;
        let command = MotorCommand::Drive {
            left: clamp_duty(left_duty),
            right: clamp_duty(right_duty),
        };
        debug!("drive: {command:?}");
        self.history.borrow_mut().push(command);
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        self.check_connected()?;
        debug!("drive: {:?}", MotorCommand::Stop);
        self.history.borrow_mut().push(MotorCommand::Stop);
        Ok(())
    }
}

#[derive(Debug)]
struct LiftSimState {
    height_cm: f32,
    powered: bool,
    steps_up: u32,
    steps_down: u32,
    power_toggles: u32,
    sensor_failing: bool,
}

/// Stepper and distance sensor sharing one simulated carriage: each powered step moves the
/// carriage by `cm_per_step` and the sensor reports where it is.  Hand clones of it to the lift
/// as both its stepper and its sensor.
#[derive(Debug, Clone)]
pub struct SimulatedLift {
    cm_per_step: f32,
    state: Rc<RefCell<LiftSimState>>,
}

impl SimulatedLift {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            cm_per_step: config.cm_per_step,
            state: Rc::new(RefCell::new(LiftSimState {
                height_cm: config.initial_height_cm,
                powered: false,
                steps_up: 0,
                steps_down: 0,
                power_toggles: 0,
                sensor_failing: false,
            })),
        }
    }

    pub fn height_cm(&self) -> f32 {
        self.state.borrow().height_cm
    }

    pub fn set_height_cm(&self, height_cm: f32) {
        self.state.borrow_mut().height_cm = height_cm;
    }

    pub fn is_powered(&self) -> bool {
        self.state.borrow().powered
    }

    pub fn steps(&self) -> (u32, u32) {
        let state = self.state.borrow();
        (state.steps_up, state.steps_down)
    }

    pub fn power_toggles(&self) -> u32 {
        self.state.borrow().power_toggles
    }

    pub fn set_sensor_failing(&self, failing: bool) {
        self.state.borrow_mut().sensor_failing = failing;
    }
}

impl StepperDriver for SimulatedLift {
    fn set_power(&mut self, enabled: bool) -> HalResult<()> {
        let mut state = self.state.borrow_mut();
        if state.powered != enabled {
            debug!("lift power: {enabled}");
            state.powered = enabled;
            state.power_toggles += 1;
        }
        Ok(())
    }

    fn step_pulse(&mut self, direction: LiftDirection) -> HalResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.powered {
            trace!("step {direction:?} ignored, driver disabled");
            return Ok(());
        }
        match direction {
            LiftDirection::Up => {
                state.height_cm += self.cm_per_step;
                state.steps_up += 1;
            }
            LiftDirection::Down => {
                state.height_cm = (state.height_cm - self.cm_per_step).max(0.0);
                state.steps_down += 1;
            }
        }
        Ok(())
    }
}

impl DistanceSensor for SimulatedLift {
    fn read_distance_cm(&mut self) -> HalResult<f32> {
        let state = self.state.borrow();
        if state.sensor_failing {
            return Err(HalError::InternalError("ultrasonic sensor not responding".to_owned()));
        }
        Ok(state.height_cm)
    }
}

/// Plays back a fixed list of readings, then keeps repeating the last one.
pub struct ScriptedDistanceSensor {
    readings: VecDeque<HalResult<f32>>,
    last: HalResult<f32>,
}

impl ScriptedDistanceSensor {
    pub fn new(readings: impl IntoIterator<Item = HalResult<f32>>) -> Self {
        Self { readings: readings.into_iter().collect(), last: Ok(0.0) }
    }
}

impl DistanceSensor for ScriptedDistanceSensor {
    fn read_distance_cm(&mut self) -> HalResult<f32> {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        self.last.clone()
    }
}

/// A whole simulated robot.  Keep this around to inspect what happened after handing
/// [`SimulatedRobot::hardware`] to the controllers.
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    pub motors: MockDriveMotors,
    pub lift: SimulatedLift,
}

impl SimulatedRobot {
    pub fn new(config: &SimConfig) -> Self {
        Self { motors: MockDriveMotors::new(), lift: SimulatedLift::new(config) }
    }

    pub fn hardware(&self) -> RobotHardware {
        RobotHardware {
            drive_motors: Box::new(self.motors.clone()),
            lift_stepper: Box::new(self.lift.clone()),
            lift_sensor: Box::new(self.lift.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_lift_only_moves_when_powered() {
        let sim = SimulatedLift::new(&SimConfig { initial_height_cm: 1.0, cm_per_step: 0.5 });
        let mut stepper = sim.clone();
        let mut sensor = sim.clone();

        stepper.step_pulse(LiftDirection::Up).unwrap();
        assert_eq!(sensor.read_distance_cm().unwrap(), 1.0);

        stepper.set_power(true).unwrap();
        stepper.set_power(true).unwrap();
        stepper.step_pulse(LiftDirection::Up).unwrap();
        stepper.step_pulse(LiftDirection::Up).unwrap();
        stepper.step_pulse(LiftDirection::Down).unwrap();
        assert_eq!(sensor.read_distance_cm().unwrap(), 1.5);
        assert_eq!(sim.steps(), (2, 1));
        assert_eq!(sim.power_toggles(), 1);
    }

    #[test]
    fn test_scripted_sensor_repeats_last() {
        let mut sensor = ScriptedDistanceSensor::new(vec![Ok(2.0), Ok(3.0)]);
        assert_eq!(sensor.read_distance_cm(), Ok(2.0));
        assert_eq!(sensor.read_distance_cm(), Ok(3.0));
        assert_eq!(sensor.read_distance_cm(), Ok(3.0));
    }
}
