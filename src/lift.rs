use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::clock::{Deadline, SharedClock};
use crate::config::LiftConfig;
use crate::robot_hal::{DistanceSensor, HalResult, LiftDirection, StepperDriver};

pub type SharedLift = Rc<RefCell<Lift>>;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum LiftState {
    Idle,
    MovingUp,
    MovingDown,
}

/// Drives the lift stepper for a fixed time window, one step per tick.  The distance sensor is
/// only a safety bound: the move also ends early if the carriage passes the configured height
/// limit for its direction.
pub struct Lift {
    stepper: Box<dyn StepperDriver>,
    sensor: Box<dyn DistanceSensor>,
    clock: SharedClock,
    config: LiftConfig,
    state: LiftState,
    deadline: Deadline,
    powered: bool,
    height_cm: f32,
}

impl Lift {
    pub fn new(
        stepper: Box<dyn StepperDriver>,
        sensor: Box<dyn DistanceSensor>,
        clock: SharedClock,
        config: LiftConfig,
    ) -> Self {
        Self {
            stepper,
            sensor,
            clock,
            config,
            state: LiftState::Idle,
            deadline: Deadline::at(0),
            powered: false,
            height_cm: 0.0,
        }
    }

    /// Power the driver down regardless of what we think it is doing and take a first reading.
    pub fn initialize(&mut self) -> HalResult<()> {
        self.stepper.set_power(false)?;
        self.powered = false;
        self.refresh_height();
        Ok(())
    }

    /// Start moving up for `duration_ms`.  Refused while the lift is already moving.
    pub fn up_for(&mut self, duration_ms: u32) -> HalResult<bool> {
        self.start_move(LiftState::MovingUp, duration_ms)
    }

    /// Start moving down for `duration_ms`.  Refused while the lift is already moving.
    pub fn down_for(&mut self, duration_ms: u32) -> HalResult<bool> {
        self.start_move(LiftState::MovingDown, duration_ms)
    }

    pub fn update(&mut self) -> HalResult<()> {
        let direction = match self.state {
            LiftState::Idle => return Ok(()),
            LiftState::MovingUp => LiftDirection::Up,
            LiftState::MovingDown => LiftDirection::Down,
        };

        self.refresh_height();
        let time_is_up = self.deadline.reached(self.clock.now_ms());
        let limit_reached = match direction {
            LiftDirection::Up => self.height_cm >= self.config.max_height_cm,
            LiftDirection::Down => self.height_cm <= self.config.min_height_cm,
        };

        if time_is_up || limit_reached {
            debug!(
                "Lift: stopping {:?} at {}cm (timeout={time_is_up}, limit={limit_reached})",
                self.state,
                self.height_cm
            );
            return self.stop();
        }

        trace!("Lift: step {direction:?} at {}cm", self.height_cm);
        self.stepper.step_pulse(direction)
    }

    pub fn stop(&mut self) -> HalResult<()> {
        self.state = LiftState::Idle;
        self.set_power(false)
    }

    pub fn state(&self) -> LiftState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == LiftState::Idle
    }

    /// Last successful sensor reading.
    pub fn height_cm(&self) -> f32 {
        self.height_cm
    }

    fn start_move(&mut self, state: LiftState, duration_ms: u32) -> HalResult<bool> {
        if self.state != LiftState::Idle {
            warn!("Lift: already {:?}, ignoring request to go {:?}", self.state, state);
            return Ok(false);
        }
        self.set_power(true)?;
        self.state = state;
        self.deadline = Deadline::after(self.clock.now_ms(), duration_ms);
        debug!("Lift: {state:?} for {duration_ms}ms from {}cm", self.height_cm);
        Ok(true)
    }

    fn set_power(&mut self, enabled: bool) -> HalResult<()> {
        if self.powered != enabled {
            self.stepper.set_power(enabled)?;
            self.powered = enabled;
        }
        Ok(())
    }

    /// A failed read keeps the previous height; the deadline still ends the move.
    fn refresh_height(&mut self) {
        match self.sensor.read_distance_cm() {
            Ok(height_cm) => self.height_cm = height_cm,
            Err(e) => warn!("Lift: height read failed, keeping {}cm: {e}", self.height_cm),
        }
    }
}
