use thiserror::Error;

/// Largest duty magnitude the motor driver accepts, anything above is clamped by implementors.
pub const MAX_DUTY: i32 = 255;

#[derive(Error, PartialEq, Clone, Debug)]
pub enum HalError {
    #[error("{0}")]
    DeviceNotConnected(String),
    #[error("{0}")]
    InternalError(String),
}

pub type HalResult<T> = Result<T, HalError>;

/// The two drive wheels.  Duty sign is direction, magnitude is speed.
pub trait DriveMotors {
    fn drive(&mut self, left_duty: i32, right_duty: i32) -> HalResult<()>;
    fn stop(&mut self) -> HalResult<()>;
}

/// Stepper motor that moves the lift, including its driver enable line and power relay.
pub trait StepperDriver {
    /// Idempotent, toggles the driver enable and the relay together.
    fn set_power(&mut self, enabled: bool) -> HalResult<()>;

    /// Exactly one step edge in the given direction.
    fn step_pulse(&mut self, direction: LiftDirection) -> HalResult<()>;
}

/// Echo-based distance sensor looking down at the floor from the lift carriage.
pub trait DistanceSensor {
    /// On echo timeout implementors return 0.0 rather than blocking.
    fn read_distance_cm(&mut self) -> HalResult<f32>;
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum LiftDirection {
    Up,
    Down,
}

pub fn clamp_duty(duty: i32) -> i32 {
    duty.clamp(-MAX_DUTY, MAX_DUTY)
}

/// Everything the robot's controllers need from the board, handed over once at startup.
pub struct RobotHardware {
    pub drive_motors: Box<dyn DriveMotors>,
    pub lift_stepper: Box<dyn StepperDriver>,
    pub lift_sensor: Box<dyn DistanceSensor>,
}
