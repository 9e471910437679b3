use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::str::FromStr;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Deadline, SharedClock};
use crate::config::{DriveConfig, MotionProfile};
use crate::grid::GridCell;
use crate::robot_hal::{clamp_duty, DriveMotors, HalResult};

pub type SharedDrivetrain = Rc<RefCell<Drivetrain>>;

/// Enough for a 180 degree turn (two quarter turns) plus the step forward.
pub const ACTION_QUEUE_CAPACITY: usize = 3;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn rotated_cw(self) -> Self {
        match self {
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
        }
    }

    pub fn rotated_ccw(self) -> Self {
        match self {
            Direction::Up => Direction::Left,
            Direction::Left => Direction::Down,
            Direction::Down => Direction::Right,
            Direction::Right => Direction::Up,
        }
    }

    /// Heading needed to go from `from` to `to`, if they are neighbours.
    pub fn between(from: &GridCell, to: &GridCell) -> Option<Self> {
        match (to.x - from.x, to.y - from.y) {
            (1, 0) => Some(Direction::Right),
            (-1, 0) => Some(Direction::Left),
            (0, 1) => Some(Direction::Up),
            (0, -1) => Some(Direction::Down),
            _ => None,
        }
    }

    /// Shortest quarter-turn sequence from this heading to `target`.  Half turns always go
    /// clockwise.
    pub fn turns_to(self, target: Direction) -> &'static [MotionAction] {
        const NONE: &[MotionAction] = &[];
        const CW: &[MotionAction] = &[MotionAction::RotateCw];
        const CCW: &[MotionAction] = &[MotionAction::RotateCcw];
        const HALF: &[MotionAction] = &[MotionAction::RotateCw, MotionAction::RotateCw];

        if target == self {
            NONE
        } else if target == self.rotated_cw() {
            CW
        } else if target == self.rotated_ccw() {
            CCW
        } else {
            HALF
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unknown heading {0:?}, expected up, down, left or right")]
pub struct ParseDirectionError(String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(ParseDirectionError(s.to_owned())),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MotionAction {
    Idle,
    RotateCw,
    RotateCcw,
    Forward,
    Backward,
}

/// Bounded FIFO of pending actions.  Pushing onto a full queue drops the action.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: VecDeque<MotionAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self { actions: VecDeque::with_capacity(ACTION_QUEUE_CAPACITY) }
    }

    #[must_use]
    pub fn push(&mut self, action: MotionAction) -> bool {
        if self.is_full() {
            return false;
        }
        self.actions.push_back(action);
        true
    }

    pub fn pop(&mut self) -> Option<MotionAction> {
        self.actions.pop_front()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.actions.len() >= ACTION_QUEUE_CAPACITY
    }

    pub fn remaining(&self) -> usize {
        ACTION_QUEUE_CAPACITY - self.actions.len()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotionAction> {
        self.actions.iter()
    }
}

/// Owns the drive motors and the robot's heading.  Executes one timed action at a time from a
/// short queue, never blocking: call [`Drivetrain::update`] every tick.
pub struct Drivetrain {
    motors: Box<dyn DriveMotors>,
    clock: SharedClock,
    config: DriveConfig,
    heading: Direction,
    action: MotionAction,
    action_deadline: Deadline,
    queue: ActionQueue,
}

impl Drivetrain {
    pub const INITIAL_HEADING: Direction = Direction::Right;

    pub fn new(motors: Box<dyn DriveMotors>, clock: SharedClock, config: DriveConfig) -> Self {
        Self {
            motors,
            clock,
            config,
            heading: Self::INITIAL_HEADING,
            action: MotionAction::Idle,
            action_deadline: Deadline::at(0),
            queue: ActionQueue::new(),
        }
    }

    /// Makes sure the wheels are stopped before the first tick.
    pub fn initialize(&mut self) -> HalResult<()> {
        self.motors.stop()
    }

    /// Queue the turn (if any) and the step needed to move from `current` to the neighbouring
    /// `next` cell.  Ignored unless idle and the cells are in-bounds neighbours.
    pub fn request_edge(&mut self, current: GridCell, next: GridCell) -> HalResult<bool> {
        if !self.is_idle() {
            warn!("Drivetrain: busy with {:?}, ignoring edge {current} -> {next}", self.action);
            return Ok(false);
        }
        if !current.in_bounds() || !next.in_bounds() {
            warn!("Drivetrain: edge {current} -> {next} leaves the grid, ignoring");
            return Ok(false);
        }
        let target = match Direction::between(&current, &next) {
            Some(target) => target,
            None => {
                warn!("Drivetrain: {current} -> {next} is not a single step, ignoring");
                return Ok(false);
            }
        };

        debug!("Drivetrain: edge {current} -> {next}, facing {:?} want {:?}", self.heading, target);
        for turn in self.heading.turns_to(target) {
            self.enqueue(*turn);
        }
        self.enqueue(MotionAction::Forward);
        self.start_next_if_idle()?;
        Ok(true)
    }

    /// Queue the minimal turn towards `target`.  Refused outright if the whole turn would not
    /// fit in the queue.
    pub fn rotate_to(&mut self, target: Direction) -> HalResult<bool> {
        let turns = self.planned_heading().turns_to(target);
        if turns.len() > self.queue.remaining() {
            warn!("Drivetrain: no room to turn {:?} -> {:?}, ignoring", self.heading, target);
            return Ok(false);
        }
        for turn in turns {
            self.enqueue(*turn);
        }
        self.start_next_if_idle()?;
        Ok(true)
    }

    pub fn start_forward(&mut self) -> HalResult<bool> {
        self.start_single(MotionAction::Forward)
    }

    pub fn start_backward(&mut self) -> HalResult<bool> {
        self.start_single(MotionAction::Backward)
    }

    pub fn start_rotate_cw(&mut self) -> HalResult<bool> {
        self.start_single(MotionAction::RotateCw)
    }

    pub fn start_rotate_ccw(&mut self) -> HalResult<bool> {
        self.start_single(MotionAction::RotateCcw)
    }

    pub fn update(&mut self) -> HalResult<()> {
        if self.action == MotionAction::Idle {
            return self.start_next_if_idle();
        }

        let now = self.clock.now_ms();
        if self.action_deadline.reached(now) {
            self.finish_action()?;
            self.start_next_if_idle()?;
        } else {
            trace!("Drivetrain: {:?} until {}", self.action, self.action_deadline.timestamp_ms());
        }
        Ok(())
    }

    /// Emergency stop: wheels off, queue drained, current action dropped.  The heading is left
    /// as-is, a rotation cut short does not count.
    pub fn halt(&mut self) -> HalResult<()> {
        if self.action != MotionAction::Idle || !self.queue.is_empty() {
            warn!("Drivetrain: halting {:?} with {} queued", self.action, self.queue.len());
        }
        self.queue.clear();
        self.action = MotionAction::Idle;
        self.motors.stop()
    }

    pub fn is_idle(&self) -> bool {
        self.action == MotionAction::Idle && self.queue.is_empty()
    }

    pub fn current_action(&self) -> MotionAction {
        self.action
    }

    pub fn heading(&self) -> Direction {
        self.heading
    }

    /// For when the robot is placed on the field facing somewhere other than right.
    pub fn set_heading(&mut self, heading: Direction) {
        self.heading = heading;
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// The running action followed by everything queued behind it.
    pub fn pending_actions(&self) -> Vec<MotionAction> {
        let running = Some(self.action).filter(|a| *a != MotionAction::Idle);
        running.into_iter().chain(self.queue.iter().copied()).collect()
    }

    pub fn set_forward_profile(&mut self, profile: MotionProfile) {
        self.config.forward = profile;
    }

    pub fn set_backward_profile(&mut self, profile: MotionProfile) {
        self.config.backward = profile;
    }

    pub fn set_rotate_profile(&mut self, profile: MotionProfile) {
        self.config.rotate = profile;
    }

    fn start_single(&mut self, action: MotionAction) -> HalResult<bool> {
        let accepted = self.enqueue(action);
        self.start_next_if_idle()?;
        Ok(accepted)
    }

    fn enqueue(&mut self, action: MotionAction) -> bool {
        let accepted = self.queue.push(action);
        if !accepted {
            warn!("Drivetrain: queue full, dropping {action:?}");
        }
        accepted
    }

    /// Heading once every pending rotation has run.
    fn planned_heading(&self) -> Direction {
        self.pending_actions().iter().fold(self.heading, |heading, action| match action {
            MotionAction::RotateCw => heading.rotated_cw(),
            MotionAction::RotateCcw => heading.rotated_ccw(),
            _ => heading,
        })
    }

    fn start_next_if_idle(&mut self) -> HalResult<()> {
        if self.action != MotionAction::Idle {
            return Ok(());
        }
        match self.queue.pop() {
            Some(next) => self.start_action(next),
            None => Ok(()),
        }
    }

    fn profile_for(&self, action: MotionAction) -> Option<MotionProfile> {
        match action {
            MotionAction::Idle => None,
            MotionAction::Forward => Some(self.config.forward),
            MotionAction::Backward => Some(self.config.backward),
            MotionAction::RotateCw => Some(self.config.rotate),
            MotionAction::RotateCcw => Some(self.config.rotate.reversed()),
        }
    }

    fn start_action(&mut self, action: MotionAction) -> HalResult<()> {
        let now = self.clock.now_ms();
        match self.profile_for(action) {
            Some(profile) => {
                let left = clamp_duty(profile.left_duty);
                let right = clamp_duty(profile.right_duty);
                debug!(
                    "Drivetrain: start {action:?} for {}ms (L={left}, R={right})",
                    profile.duration_ms
                );
                if let Err(e) = self.motors.drive(left, right) {
                    warn!(
                        "Drivetrain: {action:?} failed to start, dropping {} queued",
                        self.queue.len()
                    );
                    self.queue.clear();
                    self.action = MotionAction::Idle;
                    return Err(e);
                }
                self.action = action;
                self.action_deadline = Deadline::after(now, profile.duration_ms);
            }
            None => {
                self.motors.stop()?;
                self.action = MotionAction::Idle;
                self.action_deadline = Deadline::at(now);
            }
        }
        Ok(())
    }

    fn finish_action(&mut self) -> HalResult<()> {
        if let Err(e) = self.motors.stop() {
            warn!(
                "Drivetrain: could not stop after {:?}, dropping {} queued",
                self.action,
                self.queue.len()
            );
            self.queue.clear();
            self.action = MotionAction::Idle;
            return Err(e);
        }
        self.heading = match self.action {
            MotionAction::RotateCw => self.heading.rotated_cw(),
            MotionAction::RotateCcw => self.heading.rotated_ccw(),
            _ => self.heading,
        };
        debug!("Drivetrain: finished {:?}, facing {:?}", self.action, self.heading);
        self.action = MotionAction::Idle;
        Ok(())
    }
}
