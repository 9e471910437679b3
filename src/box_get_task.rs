use log::{debug, info, warn};

use crate::config::BoxGetConfig;
use crate::drivetrain::{Direction, SharedDrivetrain};
use crate::lift::SharedLift;
use crate::robot_hal::HalResult;

/// The box sits one cell below the robot's final waypoint.
pub const BOX_HEADING: Direction = Direction::Down;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BoxGetState {
    Idle,
    Orient,
    Forward,
    Raise,
    Backward,
    Lower,
    Done,
}

/// Face the box, drive under it, lift it, back out and set the lift down again.  Owns no
/// hardware of its own: it sequences the shared drivetrain and lift, updating both every tick.
pub struct BoxGetTask {
    drivetrain: SharedDrivetrain,
    lift: SharedLift,
    config: BoxGetConfig,
    state: BoxGetState,
    orient_issued: bool,
    drive_issued: bool,
    lift_seen_moving: bool,
}

impl BoxGetTask {
    pub fn new(drivetrain: SharedDrivetrain, lift: SharedLift, config: BoxGetConfig) -> Self {
        Self {
            drivetrain,
            lift,
            config,
            state: BoxGetState::Idle,
            orient_issued: false,
            drive_issued: false,
            lift_seen_moving: false,
        }
    }

    pub fn start_get_box(&mut self) -> HalResult<()> {
        if self.is_busy() {
            warn!("BoxGet: restarting from {:?}", self.state);
        }
        self.transition_to(BoxGetState::Orient)
    }

    pub fn update(&mut self) -> HalResult<()> {
        self.drivetrain.borrow_mut().update()?;
        self.lift.borrow_mut().update()?;

        match self.state {
            BoxGetState::Idle | BoxGetState::Done => Ok(()),
            BoxGetState::Orient => {
                if !self.orient_issued {
                    return self.issue_orient();
                }
                let drivetrain = self.drivetrain.borrow();
                let facing_box = drivetrain.is_idle() && drivetrain.heading() == BOX_HEADING;
                drop(drivetrain);
                if facing_box {
                    self.transition_to(BoxGetState::Forward)?;
                }
                Ok(())
            }
            BoxGetState::Forward => self.advance_when_drive_done(BoxGetState::Raise),
            BoxGetState::Raise => self.advance_when_lift_done(BoxGetState::Backward),
            BoxGetState::Backward => self.advance_when_drive_done(BoxGetState::Lower),
            BoxGetState::Lower => self.advance_when_lift_done(BoxGetState::Done),
        }
    }

    /// Stops both the drivetrain and the lift where they are and forgets the sequence.
    pub fn abort(&mut self) -> HalResult<()> {
        if self.is_busy() {
            warn!("BoxGet: aborting in {:?}", self.state);
        }
        self.state = BoxGetState::Idle;
        self.orient_issued = false;
        self.drive_issued = false;
        self.lift_seen_moving = false;
        self.drivetrain.borrow_mut().halt()?;
        self.lift.borrow_mut().stop()
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.state, BoxGetState::Idle | BoxGetState::Done)
    }

    pub fn is_finished(&self) -> bool {
        self.state == BoxGetState::Done
    }

    pub fn state(&self) -> BoxGetState {
        self.state
    }

    fn transition_to(&mut self, next: BoxGetState) -> HalResult<()> {
        info!("BoxGet: [{:?}] => [{:?}]", self.state, next);
        self.state = next;
        self.on_enter()
    }

    fn on_enter(&mut self) -> HalResult<()> {
        match self.state {
            BoxGetState::Idle | BoxGetState::Done => Ok(()),
            BoxGetState::Orient => {
                self.orient_issued = false;
                self.issue_orient()
            }
            BoxGetState::Forward | BoxGetState::Backward => {
                self.drive_issued = false;
                self.issue_drive()
            }
            BoxGetState::Raise | BoxGetState::Lower => {
                self.lift_seen_moving = false;
                self.issue_lift_move()
            }
        }
    }

    /// Only turns once the drivetrain has nothing else to do, so the heading it turns from is
    /// the real one.
    fn issue_orient(&mut self) -> HalResult<()> {
        let mut drivetrain = self.drivetrain.borrow_mut();
        if drivetrain.is_idle() {
            debug!("BoxGet: turning {:?} -> {BOX_HEADING:?}", drivetrain.heading());
            self.orient_issued = drivetrain.rotate_to(BOX_HEADING)?;
        }
        Ok(())
    }

    fn issue_drive(&mut self) -> HalResult<()> {
        let mut drivetrain = self.drivetrain.borrow_mut();
        let accepted = match self.state {
            BoxGetState::Forward => drivetrain.start_forward()?,
            BoxGetState::Backward => drivetrain.start_backward()?,
            _ => false,
        };
        if !accepted {
            warn!("BoxGet: drivetrain refused the {:?} move, will retry once idle", self.state);
        }
        self.drive_issued = accepted;
        Ok(())
    }

    fn issue_lift_move(&mut self) -> HalResult<()> {
        let mut lift = self.lift.borrow_mut();
        if !lift.is_idle() {
            return Ok(());
        }
        self.lift_seen_moving = match self.state {
            BoxGetState::Raise => lift.up_for(self.config.raise_ms)?,
            BoxGetState::Lower => lift.down_for(self.config.lower_ms)?,
            _ => false,
        };
        Ok(())
    }

    fn advance_when_drive_done(&mut self, next: BoxGetState) -> HalResult<()> {
        let idle = self.drivetrain.borrow().is_idle();
        if !idle {
            return Ok(());
        }
        if self.drive_issued {
            self.transition_to(next)
        } else {
            self.issue_drive()
        }
    }

    fn advance_when_lift_done(&mut self, next: BoxGetState) -> HalResult<()> {
        if !self.lift_seen_moving {
            return self.issue_lift_move();
        }
        if self.lift.borrow().is_idle() {
            self.transition_to(next)?;
        }
        Ok(())
    }
}
