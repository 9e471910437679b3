use std::cell::RefCell;
use std::rc::Rc;

use log::{error, info, warn};
use thiserror::Error;

use crate::box_get_task::{BoxGetState, BoxGetTask};
use crate::clock::SharedClock;
use crate::config::RobotConfig;
use crate::drivetrain::{Direction, Drivetrain, SharedDrivetrain};
use crate::grid::{Grid, GridCell};
use crate::grid_planner::{check_path, plan_path, PathError, PlanError};
use crate::lift::{Lift, SharedLift};
use crate::path_runner::{PathRunner, MAX_WAYPOINTS};
use crate::robot_hal::{HalError, HalResult, RobotHardware};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MissionState {
    Planning,
    Driving,
    GettingBox,
    Done,
    Failed,
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum MissionError {
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error("planned path is invalid: {0}")]
    Path(#[from] PathError),
    #[error("path runner refused a {0} waypoint path")]
    PathRejected(usize),
    #[error("hardware failure: {0}")]
    Hal(#[from] HalError),
    #[error("aborted")]
    Aborted,
}

/// Drive from `start` to `goal` and pick up the box below it.
pub struct Mission {
    grid: Grid,
    start: GridCell,
    goal: GridCell,
    drivetrain: SharedDrivetrain,
    lift: SharedLift,
    path_runner: PathRunner,
    box_get: BoxGetTask,
    state: MissionState,
    path: Vec<GridCell>,
    failure: Option<MissionError>,
    stopped_at: Option<GridCell>,
}

impl Mission {
    pub fn new(
        hardware: RobotHardware,
        clock: SharedClock,
        config: &RobotConfig,
        grid: Grid,
        start: GridCell,
        goal: GridCell,
    ) -> Self {
        let drivetrain = Rc::new(RefCell::new(Drivetrain::new(
            hardware.drive_motors,
            clock.clone(),
            config.drive.clone(),
        )));
        let lift = Rc::new(RefCell::new(Lift::new(
            hardware.lift_stepper,
            hardware.lift_sensor,
            clock.clone(),
            config.lift.clone(),
        )));
        let path_runner = PathRunner::new(drivetrain.clone(), clock, config.path.dwell_ms);
        let box_get = BoxGetTask::new(drivetrain.clone(), lift.clone(), config.box_get.clone());
        Self {
            grid,
            start,
            goal,
            drivetrain,
            lift,
            path_runner,
            box_get,
            state: MissionState::Planning,
            path: vec![],
            failure: None,
            stopped_at: None,
        }
    }

    /// Puts every actuator in a known-stopped state.  Call once before the first update.
    pub fn initialize(&mut self) -> Result<(), MissionError> {
        self.drivetrain.borrow_mut().initialize()?;
        self.lift.borrow_mut().initialize()?;
        Ok(())
    }

    /// Where the robot is placed facing, if not [`Drivetrain::INITIAL_HEADING`].
    pub fn set_initial_heading(&mut self, heading: Direction) {
        self.drivetrain.borrow_mut().set_heading(heading);
    }

    /// Advances the mission by one tick.  Any error stops the robot and leaves the mission
    /// [`MissionState::Failed`]; later updates do nothing.
    pub fn update(&mut self) -> Result<(), MissionError> {
        match self.step() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    pub fn abort(&mut self) {
        if !self.is_complete() {
            self.fail(MissionError::Aborted);
        }
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, MissionState::Done | MissionState::Failed)
    }

    pub fn failure(&self) -> Option<&MissionError> {
        self.failure.as_ref()
    }

    /// Empty until planning has succeeded.
    pub fn path(&self) -> &[GridCell] {
        &self.path
    }

    pub fn current_cell(&self) -> GridCell {
        match self.state {
            MissionState::Planning => self.start,
            MissionState::Driving => self.path_runner.current_cell().unwrap_or(self.start),
            MissionState::GettingBox | MissionState::Done => self.goal,
            MissionState::Failed => self.stopped_at.unwrap_or(self.start),
        }
    }

    pub fn heading(&self) -> Direction {
        self.drivetrain.borrow().heading()
    }

    pub fn box_state(&self) -> BoxGetState {
        self.box_get.state()
    }

    pub fn lift_height_cm(&self) -> f32 {
        self.lift.borrow().height_cm()
    }

    fn step(&mut self) -> Result<(), MissionError> {
        match self.state {
            MissionState::Planning => {
                let path = plan_path(&self.grid, self.start, self.goal, MAX_WAYPOINTS)?;
                check_path(&self.grid, &path)?;
                info!("Mission: planned {} waypoints {}", path.len(), format_path(&path));
                if !self.path_runner.load_path(&path) || !self.path_runner.start() {
                    return Err(MissionError::PathRejected(path.len()));
                }
                self.path = path;
                self.transition_to(MissionState::Driving);
            }
            MissionState::Driving => {
                self.path_runner.update()?;
                if self.path_runner.is_finished() {
                    self.box_get.start_get_box()?;
                    self.transition_to(MissionState::GettingBox);
                }
            }
            MissionState::GettingBox => {
                self.box_get.update()?;
                if self.box_get.is_finished() {
                    self.transition_to(MissionState::Done);
                }
            }
            MissionState::Done | MissionState::Failed => {}
        }
        Ok(())
    }

    fn transition_to(&mut self, next: MissionState) {
        info!("Mission: [{:?}] => [{:?}]", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: MissionError) {
        error!("Mission: failed while {:?}: {error}", self.state);
        // Stopping clears the runner's path, so note where we are first.
        self.stopped_at = Some(self.current_cell());
        if let Err(e) = self.stop_all() {
            warn!("Mission: could not stop cleanly: {e}");
        }
        self.state = MissionState::Failed;
        self.failure = Some(error);
    }

    fn stop_all(&mut self) -> HalResult<()> {
        let runner_result = self.path_runner.force_stop();
        let box_result = self.box_get.abort();
        runner_result.and(box_result)
    }
}

fn format_path(path: &[GridCell]) -> String {
    path.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" -> ")
}
