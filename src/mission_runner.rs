use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use log::{info, trace};
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};

use crate::clock::ManualClock;
use crate::drivetrain::Direction;
use crate::grid::GridCell;
use crate::mission::{Mission, MissionState};

pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// What a finished mission looked like, written out by the `mission` binary.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct MissionSummary {
    pub ticks: u64,
    pub path: Vec<GridCell>,
    pub final_cell: GridCell,
    pub final_heading: Direction,
    pub lift_height_cm: f32,
}

impl MissionSummary {
    fn of(mission: &Mission, ticks: u64) -> Self {
        Self {
            ticks,
            path: mission.path().to_vec(),
            final_cell: mission.current_cell(),
            final_heading: mission.heading(),
            lift_height_cm: mission.lift_height_cm(),
        }
    }
}

/// The outer control loop: calls [`Mission::update`] once per tick until the mission completes,
/// or gives up after `max_ticks`.
pub struct MissionRunner {
    tick: Duration,
    max_ticks: u64,
}

impl MissionRunner {
    pub fn new(tick: Duration, max_ticks: u64) -> Self {
        Self { tick, max_ticks }
    }

    /// Ticks on a tokio interval.  A late tick is skipped rather than bunched up, everything
    /// downstream works off absolute deadlines anyway.
    pub async fn run_realtime(&self, mission: &mut Mission) -> anyhow::Result<MissionSummary> {
        let mut interval = time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        mission.initialize().context("initializing hardware")?;
        let mut ticks = 0;
        while !mission.is_complete() {
            self.check_tick_budget(mission, ticks)?;
            interval.tick().await;
            Self::tick_once(mission, ticks)?;
            ticks += 1;
        }
        Self::finish(mission, ticks)
    }

    /// Same loop against a [`ManualClock`], advanced by one tick after every update.  Runs as
    /// fast as the host allows.
    pub fn run_simulated(
        &self,
        mission: &mut Mission,
        clock: &ManualClock,
    ) -> anyhow::Result<MissionSummary> {
        let tick_ms = u32::try_from(self.tick.as_millis())
            .with_context(|| format!("tick of {:?} is too long", self.tick))?;

        mission.initialize().context("initializing hardware")?;
        let mut ticks = 0;
        while !mission.is_complete() {
            self.check_tick_budget(mission, ticks)?;
            Self::tick_once(mission, ticks)?;
            clock.advance_ms(tick_ms);
            ticks += 1;
        }
        Self::finish(mission, ticks)
    }

    fn check_tick_budget(&self, mission: &mut Mission, ticks: u64) -> anyhow::Result<()> {
        if ticks >= self.max_ticks {
            let state = mission.state();
            mission.abort();
            bail!("mission still {state:?} after {ticks} ticks, aborted");
        }
        Ok(())
    }

    fn tick_once(mission: &mut Mission, ticks: u64) -> anyhow::Result<()> {
        trace!("<tick {ticks}>");
        mission.update()
            .with_context(|| format!("mission failed at tick {ticks}"))
    }

    fn finish(mission: &Mission, ticks: u64) -> anyhow::Result<MissionSummary> {
        match mission.state() {
            MissionState::Done => {
                info!("Mission complete after {ticks} ticks");
                Ok(MissionSummary::of(mission, ticks))
            }
            state => Err(anyhow!(
                "mission ended {state:?}: {}",
                mission.failure().map_or_else(|| "unknown".to_owned(), |e| e.to_string())
            )),
        }
    }
}

impl Default for MissionRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TICK, 1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use tokio::time::Instant;

    use crate::clock::{SharedClock, TokioClock};
    use crate::config::{
        BoxGetConfig, DriveConfig, MotionProfile, PathConfig, RobotConfig, SimConfig,
    };
    use crate::grid::Grid;
    use crate::robot_hal_mock::{MotorCommand, SimulatedRobot};

    use super::*;

    fn fast_config() -> RobotConfig {
        RobotConfig {
            drive: DriveConfig {
                forward: MotionProfile::new(100, 73, 63),
                backward: MotionProfile::new(100, -73, -63),
                rotate: MotionProfile::new(50, 73, -63),
            },
            path: PathConfig { dwell_ms: 30 },
            box_get: BoxGetConfig { raise_ms: 200, lower_ms: 200 },
            sim: SimConfig { initial_height_cm: 2.0, cm_per_step: 0.001 },
            ..Default::default()
        }
    }

    fn two_cell_mission(clock: SharedClock) -> (Mission, SimulatedRobot) {
        let config = fast_config();
        let robot = SimulatedRobot::new(&config.sim);
        let mission = Mission::new(
            robot.hardware(),
            clock,
            &config,
            Grid::open(),
            GridCell::new(0, 0),
            GridCell::new(2, 0),
        );
        (mission, robot)
    }

    #[test]
    fn test_simulated_run() {
        let clock = ManualClock::new();
        let (mut mission, _robot) = two_cell_mission(Rc::new(clock.clone()));
        let summary = MissionRunner::default().run_simulated(&mut mission, &clock).unwrap();

        // Done is noticed on the tick at 890ms, the 90th.
        assert_eq!(summary.ticks, 90);
        assert_eq!(summary.final_cell, GridCell::new(2, 0));
        assert_eq!(summary.final_heading, Direction::Down);
        assert_eq!(summary.path.len(), 3);
    }

    #[test]
    fn test_tick_budget_aborts() {
        let clock = ManualClock::new();
        let (mut mission, robot) = two_cell_mission(Rc::new(clock.clone()));
        let err = MissionRunner::new(DEFAULT_TICK, 20)
            .run_simulated(&mut mission, &clock)
            .unwrap_err();
        assert!(err.to_string().contains("after 20 ticks"), "{err}");
        assert_eq!(mission.state(), MissionState::Failed);
        assert_eq!(robot.motors.history().last(), Some(&MotorCommand::Stop));
    }

    #[test]
    fn test_failure_is_reported() {
        let clock = ManualClock::new();
        let config = fast_config();
        let robot = SimulatedRobot::new(&config.sim);
        let goal = GridCell::new(2, 2);
        let mut mission = Mission::new(
            robot.hardware(),
            Rc::new(clock.clone()),
            &config,
            Grid::with_obstacles(&[goal]),
            GridCell::new(0, 0),
            goal,
        );
        let err = MissionRunner::default().run_simulated(&mut mission, &clock).unwrap_err();
        assert!(format!("{err:#}").contains("on an obstacle"), "{err:#}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_run_on_paused_clock() {
        let started = Instant::now();
        let (mut mission, robot) = two_cell_mission(Rc::new(TokioClock::new()));
        let summary = MissionRunner::default().run_realtime(&mut mission).await.unwrap();

        assert_eq!(summary.ticks, 90);
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(890) && elapsed < Duration::from_millis(900),
            "{elapsed:?}"
        );
        assert_eq!(robot.lift.steps(), (19, 19));
        assert_eq!(mission.state(), MissionState::Done);
    }
}
