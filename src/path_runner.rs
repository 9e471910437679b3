use log::{debug, info, warn};

use crate::clock::{Deadline, SharedClock};
use crate::drivetrain::SharedDrivetrain;
use crate::grid::GridCell;
use crate::robot_hal::HalResult;

pub const MAX_WAYPOINTS: usize = 64;

/// Replays a list of waypoints one grid edge at a time, pausing for `dwell_ms` between edges so
/// the chassis can settle.
pub struct PathRunner {
    drivetrain: SharedDrivetrain,
    clock: SharedClock,
    path: Vec<GridCell>,
    segment_index: usize,
    started: bool,
    dwell_ms: u32,
    dwell_until: Option<Deadline>,
    was_busy: bool,
}

impl PathRunner {
    pub fn new(drivetrain: SharedDrivetrain, clock: SharedClock, dwell_ms: u32) -> Self {
        Self {
            drivetrain,
            clock,
            path: Vec::with_capacity(MAX_WAYPOINTS),
            segment_index: 0,
            started: false,
            dwell_ms,
            dwell_until: None,
            was_busy: false,
        }
    }

    /// Copies the waypoints in.  An empty or oversized list leaves an empty path loaded.
    pub fn load_path(&mut self, points: &[GridCell]) -> bool {
        self.path.clear();
        let accepted = !points.is_empty() && points.len() <= MAX_WAYPOINTS;
        if accepted {
            self.path.extend_from_slice(points);
        } else {
            warn!("PathRunner: refusing path of {} waypoints (max {MAX_WAYPOINTS})", points.len());
        }
        self.reset_run_state();
        accepted
    }

    pub fn start(&mut self) -> bool {
        if self.path.is_empty() {
            return false;
        }
        self.reset_run_state();
        self.started = true;
        info!("PathRunner: starting {} segments from {}", self.path.len() - 1, self.path[0]);
        true
    }

    pub fn update(&mut self) -> HalResult<()> {
        self.drivetrain.borrow_mut().update()?;

        if !self.started || self.is_finished() {
            return Ok(());
        }

        let now = self.clock.now_ms();
        let busy_now = !self.drivetrain.borrow().is_idle();

        if self.was_busy && !busy_now && self.has_segments_left() {
            let deadline = Deadline::after(now, self.dwell_ms);
            debug!("PathRunner: segment done, dwelling until {}", deadline.timestamp_ms());
            self.dwell_until = Some(deadline);
        }
        self.was_busy = busy_now;

        if let Some(deadline) = self.dwell_until {
            if !deadline.reached(now) {
                return Ok(());
            }
            self.dwell_until = None;
        }

        if busy_now || !self.has_segments_left() {
            return Ok(());
        }

        let from = self.path[self.segment_index];
        let to = self.path[self.segment_index + 1];
        info!(
            "PathRunner: segment {}/{}: {from} -> {to}",
            self.segment_index + 1,
            self.path.len() - 1
        );
        let mut drivetrain = self.drivetrain.borrow_mut();
        if !drivetrain.request_edge(from, to)? {
            warn!("PathRunner: drivetrain refused {from} -> {to}, skipping it");
        }
        self.segment_index += 1;
        self.was_busy = !drivetrain.is_idle();
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        !self.started
            || (!self.has_segments_left()
                && self.drivetrain.borrow().is_idle()
                && self.dwell_until.is_none())
    }

    /// Emergency stop.  Halts the drivetrain and forgets the path.
    pub fn force_stop(&mut self) -> HalResult<()> {
        if self.started {
            warn!("PathRunner: force stop at segment {}/{}", self.segment_index, self.path.len());
        }
        self.path.clear();
        self.reset_run_state();
        self.drivetrain.borrow_mut().halt()
    }

    pub fn path_length(&self) -> usize {
        self.path.len()
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn is_dwelling(&self) -> bool {
        self.dwell_until.is_some()
    }

    pub fn set_dwell_ms(&mut self, dwell_ms: u32) {
        self.dwell_ms = dwell_ms;
    }

    /// The waypoint the robot is on, or driving towards once an edge is under way.
    pub fn current_cell(&self) -> Option<GridCell> {
        self.path.get(self.segment_index).copied()
    }

    fn has_segments_left(&self) -> bool {
        self.segment_index + 1 < self.path.len()
    }

    fn reset_run_state(&mut self) {
        self.segment_index = 0;
        self.started = false;
        self.dwell_until = None;
        self.was_busy = false;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::clock::{Clock, ManualClock};
    use crate::config::{DriveConfig, MotionProfile};
    use crate::drivetrain::{Direction, Drivetrain, MotionAction};
    use crate::robot_hal_mock::{MockDriveMotors, MotorCommand};

    use super::*;

    const TICK_MS: u32 = 10;
    const DWELL_MS: u32 = 30;

    struct Rig {
        clock: ManualClock,
        motors: MockDriveMotors,
        drivetrain: SharedDrivetrain,
        runner: PathRunner,
    }

    fn rig() -> Rig {
        let clock = ManualClock::new();
        let motors = MockDriveMotors::new();
        let config = DriveConfig {
            forward: MotionProfile::new(100, 73, 63),
            backward: MotionProfile::new(100, -73, -63),
            rotate: MotionProfile::new(50, 73, -63),
        };
        let drivetrain = Rc::new(RefCell::new(Drivetrain::new(
            Box::new(motors.clone()),
            Rc::new(clock.clone()),
            config,
        )));
        let runner = PathRunner::new(drivetrain.clone(), Rc::new(clock.clone()), DWELL_MS);
        Rig { clock, motors, drivetrain, runner }
    }

    fn cells(points: &[(i32, i32)]) -> Vec<GridCell> {
        points.iter().map(|(x, y)| GridCell::new(*x, *y)).collect()
    }

    impl Rig {
        fn tick(&mut self) {
            self.clock.advance_ms(TICK_MS);
            self.runner.update().unwrap();
        }
    }

    #[test]
    fn test_straight_path_issues_two_edges_with_dwell_between() {
        let mut rig = rig();
        assert!(rig.runner.load_path(&cells(&[(0, 0), (1, 0), (2, 0)])));
        // Nothing to wait for until started.
        assert!(rig.runner.is_finished());
        assert!(rig.runner.start());
        assert!(!rig.runner.is_finished());

        // (time, action) every time the drivetrain switches what it is doing.
        let mut transitions: Vec<(u32, MotionAction)> = vec![];
        let mut last_action = MotionAction::Idle;
        let mut last_index = 0;
        while !rig.runner.is_finished() {
            assert!(rig.clock.now_ms() < 10_000, "path never finished");
            rig.tick();

            let action = rig.drivetrain.borrow().current_action();
            if action != last_action {
                transitions.push((rig.clock.now_ms(), action));
                last_action = action;
            }
            assert!(rig.runner.segment_index() >= last_index);
            last_index = rig.runner.segment_index();
        }

        assert_eq!(transitions, vec![
            (10, MotionAction::Forward),
            (110, MotionAction::Idle),
            (110 + DWELL_MS, MotionAction::Forward),
            (210 + DWELL_MS, MotionAction::Idle),
        ]);
        assert_eq!(rig.motors.drive_commands(), vec![(73, 63), (73, 63)]);
        assert_eq!(rig.runner.segment_index(), 2);
        assert_eq!(rig.runner.current_cell(), Some(GridCell::new(2, 0)));
    }

    #[test]
    fn test_not_finished_until_last_edge_goes_idle() {
        let mut rig = rig();
        rig.runner.load_path(&cells(&[(0, 0), (1, 0), (2, 0)]));
        rig.runner.start();

        while rig.runner.segment_index() < 2 {
            rig.tick();
        }
        // Last edge is under way.
        assert!(!rig.runner.is_finished());
        while !rig.drivetrain.borrow().is_idle() {
            assert!(!rig.runner.is_finished());
            rig.tick();
        }
        assert!(rig.runner.is_finished());
        assert!(!rig.runner.is_dwelling());
    }

    #[test]
    fn test_dwell_blocks_next_edge() {
        let mut rig = rig();
        rig.runner.set_dwell_ms(200);
        rig.runner.load_path(&cells(&[(0, 0), (1, 0), (2, 0)]));
        rig.runner.start();

        // First edge from t=10 to t=110.
        while rig.clock.now_ms() < 110 {
            rig.tick();
        }
        assert!(rig.runner.is_dwelling());
        while rig.clock.now_ms() < 300 {
            rig.tick();
            assert_eq!(rig.drivetrain.borrow().current_action(), MotionAction::Idle);
            assert_eq!(rig.runner.segment_index(), 1);
        }
        rig.tick();
        assert_eq!(rig.clock.now_ms(), 310);
        assert_eq!(rig.drivetrain.borrow().current_action(), MotionAction::Forward);
        assert_eq!(rig.runner.segment_index(), 2);
    }

    #[test]
    fn test_turning_path_keeps_one_edge_in_flight() {
        let mut rig = rig();
        // Facing right, so the first edge needs a left turn and the second a half turn.
        let path = cells(&[(0, 0), (0, 1), (0, 2), (1, 2), (1, 1)]);
        rig.runner.load_path(&path);
        rig.runner.start();

        let mut ticks = 0;
        while !rig.runner.is_finished() {
            assert!(ticks < 1000);
            rig.tick();
            ticks += 1;
            let forwards = rig.drivetrain.borrow().pending_actions()
                .iter()
                .filter(|a| **a == MotionAction::Forward)
                .count();
            assert!(forwards <= 1);
        }
        assert_eq!(rig.drivetrain.borrow().heading(), Direction::Down);
        assert_eq!(rig.motors.drive_commands().iter().filter(|c| **c == (73, 63)).count(), 4);
    }

    #[test]
    fn test_bad_loads_leave_an_empty_finished_path() {
        let mut rig = rig();
        assert!(!rig.runner.load_path(&[]));
        assert_eq!(rig.runner.path_length(), 0);
        assert!(!rig.runner.start());
        assert!(rig.runner.is_finished());

        let too_long: Vec<GridCell> =
            (0..=MAX_WAYPOINTS).map(|i| GridCell::new(0, i as i32 % 2)).collect();
        assert!(!rig.runner.load_path(&too_long));
        assert_eq!(rig.runner.path_length(), 0);
        assert!(!rig.runner.start());

        let max_len: Vec<GridCell> =
            (0..MAX_WAYPOINTS).map(|i| GridCell::new(0, i as i32 % 2)).collect();
        assert!(rig.runner.load_path(&max_len));
        assert_eq!(rig.runner.path_length(), MAX_WAYPOINTS);
    }

    #[test]
    fn test_single_waypoint_finishes_without_moving() {
        let mut rig = rig();
        rig.runner.load_path(&cells(&[(3, 3)]));
        assert!(rig.runner.start());
        assert!(rig.runner.is_finished());
        rig.tick();
        assert!(rig.motors.history().is_empty());
    }

    #[test]
    fn test_force_stop_mid_edge() {
        let mut rig = rig();
        rig.runner.load_path(&cells(&[(0, 0), (0, 1), (0, 2)]));
        rig.runner.start();
        rig.tick();
        rig.tick();
        assert!(!rig.drivetrain.borrow().is_idle());

        rig.runner.force_stop().unwrap();
        assert!(rig.drivetrain.borrow().is_idle());
        assert!(rig.runner.is_finished());
        assert_eq!(rig.runner.path_length(), 0);
        assert_eq!(rig.runner.segment_index(), 0);
        assert_eq!(rig.motors.history().last(), Some(&MotorCommand::Stop));

        // Nothing resumes afterwards.
        let commands = rig.motors.history().len();
        for _ in 0..50 {
            rig.tick();
        }
        assert_eq!(rig.motors.history().len(), commands);
    }

    #[test]
    fn test_reload_resets_progress() {
        let mut rig = rig();
        rig.runner.load_path(&cells(&[(0, 0), (1, 0), (2, 0)]));
        rig.runner.start();
        while rig.runner.segment_index() < 1 {
            rig.tick();
        }
        rig.runner.load_path(&cells(&[(1, 0), (1, 1)]));
        assert_eq!(rig.runner.segment_index(), 0);
        assert!(rig.runner.is_finished());
    }
}
