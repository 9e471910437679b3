pub mod clock;
pub mod config;
pub mod grid;
pub mod grid_planner;
pub mod robot_hal;
pub mod robot_hal_mock;
pub mod drivetrain;
pub mod lift;
pub mod path_runner;
pub mod box_get_task;
pub mod mission;
pub mod mission_runner;
