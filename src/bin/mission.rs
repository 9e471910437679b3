//! Plan a route across the field, drive it and pick up the box below the goal cell, on simulated
//! hardware.
//!
//! By default the mission runs against the wall clock, so it takes as long as it would on the
//! real robot.  `--fast` runs the same loop on a simulated clock instead.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use gridbox_bot::clock::{ManualClock, SharedClock, TokioClock};
use gridbox_bot::config::RobotConfig;
use gridbox_bot::drivetrain::Direction;
use gridbox_bot::grid::{Grid, GridCell};
use gridbox_bot::mission::Mission;
use gridbox_bot::mission_runner::{MissionRunner, MissionSummary};
use gridbox_bot::robot_hal_mock::SimulatedRobot;

#[derive(Parser, Debug)]
#[clap(name = "mission")]
struct Opts {
    /// JSON robot config, defaults are used for anything it leaves out.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// JSON obstacle grid, `{"blocked": [[...], ...]}`.  Open field if not given.
    #[clap(short, long)]
    grid: Option<PathBuf>,

    #[clap(long, default_value = "0,0")]
    start: GridCell,

    #[clap(long, default_value = "4,4")]
    goal: GridCell,

    /// Which way the robot is placed facing: up, down, left or right.
    #[clap(long, default_value = "right")]
    heading: Direction,

    /// Run on a simulated clock instead of in real time.
    #[clap(long)]
    fast: bool,

    #[clap(long, default_value = "10")]
    tick_ms: u64,

    /// Give up after this many ticks.
    #[clap(long, default_value = "1000000")]
    max_ticks: u64,

    /// Write the mission summary here as JSON.
    #[clap(long)]
    summary_out: Option<PathBuf>,

    /// Write the default config to this path and exit.
    #[clap(long)]
    write_default_config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let opts: Opts = Opts::parse();

    if let Some(path) = &opts.write_default_config {
        RobotConfig::default().save(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &opts.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    let grid = match &opts.grid {
        Some(path) => Grid::load(path)?,
        None => Grid::open(),
    };
    println!("{grid}");

    let robot = SimulatedRobot::new(&config.sim);
    let runner = MissionRunner::new(Duration::from_millis(opts.tick_ms), opts.max_ticks);

    let summary = if opts.fast {
        let clock = ManualClock::new();
        let mut mission = build_mission(&robot, Rc::new(clock.clone()), &config, &opts, grid);
        runner.run_simulated(&mut mission, &clock)?
    } else {
        let clock = Rc::new(TokioClock::new());
        let mut mission = build_mission(&robot, clock, &config, &opts, grid);
        runner.run_realtime(&mut mission).await?
    };

    report(&summary, &robot);
    if let Some(path) = &opts.summary_out {
        info!("Saving summary to {}", path.display());
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &summary)?;
    }
    Ok(())
}

fn build_mission(
    robot: &SimulatedRobot,
    clock: SharedClock,
    config: &RobotConfig,
    opts: &Opts,
    grid: Grid,
) -> Mission {
    let mut mission = Mission::new(robot.hardware(), clock, config, grid, opts.start, opts.goal);
    mission.set_initial_heading(opts.heading);
    mission
}

fn report(summary: &MissionSummary, robot: &SimulatedRobot) {
    let path: Vec<String> = summary.path.iter().map(|c| c.to_string()).collect();
    println!("Path: {}", path.join(" -> "));
    println!(
        "Finished at {} facing {:?} after {} ticks",
        summary.final_cell,
        summary.final_heading,
        summary.ticks
    );
    let (up, down) = robot.lift.steps();
    println!("Lift: {up} steps up, {down} down, now at {:.2}cm", summary.lift_height_cm);
    println!("Success!");
}
