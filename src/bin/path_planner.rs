use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use rand::rngs::StdRng;
use rand::SeedableRng;

use gridbox_bot::grid::{Grid, GridCell};
use gridbox_bot::grid_planner::{check_path, plan_path};
use gridbox_bot::path_runner::MAX_WAYPOINTS;

#[derive(Parser, Debug)]
#[clap(name = "path_planner")]
struct Opts {
    #[clap(long, default_value = "0,0")]
    start: GridCell,

    #[clap(long, default_value = "4,4")]
    goal: GridCell,

    /// JSON obstacle grid.  Takes precedence over `--obstacles`.
    #[clap(short, long)]
    grid: Option<PathBuf>,

    /// Number of randomly placed obstacles, never on the start or goal.
    #[clap(short = 'n', long, default_value = "0")]
    obstacles: usize,

    #[clap(short, long)]
    seed: Option<u64>,

    /// Print the grid as JSON too, handy for feeding back in with `--grid`.
    #[clap(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let opts: Opts = Opts::parse();

    let grid = match &opts.grid {
        Some(path) => Grid::load(path)?,
        None => {
            let mut rng = match opts.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            Grid::random(&mut rng, opts.obstacles, &[opts.start, opts.goal])
        }
    };

    println!("{grid}");
    if opts.json {
        println!("{}", serde_json::to_string(&grid)?);
    }

    let path = plan_path(&grid, opts.start, opts.goal, MAX_WAYPOINTS)?;
    check_path(&grid, &path)?;
    for cell in path {
        println!("{} {}", cell.x, cell.y);
    }
    Ok(())
}
