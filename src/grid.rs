use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use derive_new::new;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GRID_SIZE: i32 = 5;
pub const NUM_CELLS: usize = (GRID_SIZE * GRID_SIZE) as usize;

/// Anything with grid coordinates.  Lets the path validator accept waypoint types other than
/// [`GridCell`].
pub trait GridPoint {
    fn x(&self) -> i32;
    fn y(&self) -> i32;
}

/// `+x` is to the robot's right when facing up, `+y` is up.
#[derive(new, Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn in_bounds(&self) -> bool {
        (0..GRID_SIZE).contains(&self.x) && (0..GRID_SIZE).contains(&self.y)
    }

    pub fn manhattan_distance(&self, other: &GridCell) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn is_adjacent(&self, other: &GridCell) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// Row-major index, `y * 5 + x`.  Only meaningful for in-bounds cells.
    pub(crate) fn index(&self) -> usize {
        (self.y * GRID_SIZE + self.x) as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        let index = index as i32;
        Self { x: index % GRID_SIZE, y: index / GRID_SIZE }
    }
}

impl GridPoint for GridCell {
    fn x(&self) -> i32 {
        self.x
    }

    fn y(&self) -> i32 {
        self.y
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("expected a cell as \"x,y\", got {0:?}")]
pub struct ParseCellError(String);

/// Accepts `x,y` with optional surrounding parentheses and whitespace, e.g. `(2, 4)`.
impl FromStr for GridCell {
    type Err = ParseCellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (x, y) = inner.split_once(',').ok_or_else(|| ParseCellError(s.to_owned()))?;
        let x = x.trim().parse().map_err(|_| ParseCellError(s.to_owned()))?;
        let y = y.trim().parse().map_err(|_| ParseCellError(s.to_owned()))?;
        Ok(GridCell::new(x, y))
    }
}

/// Static occupancy map, `blocked[y][x]`, `true` means obstacle.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub blocked: [[bool; GRID_SIZE as usize]; GRID_SIZE as usize],
}

impl Grid {
    pub fn open() -> Self {
        Default::default()
    }

    pub fn with_obstacles(cells: &[GridCell]) -> Self {
        let mut grid = Self::open();
        for cell in cells.iter().filter(|c| c.in_bounds()) {
            grid.blocked[cell.y as usize][cell.x as usize] = true;
        }
        grid
    }

    /// Scatters `num_obstacles` obstacles, never on `keep_clear` cells.
    pub fn random<R: Rng>(rng: &mut R, num_obstacles: usize, keep_clear: &[GridCell]) -> Self {
        let candidates: Vec<GridCell> = (0..NUM_CELLS)
            .map(GridCell::from_index)
            .filter(|c| !keep_clear.contains(c))
            .collect();
        let amount = num_obstacles.min(candidates.len());
        let obstacles: Vec<GridCell> = sample(rng, candidates.len(), amount)
            .into_iter()
            .map(|i| candidates[i])
            .collect();
        Self::with_obstacles(&obstacles)
    }

    /// Out-of-bounds cells count as blocked.
    pub fn is_blocked(&self, cell: &GridCell) -> bool {
        !cell.in_bounds() || self.blocked[cell.y as usize][cell.x as usize]
    }

    pub fn obstacle_count(&self) -> usize {
        self.blocked.iter().flatten().filter(|b| **b).count()
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening grid {}", path.display()))?;
        let grid = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing grid {}", path.display()))?;
        Ok(grid)
    }
}

/// Top row is the highest `y`, the way the field looks from above.
impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.blocked.iter().rev() {
            let line: String = row.iter().map(|b| if *b { '#' } else { '.' }).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
