use thiserror::Error;

use crate::grid::{Grid, GridCell, GridPoint, NUM_CELLS};

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PlanError {
    #[error("start {0} is outside the grid")]
    StartOutOfBounds(GridCell),
    #[error("goal {0} is outside the grid")]
    GoalOutOfBounds(GridCell),
    #[error("start {0} is on an obstacle")]
    StartBlocked(GridCell),
    #[error("goal {0} is on an obstacle")]
    GoalBlocked(GridCell),
    #[error("no route to goal {0}")]
    Unreachable(GridCell),
    #[error("route needs {needed} waypoints but only {max} fit")]
    CapacityExceeded { needed: usize, max: usize },
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("waypoint #{index} ({x}, {y}) is outside the grid")]
    OutOfBounds { index: usize, x: i32, y: i32 },
    #[error("waypoint #{index} ({x}, {y}) is on an obstacle")]
    Blocked { index: usize, x: i32, y: i32 },
    #[error("waypoint #{index} is not adjacent to the one after it")]
    NotAdjacent { index: usize },
}

/// Expansion order matters: it decides which of several equally short routes comes out, so keep
/// it fixed for reproducible plans.
const NEIGHBOUR_OFFSETS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

#[derive(Copy, Clone)]
struct Node {
    g: i32,
    f: i32,
    came_from: Option<usize>,
    open: bool,
    closed: bool,
}

impl Default for Node {
    fn default() -> Self {
        Self { g: i32::MAX, f: i32::MAX, came_from: None, open: false, closed: false }
    }
}

/// A* over the 5x5 grid with unit edge costs and a Manhattan heuristic.  Returns the waypoints
/// from `start` to `goal` inclusive, never more than `max_waypoints` of them.
pub fn plan_path(
    grid: &Grid,
    start: GridCell,
    goal: GridCell,
    max_waypoints: usize,
) -> Result<Vec<GridCell>, PlanError> {
    if !start.in_bounds() {
        return Err(PlanError::StartOutOfBounds(start));
    }
    if !goal.in_bounds() {
        return Err(PlanError::GoalOutOfBounds(goal));
    }
    if grid.is_blocked(&start) {
        return Err(PlanError::StartBlocked(start));
    }
    if grid.is_blocked(&goal) {
        return Err(PlanError::GoalBlocked(goal));
    }

    let mut nodes = [Node::default(); NUM_CELLS];
    let start_index = start.index();
    let goal_index = goal.index();
    nodes[start_index] = Node {
        g: 0,
        f: start.manhattan_distance(&goal),
        came_from: None,
        open: true,
        closed: false,
    };

    let mut found = false;
    while let Some(current_index) = select_open_node(&nodes) {
        nodes[current_index].open = false;
        nodes[current_index].closed = true;
        if current_index == goal_index {
            found = true;
            break;
        }

        let current = GridCell::from_index(current_index);
        for (dx, dy) in NEIGHBOUR_OFFSETS {
            let neighbour = GridCell::new(current.x + dx, current.y + dy);
            if grid.is_blocked(&neighbour) {
                continue;
            }
            let neighbour_index = neighbour.index();
            if nodes[neighbour_index].closed {
                continue;
            }
            let tentative_g = nodes[current_index].g + 1;
            let node = &mut nodes[neighbour_index];
            if !node.open || tentative_g < node.g {
                node.came_from = Some(current_index);
                node.g = tentative_g;
                node.f = tentative_g + neighbour.manhattan_distance(&goal);
                node.open = true;
            }
        }
    }

    if !found {
        return Err(PlanError::Unreachable(goal));
    }

    let mut path = vec![goal];
    let mut cursor = nodes[goal_index].came_from;
    while let Some(index) = cursor {
        path.push(GridCell::from_index(index));
        cursor = nodes[index].came_from;
    }
    if path.len() > max_waypoints {
        return Err(PlanError::CapacityExceeded { needed: path.len(), max: max_waypoints });
    }
    path.reverse();
    Ok(path)
}

/// Lowest `f` wins, ties go to the lowest linear index.
fn select_open_node(nodes: &[Node]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, node) in nodes.iter().enumerate() {
        if node.open && best.map_or(true, |b| node.f < nodes[b].f) {
            best = Some(index);
        }
    }
    best
}

/// Same as [`check_path`], as a yes/no.
pub fn validate_path<P: GridPoint>(grid: &Grid, path: &[P]) -> bool {
    check_path(grid, path).is_ok()
}

/// Sanity-checks planned and hand-written paths alike before handing them to the path runner.
pub fn check_path<P: GridPoint>(grid: &Grid, path: &[P]) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    for (index, point) in path.iter().enumerate() {
        let cell = GridCell::new(point.x(), point.y());
        if !cell.in_bounds() {
            return Err(PathError::OutOfBounds { index, x: cell.x, y: cell.y });
        }
        if grid.is_blocked(&cell) {
            return Err(PathError::Blocked { index, x: cell.x, y: cell.y });
        }
        if let Some(next) = path.get(index + 1) {
            if !cell.is_adjacent(&GridCell::new(next.x(), next.y())) {
                return Err(PathError::NotAdjacent { index });
            }
        }
    }
    Ok(())
}
