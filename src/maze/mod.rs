pub mod codec;

use crate::geometry::{GridPoint, GridPose, Side};
use crate::sensors::Observation;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;

/// Cost of a cell with no path to the current targets.
pub const UNREACHABLE: u16 = 0x7FFF;

// A locked counter belongs to a wall that is known for sure.
const LOCKED: u8 = u8::MAX;
const MAX_COUNT: u8 = LOCKED - 1;

const STRAIGHT_COST: u32 = 1;
const TURN_COST: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub wall_count: [u8; 4], // indexed by Side
    pub free_count: [u8; 4],
    pub cost: u16,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            wall_count: [0; 4],
            free_count: [0; 4],
            cost: UNREACHABLE,
        }
    }
}

impl Cell {
    pub fn has_wall(&self, side: Side) -> bool {
        self.wall_count[side.index()] > self.free_count[side.index()]
    }

    pub fn is_locked(&self, side: Side) -> bool {
        self.wall_count[side.index()] == LOCKED
    }
}

/// Wall observations of one tick, relative to the robot heading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Information {
    pub left: Observation,
    pub front_left: Observation,
    pub front: Observation,
    pub front_right: Observation,
    pub right: Observation,
}

/// Wall ledger and turn-penalised costmap of a rectangular maze.
///
/// Walls are voted: every observation increments the wall or free counter
/// of both faces of the shared wall and the majority wins. While
/// `returning` the costmap leads back to the start cell, otherwise it
/// leads to the goal set.
#[derive(Debug, Clone)]
pub struct Maze {
    width: u8,
    height: u8,
    cells: Vec<Cell>,
    start: GridPose,
    goal: BTreeSet<GridPoint>,
    exploring: bool,
    returning: bool,
    best_route: BTreeMap<u16, GridPose>,
}

impl Maze {
    /// Goal cells outside the grid are dropped.
    pub fn new<I>(width: u8, height: u8, start: GridPose, goal: I) -> Self
    where
        I: IntoIterator<Item = GridPoint>,
    {
        let width = width.max(1);
        let height = height.max(1);
        let goal = goal
            .into_iter()
            .filter(|p| {
                let inside = p.x < width && p.y < height;
                if !inside {
                    log::warn!("Goal ({}, {}) is outside the maze", p.x, p.y);
                }
                inside
            })
            .collect();

        let mut maze = Maze {
            width,
            height,
            cells: vec![Cell::default(); width as usize * height as usize],
            start,
            goal,
            exploring: true,
            returning: false,
            best_route: BTreeMap::new(),
        };
        maze.lock_known_walls();
        maze.calculate_costmap();
        maze
    }

    fn lock_known_walls(&mut self) {
        for x in 0..self.width {
            self.lock_wall(GridPose::new(GridPoint::new(x, 0), Side::Down));
            self.lock_wall(GridPose::new(GridPoint::new(x, self.height - 1), Side::Up));
        }
        for y in 0..self.height {
            self.lock_wall(GridPose::new(GridPoint::new(0, y), Side::Left));
            self.lock_wall(GridPose::new(GridPoint::new(self.width - 1, y), Side::Right));
        }
        // The start cell is only open to the front.
        let start = self.start;
        self.lock_wall(start.turned_left());
        self.lock_wall(start.turned_right());
        self.lock_wall(start.turned_back());
    }

    fn lock_wall(&mut self, pose: GridPose) {
        let other = self.opposite(pose);
        for p in std::iter::once(pose).chain(other) {
            if let Some(index) = self.index(p.position) {
                let cell = &mut self.cells[index];
                cell.wall_count[p.orientation.index()] = LOCKED;
                cell.free_count[p.orientation.index()] = 0;
            }
        }
    }

    fn index(&self, position: GridPoint) -> Option<usize> {
        if position.x < self.width && position.y < self.height {
            Some(position.y as usize * self.width as usize + position.x as usize)
        } else {
            None
        }
    }

    /// The same wall seen from the neighbouring cell.
    fn opposite(&self, pose: GridPose) -> Option<GridPose> {
        pose.position
            .neighbor(pose.orientation, self.width, self.height)
            .map(|p| GridPose::new(p, pose.orientation.turned_back()))
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn start(&self) -> GridPose {
        self.start
    }

    pub fn goal(&self) -> &BTreeSet<GridPoint> {
        &self.goal
    }

    pub fn is_goal(&self, position: GridPoint) -> bool {
        self.goal.contains(&position)
    }

    pub fn exploring(&self) -> bool {
        self.exploring
    }

    pub fn returning(&self) -> bool {
        self.returning
    }

    pub fn set_exploring(&mut self, exploring: bool) {
        if self.exploring != exploring {
            self.exploring = exploring;
            self.calculate_costmap();
        }
    }

    pub fn set_returning(&mut self, returning: bool) {
        if self.returning != returning {
            self.returning = returning;
            self.calculate_costmap();
        }
    }

    pub fn cell(&self, position: GridPoint) -> Option<&Cell> {
        self.index(position).map(|i| &self.cells[i])
    }

    pub fn cost(&self, position: GridPoint) -> u16 {
        self.cell(position).map_or(UNREACHABLE, |c| c.cost)
    }

    /// Cells outside the maze are walled.
    pub fn has_wall(&self, pose: GridPose) -> bool {
        match self.cell(pose.position) {
            Some(cell) => cell.has_wall(pose.orientation),
            None => true,
        }
    }

    /// Casts one vote on the wall at `pose` and its opposite face.
    /// Returns whether the voted state changed.
    pub fn update_wall(&mut self, pose: GridPose, is_wall: bool) -> bool {
        let index = match self.index(pose.position) {
            Some(i) => i,
            None => return false,
        };
        if self.cells[index].is_locked(pose.orientation) {
            return false;
        }
        let before = self.has_wall(pose);

        let other = self.opposite(pose);
        for p in std::iter::once(pose).chain(other) {
            if let Some(i) = self.index(p.position) {
                let side = p.orientation.index();
                let cell = &mut self.cells[i];
                let counter = if is_wall {
                    &mut cell.wall_count[side]
                } else {
                    &mut cell.free_count[side]
                };
                *counter = counter.saturating_add(1).min(MAX_COUNT);
            }
        }

        before != self.has_wall(pose)
    }

    /// Integrates the observations made at `pose` and tracks progress
    /// towards the goal and back. Returns whether the costmap was recomputed.
    pub fn update(&mut self, pose: GridPose, info: &Information) -> bool {
        if !self.exploring || self.index(pose.position).is_none() {
            return false;
        }

        let mut changed = false;
        let mut observe = |maze: &mut Maze, p: GridPose, o: Observation| match o {
            Observation::Unknown => {}
            Observation::Wall => changed |= maze.update_wall(p, true),
            Observation::Free => changed |= maze.update_wall(p, false),
        };
        observe(self, pose.turned_left(), info.left);
        observe(self, pose, info.front);
        observe(self, pose.turned_right(), info.right);
        if !self.has_wall(pose) {
            let front = pose.front();
            observe(self, front.turned_left(), info.front_left);
            observe(self, front.turned_right(), info.front_right);
        }

        let progressed = self.check_progress(pose);
        if changed && !progressed {
            self.calculate_costmap();
        }
        changed || progressed
    }

    fn check_progress(&mut self, pose: GridPose) -> bool {
        if !self.returning && self.is_goal(pose.position) {
            log::info!("Goal reached at ({}, {})", pose.position.x, pose.position.y);
            self.returning = true;
            self.calculate_costmap();
            return true;
        }
        if self.returning
            && pose.position == self.start.position
            && pose.orientation == self.start.orientation.turned_back()
        {
            log::info!("Back at the start, exploration finished");
            self.exploring = false;
            self.returning = false;
            self.calculate_costmap();
            self.build_best_route();
            return true;
        }
        false
    }

    fn targets(&self) -> Vec<GridPoint> {
        if self.returning {
            vec![self.start.position]
        } else {
            self.goal.iter().copied().collect()
        }
    }

    /// Directional Dijkstra from the targets. Each cell keeps one cost per
    /// propagation direction so turns can be penalised; the cell cost is
    /// the cheapest of them.
    pub fn calculate_costmap(&mut self) {
        let count = self.cells.len();
        let mut dist = vec![[u32::MAX; 4]; count];
        let mut heap = BinaryHeap::new();
        let mut is_target = vec![false; count];

        // Direction 4 marks a seed, which has no incoming direction.
        for target in self.targets() {
            if let Some(index) = self.index(target) {
                is_target[index] = true;
                dist[index] = [0; 4];
                heap.push(Reverse((0u32, index, 4usize)));
            }
        }

        while let Some(Reverse((cost, index, incoming))) = heap.pop() {
            if incoming < 4 && cost > dist[index][incoming] {
                continue;
            }
            let position = self.position_of(index);
            for side in Side::ALL {
                if self.has_wall(GridPose::new(position, side)) {
                    continue;
                }
                let next = match position.neighbor(side, self.width, self.height) {
                    Some(p) => p,
                    None => continue,
                };
                let next_index = match self.index(next) {
                    Some(i) => i,
                    None => continue,
                };
                let step = if is_target[next_index] || incoming == 4 || incoming == side.index() {
                    STRAIGHT_COST
                } else {
                    TURN_COST
                };
                let next_cost = cost + step;
                if next_cost < dist[next_index][side.index()] {
                    dist[next_index][side.index()] = next_cost;
                    heap.push(Reverse((next_cost, next_index, side.index())));
                }
            }
        }

        for (cell, d) in self.cells.iter_mut().zip(dist.iter()) {
            let best = d.iter().copied().min().unwrap_or(u32::MAX);
            cell.cost = if best >= UNREACHABLE as u32 {
                UNREACHABLE
            } else {
                best as u16
            };
        }
    }

    fn position_of(&self, index: usize) -> GridPoint {
        let width = self.width as usize;
        GridPoint::new((index % width) as u8, (index / width) as u8)
    }

    /// Next cell to drive to from `position`, with the heading of that move.
    ///
    /// Once the route is known it is replayed; otherwise the cheapest open
    /// neighbour is chosen, ties broken in `Side::ALL` order. `None` means
    /// no neighbour is cheaper than `position`: either a target was reached
    /// or the robot is at a dead end.
    pub fn get_current_goal(&self, position: GridPoint, force_costmap: bool) -> Option<GridPose> {
        if !force_costmap && (!self.exploring || self.returning) {
            if let Some(next) = self.replay(position) {
                return Some(next);
            }
        }

        let current = self.cost(position);
        let mut best: Option<(u16, GridPose)> = None;
        for side in Side::ALL {
            if self.has_wall(GridPose::new(position, side)) {
                continue;
            }
            let next = match position.neighbor(side, self.width, self.height) {
                Some(p) => p,
                None => continue,
            };
            let cost = self.cost(next);
            if cost >= current {
                continue;
            }
            if best.map_or(true, |(c, _)| cost < c) {
                best = Some((cost, GridPose::new(next, side)));
            }
        }
        best.map(|(_, pose)| pose)
    }

    fn replay(&self, position: GridPoint) -> Option<GridPose> {
        let cost = self.cost(position);
        let entry = self.best_route.get(&cost)?;
        if entry.position != position {
            return None;
        }
        if self.returning {
            let (_, previous) = self.best_route.range(cost + 1..).next()?;
            Some(GridPose::new(
                previous.position,
                entry.orientation.turned_back(),
            ))
        } else {
            let (_, next) = self.best_route.range(..cost).next_back()?;
            Some(*next)
        }
    }

    /// Walks the costmap from the start to the goal and records each step.
    pub fn build_best_route(&mut self) {
        self.best_route.clear();
        let mut pose = self.start;
        let mut route = BTreeMap::new();
        route.insert(self.cost(pose.position), pose);

        let limit = self.cells.len();
        for _ in 0..limit {
            if self.is_goal(pose.position) {
                break;
            }
            pose = match self.get_current_goal(pose.position, true) {
                Some(next) => next,
                None => {
                    log::warn!(
                        "No route from ({}, {})",
                        pose.position.x,
                        pose.position.y
                    );
                    return;
                }
            };
            route.insert(self.cost(pose.position), pose);
        }

        if self.is_goal(pose.position) {
            log::info!("Best route rebuilt, {} cells", route.len());
            self.best_route = route;
        }
    }

    /// Route from the start to the goal, empty before the first return.
    pub fn best_route(&self) -> Vec<GridPose> {
        self.best_route.values().rev().copied().collect()
    }
}

impl fmt::Display for Maze {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let up = self.has_wall(GridPose::new(GridPoint::new(x, y), Side::Up));
                write!(f, "+{}", if up { "---" } else { "   " })?;
            }
            writeln!(f, "+")?;
            for x in 0..self.width {
                let p = GridPoint::new(x, y);
                let left = self.has_wall(GridPose::new(p, Side::Left));
                write!(f, "{}", if left { "|" } else { " " })?;
                match self.cost(p) {
                    UNREACHABLE => write!(f, "  ?")?,
                    c if c > 999 => write!(f, "***")?,
                    c => write!(f, "{:3}", c)?,
                }
            }
            let right = self.has_wall(GridPose::new(GridPoint::new(self.width - 1, y), Side::Right));
            writeln!(f, "{}", if right { "|" } else { " " })?;
        }
        for x in 0..self.width {
            let down = self.has_wall(GridPose::new(GridPoint::new(x, 0), Side::Down));
            write!(f, "+{}", if down { "---" } else { "   " })?;
        }
        writeln!(f, "+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> GridPose {
        GridPose::new(GridPoint::new(0, 0), Side::Up)
    }

    fn small() -> Maze {
        Maze::new(4, 4, start(), [GridPoint::new(3, 3)])
    }

    #[test]
    fn perimeter_and_start_walls_are_locked() {
        let maze = small();
        for x in 0..4 {
            assert!(maze.has_wall(GridPose::new(GridPoint::new(x, 0), Side::Down)));
            assert!(maze.has_wall(GridPose::new(GridPoint::new(x, 3), Side::Up)));
        }
        // wall on the right of the start cell, seen from both sides
        assert!(maze.has_wall(GridPose::new(GridPoint::new(0, 0), Side::Right)));
        assert!(maze.has_wall(GridPose::new(GridPoint::new(1, 0), Side::Left)));
        assert!(!maze.has_wall(GridPose::new(GridPoint::new(0, 0), Side::Up)));
        assert!(maze.has_wall(GridPose::new(GridPoint::new(9, 0), Side::Up)));
    }

    #[test]
    fn locked_walls_ignore_votes() {
        let mut maze = small();
        let pose = GridPose::new(GridPoint::new(0, 1), Side::Left);
        for _ in 0..300 {
            assert!(!maze.update_wall(pose, false));
        }
        assert!(maze.has_wall(pose));
    }

    #[test]
    fn votes_are_symmetric_and_majority_wins() {
        let mut maze = small();
        let pose = GridPose::new(GridPoint::new(1, 1), Side::Up);
        let other = GridPose::new(GridPoint::new(1, 2), Side::Down);

        assert!(maze.update_wall(pose, true));
        assert!(maze.has_wall(pose));
        assert!(maze.has_wall(other));

        // a tie means no wall
        assert!(maze.update_wall(other, false));
        assert!(!maze.has_wall(pose));
        assert_eq!(maze.cell(GridPoint::new(1, 2)).unwrap().free_count[Side::Down.index()], 1);
    }

    #[test]
    fn counters_saturate() {
        let mut maze = small();
        let pose = GridPose::new(GridPoint::new(1, 1), Side::Right);
        for _ in 0..400 {
            maze.update_wall(pose, true);
        }
        let cell = maze.cell(GridPoint::new(1, 1)).unwrap();
        assert_eq!(cell.wall_count[Side::Right.index()], MAX_COUNT);
        assert!(!cell.is_locked(Side::Right));
    }

    #[test]
    fn turns_cost_more_than_straights() {
        let maze = Maze::new(5, 5, start(), [GridPoint::new(4, 4)]);
        // straight along the top row or right column
        assert_eq!(maze.cost(GridPoint::new(0, 4)), 4);
        assert_eq!(maze.cost(GridPoint::new(4, 0)), 4);
        // one turn on the way
        assert_eq!(maze.cost(GridPoint::new(3, 3)), 3);
        assert_eq!(maze.cost(GridPoint::new(1, 1)), 7);
    }

    #[test]
    fn update_does_nothing_once_exploration_is_done() {
        let mut maze = small();
        maze.set_exploring(false);
        let info = Information {
            front: Observation::Wall,
            ..Information::default()
        };
        assert!(!maze.update(GridPose::new(GridPoint::new(1, 1), Side::Up), &info));
        assert!(!maze.has_wall(GridPose::new(GridPoint::new(1, 1), Side::Up)));
    }

    #[test]
    fn update_maps_slots_relative_to_heading() {
        let mut maze = small();
        let pose = GridPose::new(GridPoint::new(1, 1), Side::Right);
        let info = Information {
            left: Observation::Wall,
            front_left: Observation::Wall,
            front: Observation::Free,
            front_right: Observation::Wall,
            right: Observation::Free,
        };
        assert!(maze.update(pose, &info));
        assert!(maze.has_wall(GridPose::new(GridPoint::new(1, 1), Side::Up)));
        assert!(!maze.has_wall(GridPose::new(GridPoint::new(1, 1), Side::Down)));
        assert!(maze.has_wall(GridPose::new(GridPoint::new(2, 1), Side::Up)));
        assert!(maze.has_wall(GridPose::new(GridPoint::new(2, 1), Side::Down)));
    }

    #[test]
    fn reaching_goal_then_start_finishes_exploration() {
        let mut maze = small();
        let info = Information::default();

        maze.update(GridPose::new(GridPoint::new(3, 3), Side::Up), &info);
        assert!(maze.returning());
        assert_eq!(maze.cost(GridPoint::new(0, 0)), 0);

        // facing the wrong way does not count
        maze.update(GridPose::new(GridPoint::new(0, 0), Side::Up), &info);
        assert!(maze.exploring());

        maze.update(GridPose::new(GridPoint::new(0, 0), Side::Down), &info);
        assert!(!maze.exploring());
        assert!(!maze.returning());
        assert_eq!(maze.cost(GridPoint::new(3, 3)), 0);

        let route = maze.best_route();
        assert_eq!(route.first().unwrap().position, GridPoint::new(0, 0));
        assert_eq!(route.last().unwrap().position, GridPoint::new(3, 3));
    }

    #[test]
    fn solving_replays_the_best_route() {
        let mut maze = small();
        maze.set_exploring(false);
        maze.build_best_route();
        let route = maze.best_route();
        assert!(route.len() > 2);

        for pair in route.windows(2) {
            assert_eq!(maze.get_current_goal(pair[0].position, false), Some(pair[1]));
        }
        assert_eq!(maze.get_current_goal(GridPoint::new(3, 3), false), None);
    }

    #[test]
    fn display_draws_walls_and_costs() {
        let maze = Maze::new(2, 2, start(), [GridPoint::new(1, 1)]);
        let text = maze.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "+---+---+");
        assert_eq!(lines[1], "|  1   0|");
        assert_eq!(lines[2], "+   +   +");
        // the start cell turns once on its way out
        assert_eq!(lines[3], "|  3|  1|");
        assert_eq!(lines[4], "+---+---+");
    }
}
