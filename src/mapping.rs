//! Turns distance readings into wall observations and the costmap into
//! the next motion target.

use crate::geometry::{angle_to_grid, wrap_angle, Point, Pose};
use crate::maze::{Information, Maze};
use crate::sensors::{Calibration, DistanceSensors, Observation, SensorIndex};
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_8;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    /// Minimum of (1 + cos 4θ) / 2 to trust the readings.
    pub min_confidence: f32,
    /// Advance into the cell, as fractions of the cell size.
    pub front_window: [f32; 2],
    pub diagonal_window: [f32; 2],
    pub side_window: [f32; 2],
    pub max_lateral: f32,         // [m]
    pub look_at_threshold: f32,   // [rad]
    pub alignment_tolerance: f32, // [m]
    pub alignment_ticks: u32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            min_confidence: 0.95,
            front_window: [0.3, 0.55],
            diagonal_window: [0.6, 0.85],
            side_window: [0.4, 0.6],
            max_lateral: 0.01,
            look_at_threshold: FRAC_PI_8,
            alignment_tolerance: 0.004,
            alignment_ticks: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Rotate in place to `heading` first.
    LookAt,
    /// Drive to `point`.
    GoTo,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub kind: TargetKind,
    pub point: Point,
    pub heading: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Facing a wall at the cell centre.
    Front,
    /// Between two side walls.
    Side,
}

/// Position of the robot relative to its current cell, along its grid heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellOffset {
    /// Distance from the edge the robot entered through [m].
    pub advance: f32,
    /// Distance left of the centre line [m].
    pub lateral: f32,
}

pub struct Mapping {
    config: MappingConfig,
    cell_size: f32,
    front_ticks: u32,
    side_ticks: u32,
}

impl Mapping {
    pub fn new(config: &MappingConfig, cell_size: f32) -> Self {
        Mapping {
            config: *config,
            cell_size,
            front_ticks: 0,
            side_ticks: 0,
        }
    }

    pub fn confidence(orientation: f32) -> f32 {
        (1.0 + (4.0 * orientation).cos()) / 2.0
    }

    pub fn cell_offset(&self, pose: &Pose) -> CellOffset {
        let grid = pose.to_grid(self.cell_size);
        let center = Point::from_grid(grid.position, self.cell_size);
        let axis = grid.orientation.unit();
        let delta = pose.position - center;
        CellOffset {
            advance: delta.dot(axis) + self.cell_size / 2.0,
            lateral: axis.cross(delta),
        }
    }

    fn in_window(&self, advance: f32, window: [f32; 2]) -> bool {
        advance >= window[0] * self.cell_size && advance <= window[1] * self.cell_size
    }

    /// Samples the sensors that are meaningful at `pose` and feeds the maze.
    /// Returns the observations, or `None` when the heading is too far
    /// from a grid axis.
    pub fn update(
        &mut self,
        pose: &Pose,
        sensors: &dyn DistanceSensors,
        maze: &mut Maze,
    ) -> Option<Information> {
        if Self::confidence(pose.orientation) < self.config.min_confidence {
            return None;
        }
        let grid = pose.to_grid(self.cell_size);
        let offset = self.cell_offset(pose);
        let mut info = Information::default();

        if self.in_window(offset.advance, self.config.front_window) {
            info.front = sensors.get_observation(SensorIndex::Front);
        }
        if self.in_window(offset.advance, self.config.diagonal_window) && !maze.has_wall(grid) {
            info.front_left = sensors.get_observation(SensorIndex::FrontLeft);
            info.front_right = sensors.get_observation(SensorIndex::FrontRight);
        }
        if self.in_window(offset.advance, self.config.side_window)
            && offset.lateral.abs() <= self.config.max_lateral
        {
            info.left = sensors.get_observation(SensorIndex::Left);
            info.right = sensors.get_observation(SensorIndex::Right);
        }

        // Progress is tracked even without observations.
        maze.update(grid, &info);
        Some(info)
    }

    /// Next target according to the costmap, `None` at a target cell or a dead end.
    /// The heading error is measured to the target point, the commanded
    /// heading stays on the grid axis of the move.
    pub fn get_action(&self, pose: &Pose, maze: &Maze) -> Option<Target> {
        let grid = pose.to_grid(self.cell_size);
        let next = maze.get_current_goal(grid.position, false)?;
        let point = Point::from_grid(next.position, self.cell_size);
        let heading = next.orientation.angle();
        let error = wrap_angle(pose.position.bearing(point) - pose.orientation);
        let kind = if error.abs() > self.config.look_at_threshold {
            TargetKind::LookAt
        } else {
            TargetKind::GoTo
        };
        Some(Target {
            kind,
            point,
            heading,
        })
    }

    /// Snaps a coordinate of `pose` to the cell centre once the wall
    /// readings have matched the calibrated baselines for
    /// `alignment_ticks` consecutive calls.
    pub fn correct_pose(
        &mut self,
        pose: &mut Pose,
        alignment: Alignment,
        sensors: &dyn DistanceSensors,
        calibration: &Calibration,
    ) -> bool {
        let matches = |index: SensorIndex| {
            sensors.get_observation(index) == Observation::Wall
                && (sensors.get_reading(index) - calibration.wall(index)).abs()
                    <= self.config.alignment_tolerance
        };
        let (aligned, ticks) = match alignment {
            Alignment::Front => (matches(SensorIndex::Front), &mut self.front_ticks),
            Alignment::Side => (
                matches(SensorIndex::Left) && matches(SensorIndex::Right),
                &mut self.side_ticks,
            ),
        };
        if !aligned {
            *ticks = 0;
            return false;
        }
        *ticks += 1;
        if *ticks < self.config.alignment_ticks {
            return false;
        }
        *ticks = 0;

        let grid = pose.to_grid(self.cell_size);
        let center = Point::from_grid(grid.position, self.cell_size);
        let side = angle_to_grid(pose.orientation);
        let along_x = side.offset().0 != 0;
        match (alignment, along_x) {
            (Alignment::Front, true) | (Alignment::Side, false) => pose.position.x = center.x,
            (Alignment::Front, false) | (Alignment::Side, true) => pose.position.y = center.y,
        }
        log::debug!("{:?} alignment at ({}, {})", alignment, grid.position.x, grid.position.y);
        true
    }

    pub fn reset(&mut self) {
        self.front_ticks = 0;
        self.side_ticks = 0;
    }
}
