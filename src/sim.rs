//! Host simulation of the robot in a known maze.

use crate::geometry::{wrap_angle, GridPoint, GridPose, Point, Pose, Side};
use crate::sensors::{
    Axis, Clock, DistanceSensors, Imu, Motors, Observation, Panel, Platform, SensorIndex,
    WheelSensor, SENSOR_COUNT,
};
use crate::storage::{MemoryStorage, Storage};
use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

/// Ground truth walls. The perimeter is always closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallGrid {
    width: u8,
    height: u8,
    horizontal: Vec<bool>, // below cell (x, y), y in 0..=height
    vertical: Vec<bool>,   // left of cell (x, y), x in 0..=width
}

impl WallGrid {
    pub fn new(width: u8, height: u8) -> Self {
        let (w, h) = (width as usize, height as usize);
        let mut grid = WallGrid {
            width,
            height,
            horizontal: vec![false; w * (h + 1)],
            vertical: vec![false; (w + 1) * h],
        };
        for x in 0..w {
            grid.horizontal[x] = true;
            grid.horizontal[h * w + x] = true;
        }
        for y in 0..h {
            grid.vertical[y * (w + 1)] = true;
            grid.vertical[y * (w + 1) + w] = true;
        }
        grid
    }

    /// Parses the usual text drawing, top row first:
    ///
    /// ```text
    /// +---+---+
    /// |       |
    /// +   +---+
    /// |   |   |
    /// +---+---+
    /// ```
    pub fn from_ascii(text: &str) -> anyhow::Result<WallGrid> {
        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.trim_start())
            .collect();
        ensure!(
            lines.len() >= 3 && lines.len() % 2 == 1,
            "Expected an odd number of lines, got {}",
            lines.len()
        );
        let top = lines[0];
        ensure!(
            top.starts_with('+') && (top.len() - 1) % 4 == 0,
            "Malformed top line: {:?}",
            top
        );
        let width = (top.len() - 1) / 4;
        let height = (lines.len() - 1) / 2;
        if width == 0 || width > u8::MAX as usize || height > u8::MAX as usize {
            bail!("Unsupported maze size {}x{}", width, height);
        }

        let mut grid = WallGrid::new(width as u8, height as u8);
        for (i, line) in lines.iter().enumerate() {
            let bytes = line.as_bytes();
            let at = |col: usize| bytes.get(col).copied().unwrap_or(b' ');
            if i % 2 == 0 {
                ensure!(line.starts_with('+'), "Line {} should start with '+'", i + 1);
                let y = height - i / 2;
                for x in 0..width {
                    if at(4 * x + 2) == b'-' {
                        grid.horizontal[y * width + x] = true;
                    }
                }
            } else {
                let y = height - 1 - i / 2;
                for x in 0..=width {
                    if at(4 * x) == b'|' {
                        grid.vertical[y * (width + 1) + x] = true;
                    }
                }
            }
        }
        Ok(grid)
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    fn slot(&self, x: i32, y: i32, side: Side) -> Option<(bool, usize)> {
        let (w, h) = (self.width as i32, self.height as i32);
        if x < 0 || y < 0 || x >= w || y >= h {
            return None;
        }
        let (horizontal, index) = match side {
            Side::Down => (true, y * w + x),
            Side::Up => (true, (y + 1) * w + x),
            Side::Left => (false, y * (w + 1) + x),
            Side::Right => (false, y * (w + 1) + x + 1),
        };
        Some((horizontal, index as usize))
    }

    fn wall_at(&self, x: i32, y: i32, side: Side) -> bool {
        match self.slot(x, y, side) {
            Some((true, i)) => self.horizontal[i],
            Some((false, i)) => self.vertical[i],
            None => true,
        }
    }

    pub fn has_wall(&self, pose: GridPose) -> bool {
        self.wall_at(
            pose.position.x as i32,
            pose.position.y as i32,
            pose.orientation,
        )
    }

    fn set(&mut self, pose: GridPose, wall: bool) {
        if let Some((horizontal, i)) = self.slot(
            pose.position.x as i32,
            pose.position.y as i32,
            pose.orientation,
        ) {
            if horizontal {
                self.horizontal[i] = wall;
            } else {
                self.vertical[i] = wall;
            }
        }
    }

    pub fn add_wall(&mut self, pose: GridPose) {
        self.set(pose, true);
    }

    /// Distance from `origin` along `angle` to the first wall, capped at `max_range`.
    pub fn cast(&self, origin: Point, angle: f32, cell_size: f32, max_range: f32) -> f32 {
        let (dx, dy) = (angle.cos(), angle.sin());
        let mut x = (origin.x / cell_size).floor() as i32;
        let mut y = (origin.y / cell_size).floor() as i32;

        let step_x = if dx > 0.0 { 1 } else { -1 };
        let step_y = if dy > 0.0 { 1 } else { -1 };
        let next_line = |cell: i32, step: i32| (cell + if step > 0 { 1 } else { 0 }) as f32 * cell_size;
        let mut t_max_x = if dx.abs() < 1e-9 {
            f32::INFINITY
        } else {
            (next_line(x, step_x) - origin.x) / dx
        };
        let mut t_max_y = if dy.abs() < 1e-9 {
            f32::INFINITY
        } else {
            (next_line(y, step_y) - origin.y) / dy
        };
        let t_delta_x = if dx.abs() < 1e-9 { f32::INFINITY } else { cell_size / dx.abs() };
        let t_delta_y = if dy.abs() < 1e-9 { f32::INFINITY } else { cell_size / dy.abs() };

        loop {
            let (t, side) = if t_max_x < t_max_y {
                (t_max_x, if step_x > 0 { Side::Right } else { Side::Left })
            } else {
                (t_max_y, if step_y > 0 { Side::Up } else { Side::Down })
            };
            if t > max_range {
                return max_range;
            }
            if self.wall_at(x, y, side) {
                return t.max(0.0);
            }
            match side {
                Side::Right | Side::Left => {
                    x += step_x;
                    t_max_x += t_delta_x;
                }
                Side::Up | Side::Down => {
                    y += step_y;
                    t_max_y += t_delta_y;
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub cell_size: f32,
    pub period: f32,              // [s]
    pub wheel_radius: f32,        // [m]
    pub track_width: f32,         // [m]
    pub motor_bias: f32,          // command lost to friction
    pub motor_gain: f32,          // command per m/s
    pub motor_time_constant: f32, // [s]
    pub max_range: f32,           // [m]
    /// Readings below these are walls, per sensor slot.
    pub thresholds: [f32; SENSOR_COUNT],
    pub crash_acceleration: f32, // reported when driving into a wall [m/s^2]
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            cell_size: 0.18,
            period: 0.001,
            wheel_radius: 0.0065,
            track_width: 0.035,
            motor_bias: 4.0,
            motor_gain: 60.0,
            motor_time_constant: 0.03,
            max_range: 0.3,
            thresholds: [0.12, 0.16, 0.15, 0.16, 0.12],
            crash_acceleration: 100.0,
        }
    }
}

const SENSOR_ANGLES: [f32; SENSOR_COUNT] = [FRAC_PI_2, FRAC_PI_4, 0.0, -FRAC_PI_4, -FRAC_PI_2];

pub struct VirtualClock {
    micros: u64,
}

impl Clock for VirtualClock {
    fn micros(&self) -> u64 {
        self.micros
    }
}

#[derive(Default)]
pub struct SimWheel {
    position: f32, // [rad]
    speed: f32,    // [m/s]
}

impl WheelSensor for SimWheel {
    fn get_position(&self) -> f32 {
        self.position
    }
}

pub struct SimSensors {
    readings: [f32; SENSOR_COUNT],
    observations: [Observation; SENSOR_COUNT],
}

impl DistanceSensors for SimSensors {
    fn get_observation(&self, index: SensorIndex) -> Observation {
        self.observations[index.index()]
    }

    fn get_reading(&self, index: SensorIndex) -> f32 {
        self.readings[index.index()]
    }
}

pub struct SimImu {
    initialized: bool,
    calibrated: bool,
    angular_velocity: f32,
    acceleration: [f32; 3],
}

impl Imu for SimImu {
    fn get_linear_acceleration(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.acceleration[0],
            Axis::Y => self.acceleration[1],
            Axis::Z => self.acceleration[2],
        }
    }

    fn get_angular_velocity(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Z => self.angular_velocity,
            _ => 0.0,
        }
    }

    fn update(&mut self) {}

    fn calibrate(&mut self) {
        self.calibrated = true;
    }

    fn was_initialized(&self) -> bool {
        self.initialized
    }
}

#[derive(Default)]
pub struct SimMotors {
    enabled: bool,
    left: f32,
    right: f32,
}

impl Motors for SimMotors {
    fn set_wheel_command(&mut self, left: f32, right: f32) {
        self.left = left;
        self.right = right;
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.left = 0.0;
        self.right = 0.0;
    }
}

#[derive(Default)]
pub struct SimPanel {
    button: bool,
    switches: [bool; 2],
}

impl Panel for SimPanel {
    fn is_pressed(&self) -> bool {
        self.button
    }

    fn switch(&self, index: u8) -> bool {
        self.switches.get(index as usize).copied().unwrap_or(false)
    }
}

/// Differential drive robot with lagging motors and ray cast distance sensors.
pub struct Simulator {
    config: SimConfig,
    walls: WallGrid,
    pose: Pose,
    crashed: bool,
    clock: VirtualClock,
    left: SimWheel,
    right: SimWheel,
    sensors: SimSensors,
    imu: SimImu,
    motors: SimMotors,
    panel: SimPanel,
    storage: MemoryStorage,
}

impl Simulator {
    pub fn new(config: &SimConfig, walls: WallGrid, start: GridPose) -> Self {
        let mut sim = Simulator {
            config: *config,
            walls,
            pose: Pose::from_grid(start, config.cell_size),
            crashed: false,
            clock: VirtualClock { micros: 0 },
            left: SimWheel::default(),
            right: SimWheel::default(),
            sensors: SimSensors {
                readings: [0.0; SENSOR_COUNT],
                observations: [Observation::Unknown; SENSOR_COUNT],
            },
            imu: SimImu {
                initialized: true,
                calibrated: false,
                angular_velocity: 0.0,
                acceleration: [0.0, 0.0, 9.8],
            },
            motors: SimMotors::default(),
            panel: SimPanel::default(),
            storage: MemoryStorage::new(),
        };
        sim.update_sensors();
        sim
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Places the robot, at rest.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.left.speed = 0.0;
        self.right.speed = 0.0;
        self.crashed = false;
        self.update_sensors();
    }

    pub fn walls(&self) -> &WallGrid {
        &self.walls
    }

    pub fn crashed(&self) -> bool {
        self.crashed
    }

    pub fn millis(&self) -> u64 {
        self.clock.millis()
    }

    pub fn set_button(&mut self, pressed: bool) {
        self.panel.button = pressed;
    }

    pub fn set_switch(&mut self, index: usize, on: bool) {
        if let Some(s) = self.panel.switches.get_mut(index) {
            *s = on;
        }
    }

    pub fn set_imu_initialized(&mut self, initialized: bool) {
        self.imu.initialized = initialized;
    }

    pub fn imu_calibrated(&self) -> bool {
        self.imu.calibrated
    }

    pub fn motors_enabled(&self) -> bool {
        self.motors.enabled
    }

    pub fn memory(&mut self) -> &mut MemoryStorage {
        &mut self.storage
    }

    fn wheel_target(&self, command: f32) -> f32 {
        let c = self.config;
        if !self.motors.enabled || command.abs() <= c.motor_bias {
            return 0.0;
        }
        (command - c.motor_bias * command.signum()) / c.motor_gain
    }

    /// Advances the physics and the clock by one period.
    pub fn step(&mut self) {
        let c = self.config;
        let dt = c.period;
        self.clock.micros += (dt * 1e6).round() as u64;
        if self.crashed {
            self.imu.angular_velocity = 0.0;
            self.imu.acceleration = [0.0, 0.0, 9.8];
            return;
        }

        let alpha = (dt / c.motor_time_constant.max(dt)).min(1.0);
        let old_linear = (self.left.speed + self.right.speed) / 2.0;
        let target_left = self.wheel_target(self.motors.left);
        let target_right = self.wheel_target(self.motors.right);
        self.left.speed += alpha * (target_left - self.left.speed);
        self.right.speed += alpha * (target_right - self.right.speed);
        self.left.position += self.left.speed * dt / c.wheel_radius;
        self.right.position += self.right.speed * dt / c.wheel_radius;

        let linear = (self.left.speed + self.right.speed) / 2.0;
        let angular = (self.right.speed - self.left.speed) / c.track_width;
        let heading = self.pose.orientation + angular * dt / 2.0;
        let before = self.pose.position;
        self.pose.position.x += linear * dt * heading.cos();
        self.pose.position.y += linear * dt * heading.sin();
        self.pose.orientation = wrap_angle(self.pose.orientation + angular * dt);

        self.imu.angular_velocity = angular;
        self.imu.acceleration = [(linear - old_linear) / dt, linear * angular, 9.8];

        if self.hits_wall(before, self.pose.position) {
            log::warn!(
                "Crashed at ({:.3}, {:.3})",
                self.pose.position.x,
                self.pose.position.y
            );
            self.crashed = true;
            self.left.speed = 0.0;
            self.right.speed = 0.0;
            self.imu.acceleration[0] = -c.crash_acceleration;
        }
        self.update_sensors();
    }

    fn hits_wall(&self, from: Point, to: Point) -> bool {
        let cell = self.config.cell_size;
        let a = from.to_grid(cell);
        let b = to.to_grid(cell);
        if to.x < 0.0 || to.y < 0.0 {
            return true;
        }
        if b.x >= self.walls.width || b.y >= self.walls.height {
            return true;
        }
        let side = if b.x > a.x {
            Side::Right
        } else if b.x < a.x {
            Side::Left
        } else if b.y > a.y {
            Side::Up
        } else if b.y < a.y {
            Side::Down
        } else {
            return false;
        };
        self.walls.has_wall(GridPose::new(a, side))
    }

    fn update_sensors(&mut self) {
        for (i, offset) in SENSOR_ANGLES.iter().enumerate() {
            let reading = self.walls.cast(
                self.pose.position,
                self.pose.orientation + offset,
                self.config.cell_size,
                self.config.max_range,
            );
            self.sensors.readings[i] = reading;
            self.sensors.observations[i] = if reading < self.config.thresholds[i] {
                Observation::Wall
            } else {
                Observation::Free
            };
        }
    }

    pub fn cell(&self) -> GridPoint {
        self.pose.position.to_grid(self.config.cell_size)
    }
}

impl Platform for Simulator {
    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn distance_sensors(&self) -> &dyn DistanceSensors {
        &self.sensors
    }

    fn left_wheel(&self) -> &dyn WheelSensor {
        &self.left
    }

    fn right_wheel(&self) -> &dyn WheelSensor {
        &self.right
    }

    fn imu(&mut self) -> &mut dyn Imu {
        &mut self.imu
    }

    fn motors(&mut self) -> &mut dyn Motors {
        &mut self.motors
    }

    fn panel(&self) -> &dyn Panel {
        &self.panel
    }

    fn storage(&mut self) -> &mut dyn Storage {
        &mut self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELL: f32 = 0.18;

    const CORRIDOR: &str = "
        +---+---+---+
        |           |
        +   +---+   +
        |   |       |
        +---+---+---+
    ";

    fn pose(x: u8, y: u8, side: Side) -> GridPose {
        GridPose::new(GridPoint::new(x, y), side)
    }

    #[test]
    fn ascii_walls_are_parsed() {
        let grid = WallGrid::from_ascii(CORRIDOR).unwrap();
        assert_eq!((grid.width(), grid.height()), (3, 2));
        assert!(grid.has_wall(pose(0, 0, Side::Right)));
        assert!(!grid.has_wall(pose(0, 0, Side::Up)));
        assert!(grid.has_wall(pose(1, 0, Side::Up)));
        assert!(grid.has_wall(pose(1, 1, Side::Down)));
        assert!(!grid.has_wall(pose(1, 0, Side::Right)));
        assert!(!grid.has_wall(pose(2, 0, Side::Up)));
        assert!(grid.has_wall(pose(2, 1, Side::Up)));
        assert!(grid.has_wall(pose(2, 1, Side::Right)));
    }

    #[test]
    fn malformed_ascii_is_rejected() {
        assert!(WallGrid::from_ascii("+---+\n|   |").is_err());
        assert!(WallGrid::from_ascii("").is_err());
        assert!(WallGrid::from_ascii("+--+\n|  |\n+--+").is_err());
    }

    #[test]
    fn walls_are_shared_between_neighbours() {
        let mut grid = WallGrid::new(2, 2);
        assert!(grid.has_wall(pose(0, 0, Side::Left)));
        assert!(!grid.has_wall(pose(0, 0, Side::Up)));
        grid.add_wall(pose(0, 0, Side::Up));
        assert!(grid.has_wall(pose(0, 1, Side::Down)));
    }

    #[test]
    fn rays_stop_at_walls() {
        let grid = WallGrid::from_ascii(CORRIDOR).unwrap();
        let centre = Point::from_grid(GridPoint::new(0, 0), CELL);
        // wall on the right of (0, 0)
        assert!((grid.cast(centre, 0.0, CELL, 0.3) - 0.09).abs() < 1e-5);
        // open above, next wall is the top perimeter
        assert!((grid.cast(centre, FRAC_PI_2, CELL, 0.5) - 0.27).abs() < 1e-5);
        // capped by the range
        assert_eq!(grid.cast(centre, FRAC_PI_2, CELL, 0.2), 0.2);
        // diagonal into the side wall of the next cell
        let d = grid.cast(Point::new(0.09, 0.12), 3.0 * FRAC_PI_4, CELL, 0.3);
        assert!((d - 0.09 * 2f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn sensors_threshold_the_readings() {
        let grid = WallGrid::from_ascii(CORRIDOR).unwrap();
        let sim = Simulator::new(&SimConfig::default(), grid, pose(0, 0, Side::Up));
        let s = sim.distance_sensors();
        assert_eq!(s.get_observation(SensorIndex::Front), Observation::Free);
        assert_eq!(s.get_observation(SensorIndex::Left), Observation::Wall);
        assert_eq!(s.get_observation(SensorIndex::Right), Observation::Wall);
        assert!((s.get_reading(SensorIndex::Left) - 0.09).abs() < 1e-5);
    }

    #[test]
    fn motors_drive_the_robot_forward() {
        let grid = WallGrid::from_ascii(CORRIDOR).unwrap();
        let mut sim = Simulator::new(&SimConfig::default(), grid, pose(0, 0, Side::Up));
        sim.motors().enable();
        // 4 + 60 * 0.2
        sim.motors().set_wheel_command(16.0, 16.0);
        for _ in 0..300 {
            sim.step();
        }
        let pose = sim.pose();
        assert!((pose.position.x - 0.09).abs() < 1e-5);
        assert!(pose.position.y > 0.09 + 0.03);
        assert!((sim.left.speed - 0.2).abs() < 1e-3);
        assert_eq!(sim.millis(), 300);
        assert!(!sim.crashed());
    }

    #[test]
    fn driving_into_a_wall_is_a_crash() {
        let grid = WallGrid::from_ascii(CORRIDOR).unwrap();
        let mut sim = Simulator::new(&SimConfig::default(), grid, pose(0, 0, Side::Right));
        sim.motors().enable();
        sim.motors().set_wheel_command(30.0, 30.0);
        for _ in 0..1000 {
            sim.step();
        }
        assert!(sim.crashed());
        assert!(sim.pose().position.x < 0.19);
    }

    #[test]
    fn disabled_motors_do_not_move() {
        let grid = WallGrid::new(2, 2);
        let mut sim = Simulator::new(&SimConfig::default(), grid, pose(0, 0, Side::Up));
        sim.motors().set_wheel_command(50.0, 50.0);
        for _ in 0..100 {
            sim.step();
        }
        assert_eq!(sim.pose(), Pose::from_grid(pose(0, 0, Side::Up), CELL));
    }
}
