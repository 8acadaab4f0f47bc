use crate::follow_wall::FollowWallConfig;
use crate::geometry::{GridPoint, GridPose, Side};
use crate::mapping::MappingConfig;
use crate::odometry::OdometryConfig;
use crate::panel::PanelConfig;
use crate::pid::PidParameter;
use crate::route::RouteLimits;
use crate::run_log::LogConfig;
use crate::sensors::Calibration;
use crate::speed_controller::SpeedControllerConfig;
use crate::trajectory::SpeedLimit;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONTROL_CYCLE: u32 = 1; // ms
pub const CELL_SIZE: f32 = 0.18; // m
pub const MAZE_SIZE: u8 = 16;
pub const MAX_COMMAND: f32 = 100.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MazeConfig {
    pub width: u8,
    pub height: u8,
    pub cell_size: f32, // [m]
    pub start: GridPose,
    pub goal: Vec<GridPoint>,
}

impl Default for MazeConfig {
    fn default() -> Self {
        let c = MAZE_SIZE / 2;
        MazeConfig {
            width: MAZE_SIZE,
            height: MAZE_SIZE,
            cell_size: CELL_SIZE,
            start: GridPose::new(GridPoint::new(0, 0), Side::Up),
            goal: vec![
                GridPoint::new(c - 1, c - 1),
                GridPoint::new(c, c - 1),
                GridPoint::new(c - 1, c),
                GridPoint::new(c, c),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RobotConfig {
    pub period: f32,      // [s]
    pub max_command: f32, // motor command limit
}

impl Default for RobotConfig {
    fn default() -> Self {
        RobotConfig {
            period: CONTROL_CYCLE as f32 / 1000.0,
            max_command: MAX_COMMAND,
        }
    }
}

/// Limits of one objective.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RunSpeeds {
    pub straight: SpeedLimit,
    pub turn: SpeedLimit,
    pub arc_speed: f32, // [m/s]
}

impl Default for RunSpeeds {
    fn default() -> Self {
        RunSpeeds {
            straight: SpeedLimit::default(),
            turn: SpeedLimit {
                max_speed: 6.0,
                acceleration: 40.0,
                deceleration: 40.0,
                min_speed: 0.3,
            },
            arc_speed: 0.25,
        }
    }
}

impl RunSpeeds {
    pub fn limits(&self) -> RouteLimits {
        RouteLimits {
            straight: self.straight,
            turn: self.turn,
            arc_speed: self.arc_speed,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SpeedsConfig {
    pub explore: RunSpeeds,
    #[serde(rename = "return")]
    pub return_: RunSpeeds,
    pub solve: RunSpeeds,
}

impl Default for SpeedsConfig {
    fn default() -> Self {
        let explore = RunSpeeds::default();
        SpeedsConfig {
            explore,
            return_: RunSpeeds {
                straight: SpeedLimit {
                    max_speed: 0.4,
                    ..SpeedLimit::default()
                },
                ..explore
            },
            solve: RunSpeeds {
                straight: SpeedLimit {
                    max_speed: 0.8,
                    acceleration: 3.0,
                    deceleration: 3.0,
                    ..SpeedLimit::default()
                },
                ..explore
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub speed: SpeedControllerConfig,
    pub follow_wall: FollowWallConfig,
    /// Heading hold on straights without walls, output in [rad/s].
    pub heading: PidParameter,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            speed: SpeedControllerConfig::default(),
            follow_wall: FollowWallConfig::default(),
            heading: PidParameter {
                kp: 8.0,
                ki: 0.0,
                kd: 0.0,
                saturation: 3.0,
                max_integral: -1.0,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Horizontal acceleration treated as a collision [m/s^2].
    pub crash_acceleration: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            crash_acceleration: 40.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub maze: MazeConfig,
    pub robot: RobotConfig,
    pub odometry: OdometryConfig,
    pub speeds: SpeedsConfig,
    pub control: ControlConfig,
    pub mapping: MappingConfig,
    pub sensors: Calibration,
    pub safety: SafetyConfig,
    pub panel: PanelConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Config> {
        let config = serde_json::from_str(text).context("Failed to parse config")?;
        Ok(config)
    }

    /// Like `read`, but falls back to the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Config {
        match Self::read(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to read config: {:?}", e);
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_goal_is_the_centre() {
        let c = Config::default();
        assert_eq!(c.maze.goal.len(), 4);
        assert!(c.maze.goal.contains(&GridPoint::new(7, 7)));
        assert!(c.maze.goal.contains(&GridPoint::new(8, 8)));
        assert_eq!(c.robot.period, 0.001);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "maze": { "width": 8, "height": 8, "goal": [{ "x": 3, "y": 3 }] },
            "speeds": { "return": { "arc_speed": 0.2 } },
            "control": { "heading": { "kp": 2.0 } }
        }"#;
        let c = Config::from_json(json).unwrap();
        assert_eq!(c.maze.width, 8);
        assert_eq!(c.maze.cell_size, CELL_SIZE);
        assert_eq!(c.maze.goal, vec![GridPoint::new(3, 3)]);
        assert_eq!(c.maze.start.orientation, Side::Up);
        assert_eq!(c.speeds.return_.arc_speed, 0.2);
        assert_eq!(c.speeds.solve, SpeedsConfig::default().solve);
        assert_eq!(c.control.heading.kp, 2.0);
        assert_eq!(c.control.heading.saturation, -1.0);
        assert_eq!(c.log, LogConfig::default());
    }

    #[test]
    fn config_round_trips_through_json() {
        let c = Config::default();
        let text = serde_json::to_string_pretty(&c).unwrap();
        assert_eq!(Config::from_json(&text).unwrap(), c);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("mm-config-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::read(&path).is_err());
        assert_eq!(Config::load(&path), Config::default());
        std::fs::remove_file(&path).unwrap();
        assert_eq!(Config::load(&path), Config::default());
    }
}
