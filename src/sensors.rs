//! Interfaces to the peripheral layer. Implementations own the drivers and
//! deliver calibrated physical values; the navigation core only reads the
//! latest sample.

use crate::storage::Storage;
use serde::{Deserialize, Serialize};

pub const SENSOR_COUNT: usize = 5;

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    #[default]
    Unknown,
    Free,
    Wall,
}

/// Distance sensor slots, ordered as they face from left to right. The
/// diagonal sensors look at the side walls of the cell ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorIndex {
    Left = 0,
    FrontLeft = 1,
    Front = 2,
    FrontRight = 3,
    Right = 4,
}

impl SensorIndex {
    pub const ALL: [SensorIndex; SENSOR_COUNT] = [
        SensorIndex::Left,
        SensorIndex::FrontLeft,
        SensorIndex::Front,
        SensorIndex::FrontRight,
        SensorIndex::Right,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

pub trait DistanceSensors {
    /// Thresholded wall presence, `Unknown` when the sample is not valid.
    fn get_observation(&self, index: SensorIndex) -> Observation;
    /// Filtered distance [m].
    fn get_reading(&self, index: SensorIndex) -> f32;
}

pub trait WheelSensor {
    /// Absolute wheel angle [rad], not wrapped.
    fn get_position(&self) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

pub trait Imu {
    fn get_linear_acceleration(&self, axis: Axis) -> f32; // [m/s^2]
    fn get_angular_velocity(&self, axis: Axis) -> f32; // [rad/s]
    fn update(&mut self);
    fn calibrate(&mut self);
    fn was_initialized(&self) -> bool;
}

/// Commands are normalized to [-100, 100].
pub trait Motors {
    fn set_wheel_command(&mut self, left: f32, right: f32);

    fn set_command(&mut self, linear: f32, angular: f32) {
        self.set_wheel_command(linear - angular, linear + angular);
    }

    fn enable(&mut self);
    fn disable(&mut self);

    fn stop(&mut self) {
        self.set_wheel_command(0.0, 0.0);
    }
}

/// Front panel inputs.
pub trait Panel {
    /// Raw, undebounced button level.
    fn is_pressed(&self) -> bool;
    fn switch(&self, index: u8) -> bool;
}

pub trait Clock {
    fn micros(&self) -> u64;

    fn millis(&self) -> u64 {
        self.micros() / 1000
    }
}

/// Everything the navigator touches during a tick.
pub trait Platform {
    fn clock(&self) -> &dyn Clock;
    fn distance_sensors(&self) -> &dyn DistanceSensors;
    fn left_wheel(&self) -> &dyn WheelSensor;
    fn right_wheel(&self) -> &dyn WheelSensor;
    fn imu(&mut self) -> &mut dyn Imu;
    fn motors(&mut self) -> &mut dyn Motors;
    fn panel(&self) -> &dyn Panel;
    fn storage(&mut self) -> &mut dyn Storage;
}

/// Averaged readings of the calibration run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Calibration {
    /// Readings with the robot centred in a cell closed on the left, front and right.
    pub wall: [f32; SENSOR_COUNT],
    /// Readings with no wall in range.
    pub free: [f32; SENSOR_COUNT],
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            wall: [0.09, 0.127, 0.09, 0.127, 0.09],
            free: [0.3; SENSOR_COUNT],
        }
    }
}

impl Calibration {
    pub fn wall(&self, index: SensorIndex) -> f32 {
        self.wall[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        last: (f32, f32),
    }

    impl Motors for Recorder {
        fn set_wheel_command(&mut self, left: f32, right: f32) {
            self.last = (left, right);
        }
        fn enable(&mut self) {}
        fn disable(&mut self) {}
    }

    #[test]
    fn set_command_mixes_into_wheels() {
        let mut m = Recorder { last: (1.0, 1.0) };
        m.set_command(30.0, 10.0);
        assert_eq!(m.last, (20.0, 40.0));
        m.stop();
        assert_eq!(m.last, (0.0, 0.0));
    }

    #[test]
    fn calibration_round_trips_through_json() {
        let c = Calibration::default();
        let bytes = serde_json::to_vec(&c).unwrap();
        let back: Calibration = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, c);
        assert_eq!(back.wall(SensorIndex::Front), 0.09);
    }
}
