use crate::filter::Butterworth2;
use crate::pid::{Pid, PidParameter};
use crate::sensors::{Calibration, DistanceSensors, Observation, SensorIndex};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FollowWallConfig {
    pub pid: PidParameter,
    pub derivative_cutoff: f32, // [Hz]
    pub max_error: f32,         // [m], larger errors mean the reading is not a side wall
}

impl Default for FollowWallConfig {
    fn default() -> Self {
        FollowWallConfig {
            pid: PidParameter {
                kp: 40.0,
                ki: 0.0,
                kd: 0.02,
                saturation: 3.0,
                max_integral: -1.0,
            },
            derivative_cutoff: 30.0,
            max_error: 0.03,
        }
    }
}

/// Keeps the robot centred between side walls. The output is an angular
/// velocity bias [rad/s], positive to the left.
pub struct FollowWall {
    config: FollowWallConfig,
    pid: Pid,
    derivative_filter: Butterworth2,
    last_error: Option<f32>,
}

impl FollowWall {
    pub fn new(config: &FollowWallConfig, period: f32) -> Self {
        FollowWall {
            config: *config,
            pid: Pid::new(&config.pid),
            derivative_filter: Butterworth2::new(config.derivative_cutoff, period),
            last_error: None,
        }
    }

    /// Centring error [m], positive when the robot sits right of centre.
    /// With one wall visible the error is measured against its baseline.
    pub fn error(sensors: &dyn DistanceSensors, calibration: &Calibration) -> Option<f32> {
        let left_wall = sensors.get_observation(SensorIndex::Left) == Observation::Wall;
        let right_wall = sensors.get_observation(SensorIndex::Right) == Observation::Wall;
        let left = sensors.get_reading(SensorIndex::Left);
        let right = sensors.get_reading(SensorIndex::Right);
        let left_offset = calibration.wall(SensorIndex::Left);
        let right_offset = calibration.wall(SensorIndex::Right);

        match (left_wall, right_wall) {
            (true, true) => Some((left - left_offset) - (right - right_offset)),
            (true, false) => Some(2.0 * (left - left_offset)),
            (false, true) => Some(-2.0 * (right - right_offset)),
            (false, false) => None,
        }
    }

    /// Returns `None` and forgets the derivative history when no usable wall is in view.
    pub fn correction(
        &mut self,
        sensors: &dyn DistanceSensors,
        calibration: &Calibration,
        dt: f32,
    ) -> Option<f32> {
        let error = match Self::error(sensors, calibration) {
            Some(e) if e.abs() <= self.config.max_error => e,
            _ => {
                self.last_error = None;
                self.derivative_filter.reset();
                return None;
            }
        };

        let raw_rate = match self.last_error {
            Some(last) if dt > 0.0 => (error - last) / dt,
            _ => 0.0,
        };
        self.last_error = Some(error);
        let rate = self.derivative_filter.filter(raw_rate);

        // The PID damps the rate of the measured value, which is -rate here.
        Some(self.pid.update_with_rate(error, -rate, dt))
    }

    pub fn reset(&mut self) {
        self.pid.reset();
        self.derivative_filter.reset();
        self.last_error = None;
    }
}
