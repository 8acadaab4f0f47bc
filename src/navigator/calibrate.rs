use crate::sensors::{Calibration, Platform, SensorIndex, SENSOR_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    Gyro,
    /// The robot sits in a cell closed on the left, front and right.
    Walls,
    /// The robot sees no wall.
    Free,
}

/// Sensor calibration sequence. The operator gets `wait_ms` between the
/// steps to reposition the robot.
pub struct Calibrator {
    samples: u32,
    wait_ms: u64,
    step: CalibrationStep,
    result: Calibration,
    sums: [f32; SENSOR_COUNT],
    count: u32,
    resume_at: Option<u64>,
}

impl Calibrator {
    pub fn new(samples: u32, wait_ms: u64) -> Self {
        Calibrator {
            samples: samples.max(1),
            wait_ms,
            step: CalibrationStep::Gyro,
            result: Calibration::default(),
            sums: [0.0; SENSOR_COUNT],
            count: 0,
            resume_at: None,
        }
    }

    pub fn start(&mut self, base: Calibration) {
        log::info!("Calibration started");
        self.step = CalibrationStep::Gyro;
        self.result = base;
        self.sums = [0.0; SENSOR_COUNT];
        self.count = 0;
        self.resume_at = None;
    }

    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    fn advance(&mut self, step: CalibrationStep, now_ms: u64) {
        log::info!("Calibration step {:?}", step);
        self.step = step;
        self.sums = [0.0; SENSOR_COUNT];
        self.count = 0;
        self.resume_at = Some(now_ms + self.wait_ms);
    }

    /// Returns the new calibration once the last step is done.
    pub fn tick(&mut self, platform: &mut dyn Platform, now_ms: u64) -> Option<Calibration> {
        if let Some(resume_at) = self.resume_at {
            if now_ms < resume_at {
                return None;
            }
            self.resume_at = None;
        }

        if self.step == CalibrationStep::Gyro {
            platform.imu().calibrate();
            self.advance(CalibrationStep::Walls, now_ms);
            return None;
        }

        let sensors = platform.distance_sensors();
        for index in SensorIndex::ALL {
            self.sums[index.index()] += sensors.get_reading(index);
        }
        self.count += 1;
        if self.count < self.samples {
            return None;
        }

        let count = self.count as f32;
        let mean = self.sums.map(|sum| sum / count);
        match self.step {
            CalibrationStep::Walls => {
                self.result.wall = mean;
                self.advance(CalibrationStep::Free, now_ms);
                None
            }
            _ => {
                self.result.free = mean;
                self.step = CalibrationStep::Gyro;
                Some(self.result)
            }
        }
    }
}
