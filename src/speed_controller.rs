use crate::geometry::Twist;
use crate::pid::{Pid, PidParameter};
use serde::{Deserialize, Serialize};

/// Open loop motor model of one wheel, in command units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Feedforward {
    pub bias: f32,         // static friction
    pub speed: f32,        // per m/s
    pub acceleration: f32, // per m/s^2
    /// Target steps are differentiated into spikes, so the acceleration is clamped [m/s^2].
    pub max_acceleration: f32,
}

impl Default for Feedforward {
    fn default() -> Self {
        Feedforward {
            bias: 4.0,
            speed: 60.0,
            acceleration: 2.0,
            max_acceleration: 10.0,
        }
    }
}

impl Feedforward {
    fn command(&self, target: f32, previous_target: f32, dt: f32) -> f32 {
        let bias = if target > 0.0 {
            self.bias
        } else if target < 0.0 {
            -self.bias
        } else {
            0.0
        };
        let acceleration = if dt > 0.0 {
            let limit = self.max_acceleration.abs();
            ((target - previous_target) / dt).max(-limit).min(limit)
        } else {
            0.0
        };
        bias + self.speed * target + self.acceleration * acceleration
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SpeedControllerConfig {
    pub linear_pid: PidParameter,
    pub angular_pid: PidParameter,
    pub feedforward_left: Feedforward,
    pub feedforward_right: Feedforward,
}

impl Default for SpeedControllerConfig {
    fn default() -> Self {
        SpeedControllerConfig {
            linear_pid: PidParameter {
                kp: 40.0,
                ki: 20.0,
                kd: 0.0,
                saturation: 50.0,
                max_integral: 30.0,
            },
            angular_pid: PidParameter {
                kp: 2.0,
                ki: 20.0,
                kd: 0.0,
                saturation: 50.0,
                max_integral: 30.0,
            },
            feedforward_left: Feedforward::default(),
            feedforward_right: Feedforward::default(),
        }
    }
}

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct WheelCommand {
    pub left: f32,
    pub right: f32,
}

impl WheelCommand {
    pub fn new(left: f32, right: f32) -> Self {
        WheelCommand { left, right }
    }

    pub fn clamped(&self, limit: f32) -> WheelCommand {
        WheelCommand::new(
            self.left.max(-limit).min(limit),
            self.right.max(-limit).min(limit),
        )
    }
}

/// Feedback and feedforward are kept apart so both can be logged.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SpeedOutput {
    pub feedback: WheelCommand,
    pub feedforward: WheelCommand,
}

impl SpeedOutput {
    pub fn total(&self) -> WheelCommand {
        WheelCommand::new(
            self.feedback.left + self.feedforward.left,
            self.feedback.right + self.feedforward.right,
        )
    }
}

pub struct SpeedController {
    config: SpeedControllerConfig,
    track_width: f32,
    linear_pid: Pid,
    angular_pid: Pid,
    previous_target: WheelCommand, // wheel speeds [m/s]
}

impl SpeedController {
    pub fn new(config: &SpeedControllerConfig, track_width: f32) -> Self {
        SpeedController {
            config: *config,
            track_width,
            linear_pid: Pid::new(&config.linear_pid),
            angular_pid: Pid::new(&config.angular_pid),
            previous_target: WheelCommand::default(),
        }
    }

    fn wheel_speeds(&self, twist: &Twist) -> WheelCommand {
        let half = twist.angular * self.track_width / 2.0;
        WheelCommand::new(twist.linear - half, twist.linear + half)
    }

    pub fn update(&mut self, target: &Twist, measured: &Twist, dt: f32) -> SpeedOutput {
        let linear = self.linear_pid.update(target.linear - measured.linear, dt);
        let angular = self.angular_pid.update(target.angular - measured.angular, dt);

        let wheels = self.wheel_speeds(target);
        let feedforward = WheelCommand::new(
            self.config
                .feedforward_left
                .command(wheels.left, self.previous_target.left, dt),
            self.config
                .feedforward_right
                .command(wheels.right, self.previous_target.right, dt),
        );
        self.previous_target = wheels;

        SpeedOutput {
            feedback: WheelCommand::new(linear - angular, linear + angular),
            feedforward,
        }
    }

    pub fn reset(&mut self) {
        self.linear_pid.reset();
        self.angular_pid.reset();
        self.previous_target = WheelCommand::default();
    }
}
