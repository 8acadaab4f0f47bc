use crate::filter::LowPass;
use crate::geometry::{wrap_angle, Pose, State, Twist};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct OdometryConfig {
    pub wheel_radius: f32,         // [m]
    pub track_width: f32,          // [m], distance between left and right wheels
    pub velocity_cutoff: f32,      // [Hz]
    pub small_angle: f32,          // [rad], below this the chord equals the arc
    pub imu_check: bool,           // compare encoder heading change with the gyro
    pub imu_tolerance: f32,        // [rad] per tick
}

impl Default for OdometryConfig {
    fn default() -> Self {
        OdometryConfig {
            wheel_radius: 0.0065,
            track_width: 0.035,
            velocity_cutoff: 30.0,
            small_angle: 1e-4,
            imu_check: true,
            imu_tolerance: 0.002,
        }
    }
}

pub struct Odometry {
    config: OdometryConfig,
    left_position: f32,  // last wheel angle [rad]
    right_position: f32, // last wheel angle [rad]
    linear_filter: LowPass,
    angular_filter: LowPass,
    state: State,
    displacement: Twist,
    slip_count: u32,
}

impl Odometry {
    pub fn new(config: &OdometryConfig, period: f32) -> Self {
        Odometry {
            config: *config,
            left_position: 0.0,
            right_position: 0.0,
            linear_filter: LowPass::new(config.velocity_cutoff, period),
            angular_filter: LowPass::new(config.velocity_cutoff, period),
            state: State::default(),
            displacement: Twist::default(),
            slip_count: 0,
        }
    }

    /// Re-homes the estimate at `pose` with the wheels at rest.
    pub fn reset(&mut self, pose: Pose, left_position: f32, right_position: f32) {
        self.state = State {
            pose,
            velocity: Twist::default(),
        };
        self.rebase(left_position, right_position);
    }

    /// Keeps the pose but forgets the wheel history and velocity.
    pub fn rebase(&mut self, left_position: f32, right_position: f32) {
        self.left_position = left_position;
        self.right_position = right_position;
        self.linear_filter.reset(0.0);
        self.angular_filter.reset(0.0);
        self.state.velocity = Twist::default();
        self.displacement = Twist::default();
    }

    /// Integrates one tick. Wheel positions are absolute angles [rad],
    /// `gyro` is the yaw rate [rad/s] when available.
    pub fn update(
        &mut self,
        left_position: f32,
        right_position: f32,
        gyro: Option<f32>,
        elapsed_time: f32,
    ) {
        if elapsed_time <= 0.0 {
            return;
        }

        let left = (left_position - self.left_position) * self.config.wheel_radius;
        let right = (right_position - self.right_position) * self.config.wheel_radius;
        self.left_position = left_position;
        self.right_position = right_position;

        let linear = (left + right) / 2.0;
        let mut angular = (right - left) / self.config.track_width;

        if let (true, Some(gyro)) = (self.config.imu_check, gyro) {
            let inertial = gyro * elapsed_time;
            if (angular - inertial).abs() > self.config.imu_tolerance {
                self.slip_count += 1;
                log::debug!(
                    "Wheel slip: encoder {:.4} rad, gyro {:.4} rad",
                    angular,
                    inertial
                );
                angular = inertial;
            }
        }

        let chord = if angular.abs() < self.config.small_angle {
            linear
        } else {
            2.0 * (linear / angular) * (angular / 2.0).sin()
        };

        let pose = &mut self.state.pose;
        let heading = pose.orientation + angular / 2.0;
        pose.position.x += chord * heading.cos();
        pose.position.y += chord * heading.sin();
        pose.orientation = wrap_angle(pose.orientation + angular);

        self.state.velocity = Twist::new(
            self.linear_filter.filter(linear / elapsed_time),
            self.angular_filter.filter(angular / elapsed_time),
        );
        self.displacement = Twist::new(linear, angular);
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn pose(&self) -> Pose {
        self.state.pose
    }

    /// Overrides the estimated pose, used by wall alignment.
    pub fn set_pose(&mut self, pose: Pose) {
        self.state.pose = pose;
    }

    /// Displacement integrated by the last `update`.
    pub fn displacement(&self) -> Twist {
        self.displacement
    }

    pub fn slip_count(&self) -> u32 {
        self.slip_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use std::f32::consts::{FRAC_PI_2, PI};

    const DT: f32 = 0.001;

    fn odometry() -> Odometry {
        let config = OdometryConfig {
            wheel_radius: 0.01,
            track_width: 0.04,
            imu_check: false,
            ..OdometryConfig::default()
        };
        Odometry::new(&config, DT)
    }

    #[test]
    fn straight_motion_follows_heading() {
        let mut odo = odometry();
        odo.reset(Pose::new(Point::new(0.09, 0.09), FRAC_PI_2), 0.0, 0.0);
        // 10 rad of wheel rotation is 0.1 m
        for i in 1..=100 {
            let p = i as f32 * 0.1;
            odo.update(p, p, None, DT);
        }
        let pose = odo.pose();
        assert!((pose.position.x - 0.09).abs() < 1e-5);
        assert!((pose.position.y - 0.19).abs() < 1e-4);
        assert!((pose.orientation - FRAC_PI_2).abs() < 1e-6);
        assert!(odo.state().velocity.linear > 0.0);
    }

    #[test]
    fn pivot_keeps_position() {
        let mut odo = odometry();
        // a half turn in place: each wheel travels PI * track / 2
        let wheel = PI * 0.04 / 2.0 / 0.01;
        for i in 1..=200 {
            let p = wheel * i as f32 / 200.0;
            odo.update(-p, p, None, DT);
        }
        let pose = odo.pose();
        assert!(pose.position.x.abs() < 1e-5);
        assert!(pose.position.y.abs() < 1e-5);
        assert!((pose.orientation.abs() - PI).abs() < 1e-3);
    }

    #[test]
    fn arc_uses_exact_chord() {
        let mut odo = odometry();
        // quarter circle of radius 0.1 m in a single step
        let radius = 0.1;
        let angle = FRAC_PI_2;
        let left = (radius - 0.02) * angle / 0.01;
        let right = (radius + 0.02) * angle / 0.01;
        odo.update(left, right, None, DT);
        let pose = odo.pose();
        assert!((pose.position.x - radius).abs() < 1e-4);
        assert!((pose.position.y - radius).abs() < 1e-4);
        assert!((pose.orientation - FRAC_PI_2).abs() < 1e-4);
    }

    #[test]
    fn zero_displacement_keeps_pose_and_decays_velocity() {
        let mut odo = odometry();
        odo.update(1.0, 1.0, None, DT);
        let pose = odo.pose();
        let v0 = odo.state().velocity.linear;
        assert!(v0 > 0.0);

        let mut last = v0;
        for _ in 0..50 {
            odo.update(1.0, 1.0, None, DT);
            assert_eq!(odo.pose(), pose);
            let v = odo.state().velocity.linear;
            assert!(v < last);
            last = v;
        }
        assert!(last < v0 * 0.01);
    }

    #[test]
    fn zero_elapsed_time_is_ignored() {
        let mut odo = odometry();
        odo.update(5.0, 5.0, None, 0.0);
        assert_eq!(odo.pose(), Pose::default());
        assert_eq!(odo.displacement(), Twist::default());
    }

    #[test]
    fn gyro_overrides_slipping_wheels() {
        let config = OdometryConfig {
            wheel_radius: 0.01,
            track_width: 0.04,
            imu_check: true,
            imu_tolerance: 0.001,
            ..OdometryConfig::default()
        };
        let mut odo = Odometry::new(&config, DT);
        // left wheel spins freely, gyro reports no rotation
        odo.update(0.5, 0.0, Some(0.0), DT);
        assert_eq!(odo.slip_count(), 1);
        assert_eq!(odo.pose().orientation, 0.0);
        assert_eq!(odo.displacement().angular, 0.0);
    }
}
