use super::{Fault, Navigator, Objective};
use crate::geometry::{angle_to_grid, wrap_angle, GridPoint, GridPose};
use crate::mapping::{Alignment, TargetKind};
use crate::run_log::TickRecord;
use crate::sensors::{Axis, Platform};
use crate::trajectory::Action;
use std::collections::VecDeque;

/// Progress of the current run.
#[derive(Debug, Default)]
pub(super) struct RunState {
    /// Actions planned ahead, consumed before asking the costmap.
    pub queue: VecDeque<Action>,
    pub action: Option<Action>,
    pub progress: f32, // [m] or [rad]
    /// Cell the current straight was planned towards.
    pub goal: Option<GridPose>,
    /// End speed of the last finished action [m/s].
    pub speed: f32,
    pub time: f32, // [s]
}

impl Navigator {
    pub(super) fn run_tick(&mut self, platform: &mut dyn Platform, elapsed: f32) {
        let now_ms = platform.clock().millis();
        let left = platform.left_wheel().get_position();
        let right = platform.right_wheel().get_position();
        let gyro = platform.imu().get_angular_velocity(Axis::Z);
        self.odometry.update(left, right, Some(gyro), elapsed);
        self.run.time += elapsed;

        let ax = platform.imu().get_linear_acceleration(Axis::X);
        let ay = platform.imu().get_linear_acceleration(Axis::Y);
        let acceleration = ax.hypot(ay);
        if acceleration > self.config.safety.crash_acceleration {
            log::error!("Collision, acceleration {:.1} m/s^2", acceleration);
            self.fail(platform, Fault::Crash);
            return;
        }

        if self.objective != Objective::Solve {
            let pose = self.odometry.pose();
            self.mapping
                .update(&pose, platform.distance_sensors(), &mut self.maze);
        }

        if let Some(action) = &self.run.action {
            self.run.progress += action.progress_delta(&self.odometry.displacement());
        }
        self.check_braking();

        let finished = self
            .run
            .action
            .map_or(true, |a| a.is_finished(self.run.progress));
        if finished {
            if let Some(done) = self.run.action.take() {
                self.run.speed = done.end_speed();
            }
            if self.is_complete() {
                self.finish_run(platform, now_ms);
                return;
            }
            let next = match self.run.queue.pop_front() {
                Some(action) => {
                    self.run.goal = None;
                    Some(action)
                }
                None => self.plan(),
            };
            match next {
                Some(action) => {
                    log::debug!(
                        "{} {:.3} from {:.2} to {:.2}",
                        action.name(),
                        action.length(),
                        self.run.speed,
                        action.end_speed()
                    );
                    self.run.action = Some(action);
                    self.run.progress = 0.0;
                }
                None => {
                    let cell = self.cell();
                    log::error!("Nowhere to go from ({}, {})", cell.x, cell.y);
                    self.fail(platform, Fault::NoPath);
                    return;
                }
            }
        }

        self.control(platform, elapsed);
    }

    fn cell(&self) -> GridPoint {
        self.odometry
            .pose()
            .position
            .to_grid(self.config.maze.cell_size)
    }

    fn is_complete(&self) -> bool {
        match self.objective {
            Objective::Explore => self.maze.returning(),
            Objective::Return => !self.maze.exploring(),
            Objective::Solve => self.run.queue.is_empty() && self.maze.is_goal(self.cell()),
        }
    }

    /// Whether the robot can drive through `goal` without stopping.
    fn continues_straight(&self, goal: GridPose) -> bool {
        let is_target = if self.maze.returning() {
            goal.position == self.maze.start().position
        } else {
            self.maze.is_goal(goal.position)
        };
        if is_target {
            return false;
        }
        matches!(
            self.maze.get_current_goal(goal.position, false),
            Some(next) if next.orientation == goal.orientation
        )
    }

    /// Next action from the costmap.
    fn plan(&mut self) -> Option<Action> {
        let pose = self.odometry.pose();
        let speeds = self.speeds();
        let target = self.mapping.get_action(&pose, &self.maze)?;
        match target.kind {
            TargetKind::LookAt => {
                self.run.goal = None;
                let turn = Action::turn(wrap_angle(target.heading - pose.orientation), &speeds.turn);
                if self.run.speed <= 0.0 {
                    return Some(turn);
                }
                // Still moving: stop on the current axis first.
                let limit = speeds.straight;
                let distance = self.run.speed * self.run.speed / (2.0 * limit.deceleration);
                self.run.queue.push_back(turn);
                Some(Action::straight(
                    distance,
                    angle_to_grid(pose.orientation).angle(),
                    self.run.speed,
                    0.0,
                    &limit,
                    false,
                ))
            }
            TargetKind::GoTo => {
                let cell_size = self.config.maze.cell_size;
                let side = angle_to_grid(target.heading);
                let goal = GridPose::new(target.point.to_grid(cell_size), side);
                let distance = (target.point - pose.position).dot(side.unit());
                let end_speed = if self.continues_straight(goal) {
                    speeds.straight.max_speed
                } else {
                    0.0
                };
                self.run.goal = Some(goal);
                Some(Action::straight(
                    distance,
                    target.heading,
                    self.run.speed,
                    end_speed,
                    &speeds.straight,
                    true,
                ))
            }
        }
    }

    /// Walls found after planning can close the way ahead. The straight is
    /// then replaced by one that stops in its goal cell.
    fn check_braking(&mut self) {
        let (action, goal) = match (self.run.action, self.run.goal) {
            (Some(a @ Action::Straight(_)), Some(goal)) if a.end_speed() > 0.0 => (a, goal),
            _ => return,
        };
        if self.continues_straight(goal) {
            return;
        }
        let speed = action.twist(self.run.progress).linear;
        let remaining = (action.length() - self.run.progress).max(0.0);
        let heading = action.heading().unwrap_or_else(|| goal.orientation.angle());
        log::debug!(
            "Stopping in ({}, {}), {:.3} m left",
            goal.position.x,
            goal.position.y,
            remaining
        );
        self.run.action = Some(Action::straight(
            remaining,
            heading,
            speed,
            0.0,
            &self.speeds().straight,
            action.allows_wall_following(),
        ));
        self.run.progress = 0.0;
    }

    fn control(&mut self, platform: &mut dyn Platform, elapsed: f32) {
        let action = match self.run.action {
            Some(a) => a,
            None => return,
        };
        let mut target = action.twist(self.run.progress);
        let pose = self.odometry.pose();

        let wall = if action.allows_wall_following() {
            self.follow_wall
                .correction(platform.distance_sensors(), &self.calibration, elapsed)
        } else {
            None
        };
        let bias = match (wall, action.heading()) {
            (Some(correction), _) => {
                self.heading_pid.reset();
                correction
            }
            (None, Some(heading)) => self
                .heading_pid
                .update(wrap_angle(heading - pose.orientation), elapsed),
            (None, None) => 0.0,
        };
        target.angular += bias;

        let remaining = action.length() - self.run.progress;
        let alignment = match action {
            Action::Straight(_)
                if action.end_speed() <= 0.0
                    && remaining < self.config.maze.cell_size / 4.0 =>
            {
                Some(Alignment::Front)
            }
            _ if action.allows_wall_following() => Some(Alignment::Side),
            _ => None,
        };
        if let Some(alignment) = alignment {
            let mut corrected = pose;
            if self.mapping.correct_pose(
                &mut corrected,
                alignment,
                platform.distance_sensors(),
                &self.calibration,
            ) {
                self.odometry.set_pose(corrected);
            }
        }

        let measured = self.odometry.state().velocity;
        let output = self.speed_controller.update(&target, &measured, elapsed);
        let command = output.total().clamped(self.config.robot.max_command);
        platform
            .motors()
            .set_wheel_command(command.left, command.right);

        self.run_log.record(TickRecord {
            time: self.run.time,
            x: pose.position.x,
            y: pose.position.y,
            theta: pose.orientation,
            v: measured.linear,
            omega: measured.angular,
            target_v: target.linear,
            target_omega: target.angular,
            feedback_l: output.feedback.left,
            feedback_r: output.feedback.right,
            feedforward_l: output.feedforward.left,
            feedforward_r: output.feedforward.right,
            wall_bias: bias,
            action: action.name(),
        });
    }
}
