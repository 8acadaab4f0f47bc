use crate::geometry::Twist;
use serde::{Deserialize, Serialize};

/// Progress at which a segment counts as done, as a fraction of the
/// segment so short segments still finish.
const FINISH_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePhase {
    Acceleration,
    ConstantVelocity,
    Deceleration,
}

/// Trapezoidal speed profile over a travelled distance (or angle).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub x_target: f32,  // target distance, always >= 0
    pub x_a: f32,       // acceleration distance
    pub x_d: f32,       // deceleration distance
    pub v_limit: f32,   // reachable cruise speed
    pub v_initial: f32, // initial speed
    pub v_final: f32,   // final speed
    pub v_min: f32,     // floor that keeps the segment moving
    pub a_accel: f32,   // acceleration
    pub a_decel: f32,   // deceleration
}

impl Profile {
    pub fn new(x_t: f32, v_i: f32, v_l: f32, v_f: f32, a_a: f32, a_d: f32, v_min: f32) -> Self {
        let x_t = x_t.abs();
        let a_a = a_a.max(f32::EPSILON);
        let a_d = a_d.max(f32::EPSILON);
        let v_i = v_i.max(0.0);
        let v_f = v_f.max(0.0).min(v_l);

        let mut v_l = v_l.max(v_i.max(v_f));
        let mut x_a = (v_l * v_l - v_i * v_i) / (2.0 * a_a);
        let mut x_d = (v_l * v_l - v_f * v_f) / (2.0 * a_d);
        if x_a + x_d > x_t {
            // Triangular profile: the cruise speed is never reached.
            let v_sq = (2.0 * a_a * a_d * x_t + v_i * v_i * a_d + v_f * v_f * a_a) / (a_a + a_d);
            v_l = v_sq.max(0.0).sqrt();
            x_a = ((v_l * v_l - v_i * v_i) / (2.0 * a_a)).max(0.0);
            x_d = ((v_l * v_l - v_f * v_f) / (2.0 * a_d)).max(0.0);
        }

        Profile {
            x_target: x_t,
            x_a,
            x_d,
            v_limit: v_l,
            v_initial: v_i,
            v_final: v_f,
            v_min: v_min.max(0.0),
            a_accel: a_a,
            a_decel: a_d,
        }
    }

    pub fn phase(&self, x: f32) -> ProfilePhase {
        if x < self.x_a {
            ProfilePhase::Acceleration
        } else if x < self.x_target - self.x_d {
            ProfilePhase::ConstantVelocity
        } else {
            ProfilePhase::Deceleration
        }
    }

    /// Commanded speed after travelling `x`.
    pub fn speed_at(&self, x: f32) -> f32 {
        if self.is_finished(x) {
            return self.v_final;
        }
        let x = x.max(0.0);
        let v_acc = (self.v_initial * self.v_initial + 2.0 * self.a_accel * x).sqrt();
        let remaining = (self.x_target - x).max(0.0);
        let v_dec = (self.v_final * self.v_final + 2.0 * self.a_decel * remaining).sqrt();
        self.v_limit.min(v_acc).min(v_dec).max(self.v_min)
    }

    pub fn is_finished(&self, x: f32) -> bool {
        x >= self.x_target * (1.0 - FINISH_TOLERANCE)
    }

    /// Lower bound of the time needed, ignoring the speed floor.
    pub fn time_required(&self) -> f32 {
        let t_a = (self.v_limit - self.v_initial).max(0.0) / self.a_accel;
        let t_d = (self.v_limit - self.v_final).max(0.0) / self.a_decel;
        let x_c = (self.x_target - self.x_a - self.x_d).max(0.0);
        let t_c = if self.v_limit > 0.0 {
            x_c / self.v_limit
        } else {
            0.0
        };
        t_a + t_c + t_d
    }
}

/// Straight segment along `heading`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Straight {
    pub profile: Profile,
    pub heading: f32,
    pub wall_following: bool,
}

/// Constant radius arc, speed profiled along the arc length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub profile: Profile,
    pub radius: f32,
    pub direction: f32, // +1 left, -1 right
}

/// In-place rotation, speed profiled over the absolute angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turn {
    pub profile: Profile,
    pub direction: f32, // +1 left, -1 right
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Straight(Straight),
    Arc(Arc),
    Turn(Turn),
}

/// Linear [m/s, m/s^2] or angular [rad/s, rad/s^2] limits of a segment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SpeedLimit {
    pub max_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub min_speed: f32,
}

impl Default for SpeedLimit {
    fn default() -> Self {
        SpeedLimit {
            max_speed: 0.3,
            acceleration: 2.0,
            deceleration: 2.0,
            min_speed: 0.05,
        }
    }
}

impl Action {
    pub fn straight(
        distance: f32,
        heading: f32,
        start_speed: f32,
        end_speed: f32,
        limit: &SpeedLimit,
        wall_following: bool,
    ) -> Action {
        Action::Straight(Straight {
            profile: Profile::new(
                distance,
                start_speed,
                limit.max_speed,
                end_speed,
                limit.acceleration,
                limit.deceleration,
                limit.min_speed,
            ),
            heading,
            wall_following,
        })
    }

    /// `angle` is signed, positive turns left.
    pub fn arc(angle: f32, radius: f32, speed: f32, limit: &SpeedLimit) -> Action {
        Action::Arc(Arc {
            profile: Profile::new(
                angle.abs() * radius,
                speed,
                speed,
                speed,
                limit.acceleration,
                limit.deceleration,
                limit.min_speed,
            ),
            radius,
            direction: direction_of(angle),
        })
    }

    /// `angle` is signed, positive turns left.
    pub fn turn(angle: f32, limit: &SpeedLimit) -> Action {
        Action::Turn(Turn {
            profile: Profile::new(
                angle,
                0.0,
                limit.max_speed,
                0.0,
                limit.acceleration,
                limit.deceleration,
                limit.min_speed,
            ),
            direction: direction_of(angle),
        })
    }

    fn profile(&self) -> &Profile {
        match self {
            Action::Straight(s) => &s.profile,
            Action::Arc(a) => &a.profile,
            Action::Turn(t) => &t.profile,
        }
    }

    /// Command after `progress` along the segment (metres, or radians for a turn).
    pub fn twist(&self, progress: f32) -> Twist {
        match self {
            Action::Straight(s) => Twist::new(s.profile.speed_at(progress), 0.0),
            Action::Arc(a) => {
                let v = a.profile.speed_at(progress);
                Twist::new(v, a.direction * v / a.radius)
            }
            Action::Turn(t) => Twist::new(0.0, t.direction * t.profile.speed_at(progress)),
        }
    }

    pub fn is_finished(&self, progress: f32) -> bool {
        self.profile().is_finished(progress)
    }

    /// Progress made by a displacement measured over one tick.
    pub fn progress_delta(&self, displacement: &Twist) -> f32 {
        match self {
            Action::Straight(_) | Action::Arc(_) => displacement.linear,
            Action::Turn(t) => t.direction * displacement.angular,
        }
    }

    pub fn allows_wall_following(&self) -> bool {
        matches!(self, Action::Straight(s) if s.wall_following)
    }

    pub fn heading(&self) -> Option<f32> {
        match self {
            Action::Straight(s) => Some(s.heading),
            _ => None,
        }
    }

    /// Linear speed at the end of the segment.
    pub fn end_speed(&self) -> f32 {
        match self {
            Action::Turn(_) => 0.0,
            _ => self.profile().v_final,
        }
    }

    pub fn length(&self) -> f32 {
        self.profile().x_target
    }

    pub fn time_required(&self) -> f32 {
        self.profile().time_required()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Straight(_) => "straight",
            Action::Arc(_) => "arc",
            Action::Turn(_) => "turn",
        }
    }
}

fn direction_of(angle: f32) -> f32 {
    if angle < 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const LIMIT: SpeedLimit = SpeedLimit {
        max_speed: 1.0,
        acceleration: 2.0,
        deceleration: 2.0,
        min_speed: 0.05,
    };

    #[test]
    fn trapezoid_reaches_cruise_speed() {
        let p = Profile::new(1.0, 0.0, 1.0, 0.0, 2.0, 2.0, 0.0);
        assert!((p.x_a - 0.25).abs() < 1e-6);
        assert!((p.x_d - 0.25).abs() < 1e-6);
        assert_eq!(p.phase(0.1), ProfilePhase::Acceleration);
        assert_eq!(p.phase(0.5), ProfilePhase::ConstantVelocity);
        assert_eq!(p.phase(0.9), ProfilePhase::Deceleration);
        assert!((p.speed_at(0.5) - 1.0).abs() < 1e-6);
        assert!((p.time_required() - 1.5).abs() < 1e-5);
    }

    #[test]
    fn short_segment_becomes_triangular() {
        let p = Profile::new(0.1, 0.0, 1.0, 0.0, 2.0, 2.0, 0.0);
        // v^2 = a * x for symmetric accel/decel starting and ending at rest
        assert!((p.v_limit - (0.2f32).sqrt()).abs() < 1e-5);
        assert!((p.x_a + p.x_d - 0.1).abs() < 1e-5);
        let peak = p.speed_at(0.05);
        assert!((peak - p.v_limit).abs() < 1e-4);
    }

    #[test]
    fn speed_floor_keeps_segment_moving() {
        let action = Action::straight(0.18, 0.0, 0.0, 0.0, &LIMIT, true);
        assert!((action.twist(0.0).linear - 0.05).abs() < 1e-6);
        assert!(action.twist(0.17).linear >= 0.05);
        assert!(action.is_finished(0.18));
        assert_eq!(action.twist(0.18).linear, 0.0);
        assert!(action.allows_wall_following());
    }

    #[test]
    fn profile_never_exceeds_limit() {
        let action = Action::straight(0.9, 0.0, 0.3, 0.5, &LIMIT, false);
        let mut x = 0.0;
        while x < 0.9 {
            let v = action.twist(x).linear;
            assert!(v <= 1.0 + 1e-6);
            assert!(v > 0.0);
            x += 0.01;
        }
        assert_eq!(action.end_speed(), 0.5);
    }

    #[test]
    fn right_turn_commands_negative_rate() {
        let action = Action::turn(-FRAC_PI_2, &LIMIT);
        let twist = action.twist(0.5);
        assert_eq!(twist.linear, 0.0);
        assert!(twist.angular < 0.0);
        // turning right produces negative angular displacement
        let delta = action.progress_delta(&Twist::new(0.0, -0.01));
        assert!((delta - 0.01).abs() < 1e-6);
        assert!(!action.is_finished(1.0));
        assert!(action.is_finished(FRAC_PI_2));
        assert_eq!(action.heading(), None);
    }

    #[test]
    fn arc_couples_angular_to_linear_speed() {
        let action = Action::arc(FRAC_PI_2, 0.09, 0.4, &LIMIT);
        let twist = action.twist(0.05);
        assert!((twist.linear - 0.4).abs() < 1e-6);
        assert!((twist.angular - 0.4 / 0.09).abs() < 1e-4);
        assert!((action.length() - FRAC_PI_2 * 0.09).abs() < 1e-6);
        assert!(!action.allows_wall_following());
    }
}
