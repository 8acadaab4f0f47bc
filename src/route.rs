//! Converts the best route into the action list of a solve run.

use crate::geometry::{wrap_angle, GridPose, Side};
use crate::panel::RunOptions;
use crate::trajectory::{Action, SpeedLimit};
use std::f32::consts::FRAC_PI_2;

/// Speeds used by the planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLimits {
    pub straight: SpeedLimit,
    pub turn: SpeedLimit, // angular, for in-place turns
    pub arc_speed: f32,   // [m/s]
}

/// Consecutive moves in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    side: Side,
    cells: u32,
}

fn runs(route: &[GridPose], merge: bool) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for pose in route.iter().skip(1) {
        match runs.last_mut() {
            Some(run) if merge && run.side == pose.orientation => run.cells += 1,
            _ => runs.push(Run {
                side: pose.orientation,
                cells: 1,
            }),
        }
    }
    runs
}

/// `route` starts with the start pose; every later entry holds the heading
/// of the move into its cell. Smooth turns imply merged straights.
pub fn plan(
    route: &[GridPose],
    cell_size: f32,
    options: RunOptions,
    limits: &RouteLimits,
) -> Vec<Action> {
    let start = match route.first() {
        Some(p) => *p,
        None => return Vec::new(),
    };
    let smooth = options.smooth_turns;
    let runs = runs(route, options.merge_straights || smooth);

    let mut actions = Vec::new();
    let mut heading = start.orientation;
    for (i, run) in runs.iter().enumerate() {
        let distance = run.cells as f32 * cell_size;
        let angle = run.side.angle();

        if !smooth || i == 0 {
            if run.side != heading {
                let turn = wrap_angle(angle - heading.angle());
                actions.push(Action::turn(turn, &limits.turn));
            }
            heading = run.side;
        }

        if !smooth {
            actions.push(Action::straight(distance, angle, 0.0, 0.0, &limits.straight, true));
            continue;
        }

        // Arcs of radius cell/2 take half a cell from each neighbouring run.
        let first = i == 0;
        let last = i + 1 == runs.len();
        let mut length = distance;
        if !first {
            length -= cell_size / 2.0;
        }
        if !last {
            length -= cell_size / 2.0;
        }
        let start_speed = if first { 0.0 } else { limits.arc_speed };
        let end_speed = if last { 0.0 } else { limits.arc_speed };
        if length > f32::EPSILON {
            actions.push(Action::straight(
                length,
                angle,
                start_speed,
                end_speed,
                &limits.straight,
                true,
            ));
        }

        if let Some(next) = runs.get(i + 1) {
            let turn = if next.side == run.side.turned_left() {
                FRAC_PI_2
            } else {
                -FRAC_PI_2
            };
            actions.push(Action::arc(
                turn,
                cell_size / 2.0,
                limits.arc_speed,
                &limits.straight,
            ));
            heading = next.side;
        }
    }
    actions
}
