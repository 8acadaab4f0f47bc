use micromouse_nav::config::Config;
use micromouse_nav::geometry::{GridPoint, GridPose, Point, Pose, Side};
use micromouse_nav::maze::{codec, Maze, UNREACHABLE};
use micromouse_nav::navigator::{Fault, Navigator, NavigatorState, Objective, MAZE_BLOB};
use micromouse_nav::panel::RunOptions;
use micromouse_nav::sim::{SimConfig, Simulator, WallGrid};
use micromouse_nav::storage::Storage;
use rstest::rstest;
use std::f32::consts::FRAC_PI_2;

// One corridor from the start to the top left corner, with a closed
// pocket in the bottom right.
const SNAKE: &str = "
+---+---+---+
|           |
+---+---+   +
|           |
+   +---+---+
|   |       |
+---+---+---+
";

fn snake_config() -> Config {
    let mut config = Config::default();
    config.maze.width = 3;
    config.maze.height = 3;
    config.maze.goal = vec![GridPoint::new(0, 2)];
    config.panel.wait_ms = 100;
    config
}

fn snake_sim(config: &Config) -> Simulator {
    let walls = WallGrid::from_ascii(SNAKE).unwrap();
    Simulator::new(&SimConfig::default(), walls, config.maze.start)
}

fn start_pose(config: &Config) -> Pose {
    Pose::from_grid(config.maze.start, config.maze.cell_size)
}

/// Presses the button briefly, then ticks until the robot is in a run.
fn start_exploring(nav: &mut Navigator, sim: &mut Simulator) {
    sim.set_button(true);
    for _ in 0..100 {
        nav.tick(sim);
        sim.step();
    }
    sim.set_button(false);
    for _ in 0..1000 {
        nav.tick(sim);
        sim.step();
        if nav.state() == NavigatorState::Run {
            return;
        }
    }
    panic!("run did not start, state {:?}", nav.state());
}

/// Runs exploration, the return trip and the solve run to completion.
/// Returns the objectives seen when each run was armed.
fn explore_return_and_solve_snake(
    config: &Config,
    nav: &mut Navigator,
    sim: &mut Simulator,
) -> Vec<Objective> {
    start_exploring(nav, sim);
    assert_eq!(nav.objective(), Objective::Explore);

    let mut objectives = vec![Objective::Explore];
    let mut last = nav.state();
    for _ in 0..200_000 {
        nav.tick(sim);
        sim.step();
        let state = nav.state();
        if state != last {
            if state == NavigatorState::WaitForRun {
                objectives.push(nav.objective());
                if nav.objective() == Objective::Solve {
                    sim.set_pose(start_pose(config));
                }
            }
            last = state;
        }
        if matches!(state, NavigatorState::Idle | NavigatorState::Error(_)) {
            break;
        }
    }
    objectives
}

#[test]
fn explore_return_and_solve() {
    let config = snake_config();
    let mut sim = snake_sim(&config);
    let mut nav = Navigator::new(&config);
    let objectives = explore_return_and_solve_snake(&config, &mut nav, &mut sim);

    assert_eq!(nav.state(), NavigatorState::Idle);
    assert!(!sim.crashed());
    assert_eq!(
        objectives,
        vec![Objective::Explore, Objective::Return, Objective::Solve]
    );
    assert_eq!(sim.cell(), GridPoint::new(0, 2));

    let maze = nav.maze();
    assert!(!maze.exploring());
    let route: Vec<GridPoint> = maze.best_route().iter().map(|p| p.position).collect();
    assert_eq!(
        route,
        vec![
            GridPoint::new(0, 0),
            GridPoint::new(0, 1),
            GridPoint::new(1, 1),
            GridPoint::new(2, 1),
            GridPoint::new(2, 2),
            GridPoint::new(1, 2),
            GridPoint::new(0, 2),
        ]
    );
    // walls along the corridor were learnt
    assert!(maze.has_wall(GridPose::new(GridPoint::new(0, 1), Side::Up)));
    assert!(maze.has_wall(GridPose::new(GridPoint::new(1, 1), Side::Up)));
    assert!(!maze.has_wall(GridPose::new(GridPoint::new(2, 1), Side::Up)));

    let mut data = Vec::new();
    sim.memory().load(MAZE_BLOB, &mut data).unwrap();
    let stored = codec::from_bytes(&data).unwrap();
    assert_eq!(stored.best_route(), maze.best_route());
    assert!(!nav.run_log().records().is_empty());
}

#[rstest]
#[case(true, false)]
#[case(true, true)]
fn solve_run_follows_the_switches(#[case] merge: bool, #[case] smooth: bool) {
    let config = snake_config();
    let mut sim = snake_sim(&config);
    sim.set_switch(RunOptions::MERGE_SWITCH as usize, merge);
    sim.set_switch(RunOptions::SMOOTH_SWITCH as usize, smooth);
    let mut nav = Navigator::new(&config);
    let objectives = explore_return_and_solve_snake(&config, &mut nav, &mut sim);

    assert_eq!(
        objectives,
        vec![Objective::Explore, Objective::Return, Objective::Solve]
    );
    assert_eq!(
        nav.options(),
        RunOptions {
            merge_straights: merge,
            smooth_turns: smooth,
        }
    );
    assert_eq!(nav.state(), NavigatorState::Idle);
    assert!(!sim.crashed());
    assert_eq!(sim.cell(), GridPoint::new(0, 2));
}

#[test]
fn collision_stops_the_run() {
    let config = snake_config();
    let mut sim = snake_sim(&config);
    let mut nav = Navigator::new(&config);
    start_exploring(&mut nav, &mut sim);

    // Drop the robot right in front of the bottom wall, facing it.
    sim.set_pose(Pose::new(Point::new(0.09, 0.003), -FRAC_PI_2));
    for _ in 0..2000 {
        nav.tick(&mut sim);
        sim.step();
        if matches!(nav.state(), NavigatorState::Error(_)) {
            break;
        }
    }
    assert!(sim.crashed());
    assert_eq!(nav.state(), NavigatorState::Error(Fault::Crash));
    assert!(!sim.motors_enabled());
}

#[test]
fn open_maze_descends_to_the_centre() {
    let config = Config::default();
    let mut maze = Maze::new(16, 16, config.maze.start, config.maze.goal.iter().copied());
    maze.set_exploring(false);
    maze.build_best_route();
    let route = maze.best_route();

    // Manhattan distance to the nearest goal cell
    assert_eq!(route.len(), 15);
    assert_eq!(route[0], config.maze.start);
    assert!(maze.is_goal(route[14].position));
    assert!(route.len() - 1 <= 16);
    for pair in route.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        assert_eq!(from.position.neighbor(to.orientation, 16, 16), Some(to.position));
        let decrease = maze.cost(from.position) - maze.cost(to.position);
        assert!(matches!(decrease, 1 | 2), "cost dropped by {}", decrease);
    }
}

#[test]
fn enclosed_goal_is_unreachable() {
    let config = snake_config();
    let mut maze = Maze::new(3, 3, config.maze.start, [GridPoint::new(1, 1)]);
    let goal = GridPoint::new(1, 1);
    for side in Side::ALL {
        maze.update_wall(GridPose::new(goal, side), true);
    }
    maze.calculate_costmap();
    assert_eq!(maze.cost(goal), 0);
    for x in 0..3 {
        for y in 0..3 {
            let p = GridPoint::new(x, y);
            if p != goal {
                assert_eq!(maze.cost(p), UNREACHABLE);
            }
        }
    }
    assert_eq!(maze.get_current_goal(GridPoint::new(0, 0), true), None);
}
