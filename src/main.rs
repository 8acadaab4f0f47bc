use micromouse_nav::config::Config;
use micromouse_nav::geometry::{GridPoint, Pose};
use micromouse_nav::logger;
use micromouse_nav::navigator::{Navigator, NavigatorState, Objective, CALIBRATION_BLOB, MAZE_BLOB};
use micromouse_nav::sensors::Platform;
use micromouse_nav::sim::{SimConfig, Simulator, WallGrid};
use micromouse_nav::storage::{FileStorage, Storage};
use micromouse_nav::timer::LoopTimer;
use std::fs::File;

const DEMO_MAZE: &str = "
+---+---+---+---+
|       |       |
+   +   +   +   +
|   |   |   |   |
+   +---+   +   +
|           |   |
+   +---+---+   +
|   |           |
+---+---+---+---+
";

const PRESS_MS: u64 = 200;
const BLOBS: [&str; 2] = [MAZE_BLOB, CALIBRATION_BLOB];
const TIME_LIMIT_MS: u64 = 600_000;

/// Copies the named blobs that `from` holds. Missing blobs are skipped.
fn copy_blobs(from: &mut dyn Storage, to: &mut dyn Storage) -> anyhow::Result<()> {
    let mut data = Vec::new();
    for name in BLOBS {
        if let Err(e) = from.load(name, &mut data) {
            log::debug!("Skipping {}: {:#}", name, e);
            continue;
        }
        to.save(name, &data)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logger::set_log(log::LevelFilter::Info)?;
    logger::set_panic_handler();

    let args: Vec<String> = std::env::args().collect();
    let mut config = match args.get(1) {
        Some(path) => Config::load(path),
        None => Config::default(),
    };
    let walls = match args.get(2) {
        Some(path) => WallGrid::from_ascii(&std::fs::read_to_string(path)?)?,
        None => {
            let walls = WallGrid::from_ascii(DEMO_MAZE)?;
            config.maze.goal = vec![GridPoint::new(3, 3)];
            walls
        }
    };
    config.maze.width = walls.width();
    config.maze.height = walls.height();

    let sim_config = SimConfig {
        cell_size: config.maze.cell_size,
        period: config.robot.period,
        ..SimConfig::default()
    };
    let mut sim = Simulator::new(&sim_config, walls, config.maze.start);

    // Blobs persist across invocations when a data directory is given.
    let mut files = match args.get(3) {
        Some(dir) => Some(FileStorage::new(dir)?),
        None => None,
    };
    if let Some(files) = files.as_mut() {
        copy_blobs(files, sim.memory())?;
    }
    let mut navigator = Navigator::new(&config);

    // The simulated clock is stepped, so the timer only paces the loop.
    let period_us = (config.robot.period * 1e6) as u64;
    let mut timer = LoopTimer::new(period_us, sim.clock().micros());
    let mut last_state = navigator.state();
    let mut solved = false;

    while sim.millis() < TIME_LIMIT_MS {
        if !timer.poll(sim.clock().micros()) {
            sim.step();
            continue;
        }
        sim.set_button(sim.millis() < PRESS_MS);
        navigator.tick(&mut sim);
        sim.step();

        let state = navigator.state();
        if state != last_state {
            match state {
                NavigatorState::WaitForRun if navigator.objective() == Objective::Solve => {
                    // Put the robot back on the start cell.
                    sim.set_pose(Pose::from_grid(config.maze.start, config.maze.cell_size));
                }
                NavigatorState::Idle if last_state == NavigatorState::Run => {
                    solved = true;
                }
                _ => {}
            }
            last_state = state;
        }
        if solved || matches!(state, NavigatorState::Error(_)) {
            break;
        }
    }

    println!("{}", navigator.maze());
    let route = navigator.maze().best_route();
    println!("Best route: {} cells", route.len());

    if let Some(files) = files.as_mut() {
        copy_blobs(sim.memory(), files)?;
    }

    let file = File::create("run_log.csv")?;
    navigator.run_log().save_csv(file)?;

    match navigator.state() {
        NavigatorState::Error(fault) => anyhow::bail!("Stopped with {:?}", fault),
        _ if !solved => anyhow::bail!("Timed out after {} ms", sim.millis()),
        _ => {
            log::info!("Solved in {} ms of simulated time", sim.millis());
            Ok(())
        }
    }
}
