//! Top level state machine, ticked once per control period.

mod calibrate;
mod run;

pub use calibrate::{CalibrationStep, Calibrator};

use crate::config::{Config, RunSpeeds};
use crate::follow_wall::FollowWall;
use crate::geometry::Pose;
use crate::mapping::Mapping;
use crate::maze::{codec, Maze, UNREACHABLE};
use crate::odometry::Odometry;
use crate::panel::{ButtonDebouncer, Gesture, RunOptions};
use crate::pid::Pid;
use crate::route;
use crate::run_log::RunLog;
use crate::sensors::{Calibration, Platform};
use crate::speed_controller::SpeedController;
use anyhow::Context;
use run::RunState;

pub const MAZE_BLOB: &str = "maze";
pub const CALIBRATION_BLOB: &str = "calibration";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    SensorInit,
    Crash,
    NoPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Explore,
    Return,
    Solve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorState {
    Init,
    Idle,
    WaitForRun,
    Run,
    WaitForCalibrate,
    Calibrate,
    /// Terminal until reset.
    Error(Fault),
}

pub struct Navigator {
    config: Config,
    state: NavigatorState,
    objective: Objective,
    options: RunOptions,
    maze: Maze,
    mapping: Mapping,
    odometry: Odometry,
    speed_controller: SpeedController,
    follow_wall: FollowWall,
    heading_pid: Pid,
    calibration: Calibration,
    calibrator: Calibrator,
    button: ButtonDebouncer,
    run: RunState,
    run_log: RunLog,
    wait_until: u64, // [ms]
    last_tick: Option<u64>,
}

fn fresh_maze(config: &Config) -> Maze {
    Maze::new(
        config.maze.width,
        config.maze.height,
        config.maze.start,
        config.maze.goal.iter().copied(),
    )
}

impl Navigator {
    pub fn new(config: &Config) -> Self {
        let period = config.robot.period;
        Navigator {
            config: config.clone(),
            state: NavigatorState::Init,
            objective: Objective::Explore,
            options: RunOptions::default(),
            maze: fresh_maze(config),
            mapping: Mapping::new(&config.mapping, config.maze.cell_size),
            odometry: Odometry::new(&config.odometry, period),
            speed_controller: SpeedController::new(&config.control.speed, config.odometry.track_width),
            follow_wall: FollowWall::new(&config.control.follow_wall, period),
            heading_pid: Pid::new(&config.control.heading),
            calibration: config.sensors,
            calibrator: Calibrator::new(config.panel.calibration_samples, config.panel.wait_ms),
            button: ButtonDebouncer::new(&config.panel),
            run: RunState::default(),
            run_log: RunLog::new(&config.log),
            wait_until: 0,
            last_tick: None,
        }
    }

    pub fn state(&self) -> NavigatorState {
        self.state
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Route options of the current or last solve run.
    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn pose(&self) -> Pose {
        self.odometry.pose()
    }

    pub fn odometry(&self) -> &Odometry {
        &self.odometry
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn calibration_step(&self) -> Option<CalibrationStep> {
        match self.state {
            NavigatorState::Calibrate => Some(self.calibrator.step()),
            _ => None,
        }
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    fn speeds(&self) -> RunSpeeds {
        match self.objective {
            Objective::Explore => self.config.speeds.explore,
            Objective::Return => self.config.speeds.return_,
            Objective::Solve => self.config.speeds.solve,
        }
    }

    fn set_state(&mut self, state: NavigatorState) {
        if self.state != state {
            log::info!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn fail(&mut self, platform: &mut dyn Platform, fault: Fault) {
        log::error!("Fault: {:?} ({:?} run)", fault, self.objective);
        platform.motors().stop();
        platform.motors().disable();
        self.set_state(NavigatorState::Error(fault));
    }

    pub fn tick(&mut self, platform: &mut dyn Platform) {
        let now = platform.clock().micros();
        let elapsed = match self.last_tick {
            Some(last) => now.saturating_sub(last) as f32 * 1e-6,
            None => self.config.robot.period,
        };
        self.last_tick = Some(now);
        let now_ms = now / 1000;
        platform.imu().update();

        match self.state {
            NavigatorState::Init => self.init(platform),
            NavigatorState::Idle => self.idle(platform, now_ms),
            NavigatorState::WaitForRun => {
                if now_ms >= self.wait_until {
                    self.start_run(platform);
                }
            }
            NavigatorState::Run => self.run_tick(platform, elapsed),
            NavigatorState::WaitForCalibrate => {
                if now_ms >= self.wait_until {
                    self.calibrator.start(self.calibration);
                    self.set_state(NavigatorState::Calibrate);
                }
            }
            NavigatorState::Calibrate => self.calibrate_tick(platform, now_ms),
            NavigatorState::Error(_) => {}
        }
    }

    fn init(&mut self, platform: &mut dyn Platform) {
        if !platform.imu().was_initialized() {
            self.fail(platform, Fault::SensorInit);
            return;
        }
        match load_calibration(platform) {
            Ok(c) => {
                log::info!("Calibration loaded: {:?}", c);
                self.calibration = c;
            }
            Err(e) => log::info!("Using default calibration: {:#}", e),
        }
        platform.motors().disable();
        self.set_state(NavigatorState::Idle);
    }

    fn idle(&mut self, platform: &mut dyn Platform, now_ms: u64) {
        let level = platform.panel().is_pressed();
        match self.button.update(level, now_ms) {
            Some(Gesture::Short) => {
                self.maze = fresh_maze(&self.config);
                self.objective = Objective::Explore;
                self.wait(NavigatorState::WaitForRun, now_ms);
            }
            Some(Gesture::Long) => match load_maze(platform) {
                Ok(maze) => {
                    self.maze = maze;
                    self.objective = Objective::Solve;
                    self.options = RunOptions::from_panel(platform.panel());
                    self.wait(NavigatorState::WaitForRun, now_ms);
                }
                Err(e) => log::warn!("Cannot solve: {:#}", e),
            },
            Some(Gesture::ExtraLong) => self.wait(NavigatorState::WaitForCalibrate, now_ms),
            None => {}
        }
    }

    fn wait(&mut self, next: NavigatorState, now_ms: u64) {
        self.wait_until = now_ms + self.config.panel.wait_ms;
        self.set_state(next);
    }

    fn start_run(&mut self, platform: &mut dyn Platform) {
        let left = platform.left_wheel().get_position();
        let right = platform.right_wheel().get_position();
        let cell_size = self.config.maze.cell_size;
        match self.objective {
            Objective::Return => self.odometry.rebase(left, right),
            _ => self
                .odometry
                .reset(Pose::from_grid(self.maze.start(), cell_size), left, right),
        }
        self.speed_controller.reset();
        self.follow_wall.reset();
        self.heading_pid.reset();
        self.mapping.reset();
        self.button.reset();
        self.run = RunState::default();

        let position = self.odometry.pose().position.to_grid(cell_size);
        if self.maze.cost(position) == UNREACHABLE {
            log::error!("No path from ({}, {})", position.x, position.y);
            self.fail(platform, Fault::NoPath);
            return;
        }

        if self.objective == Objective::Solve && self.options.any() {
            let actions = route::plan(
                &self.maze.best_route(),
                cell_size,
                self.options,
                &self.config.speeds.solve.limits(),
            );
            if actions.is_empty() {
                self.fail(platform, Fault::NoPath);
                return;
            }
            log::info!("Solve run with {:?}, {} actions", self.options, actions.len());
            self.run.queue.extend(actions);
        }

        self.run_log.start();
        platform.motors().enable();
        log::info!("Start {:?} run", self.objective);
        self.set_state(NavigatorState::Run);
    }

    fn finish_run(&mut self, platform: &mut dyn Platform, now_ms: u64) {
        platform.motors().stop();
        platform.motors().disable();
        log::info!(
            "{:?} run finished in {:.2} s, {} slips",
            self.objective,
            self.run.time,
            self.odometry.slip_count()
        );

        match self.objective {
            Objective::Explore => {
                self.objective = Objective::Return;
                self.wait(NavigatorState::WaitForRun, now_ms);
            }
            Objective::Return => {
                let saved = codec::to_bytes(&self.maze)
                    .and_then(|data| platform.storage().save(MAZE_BLOB, &data));
                match saved {
                    Ok(()) => log::info!("Maze saved"),
                    Err(e) => log::warn!("Failed to save the maze: {:#}", e),
                }
                self.objective = Objective::Solve;
                self.options = RunOptions::from_panel(platform.panel());
                self.wait(NavigatorState::WaitForRun, now_ms);
            }
            Objective::Solve => self.set_state(NavigatorState::Idle),
        }
    }

    fn calibrate_tick(&mut self, platform: &mut dyn Platform, now_ms: u64) {
        let calibration = match self.calibrator.tick(platform, now_ms) {
            Some(c) => c,
            None => return,
        };
        log::info!("Calibration finished: {:?}", calibration);
        self.calibration = calibration;
        let saved = serde_json::to_vec(&calibration)
            .map_err(anyhow::Error::from)
            .and_then(|data| platform.storage().save(CALIBRATION_BLOB, &data));
        if let Err(e) = saved {
            log::warn!("Failed to save the calibration: {:#}", e);
        }
        self.set_state(NavigatorState::Idle);
    }
}

fn load_calibration(platform: &mut dyn Platform) -> anyhow::Result<Calibration> {
    let mut data = Vec::new();
    platform.storage().load(CALIBRATION_BLOB, &mut data)?;
    let calibration = serde_json::from_slice(&data).context("Malformed calibration")?;
    Ok(calibration)
}

/// Loads the persisted maze, ready to be solved.
fn load_maze(platform: &mut dyn Platform) -> anyhow::Result<Maze> {
    let mut data = Vec::new();
    platform.storage().load(MAZE_BLOB, &mut data)?;
    let mut maze = codec::from_bytes(&data)?;
    maze.set_returning(false);
    maze.set_exploring(false);
    if maze.best_route().is_empty() {
        maze.build_best_route();
    }
    Ok(maze)
}
