pub mod config;
pub mod filter;
pub mod follow_wall;
pub mod geometry;
pub mod logger;
pub mod mapping;
pub mod maze;
pub mod navigator;
pub mod odometry;
pub mod panel;
pub mod pid;
pub mod route;
pub mod run_log;
pub mod sensors;
pub mod sim;
pub mod speed_controller;
pub mod storage;
pub mod timer;
pub mod trajectory;
