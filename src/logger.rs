use log::{Level, LevelFilter, Metadata, Record};
use std::io::Write as _;
use std::panic::{self, PanicHookInfo};
use std::time::Instant;

/// Logs to stderr, stamped with the time since the logger was installed.
pub struct TickLogger {
    origin: Instant,
    level: Level,
}

impl TickLogger {
    pub fn new(level: Level) -> Self {
        TickLogger {
            origin: Instant::now(),
            level,
        }
    }

    fn time(&self) -> (u64, u64, u64, u64) {
        let us = self.origin.elapsed().as_micros() as u64;
        split_time(us)
    }
}

/// (minutes, seconds, milliseconds, microseconds)
fn split_time(us: u64) -> (u64, u64, u64, u64) {
    let ms = us / 1000;
    let sec = ms / 1000;
    (sec / 60, sec % 60, ms % 1000, us % 1000)
}

fn format_line(time: (u64, u64, u64, u64), level: Level, args: &std::fmt::Arguments) -> String {
    let (min, sec, ms, us) = time;
    format!(
        "[{:02}:{:02}:{:03}:{:03}] {} - {}",
        min, sec, ms, us, level, args
    )
}

impl log::Log for TickLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let line = format_line(self.time(), record.level(), record.args());
            let _ = writeln!(std::io::stderr(), "{}", line);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs the logger once per process.
pub fn set_log(log_level: LevelFilter) -> anyhow::Result<()> {
    let level = log_level.to_level().unwrap_or(Level::Error);
    log::set_boxed_logger(Box::new(TickLogger::new(level)))
        .map(|()| log::set_max_level(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to install the logger: {}", e))
}

fn panic_handler(info: &PanicHookInfo) {
    if let Some(location) = info.location() {
        log::error!(
            "Panic occurred in file '{}' at line {}",
            location.file(),
            location.line()
        );
    } else {
        log::error!("Panic occurred but can't get location information...");
    }
    log::error!("{}", info);
}

pub fn set_panic_handler() {
    panic::set_hook(Box::new(panic_handler));
}
