use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub interval: u32, // ticks between records
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            interval: 10,
            capacity: 20_000,
        }
    }
}

/// One row of the run log.
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct TickRecord {
    pub time: f32, // [s]
    pub x: f32,
    pub y: f32,
    pub theta: f32,
    pub v: f32,
    pub omega: f32,
    pub target_v: f32,
    pub target_omega: f32,
    pub feedback_l: f32,
    pub feedback_r: f32,
    pub feedforward_l: f32,
    pub feedforward_r: f32,
    pub wall_bias: f32,
    pub action: &'static str,
}

pub struct RunLog {
    config: LogConfig,
    records: Vec<TickRecord>,
    counter: u32,
    is_full: bool,
}

impl RunLog {
    pub fn new(config: &LogConfig) -> Self {
        RunLog {
            config: *config,
            records: Vec::new(),
            counter: 0,
            is_full: false,
        }
    }

    pub fn start(&mut self) {
        log::info!("Start logging.");
        self.counter = 0;
        self.is_full = false;
        self.records.clear();
    }

    /// Keeps one record every `interval` calls until the buffer is full.
    pub fn record(&mut self, record: TickRecord) {
        if self.is_full {
            return;
        }
        self.counter += 1;
        if self.counter >= self.config.interval {
            self.counter = 0;
            self.records.push(record);
            if self.records.len() >= self.config.capacity {
                log::warn!("Log is full.");
                self.is_full = true;
            }
        }
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn is_full(&self) -> bool {
        self.is_full
    }

    pub fn save_csv<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        log::info!("Saving log data... ({} records)", self.records.len());
        let mut wtr = csv::Writer::from_writer(writer);
        for record in self.records.iter() {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.counter = 0;
        self.is_full = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(interval: u32, capacity: usize) -> RunLog {
        RunLog::new(&LogConfig { interval, capacity })
    }

    #[test]
    fn records_are_sampled() {
        let mut log = log(3, 100);
        for i in 0..10 {
            log.record(TickRecord {
                time: i as f32,
                ..TickRecord::default()
            });
        }
        let times: Vec<f32> = log.records().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![2.0, 5.0, 8.0]);
    }

    #[test]
    fn full_log_stops_recording() {
        let mut log = log(1, 2);
        for _ in 0..5 {
            log.record(TickRecord::default());
        }
        assert!(log.is_full());
        assert_eq!(log.records().len(), 2);
        log.clear();
        assert!(!log.is_full());
        assert!(log.records().is_empty());
    }

    #[test]
    fn csv_has_header_and_rows() {
        let mut log = log(1, 10);
        log.record(TickRecord {
            x: 0.09,
            action: "straight",
            ..TickRecord::default()
        });
        let mut out = Vec::new();
        log.save_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("time,x,y,theta"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("0.0,0.09,"));
        assert!(row.ends_with(",straight"));
        assert!(lines.next().is_none());
    }
}
