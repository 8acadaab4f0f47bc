use crate::sensors::Panel;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PanelConfig {
    pub debounce_ms: u64,
    pub long_press_ms: u64,
    pub extra_long_press_ms: u64,
    pub wait_ms: u64, // delay between the gesture and the run
    pub calibration_samples: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            debounce_ms: 20,
            long_press_ms: 1000,
            extra_long_press_ms: 3000,
            wait_ms: 1000,
            calibration_samples: 200,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Gesture {
    Short,
    Long,
    ExtraLong,
}

/// Classifies button presses by their duration, reported on release.
#[derive(Debug, Clone)]
pub struct ButtonDebouncer {
    config: PanelConfig,
    stable: bool,
    candidate: bool,
    candidate_since: u64,
    pressed_at: u64,
}

impl ButtonDebouncer {
    pub fn new(config: &PanelConfig) -> Self {
        ButtonDebouncer {
            config: *config,
            stable: false,
            candidate: false,
            candidate_since: 0,
            pressed_at: 0,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    /// `level` is the raw button level at `now` [ms].
    pub fn update(&mut self, level: bool, now: u64) -> Option<Gesture> {
        if level != self.candidate {
            self.candidate = level;
            self.candidate_since = now;
        }
        if self.candidate == self.stable
            || now.saturating_sub(self.candidate_since) < self.config.debounce_ms
        {
            return None;
        }

        self.stable = self.candidate;
        if self.stable {
            self.pressed_at = self.candidate_since;
            return None;
        }

        let duration = self.candidate_since.saturating_sub(self.pressed_at);
        let gesture = if duration >= self.config.extra_long_press_ms {
            Gesture::ExtraLong
        } else if duration >= self.config.long_press_ms {
            Gesture::Long
        } else {
            Gesture::Short
        };
        log::debug!("Button released after {} ms: {:?}", duration, gesture);
        Some(gesture)
    }

    pub fn reset(&mut self) {
        self.stable = false;
        self.candidate = false;
    }
}

/// Solve run options taken from the panel switches.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub merge_straights: bool,
    pub smooth_turns: bool,
}

impl RunOptions {
    pub const MERGE_SWITCH: u8 = 0;
    pub const SMOOTH_SWITCH: u8 = 1;

    pub fn from_panel(panel: &dyn Panel) -> Self {
        RunOptions {
            merge_straights: panel.switch(Self::MERGE_SWITCH),
            smooth_turns: panel.switch(Self::SMOOTH_SWITCH),
        }
    }

    pub fn any(&self) -> bool {
        self.merge_straights || self.smooth_turns
    }
}
