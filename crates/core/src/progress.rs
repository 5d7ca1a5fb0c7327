// Parsing of ffmpeg `-progress` output and per-job percentage tracking

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What ffmpeg reports it will do after a progress block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressState {
    #[default]
    Continue,
    End,
}

/// One `-progress` block. Fields are optional because ffmpeg reports `N/A`
/// (or omits keys) early in an encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInfo {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub bitrate: Option<String>,
    pub total_size: Option<u64>,
    pub out_time_us: Option<i64>,
    pub speed: Option<f64>,
    pub state: ProgressState,
}

impl ProgressInfo {
    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "frame" => self.frame = value.parse().ok(),
            "fps" => self.fps = value.parse().ok(),
            "bitrate" if value != "N/A" => self.bitrate = Some(value.to_string()),
            "total_size" => self.total_size = value.parse().ok(),
            // out_time_ms is also in microseconds; ffmpeg kept the old name
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse() {
                    self.out_time_us = Some(us);
                }
            }
            "speed" => self.speed = value.trim_end_matches('x').trim().parse().ok(),
            "progress" => {
                self.state = if value == "end" {
                    ProgressState::End
                } else {
                    ProgressState::Continue
                }
            }
            _ => {}
        }
    }
}

/// Parse a chunk of `key=value` lines as one block
pub fn parse_progress_block(text: &str) -> ProgressInfo {
    let mut info = ProgressInfo::default();
    for line in text.lines() {
        if let Some((key, value)) = line.trim().split_once('=') {
            info.apply(key.trim(), value);
        }
    }
    info
}

/// Incremental parser fed one stdout line at a time; yields a block at each
/// `progress=` terminator line.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: ProgressInfo,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> Option<ProgressInfo> {
        let (key, value) = line.trim().split_once('=')?;
        let key = key.trim();
        self.current.apply(key, value);
        if key == "progress" {
            Some(std::mem::take(&mut self.current))
        } else {
            None
        }
    }
}

/// Percentage of `length_us` covered by `out_time_us`, clamped to 0..=100.
/// Undefined ratios (zero length, NaN) are reported as 0.
pub fn percentage(out_time_us: i64, length_us: u64) -> f64 {
    let pct = out_time_us as f64 / length_us as f64 * 100.0;
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Progress of one running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub input: PathBuf,
    pub length_us: u64,
    pub out_time_us: u64,
    pub percentage: f64,
}

impl ProgressRecord {
    pub fn new(input: PathBuf, length_us: u64) -> Self {
        Self {
            input,
            length_us,
            out_time_us: 0,
            percentage: 0.0,
        }
    }

    pub fn update(&mut self, info: &ProgressInfo) {
        if let Some(us) = info.out_time_us {
            self.out_time_us = us.max(0) as u64;
            self.percentage = percentage(us, self.length_us);
        }
        if info.state == ProgressState::End {
            self.percentage = 100.0;
        }
    }
}
