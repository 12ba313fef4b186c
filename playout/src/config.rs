// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Producer, consumer and engine configuration.
//!
//! All structures deserialize from JSON with every tunable defaulted, so a
//! minimal document only names the media:
//!
//! ```
//! use playout::config::ProducerConfig;
//!
//! let config = ProducerConfig::from_json(r#"{"path": "clip.mov", "loop": true}"#).unwrap();
//! assert!(config.looping);
//! assert_eq!(config.start, 0);
//! assert_eq!(config.duration, None);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Result, format::VideoFormat};

/// Engine tunables shared by the Sample Source, Clip Scheduler and
/// Playout Buffer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlayoutSettings {
    /// Playout buffer capacity in frames. `None` derives it from the
    /// production rate (a quarter second, at least the flush look-ahead).
    pub buffer_capacity: Option<usize>,
    /// Frames that must be buffered before the first frame after a seek is
    /// delivered.
    pub flush_lookahead: usize,
    /// Frames that must be produced since the last loop point before the
    /// clip may loop again.
    pub loop_min_frames: u64,
    /// Decoded video samples held between the graph and the scheduler.
    pub video_queue_capacity: usize,
    /// Decoded audio samples held between the graph and the scheduler.
    pub audio_queue_capacity: usize,
    /// Upper bound of one bus poll in the monitor thread.
    pub monitor_poll_ms: u64,
    /// Scheduler sleep while holding the end of a clip.
    pub idle_sleep_ms: u64,
}

impl Default for PlayoutSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: None,
            flush_lookahead: 4,
            loop_min_frames: 2,
            video_queue_capacity: 64,
            audio_queue_capacity: 128,
            monitor_poll_ms: 100,
            idle_sleep_ms: 10,
        }
    }
}

impl PlayoutSettings {
    /// Effective playout buffer capacity for `format`.
    pub fn buffer_capacity_for(&self, format: &VideoFormat) -> usize {
        let derived = (format.fps() / 4.0) as usize;
        self.buffer_capacity
            .unwrap_or(derived)
            .max(self.flush_lookahead)
            .max(1)
    }
}

/// Clip trim points expressed the way playout commands express them.
///
/// `in` is where the clip starts, `seek` where playback begins, and the
/// end is given either as a `length` from `in` or as an absolute `out`
/// (`out` wins when both are present).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipRange {
    /// Clip start in milliseconds.
    pub r#in: Option<i64>,
    /// Initial playback position in milliseconds.
    pub seek: Option<i64>,
    /// Clip length in milliseconds.
    pub length: Option<i64>,
    /// Clip end in milliseconds.
    pub out: Option<i64>,
}

/// Configuration of one clip producer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProducerConfig {
    /// Label used in logs and the status line. Defaults to the path.
    #[serde(default)]
    pub name: String,
    /// Media path or URI.
    pub path: String,
    /// Video filter description (`scale=W:H,format=yuv420p,fps=N`).
    #[serde(default)]
    pub vfilter: Option<String>,
    /// Clip start in milliseconds.
    #[serde(default)]
    pub start: i64,
    /// Initial seek in milliseconds.
    #[serde(default)]
    pub seek: Option<i64>,
    /// Clip duration in milliseconds; `None` plays to the natural end.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Restart at `start` when the clip ends.
    #[serde(rename = "loop", default)]
    pub looping: bool,
    /// Folder searched for relative media names.
    #[serde(default)]
    pub media_folder: Option<PathBuf>,
}

impl ProducerConfig {
    /// Configuration playing `path` from the beginning to its end.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            path: path.into(),
            vfilter: None,
            start: 0,
            seek: None,
            duration: None,
            looping: false,
            media_folder: None,
        }
    }

    /// Parses a JSON producer configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Applies trim points given as in/seek/length/out.
    pub fn with_range(mut self, range: ClipRange) -> Self {
        let seek = range.seek.unwrap_or(0);
        let start = range.r#in.unwrap_or(seek);
        let seek = if range.seek.is_some() { seek } else { start };
        let out = range
            .out
            .or_else(|| range.length.map(|length| start.saturating_add(length)));

        self.start = start;
        self.seek = (seek != 0).then_some(seek);
        self.duration = out.map(|out| (out - start).max(0));
        self
    }

    /// The name to report, falling back to the path.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.path
        } else {
            &self.name
        }
    }
}

/// Configuration of one frame consumer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConsumerConfig {
    /// Output path or URL.
    pub path: String,
    /// Encoder options (`-vcodec x264 -vbitrate 5000 ...`).
    #[serde(default)]
    pub args: String,
    /// Favor latency over completeness (capacity-1 capture queue).
    #[serde(default)]
    pub realtime: bool,
}

impl ConsumerConfig {
    /// Parses a JSON consumer configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Rate;

    #[test]
    fn length_is_relative_to_in() {
        let config = ProducerConfig::new("clip.mov").with_range(ClipRange {
            r#in: Some(1000),
            length: Some(500),
            ..Default::default()
        });
        assert_eq!(config.start, 1000);
        assert_eq!(config.seek, Some(1000));
        assert_eq!(config.duration, Some(500));
    }

    #[test]
    fn out_overrides_length() {
        let config = ProducerConfig::new("clip.mov").with_range(ClipRange {
            r#in: Some(200),
            seek: Some(400),
            length: Some(10_000),
            out: Some(1200),
        });
        assert_eq!(config.start, 200);
        assert_eq!(config.seek, Some(400));
        assert_eq!(config.duration, Some(1000));
    }

    #[test]
    fn no_range_plays_everything() {
        let config = ProducerConfig::new("clip.mov").with_range(ClipRange::default());
        assert_eq!(config.start, 0);
        assert_eq!(config.seek, None);
        assert_eq!(config.duration, None);
    }

    #[test]
    fn capacity_never_below_lookahead() {
        let settings = PlayoutSettings::default();
        let slow = VideoFormat::progressive(640, 480, Rate::new(10, 1));
        let fast = VideoFormat::progressive(640, 480, Rate::new(60, 1));
        assert_eq!(settings.buffer_capacity_for(&slow), 4);
        assert_eq!(settings.buffer_capacity_for(&fast), 15);
    }

    #[test]
    fn settings_fill_defaults() {
        let settings: PlayoutSettings = serde_json::from_str(r#"{"loop_min_frames": 5}"#).unwrap();
        assert_eq!(settings.loop_min_frames, 5);
        assert_eq!(settings.flush_lookahead, 4);
        assert_eq!(settings.video_queue_capacity, 64);
    }
}
