// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Production video format.
//!
//! The production clock runs at a fixed frame rate. Every frame duration and
//! every encoder timestamp in this crate is derived from the [`VideoFormat`]
//! rather than from the media itself, which keeps pacing constant regardless
//! of what the decoder reports.

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Production video format.
///
/// # Examples
///
/// ```
/// use playout::format::VideoFormat;
///
/// let json = r#"{
///     "width": 1920,
///     "height": 1080,
///     "frame_rate": {"numerator": 25},
///     "interlace_mode": "interlaced_tff"
/// }"#;
///
/// let format = VideoFormat::from_json(json).unwrap();
/// assert_eq!(format.field_count(), 2);
/// assert_eq!(format.frame_duration_ms(), 40);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VideoFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate (e.g., 30000/1001 for 29.97 fps).
    pub frame_rate: Rate,
    /// Interlacing mode.
    #[serde(default = "default_interlace_mode")]
    pub interlace_mode: InterlaceMode,
}

impl VideoFormat {
    /// Creates a progressive format.
    pub fn progressive(width: u32, height: u32, frame_rate: Rate) -> Self {
        Self {
            width,
            height,
            frame_rate,
            interlace_mode: InterlaceMode::Progressive,
        }
    }

    /// Parses and validates a JSON format description.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] if the document is malformed
    /// * [`Error::InvalidFormat`] if the dimensions or rate are degenerate
    pub fn from_json(json: &str) -> Result<Self> {
        let format: Self = serde_json::from_str(json)?;
        format.validate()?;
        Ok(format)
    }

    /// Rejects zero dimensions and non-positive rates.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidFormat(format!(
                "{}x{} has an empty dimension",
                self.width, self.height
            )));
        }
        if self.frame_rate.numerator <= 0 || self.frame_rate.denominator <= 0 {
            return Err(Error::InvalidFormat(format!(
                "frame rate {}/{} is not positive",
                self.frame_rate.numerator, self.frame_rate.denominator
            )));
        }
        Ok(())
    }

    /// Number of fields per frame: 2 for interlaced modes, 1 otherwise.
    pub fn field_count(&self) -> usize {
        match self.interlace_mode {
            InterlaceMode::Progressive => 1,
            InterlaceMode::InterlacedTff | InterlaceMode::InterlacedBff => 2,
        }
    }

    /// Frames per second as a float.
    pub fn fps(&self) -> f64 {
        self.frame_rate.as_f64()
    }

    /// Duration of one frame in whole milliseconds (rounded).
    pub fn frame_duration_ms(&self) -> i64 {
        let num = i64::from(self.frame_rate.numerator.max(1));
        let den = i64::from(self.frame_rate.denominator.max(1));
        (1000 * den + num / 2) / num
    }

    /// Timing of the `index`-th frame of a constant-rate stream.
    ///
    /// The timestamp is computed from the counter each time instead of being
    /// accumulated, so rounding never drifts.
    pub fn frame_timing(&self, index: u64) -> FrameTiming {
        let pts = self.frame_rate.nanos_for(index);
        let next = self.frame_rate.nanos_for(index + 1);
        FrameTiming {
            pts: Duration::from_nanos(pts),
            duration: Duration::from_nanos(next - pts),
        }
    }

    /// Size in bytes of one BGRA frame.
    pub fn bgra_frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Presentation timestamp and duration of one frame pushed to an encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTiming {
    /// Presentation timestamp relative to the first frame.
    pub pts: Duration,
    /// Frame duration.
    pub duration: Duration,
}

/// Video interlacing mode.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterlaceMode {
    /// Progressive scan (non-interlaced).
    #[serde(rename = "progressive")]
    Progressive,
    /// Interlaced with top field first.
    #[serde(rename = "interlaced_tff")]
    InterlacedTff,
    /// Interlaced with bottom field first.
    #[serde(rename = "interlaced_bff")]
    InterlacedBff,
}

impl FromStr for InterlaceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "progressive" => Ok(Self::Progressive),
            "interlaced_tff" => Ok(Self::InterlacedTff),
            "interlaced_bff" => Ok(Self::InterlacedBff),
            other => Err(Error::InvalidFormat(format!(
                "unknown interlace mode '{other}'"
            ))),
        }
    }
}

fn default_interlace_mode() -> InterlaceMode {
    InterlaceMode::Progressive
}

/// Rational number representation for frame rates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate {
    /// Numerator of the rate.
    pub numerator: i32,
    /// Denominator of the rate (defaults to 1 if omitted in JSON).
    #[serde(default = "default_denominator")]
    pub denominator: i32,
}

impl Rate {
    /// Creates a rate of `numerator / denominator`.
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// The rate as a float.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator.max(1))
    }

    /// Nanoseconds elapsed after `count` periods.
    fn nanos_for(&self, count: u64) -> u64 {
        let num = self.numerator.max(1) as u128;
        let den = self.denominator.max(1) as u128;
        let ns = count as u128 * 1_000_000_000u128;
        let ns = ns * den;
        (ns / num) as u64
    }
}

/// Default denominator for rates.
fn default_denominator() -> i32 {
    1
}
