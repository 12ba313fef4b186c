// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Clip trim, loop and seek control.
//!
//! Control calls arrive on arbitrary threads and must not block the
//! production clock, so the clip window lives in atomics. The control API
//! is the only writer of `start`, `duration` and `loop`; the seek slot is
//! written by the control API and cleared by the Clip Scheduler.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::{Error, Result};

const UNBOUNDED: i64 = i64::MAX;
const NO_SEEK: i64 = -1;

/// Snapshot of the clip trim points, read once per scheduler iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipWindow {
    /// Clip start in milliseconds.
    pub start: i64,
    /// Clip duration in milliseconds; `None` plays to the natural end.
    pub duration: Option<i64>,
    /// Restart at `start` when the end is reached.
    pub looping: bool,
}

impl ClipWindow {
    /// Effective end, only when the duration is finite.
    pub fn end(&self) -> Option<i64> {
        self.duration.map(|d| self.start.saturating_add(d))
    }

    /// Whether `time` is at or past the effective end.
    pub fn is_past_end(&self, time: i64) -> bool {
        self.end().is_some_and(|end| time >= end)
    }
}

/// Atomic clip window plus the pending seek request.
#[derive(Debug)]
pub struct ClipControl {
    start: AtomicI64,
    duration: AtomicI64,
    looping: AtomicBool,
    seek: AtomicI64,
}

impl ClipControl {
    /// Creates a control block for `window`.
    pub fn new(window: ClipWindow) -> Self {
        Self {
            start: AtomicI64::new(window.start.max(0)),
            duration: AtomicI64::new(window.duration.map_or(UNBOUNDED, |d| d.max(0))),
            looping: AtomicBool::new(window.looping),
            seek: AtomicI64::new(NO_SEEK),
        }
    }

    /// Current trim points.
    pub fn window(&self) -> ClipWindow {
        let duration = self.duration.load(Ordering::Acquire);
        ClipWindow {
            start: self.start.load(Ordering::Acquire),
            duration: (duration != UNBOUNDED).then_some(duration),
            looping: self.looping.load(Ordering::Acquire),
        }
    }

    pub fn set_start(&self, start: i64) {
        self.start.store(start.max(0), Ordering::Release);
    }

    pub fn set_duration(&self, duration: Option<i64>) {
        self.duration
            .store(duration.map_or(UNBOUNDED, |d| d.max(0)), Ordering::Release);
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    /// Posts a seek; a later request replaces an unconsumed one.
    pub fn request_seek(&self, position: i64) {
        self.seek.store(position.max(0), Ordering::Release);
    }

    /// Consumes the pending seek, if any.
    pub fn take_seek(&self) -> Option<i64> {
        let position = self.seek.swap(NO_SEEK, Ordering::AcqRel);
        (position != NO_SEEK).then_some(position)
    }

    /// Whether a seek is waiting to be consumed.
    pub fn seek_pending(&self) -> bool {
        self.seek.load(Ordering::Acquire) != NO_SEEK
    }
}

/// Where a `SEEK` command is anchored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekTarget {
    /// An absolute position in milliseconds.
    Absolute(i64),
    /// The current playback time.
    Relative,
    /// The clip start.
    In,
    /// The clip end.
    Out,
    /// The end of the media.
    End,
}

/// Clip control command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipCommand {
    /// Sets looping, or toggles when no value is given.
    Loop(Option<bool>),
    /// Sets the clip start.
    In(i64),
    /// Sets the clip end (duration becomes `out - start`).
    Out(i64),
    /// Sets the clip duration.
    Length(i64),
    /// Seeks to `target + offset`.
    Seek(SeekTarget, i64),
}

impl ClipCommand {
    /// Parses `LOOP [0|1]`, `IN|START n`, `OUT n`, `LENGTH n` and
    /// `SEEK [REL|IN|OUT|END|n] [offset]`, case-insensitively.
    ///
    /// # Examples
    ///
    /// ```
    /// use playout::clip::{ClipCommand, SeekTarget};
    ///
    /// assert_eq!(
    ///     ClipCommand::parse(&["seek", "rel", "-40"]).unwrap(),
    ///     ClipCommand::Seek(SeekTarget::Relative, -40)
    /// );
    /// ```
    pub fn parse(params: &[&str]) -> Result<Self> {
        let Some(cmd) = params.first() else {
            return Err(Error::InvalidCommand("empty command".into()));
        };
        let value = params.get(1).copied();
        let number = |text: Option<&str>| -> Result<i64> {
            let text = text.ok_or_else(|| Error::InvalidCommand(format!("{cmd} needs a value")))?;
            text.parse()
                .map_err(|_| Error::InvalidCommand(format!("'{text}' is not a number")))
        };

        match cmd.to_lowercase().as_str() {
            "loop" => Ok(Self::Loop(match value {
                None => None,
                Some(v) => Some(number(Some(v))? != 0),
            })),
            "in" | "start" => Ok(Self::In(number(value)?)),
            "out" => Ok(Self::Out(number(value)?)),
            "length" => Ok(Self::Length(number(value)?)),
            "seek" => {
                let target = match value.map(str::to_lowercase).as_deref() {
                    Some("rel") => SeekTarget::Relative,
                    Some("in") => SeekTarget::In,
                    Some("out") => SeekTarget::Out,
                    Some("end") => SeekTarget::End,
                    _ => SeekTarget::Absolute(number(value)?),
                };
                let offset = match params.get(2) {
                    Some(offset) => number(Some(offset))?,
                    None => 0,
                };
                Ok(Self::Seek(target, offset))
            }
            other => Err(Error::InvalidCommand(format!("unknown command '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_is_consumed_once() {
        let control = ClipControl::new(ClipWindow {
            start: 0,
            duration: None,
            looping: false,
        });
        assert_eq!(control.take_seek(), None);
        control.request_seek(-20);
        assert!(control.seek_pending());
        assert_eq!(control.take_seek(), Some(0));
        assert_eq!(control.take_seek(), None);
    }

    #[test]
    fn unbounded_duration_has_no_end() {
        let control = ClipControl::new(ClipWindow {
            start: 500,
            duration: None,
            looping: true,
        });
        let window = control.window();
        assert_eq!(window.end(), None);
        assert!(!window.is_past_end(i64::MAX - 1));

        control.set_duration(Some(1000));
        let window = control.window();
        assert_eq!(window.end(), Some(1500));
        assert!(window.is_past_end(1500));
        assert!(!window.is_past_end(1499));
    }

    #[test]
    fn parses_commands() {
        assert_eq!(ClipCommand::parse(&["LOOP"]).unwrap(), ClipCommand::Loop(None));
        assert_eq!(
            ClipCommand::parse(&["loop", "0"]).unwrap(),
            ClipCommand::Loop(Some(false))
        );
        assert_eq!(ClipCommand::parse(&["START", "80"]).unwrap(), ClipCommand::In(80));
        assert_eq!(
            ClipCommand::parse(&["seek", "1200"]).unwrap(),
            ClipCommand::Seek(SeekTarget::Absolute(1200), 0)
        );
        assert_eq!(
            ClipCommand::parse(&["SEEK", "END", "-1000"]).unwrap(),
            ClipCommand::Seek(SeekTarget::End, -1000)
        );
        assert!(ClipCommand::parse(&["seek"]).is_err());
        assert!(ClipCommand::parse(&["rewind"]).is_err());
    }
}
