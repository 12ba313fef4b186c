// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Playout Buffer and Field Sequencer.
//!
//! The buffer sits between the Clip Scheduler (the only producer) and the
//! production clock (the only consumer). The scheduler blocks on a full
//! buffer; the clock never waits for more than the mutex.
//!
//! ## Field sequencing
//! Every pending frame carries a sequence number. For interlaced output,
//! even sequence numbers start on field A and odd ones on field B; a parity
//! mismatch on the advancing call is reported as underflow so field order
//! can never desync.
//!
//! ## Delivery
//! * [`PlayoutBuffer::last_frame`] never advances. On the first field it may
//!   adopt the buffer head as the held frame (after a seek, or at startup).
//! * [`PlayoutBuffer::next_frame`] advances, holds the last frame at the end
//!   of a clip, or reports underflow.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::{
    clip::ClipWindow,
    diagnostics::{self, Diagnostics, TagSeverity},
};

/// Field requested by the production clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoField {
    /// A whole progressive frame.
    Progressive,
    /// First field of an interlaced pair.
    A,
    /// Second field of an interlaced pair.
    B,
}

/// Result of one delivery call.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery<F> {
    /// A newly advanced frame.
    Frame(F),
    /// The held frame, repeated.
    Still(F),
    /// Nothing to show this tick.
    Empty,
}

impl<F> Delivery<F> {
    /// The delivered frame, if any.
    pub fn frame(&self) -> Option<&F> {
        match self {
            Self::Frame(frame) | Self::Still(frame) => Some(frame),
            Self::Empty => None,
        }
    }

    /// Whether this is an underflow (or nothing held yet).
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A converted frame waiting for its tick.
#[derive(Clone, Debug)]
pub struct PendingFrame<F> {
    /// Production-ready frame.
    pub frame: F,
    /// Presentation timestamp in milliseconds.
    pub pts: i64,
    /// Duration in milliseconds.
    pub duration: i64,
    /// Monotonic sequence number; parity selects the field.
    pub sequence: u64,
}

impl<F> PendingFrame<F> {
    fn starts_on(&self, field: VideoField) -> bool {
        match field {
            VideoField::Progressive => true,
            VideoField::A => self.sequence % 2 == 0,
            VideoField::B => self.sequence % 2 == 1,
        }
    }
}

struct PlayoutState<F> {
    queue: VecDeque<PendingFrame<F>>,
    current: Option<F>,
    frame_time: i64,
    frame_duration: i64,
    flush: bool,
    /// Underflowed ticks since the last delivery; `None` once recovered.
    latency: Option<u64>,
}

/// Bounded frame buffer shared by the Clip Scheduler and the clock.
pub struct PlayoutBuffer<F> {
    state: Mutex<PlayoutState<F>>,
    space: Condvar,
    capacity: usize,
    lookahead: usize,
    interlaced: bool,
    end_of_clip: AtomicBool,
    diagnostics: Arc<Diagnostics>,
}

impl<F: Clone> PlayoutBuffer<F> {
    /// Creates an empty buffer.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of pending frames
    /// * `lookahead` - Frames required before advancing after a flush
    /// * `field_count` - 2 enables field parity checks
    /// * `diagnostics` - Receives `buffer`, `frame-time` and `underflow`
    pub fn new(
        capacity: usize,
        lookahead: usize,
        field_count: usize,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(PlayoutState {
                queue: VecDeque::with_capacity(capacity),
                current: None,
                frame_time: 0,
                frame_duration: 0,
                flush: true,
                latency: Some(0),
            }),
            space: Condvar::new(),
            capacity,
            lookahead: lookahead.min(capacity),
            interlaced: field_count == 2,
            end_of_clip: AtomicBool::new(false),
            diagnostics,
        }
    }

    /// Appends a frame, blocking while the buffer is full.
    ///
    /// `cancel` is evaluated under the lock before every wait and once more
    /// before inserting; when it returns `true` the frame is dropped.
    ///
    /// # Returns
    /// `true` if the frame was queued.
    pub fn push(&self, pending: PendingFrame<F>, cancel: impl Fn() -> bool) -> bool {
        let mut state = self.state.lock();
        while state.queue.len() >= self.capacity && !cancel() {
            self.space.wait(&mut state);
        }
        if cancel() {
            return false;
        }
        state.queue.push_back(pending);
        self.report_occupancy(state.queue.len());
        true
    }

    /// Returns the held frame without advancing.
    pub fn last_frame(&self, field: VideoField) -> Delivery<F> {
        let mut state = self.state.lock();
        if field != VideoField::B && (state.flush || state.current.is_none()) {
            let head = state
                .queue
                .front()
                .map(|head| (head.frame.clone(), head.pts, head.duration));
            if let Some((frame, pts, duration)) = head {
                state.current = Some(frame);
                state.frame_time = pts;
                state.frame_duration = duration;
                state.flush = false;
            }
        }
        state
            .current
            .clone()
            .map_or(Delivery::Empty, Delivery::Still)
    }

    /// Advances to the next frame for `field`.
    ///
    /// # Arguments
    /// * `field` - Field the clock is about to show
    /// * `window` - Current clip window, bounds end-of-clip extrapolation
    /// * `input_duration` - Media duration in milliseconds (0 if unknown)
    pub fn next_frame(
        &self,
        field: VideoField,
        window: &ClipWindow,
        input_duration: i64,
    ) -> Delivery<F> {
        let mut state = self.state.lock();

        // Nothing more will arrive at end of clip, so a short tail is not
        // held back by the look-ahead.
        let starved = state.queue.is_empty()
            || (state.flush && state.queue.len() < self.lookahead && !self.is_end_of_clip());
        if starved {
            if self.is_end_of_clip() && !state.flush {
                let end = window.end().unwrap_or(i64::MAX);
                if state.frame_time < end && state.frame_duration != 0 {
                    state.frame_time += state.frame_duration;
                } else if state.frame_time < end {
                    state.frame_time = input_duration;
                }
                return state
                    .current
                    .clone()
                    .map_or(Delivery::Empty, Delivery::Still);
            }
            return self.underflow(&mut state);
        }

        if self.interlaced
            && state
                .queue
                .front()
                .is_some_and(|head| !head.starts_on(field))
        {
            return self.underflow(&mut state);
        }

        let Some(pending) = state.queue.pop_front() else {
            return self.underflow(&mut state);
        };

        if let Some(ticks) = state.latency.take() {
            info!(
                source = %self.diagnostics.name(),
                ticks,
                "Frame delivery resumed"
            );
        }

        state.current = Some(pending.frame.clone());
        state.frame_time = pending.pts;
        state.frame_duration = pending.duration;
        state.flush = false;
        self.space.notify_all();

        self.report_occupancy(state.queue.len());
        self.diagnostics
            .set_value(diagnostics::FRAME_TIME, pending.pts as f64 / 1000.0);
        Delivery::Frame(pending.frame)
    }

    fn underflow(&self, state: &mut PlayoutState<F>) -> Delivery<F> {
        state.latency = Some(state.latency.map_or(1, |ticks| ticks + 1));
        self.diagnostics
            .set_tag(TagSeverity::Warning, diagnostics::UNDERFLOW);
        Delivery::Empty
    }

    fn report_occupancy(&self, len: usize) {
        self.diagnostics
            .set_value(diagnostics::BUFFER, len as f64 / self.capacity as f64);
    }

    /// True once a frame is buffered or held.
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock();
        !state.queue.is_empty() || state.current.is_some()
    }

    /// Timestamp of the held frame in milliseconds.
    pub fn time(&self) -> i64 {
        self.state.lock().frame_time
    }

    /// Duration of the held frame in milliseconds.
    pub fn frame_duration(&self) -> i64 {
        self.state.lock().frame_duration
    }

    /// Whether the next advance waits for the flush look-ahead.
    pub fn is_flushing(&self) -> bool {
        self.state.lock().flush
    }

    /// Requires the look-ahead before the next advance.
    pub fn begin_flush(&self) {
        self.state.lock().flush = true;
    }

    /// Drops every pending frame, marks a flush and wakes a blocked push.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        state.flush = true;
        self.space.notify_all();
        self.report_occupancy(0);
        debug!(source = %self.diagnostics.name(), dropped, "Playout buffer cleared");
    }

    /// Wakes a blocked push so it can re-evaluate its cancel condition.
    pub fn wake(&self) {
        let _state = self.state.lock();
        self.space.notify_all();
    }

    /// Number of pending frames.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether no frame is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pending frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set by the Clip Scheduler once the clip's end has been produced.
    pub fn set_end_of_clip(&self, end_of_clip: bool) {
        self.end_of_clip.store(end_of_clip, Ordering::Release);
    }

    pub fn is_end_of_clip(&self) -> bool {
        self.end_of_clip.load(Ordering::Acquire)
    }
}
