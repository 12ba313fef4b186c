// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Clip Scheduler.
//!
//! A dedicated thread that moves decoded samples from the Sample Source into
//! the Playout Buffer. It is driven by sample availability, not by a timer:
//!
//! 1. Consume a pending seek (forward it, flush the buffer state, restart)
//! 2. At end of clip: loop back to `start`, or idle and let the clock hold
//!    the last frame
//! 3. Pop one sample, convert it, push it under backpressure
//! 4. Nothing decoded yet: back off, with a debounced diagnostic
//!
//! Samples are popped from the source before the buffer lock is taken, so
//! the source's queues and the buffer's mutex are never held together.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, info, trace, warn};

use crate::{
    buffer::{PendingFrame, PlayoutBuffer},
    clip::ClipControl,
    config::PlayoutSettings,
    graph::{FrameFactory, GraphBuilder},
    sample::MediaSample,
    source::SampleSource,
};

/// Misses after which the back-off grows from [`SHORT_BACKOFF`] to [`LONG_BACKOFF`].
const BACKOFF_THRESHOLD: u64 = 25;
const SHORT_BACKOFF: Duration = Duration::from_millis(5);
const LONG_BACKOFF: Duration = Duration::from_millis(20);
/// One "waiting for frame" warning per this many consecutive misses.
const MISS_REPORT_INTERVAL: u64 = 500;
const MISS_REPORT_OFFSET: u64 = 100;

/// Scheduler thread state.
pub struct ClipScheduler<B: GraphBuilder, F: FrameFactory<B::Sample>> {
    name: String,
    source: Arc<SampleSource<B>>,
    factory: Arc<F>,
    buffer: Arc<PlayoutBuffer<F::Frame>>,
    control: Arc<ClipControl>,
    abort: Arc<AtomicBool>,
    frame_duration: i64,
    loop_min_frames: u64,
    idle: Duration,

    sequence: u64,
    last_end: Option<i64>,
    frames_since_loop: u64,
    misses: u64,
}

impl<B: GraphBuilder, F: FrameFactory<B::Sample>> ClipScheduler<B, F> {
    /// Creates a scheduler for one clip.
    ///
    /// `frame_duration` is the production frame duration in milliseconds;
    /// every frame gets exactly this duration regardless of the sample.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        source: Arc<SampleSource<B>>,
        factory: Arc<F>,
        buffer: Arc<PlayoutBuffer<F::Frame>>,
        control: Arc<ClipControl>,
        abort: Arc<AtomicBool>,
        frame_duration: i64,
        settings: &PlayoutSettings,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            factory,
            buffer,
            control,
            abort,
            frame_duration,
            loop_min_frames: settings.loop_min_frames,
            idle: Duration::from_millis(settings.idle_sleep_ms.max(1)),
            sequence: 0,
            last_end: None,
            frames_since_loop: 0,
            misses: 0,
        }
    }

    /// Runs the scheduler on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("playout-scheduler".into())
            .spawn(move || self.run())
    }

    /// Loops until the abort flag is raised.
    pub fn run(mut self) {
        debug!(source = %self.name, "Scheduler started");
        while !self.abort.load(Ordering::Acquire) {
            self.step();
        }
        debug!(source = %self.name, frames = self.sequence, "Scheduler stopped");
    }

    fn step(&mut self) {
        if let Some(position) = self.control.take_seek() {
            self.source.seek(position, true);
            self.restart();
            self.sequence = 0;
            self.buffer.begin_flush();
            return;
        }

        let window = self.control.window();
        let past_end = self.last_end.is_some_and(|end| window.is_past_end(end));
        // EOS is only final once everything decoded before it was consumed.
        let drained = self.source.is_eof() && self.source.video_len() == 0;
        let end_of_clip = drained || past_end;
        self.buffer.set_end_of_clip(end_of_clip);

        if end_of_clip {
            if window.looping && self.frames_since_loop >= self.loop_min_frames {
                info!(source = %self.name, start = window.start, "Looping clip");
                self.source.seek(window.start, true);
                self.restart();
                self.buffer.set_end_of_clip(false);
            } else {
                thread::sleep(self.idle);
            }
            return;
        }

        let Some(sample) = self.source.try_pop_video() else {
            self.missed();
            return;
        };
        self.misses = 0;

        let pts = sample
            .pts_ns()
            .map(|ns| (ns / 1_000_000) as i64)
            .or(self.last_end)
            .unwrap_or(window.start);
        if pts < window.start {
            trace!(source = %self.name, pts, start = window.start, "Sample before clip start dropped");
            return;
        }
        if window.is_past_end(pts) {
            self.last_end = Some(pts);
            return;
        }

        let frame = match self.factory.make_frame(sample) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(source = %self.name, pts, "Sample skipped: {e}");
                return;
            }
        };
        let pending = PendingFrame {
            frame,
            pts,
            duration: self.frame_duration,
            sequence: self.sequence,
        };

        let control = &self.control;
        let abort = &self.abort;
        let pushed = self.buffer.push(pending, || {
            control.seek_pending() || abort.load(Ordering::Acquire)
        });
        if pushed {
            self.sequence += 1;
            self.frames_since_loop += 1;
            self.last_end = Some(pts + self.frame_duration);
        }
    }

    fn restart(&mut self) {
        self.last_end = None;
        self.frames_since_loop = 0;
        self.misses = 0;
    }

    fn missed(&mut self) {
        self.misses += 1;
        if self.misses % MISS_REPORT_INTERVAL == MISS_REPORT_OFFSET {
            warn!(source = %self.name, misses = self.misses, "Waiting for frame");
        }
        thread::sleep(if self.misses > BACKOFF_THRESHOLD {
            LONG_BACKOFF
        } else {
            SHORT_BACKOFF
        });
    }
}
