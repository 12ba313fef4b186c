// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Clip producer: the production-clock facing side of one clip.
//!
//! A [`ClipProducer`] wires a [`SampleSource`], a [`ClipScheduler`] thread
//! and a [`PlayoutBuffer`] together. Every method is safe to call from the
//! clock thread: deliveries take one mutex, control calls are atomic writes
//! picked up by the scheduler on its next iteration.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use serde_json::{Value, json};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    Result,
    buffer::{Delivery, PlayoutBuffer, VideoField},
    clip::{ClipCommand, ClipControl, ClipWindow, SeekTarget},
    config::{PlayoutSettings, ProducerConfig},
    diagnostics::Diagnostics,
    format::VideoFormat,
    graph::{DecodeRequest, FrameFactory, GraphBuilder},
    request::resolve_media_uri,
    scheduler::ClipScheduler,
    source::SampleSource,
};

/// Key/value snapshot published to a monitoring surface.
pub type MonitorState = BTreeMap<String, Value>;

/// Where a clip is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipPhase {
    /// A seek was requested and not yet forwarded to the graph.
    Seeking,
    /// Waiting for enough frames to deliver.
    Buffering,
    /// Delivering frames.
    Playing,
    /// Past the end with looping disabled; the last frame is held.
    EndHold,
    /// Past the end, about to restart at the clip start.
    Looping,
}

/// One playing clip.
pub struct ClipProducer<B: GraphBuilder, F: FrameFactory<B::Sample>> {
    id: Uuid,
    name: String,
    path: String,
    format: VideoFormat,
    source: Arc<SampleSource<B>>,
    buffer: Arc<PlayoutBuffer<F::Frame>>,
    control: Arc<ClipControl>,
    abort: Arc<AtomicBool>,
    diagnostics: Arc<Diagnostics>,
    scheduler: Option<JoinHandle<()>>,
}

impl<B: GraphBuilder, F: FrameFactory<B::Sample>> ClipProducer<B, F> {
    /// Opens a clip and starts decoding.
    ///
    /// # Arguments
    /// * `builder` - Decode graph factory
    /// * `factory` - Sample to frame conversion
    /// * `format` - Production format (frame rate, interlacing)
    /// * `config` - Media, trim points and loop flag
    /// * `settings` - Engine tunables
    ///
    /// # Errors
    /// Construction errors only: an empty or unresolvable path, an invalid
    /// format, a graph that cannot be built, or a thread that cannot be
    /// spawned. The producer never fails after this point.
    pub fn new(
        builder: B,
        factory: F,
        format: VideoFormat,
        config: ProducerConfig,
        settings: PlayoutSettings,
    ) -> Result<Self> {
        format.validate()?;
        let uri = resolve_media_uri(&config.path, config.media_folder.as_deref())?;
        let name = config.display_name().to_string();
        let diagnostics = Diagnostics::new(name.clone());

        let mut options = BTreeMap::new();
        if let Some(vfilter) = &config.vfilter {
            options.insert("vf".to_string(), vfilter.clone());
        }
        let request = DecodeRequest {
            uri,
            format: format.clone(),
            options,
        };

        let source = Arc::new(SampleSource::new(
            builder,
            request,
            &settings,
            // Looping restarts at the clip start, which only the scheduler knows.
            false,
            diagnostics.clone(),
        )?);
        let buffer = Arc::new(PlayoutBuffer::new(
            settings.buffer_capacity_for(&format),
            settings.flush_lookahead,
            format.field_count(),
            diagnostics.clone(),
        ));
        let control = Arc::new(ClipControl::new(ClipWindow {
            start: config.start,
            duration: config.duration,
            looping: config.looping,
        }));
        match config.seek {
            Some(seek) => control.request_seek(seek),
            None if config.start > 0 => control.request_seek(config.start),
            None => {}
        }

        let abort = Arc::new(AtomicBool::new(false));
        let scheduler = ClipScheduler::new(
            name.clone(),
            source.clone(),
            Arc::new(factory),
            buffer.clone(),
            control.clone(),
            abort.clone(),
            format.frame_duration_ms(),
            &settings,
        )
        .spawn()?;
        source.start();

        let id = Uuid::new_v4();
        info!(%id, name, path = %config.path, "Clip producer started");
        Ok(Self {
            id,
            name,
            path: config.path,
            format,
            source,
            buffer,
            control,
            abort,
            diagnostics,
            scheduler: Some(scheduler),
        })
    }

    /// The held frame for `field`, without advancing.
    pub fn last_frame(&self, field: VideoField) -> Delivery<F::Frame> {
        let delivery = self.buffer.last_frame(field);
        self.diagnostics.set_text(self.status());
        delivery
    }

    /// Advances to the frame for `field`.
    ///
    /// Returns [`Delivery::Empty`] on underflow and [`Delivery::Still`]
    /// while holding the end of a clip.
    pub fn next_frame(&self, field: VideoField) -> Delivery<F::Frame> {
        let delivery =
            self.buffer
                .next_frame(field, &self.control.window(), self.source.duration_ms());
        self.diagnostics.set_text(self.status());
        delivery
    }

    /// True once at least one frame is buffered or held.
    pub fn is_ready(&self) -> bool {
        self.buffer.is_ready()
    }

    /// Seeks to `position` milliseconds. Buffered frames are discarded now;
    /// the graph seek happens on the scheduler's next iteration.
    pub fn seek(&self, position: i64) {
        self.control.request_seek(position);
        self.buffer.clear();
    }

    pub fn set_loop(&self, looping: bool) {
        self.control.set_looping(looping);
    }

    pub fn looping(&self) -> bool {
        self.control.window().looping
    }

    pub fn set_start(&self, start: i64) {
        self.control.set_start(start);
    }

    pub fn start(&self) -> i64 {
        self.control.window().start
    }

    /// Sets the clip duration; `None` plays to the natural end.
    pub fn set_duration(&self, duration: Option<i64>) {
        self.control.set_duration(duration);
    }

    pub fn duration(&self) -> Option<i64> {
        self.control.window().duration
    }

    /// Timestamp of the held frame in milliseconds.
    pub fn time(&self) -> i64 {
        self.buffer.time()
    }

    /// Media duration in milliseconds, if known.
    pub fn file_duration(&self) -> Option<i64> {
        Some(self.source.duration_ms()).filter(|d| *d > 0)
    }

    /// Whether the end of the clip has been produced.
    pub fn is_end_of_clip(&self) -> bool {
        self.buffer.is_end_of_clip()
    }

    pub fn phase(&self) -> ClipPhase {
        if self.control.seek_pending() {
            ClipPhase::Seeking
        } else if self.buffer.is_end_of_clip() {
            if self.looping() {
                ClipPhase::Looping
            } else {
                ClipPhase::EndHold
            }
        } else if self.buffer.is_flushing() || self.buffer.is_empty() {
            ClipPhase::Buffering
        } else {
            ClipPhase::Playing
        }
    }

    /// Frames played since the clip start.
    pub fn frame_number(&self) -> u32 {
        let frames = self.position() / self.format.frame_duration_ms().max(1);
        u32::try_from(frames).unwrap_or(u32::MAX)
    }

    /// Clip length in frames; `u32::MAX` while looping, 0 if unknown.
    pub fn nb_frames(&self) -> u32 {
        if self.looping() {
            return u32::MAX;
        }
        let length = self
            .duration()
            .or_else(|| self.file_duration().map(|d| d.saturating_sub(self.start()).max(0)))
            .unwrap_or(0);
        u32::try_from(length / self.format.frame_duration_ms().max(1)).unwrap_or(u32::MAX)
    }

    /// Applies a clip command and returns the resulting value.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let position = producer.call(ClipCommand::parse(&["SEEK", "IN", "500"])?)?;
    /// ```
    pub fn call(&self, command: ClipCommand) -> Result<i64> {
        debug!(id = %self.id, ?command, "Clip command");
        match command {
            ClipCommand::Loop(looping) => {
                let looping = looping.unwrap_or(!self.looping());
                self.set_loop(looping);
                Ok(i64::from(looping))
            }
            ClipCommand::In(start) => {
                self.set_start(start);
                Ok(self.start())
            }
            ClipCommand::Out(out) => {
                self.set_duration(Some(out.saturating_sub(self.start())));
                Ok(out)
            }
            ClipCommand::Length(length) => {
                self.set_duration(Some(length));
                Ok(length)
            }
            ClipCommand::Seek(target, offset) => {
                let base = match target {
                    SeekTarget::Absolute(position) => position,
                    SeekTarget::Relative => self.time(),
                    SeekTarget::In => self.start(),
                    SeekTarget::Out => self.start().saturating_add(self.duration().unwrap_or(0)),
                    SeekTarget::End => self.file_duration().unwrap_or(0),
                };
                let position = base.saturating_add(offset).max(0);
                self.seek(position);
                Ok(position)
            }
        }
    }

    /// Status line: `<name>|<position>/<duration>` in milliseconds, the
    /// position counted from the clip start.
    pub fn status(&self) -> String {
        let duration = self
            .duration()
            .or_else(|| self.file_duration())
            .unwrap_or(0);
        format!("{}|{}/{}", self.name, self.position(), duration)
    }

    fn position(&self) -> i64 {
        self.time().saturating_sub(self.start()).max(0)
    }

    /// Monitoring snapshot; times are in seconds.
    pub fn state(&self) -> MonitorState {
        let seconds = |ms: i64| ms as f64 / 1000.0;
        let mut state = MonitorState::new();
        state.insert("file/name".into(), json!(self.name));
        state.insert("file/path".into(), json!(self.path));
        state.insert("loop".into(), json!(self.looping()));
        state.insert(
            "file/clip".into(),
            json!([seconds(self.start()), seconds(self.duration().unwrap_or(0))]),
        );
        state.insert(
            "file/time".into(),
            json!([seconds(self.time()), seconds(self.file_duration().unwrap_or(0))]),
        );
        state
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// Tears the producer down on a detached thread so the caller never
    /// waits for the joins.
    pub fn dispose(self) {
        let spawned = thread::Builder::new()
            .name("playout-dispose".into())
            .spawn(move || drop(self));
        if let Err(e) = spawned {
            error!("Failed to spawn disposal thread, producer dropped inline: {e}");
        }
    }
}

impl<B: GraphBuilder, F: FrameFactory<B::Sample>> Drop for ClipProducer<B, F> {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::Release);
        self.buffer.wake();
        if let Some(scheduler) = self.scheduler.take() {
            if scheduler.join().is_err() {
                error!(id = %self.id, "Scheduler thread panicked");
            }
        }
        self.source.abort();
        info!(id = %self.id, name = %self.name, "Clip producer stopped");
    }
}
