// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample Source.
//!
//! Owns one decode graph, the two bounded queues its callbacks fill, and a
//! monitor thread that drains the graph's event bus.
//!
//! ## Threads
//! - Graph callbacks (graph-owned): push samples through the [`SampleSink`]
//! - Monitor (owned here): end-of-stream, errors, duration and dimensions
//! - Consumer (the Clip Scheduler): pops samples, issues seeks
//!
//! The graph handle sits behind a lock so that [`SampleSource::abort`] and
//! [`SampleSource::reset`] can take it away; every entry point checks for it
//! and degrades to a logged no-op when it is gone.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::{
    Error, Result,
    config::PlayoutSettings,
    diagnostics::{self, Diagnostics, TagSeverity},
    graph::{DecodeGraph, DecodeRequest, GraphBuilder, GraphEvent, GraphState},
    sample::{SampleQueue, SampleSink},
};

#[derive(Default)]
struct MediaInfo {
    captured: bool,
    video_size: Option<(u32, u32)>,
    audio_format: Option<(u32, u32)>,
}

struct SourceInner<B: GraphBuilder> {
    builder: B,
    request: DecodeRequest,
    loop_on_eos: bool,
    poll: Duration,
    diagnostics: Arc<Diagnostics>,
    sink: SampleSink<B::Sample>,
    graph: RwLock<Option<Arc<B::Graph>>>,
    video: SampleQueue<B::Sample>,
    audio: SampleQueue<B::Sample>,
    eof: AtomicBool,
    abort: AtomicBool,
    playing: AtomicBool,
    duration_ms: AtomicI64,
    info: Mutex<MediaInfo>,
    reset_lock: Mutex<()>,
}

/// Decode graph wrapper with bounded sample queues.
pub struct SampleSource<B: GraphBuilder> {
    inner: Arc<SourceInner<B>>,
    monitor: Option<JoinHandle<()>>,
}

impl<B: GraphBuilder> SampleSource<B> {
    /// Builds the decode graph, prerolls it and starts the monitor thread.
    ///
    /// # Arguments
    /// * `builder` - Decode graph factory (kept for [`SampleSource::reset`])
    /// * `request` - What to decode
    /// * `settings` - Queue capacities and monitor poll interval
    /// * `loop_on_eos` - Seek to 0 on end-of-stream instead of flagging EOF
    /// * `diagnostics` - Receives the `input` and `seek` channels
    ///
    /// # Errors
    /// * [`Error::EmptySource`] if the request has no URI
    /// * Any construction or state-change error from the graph
    pub fn new(
        builder: B,
        request: DecodeRequest,
        settings: &PlayoutSettings,
        loop_on_eos: bool,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self> {
        if request.uri.is_empty() {
            return Err(Error::EmptySource);
        }

        let video = SampleQueue::new(settings.video_queue_capacity);
        let audio = SampleQueue::new(settings.audio_queue_capacity);
        let sink = SampleSink::new(video.sender(), audio.sender(), diagnostics.clone());

        let graph = builder.build(&request, sink.clone())?;
        graph.set_state(GraphState::Paused)?;
        info!(uri = %request.uri, "Decode graph created");

        let inner = Arc::new(SourceInner {
            builder,
            request,
            loop_on_eos,
            poll: Duration::from_millis(settings.monitor_poll_ms.max(1)),
            diagnostics,
            sink,
            graph: RwLock::new(Some(Arc::new(graph))),
            video,
            audio,
            eof: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            duration_ms: AtomicI64::new(0),
            info: Mutex::new(MediaInfo::default()),
            reset_lock: Mutex::new(()),
        });

        let monitor = {
            let inner = inner.clone();
            thread::Builder::new()
                .name("playout-monitor".into())
                .spawn(move || inner.monitor())?
        };

        Ok(Self {
            inner,
            monitor: Some(monitor),
        })
    }

    /// Sets the graph playing. Failures are logged and leave the state as is.
    pub fn start(&self) {
        if self.inner.transition(GraphState::Playing) {
            self.inner.playing.store(true, Ordering::Release);
        }
    }

    /// Pauses the graph. Failures are logged and leave the state as is.
    pub fn stop(&self) {
        if self.inner.transition(GraphState::Paused) {
            self.inner.playing.store(false, Ordering::Release);
        }
    }

    /// Pops the oldest decoded video sample without blocking.
    pub fn try_pop_video(&self) -> Option<B::Sample> {
        self.inner.video.try_pop()
    }

    /// Pops the oldest decoded audio sample without blocking.
    pub fn try_pop_audio(&self) -> Option<B::Sample> {
        self.inner.audio.try_pop()
    }

    /// Issues a flushing key-frame seek.
    ///
    /// Negative positions are clamped to 0. With `flush`, both queues are
    /// drained first so no pre-seek sample survives. Completion is not
    /// awaited; samples from the new position simply start arriving.
    pub fn seek(&self, position_ms: i64, flush: bool) {
        self.inner.seek(position_ms, flush);
    }

    /// Stops the graph and releases it along with every queued sample.
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Tears the graph down and builds a fresh one from the same request.
    ///
    /// # Errors
    /// [`Error::NoGraph`] after [`SampleSource::abort`], or the construction
    /// error of the new graph (the source then stays without a graph).
    pub fn reset(&self) -> Result<()> {
        self.inner.reset()
    }

    /// Whether the graph reported end-of-stream since the last seek.
    pub fn is_eof(&self) -> bool {
        self.inner.eof.load(Ordering::Acquire)
    }

    /// Media duration in milliseconds; 0 while unknown.
    pub fn duration_ms(&self) -> i64 {
        self.inner.duration_ms.load(Ordering::Acquire)
    }

    /// Negotiated video dimensions, once playing.
    pub fn video_size(&self) -> Option<(u32, u32)> {
        self.inner.info.lock().video_size
    }

    /// Negotiated audio `(channels, rate)`, once playing.
    pub fn audio_format(&self) -> Option<(u32, u32)> {
        self.inner.info.lock().audio_format
    }

    /// Number of decoded video samples waiting.
    pub fn video_len(&self) -> usize {
        self.inner.video.len()
    }

    /// The request this source decodes.
    pub fn request(&self) -> &DecodeRequest {
        &self.inner.request
    }
}

impl<B: GraphBuilder> Drop for SampleSource<B> {
    fn drop(&mut self) {
        self.inner.abort();
        if let Some(monitor) = self.monitor.take() {
            if monitor.join().is_err() {
                error!("Monitor thread panicked");
            }
        }
    }
}

impl<B: GraphBuilder> SourceInner<B> {
    fn graph(&self) -> Option<Arc<B::Graph>> {
        self.graph.read().clone()
    }

    fn transition(&self, state: GraphState) -> bool {
        let Some(graph) = self.graph() else {
            warn!(uri = %self.request.uri, ?state, "State change ignored: graph not available");
            return false;
        };
        match graph.set_state(state) {
            Ok(()) => true,
            Err(e) => {
                warn!(uri = %self.request.uri, ?state, "State change failed: {e}");
                false
            }
        }
    }

    fn flush_queues(&self) {
        let video = self.video.flush();
        let audio = self.audio.flush();
        trace!(video, audio, "Sample queues flushed");
    }

    fn seek(&self, position_ms: i64, flush: bool) {
        let Some(graph) = self.graph() else {
            warn!(uri = %self.request.uri, position_ms, "Seek ignored: graph not available");
            return;
        };
        let position = position_ms.max(0);
        if flush {
            self.flush_queues();
        }
        if let Err(e) = graph.seek(Duration::from_millis(position as u64)) {
            warn!(uri = %self.request.uri, position, "Seek failed: {e}");
        }
        if flush {
            // A callback already running when the seek started may still
            // have delivered one pre-seek sample.
            self.flush_queues();
        }
        self.eof.store(false, Ordering::Release);
        self.diagnostics
            .set_tag(TagSeverity::Info, diagnostics::SEEK);
        debug!(uri = %self.request.uri, position, "Seek issued");
    }

    fn abort(&self) {
        self.abort.store(true, Ordering::Release);
        let graph = self.graph.write().take();
        if let Some(graph) = graph {
            if let Err(e) = graph.set_state(GraphState::Null) {
                warn!(uri = %self.request.uri, "Teardown failed: {e}");
            }
            debug!(uri = %self.request.uri, "Decode graph released");
        }
        self.flush_queues();
    }

    fn reset(&self) -> Result<()> {
        let _guard = self.reset_lock.lock();
        if self.abort.load(Ordering::Acquire) {
            warn!(uri = %self.request.uri, "Reset ignored: source aborted");
            return Err(Error::NoGraph);
        }

        let old = self.graph.write().take();
        if let Some(old) = old {
            if let Err(e) = old.set_state(GraphState::Null) {
                warn!(uri = %self.request.uri, "Teardown before reset failed: {e}");
            }
        }
        self.flush_queues();
        self.eof.store(false, Ordering::Release);
        *self.info.lock() = MediaInfo::default();

        let graph = self.builder.build(&self.request, self.sink.clone())?;
        graph.set_state(GraphState::Paused)?;
        if self.playing.load(Ordering::Acquire) {
            graph.set_state(GraphState::Playing)?;
        }
        *self.graph.write() = Some(Arc::new(graph));
        info!(uri = %self.request.uri, "Decode graph rebuilt");
        Ok(())
    }

    fn monitor(&self) {
        while !self.abort.load(Ordering::Acquire) {
            let Some(graph) = self.graph() else {
                thread::sleep(self.poll);
                continue;
            };
            let Some(event) = graph.next_event(self.poll) else {
                continue;
            };

            match event {
                GraphEvent::EndOfStream if self.loop_on_eos => {
                    debug!(uri = %self.request.uri, "End of stream, looping");
                    self.seek(0, true);
                }
                GraphEvent::EndOfStream => {
                    debug!(uri = %self.request.uri, "End of stream");
                    self.eof.store(true, Ordering::Release);
                }
                GraphEvent::Error { source, message } => {
                    error!(uri = %self.request.uri, element = %source, "{message}");
                }
                GraphEvent::Warning { source, message } => {
                    warn!(uri = %self.request.uri, element = %source, "{message}");
                }
                GraphEvent::StateChanged {
                    current: GraphState::Playing,
                    ..
                } => self.capture_media_info(graph.as_ref()),
                GraphEvent::StateChanged { .. } => {}
            }
        }
        trace!(uri = %self.request.uri, "Monitor thread exiting");
    }

    fn capture_media_info(&self, graph: &B::Graph) {
        let mut info = self.info.lock();
        if info.captured {
            return;
        }
        info.captured = true;
        info.video_size = graph.video_size();
        info.audio_format = graph.audio_format();

        let duration_ms = graph
            .duration()
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        self.duration_ms.store(duration_ms, Ordering::Release);
        info!(
            uri = %self.request.uri,
            duration_ms,
            video = ?info.video_size,
            audio = ?info.audio_format,
            "Media info captured"
        );
    }
}
