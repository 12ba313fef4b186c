// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory decode and encode graphs for integration tests.
//!
//! The mock decoder runs a feeder thread that behaves like a real decode
//! graph: it only produces while playing, retries when the sample queue is
//! full, posts end-of-stream after the last frame and restarts from the
//! seek position. Seeks are atomic with respect to sample delivery, and the
//! first sample after a seek takes a few milliseconds, like a real decoder.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use playout::{
    DecodeGraph, DecodeRequest, EncodeConfig, EncodeGraph, EncodeGraphBuilder, Error,
    FrameFactory, FrameTiming, GraphBuilder, GraphEvent, GraphState, MediaSample, Rate, Result,
    SampleSink, VideoFormat,
};

pub const FRAME_MS: u64 = 40;

const SEEK_LATENCY: Duration = Duration::from_millis(5);

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

pub fn init_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 25 fps production format.
pub fn format_25p() -> VideoFormat {
    VideoFormat::progressive(64, 36, Rate::new(25, 1))
}

/// Polls `condition` every millisecond until it holds or 5 s have passed.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Decoded sample; counts itself in `live` until dropped.
pub struct MockSample {
    pub index: u64,
    pts_ns: u64,
    live: Arc<AtomicI64>,
}

impl MockSample {
    fn new(index: u64, live: Arc<AtomicI64>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            index,
            pts_ns: index * FRAME_MS * 1_000_000,
            live,
        }
    }
}

impl Drop for MockSample {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MediaSample for MockSample {
    fn pts_ns(&self) -> Option<u64> {
        Some(self.pts_ns)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockFrame {
    pub index: u64,
}

pub struct MockFactory;

impl FrameFactory<MockSample> for MockFactory {
    type Frame = MockFrame;

    fn make_frame(&self, sample: MockSample) -> Result<MockFrame> {
        Ok(MockFrame {
            index: sample.index,
        })
    }
}

/// Decode graph factory for a clip of `frames` frames of 40 ms.
#[derive(Clone)]
pub struct MockBuilder {
    pub frames: u64,
    /// Makes every later `build` fail.
    pub fail: Arc<AtomicBool>,
    /// Samples not yet dropped.
    pub live: Arc<AtomicI64>,
    pub builds: Arc<AtomicUsize>,
    /// Graphs built and not yet torn down.
    pub graphs: Arc<AtomicI64>,
}

impl MockBuilder {
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            fail: Arc::new(AtomicBool::new(false)),
            live: Arc::new(AtomicI64::new(0)),
            builds: Arc::new(AtomicUsize::new(0)),
            graphs: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn failing() -> Self {
        let builder = Self::new(0);
        builder.fail.store(true, Ordering::SeqCst);
        builder
    }
}

impl GraphBuilder for MockBuilder {
    type Sample = MockSample;
    type Graph = MockGraph;

    fn build(&self, _request: &DecodeRequest, sink: SampleSink<MockSample>) -> Result<MockGraph> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::MissingElement("mockdec".into()));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.graphs.fetch_add(1, Ordering::SeqCst);
        Ok(MockGraph::new(
            self.frames,
            sink,
            self.live.clone(),
            self.graphs.clone(),
        ))
    }
}

struct Cursor {
    next: u64,
    eos_sent: bool,
    resume_at: Option<Instant>,
}

struct Feed {
    frames: u64,
    state: Mutex<GraphState>,
    cursor: Mutex<Cursor>,
    stop: AtomicBool,
    events: Sender<GraphEvent>,
    sink: SampleSink<MockSample>,
    live: Arc<AtomicI64>,
}

pub struct MockGraph {
    feed: Arc<Feed>,
    events: Receiver<GraphEvent>,
    feeder: Option<JoinHandle<()>>,
    graphs: Arc<AtomicI64>,
}

impl MockGraph {
    fn new(
        frames: u64,
        sink: SampleSink<MockSample>,
        live: Arc<AtomicI64>,
        graphs: Arc<AtomicI64>,
    ) -> Self {
        let (tx, rx) = unbounded();
        let feed = Arc::new(Feed {
            frames,
            state: Mutex::new(GraphState::Null),
            cursor: Mutex::new(Cursor {
                next: 0,
                eos_sent: false,
                resume_at: None,
            }),
            stop: AtomicBool::new(false),
            events: tx,
            sink,
            live,
        });
        let feeder = {
            let feed = feed.clone();
            thread::spawn(move || feed.run())
        };
        Self {
            feed,
            events: rx,
            feeder: Some(feeder),
            graphs,
        }
    }
}

impl Feed {
    fn run(&self) {
        while !self.stop.load(Ordering::SeqCst) {
            if *self.state.lock().unwrap() != GraphState::Playing {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            let mut cursor = self.cursor.lock().unwrap();
            if cursor.resume_at.is_some_and(|at| Instant::now() < at) {
                drop(cursor);
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            if cursor.next >= self.frames {
                if !cursor.eos_sent {
                    cursor.eos_sent = true;
                    let _ = self.events.send(GraphEvent::EndOfStream);
                }
                drop(cursor);
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            let sample = MockSample::new(cursor.next, self.live.clone());
            if self.sink.push_video(sample) {
                cursor.next += 1;
            } else {
                drop(cursor);
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

impl DecodeGraph for MockGraph {
    fn set_state(&self, state: GraphState) -> Result<()> {
        let old = std::mem::replace(&mut *self.feed.state.lock().unwrap(), state);
        if old != state {
            let _ = self.feed.events.send(GraphEvent::StateChanged {
                old,
                current: state,
            });
        }
        Ok(())
    }

    fn seek(&self, position: Duration) -> Result<()> {
        let mut cursor = self.feed.cursor.lock().unwrap();
        cursor.next = position.as_millis() as u64 / FRAME_MS;
        cursor.eos_sent = false;
        cursor.resume_at = Some(Instant::now() + SEEK_LATENCY);
        Ok(())
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.feed.frames * FRAME_MS))
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        Some((64, 36))
    }

    fn audio_format(&self) -> Option<(u32, u32)> {
        None
    }

    fn next_event(&self, timeout: Duration) -> Option<GraphEvent> {
        self.events.recv_timeout(timeout).ok()
    }
}

impl Drop for MockGraph {
    fn drop(&mut self) {
        self.feed.stop.store(true, Ordering::SeqCst);
        if let Some(feeder) = self.feeder.take() {
            feeder.join().unwrap();
        }
        self.graphs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a mock encoder saw.
#[derive(Default)]
pub struct EncodeLog {
    pub pushed: Mutex<Vec<(u32, FrameTiming)>>,
    pub finished: AtomicBool,
}

pub struct MockEncodeBuilder {
    pub log: Arc<EncodeLog>,
    pub fail: bool,
}

impl MockEncodeBuilder {
    pub fn new() -> Self {
        Self {
            log: Arc::new(EncodeLog::default()),
            fail: false,
        }
    }
}

impl EncodeGraphBuilder for MockEncodeBuilder {
    type Graph = MockEncoder;

    fn build(&self, _format: &VideoFormat, _config: &EncodeConfig, _realtime: bool) -> Result<MockEncoder> {
        if self.fail {
            return Err(Error::Construction("no such muxer".into()));
        }
        Ok(MockEncoder {
            log: self.log.clone(),
        })
    }
}

pub struct MockEncoder {
    log: Arc<EncodeLog>,
}

impl EncodeGraph for MockEncoder {
    type Frame = u32;
    type Sample = u32;

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn convert(&self, frame: u32) -> Result<u32> {
        Ok(frame)
    }

    fn push(&mut self, sample: u32, timing: FrameTiming) -> Result<()> {
        self.log.pushed.lock().unwrap().push((sample, timing));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.log.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}
