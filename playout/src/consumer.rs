// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Frame consumer: the production-clock facing side of one output.
//!
//! The encode graph is built on the worker thread during
//! [`FrameConsumer::initialize`]; a construction failure there is stored and
//! surfaced once by the next [`FrameConsumer::send`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    buffer::VideoField,
    capture::{CaptureQueue, EncodePump},
    config::ConsumerConfig,
    diagnostics::Diagnostics,
    format::VideoFormat,
    graph::{EncodeGraph, EncodeGraphBuilder},
    options::{EncodeConfig, parse_options},
    producer::MonitorState,
};

/// Base of consumer indices; the channel index is added to it.
pub const CONSUMER_INDEX_BASE: i32 = 600_000;

const CLOSE_RETRY: Duration = Duration::from_millis(100);

/// Frame type accepted by the consumer built with `B`.
pub type FrameOf<B> = <<B as EncodeGraphBuilder>::Graph as EncodeGraph>::Frame;

/// One encoded output.
pub struct FrameConsumer<B: EncodeGraphBuilder> {
    id: Uuid,
    config: ConsumerConfig,
    builder: Arc<B>,
    diagnostics: Arc<Diagnostics>,
    queue: Arc<CaptureQueue<FrameOf<B>>>,
    running: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<Error>>>,
    channel_index: Option<i32>,
    worker: Option<JoinHandle<()>>,
}

impl<B: EncodeGraphBuilder> FrameConsumer<B> {
    /// Creates an idle consumer; nothing is built until `initialize`.
    pub fn new(config: ConsumerConfig, builder: B) -> Self {
        let diagnostics = Diagnostics::new(config.path.clone());
        let queue = if config.realtime {
            CaptureQueue::realtime(diagnostics.clone())
        } else {
            CaptureQueue::rendering(diagnostics.clone())
        };
        Self {
            id: Uuid::new_v4(),
            config,
            builder: Arc::new(builder),
            diagnostics,
            queue: Arc::new(queue),
            running: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            channel_index: None,
            worker: None,
        }
    }

    /// Parses the encoder options and starts the encode worker.
    ///
    /// # Errors
    /// * [`Error::AlreadyInitialized`] on a second call
    /// * [`Error::InvalidFormat`] for a degenerate format
    /// * [`Error::Thread`] if the worker cannot be spawned
    pub fn initialize(&mut self, format: VideoFormat, channel_index: i32) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        format.validate()?;

        let options = parse_options(&self.config.args)?;
        let encode = EncodeConfig::from_options(&self.config.path, &options);
        info!(id = %self.id, path = %self.config.path, ?encode, "Initializing consumer");

        let builder = self.builder.clone();
        let queue = self.queue.clone();
        let running = self.running.clone();
        let failure = self.failure.clone();
        let diagnostics = self.diagnostics.clone();
        let realtime = self.config.realtime;

        self.running.store(true, Ordering::Release);
        let worker = thread::Builder::new()
            .name("playout-encode".into())
            .spawn(move || {
                let built = builder
                    .build(&format, &encode, realtime)
                    .and_then(|mut graph| graph.start().map(|()| graph));
                match built {
                    Ok(graph) => {
                        EncodePump::new(graph, queue, format, diagnostics).run();
                    }
                    Err(e) => {
                        error!(output = %diagnostics.name(), "Encode graph failed: {e}");
                        *failure.lock() = Some(e);
                    }
                }
                running.store(false, Ordering::Release);
            });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        self.channel_index = Some(channel_index);
        self.worker = Some(worker);
        Ok(())
    }

    /// Hands one frame to the encoder without blocking.
    ///
    /// For interlaced output the frame carries both fields, so only the
    /// first field of a pair is queued.
    ///
    /// # Returns
    /// Whether the consumer is still running.
    ///
    /// # Errors
    /// The stored worker failure, exactly once.
    pub fn send(&self, field: VideoField, frame: FrameOf<B>) -> Result<bool> {
        if let Some(e) = self.failure.lock().take() {
            return Err(e);
        }
        if !self.running.load(Ordering::Acquire) {
            return Ok(false);
        }
        if field != VideoField::B {
            self.queue.try_push(frame);
        }
        Ok(true)
    }

    pub fn name(&self) -> &'static str {
        "gstreamer"
    }

    /// Consumer index: the base plus the channel, or a path hash before
    /// initialization.
    pub fn index(&self) -> i32 {
        match self.channel_index {
            Some(channel) => CONSUMER_INDEX_BASE + channel,
            None => path_hash(&self.config.path),
        }
    }

    /// Status line: `gstreamer[<path>]`.
    pub fn status(&self) -> String {
        format!("{}[{}]", self.name(), self.config.path)
    }

    pub fn state(&self) -> MonitorState {
        let mut state = MonitorState::new();
        state.insert("file/path".into(), json!(self.config.path));
        state.insert("realtime".into(), json!(self.config.realtime));
        state.insert("running".into(), json!(self.running.load(Ordering::Acquire)));
        state
    }

    /// Whether the output paces the production clock. It never does.
    pub fn has_synchronization_clock(&self) -> bool {
        false
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }
}

impl<B: EncodeGraphBuilder> Drop for FrameConsumer<B> {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        while !self.queue.close(CLOSE_RETRY) {
            if worker.is_finished() {
                break;
            }
            warn!(id = %self.id, "Encoder is not draining, retrying shutdown");
        }
        if worker.join().is_err() {
            error!(id = %self.id, "Encode worker panicked");
        }
        info!(id = %self.id, path = %self.config.path, "Consumer stopped");
    }
}

fn path_hash(path: &str) -> i32 {
    let hash = path
        .bytes()
        .fold(0i32, |hash, byte| hash.wrapping_mul(31).wrapping_add(i32::from(byte)));
    hash.rem_euclid(10_000)
}
