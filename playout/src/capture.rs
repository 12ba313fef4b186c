// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Capture Queue and Encode Pump.
//!
//! The production clock pushes one frame per tick into a [`CaptureQueue`]
//! without ever blocking; the [`EncodePump`] thread drains it at the encode
//! graph's own pace. `None` in the queue is the shutdown sentinel.

use std::{sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, error, trace};

use crate::{
    diagnostics::{self, Diagnostics, TagSeverity},
    format::VideoFormat,
    graph::EncodeGraph,
};

/// Capacity of a realtime capture queue.
pub const REALTIME_CAPACITY: usize = 1;
/// Capacity of a file-rendering capture queue.
pub const RENDERING_CAPACITY: usize = 64;

/// What to discard when a frame arrives at a full queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the queued frame so the freshest one is encoded.
    DropOldest,
    /// Reject the incoming frame.
    DropNewest,
}

/// Bounded frame queue between the production clock and an encode pump.
pub struct CaptureQueue<F> {
    tx: Sender<Option<F>>,
    rx: Receiver<Option<F>>,
    policy: OverflowPolicy,
    diagnostics: Arc<Diagnostics>,
}

impl<F: Send> CaptureQueue<F> {
    /// Queue for live outputs: one slot, the freshest frame wins.
    pub fn realtime(diagnostics: Arc<Diagnostics>) -> Self {
        Self::with_capacity(REALTIME_CAPACITY, OverflowPolicy::DropOldest, diagnostics)
    }

    /// Queue for file rendering: deep enough that drops are exceptional.
    pub fn rendering(diagnostics: Arc<Diagnostics>) -> Self {
        Self::with_capacity(RENDERING_CAPACITY, OverflowPolicy::DropNewest, diagnostics)
    }

    pub fn with_capacity(
        capacity: usize,
        policy: OverflowPolicy,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            diagnostics,
        }
    }

    /// Offers a frame without blocking.
    ///
    /// Every overflow raises a `dropped-frame` tag.
    ///
    /// # Returns
    /// `true` if no frame was dropped.
    pub fn try_push(&self, frame: F) -> bool {
        let accepted = match self.tx.try_send(Some(frame)) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(item)) => {
                self.diagnostics
                    .set_tag(TagSeverity::Warning, diagnostics::DROPPED_FRAME);
                if self.policy == OverflowPolicy::DropOldest {
                    self.replace_oldest(item);
                }
                false
            }
        };
        self.diagnostics
            .set_value(diagnostics::INPUT, self.len() as f64 / self.capacity() as f64);
        accepted
    }

    /// Evicts the oldest queued frame, if the pump has not taken it already,
    /// and queues `item` in its place.
    fn replace_oldest(&self, item: Option<F>) {
        let evicted = self.rx.try_recv().is_ok();
        match self.tx.try_send(item) {
            Ok(()) => trace!(evicted, "Oldest frame replaced"),
            Err(TrySendError::Full(_)) => {
                debug!("Capture queue refilled by a concurrent push, frame dropped")
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Blocks for the next frame; `None` on the shutdown sentinel.
    pub fn pop(&self) -> Option<F> {
        self.rx.recv().ok().flatten()
    }

    /// Queues the shutdown sentinel, waiting at most `timeout` for space.
    ///
    /// # Returns
    /// `false` if the queue stayed full for the whole timeout.
    pub fn close(&self, timeout: Duration) -> bool {
        match self.tx.send_timeout(None, timeout) {
            Ok(()) => true,
            Err(e) => matches!(e, SendTimeoutError::Disconnected(_)),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(1)
    }
}

/// Drains a capture queue into an encode graph.
pub struct EncodePump<G: EncodeGraph> {
    graph: G,
    queue: Arc<CaptureQueue<G::Frame>>,
    format: VideoFormat,
    frame_count: u64,
    diagnostics: Arc<Diagnostics>,
}

impl<G: EncodeGraph> EncodePump<G> {
    /// Creates a pump for a started graph.
    pub fn new(
        graph: G,
        queue: Arc<CaptureQueue<G::Frame>>,
        format: VideoFormat,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            graph,
            queue,
            format,
            frame_count: 0,
            diagnostics,
        }
    }

    /// Encodes until the sentinel arrives, then finalizes the output.
    ///
    /// Timestamps come from the pump's own frame counter, so output is
    /// constant rate whatever the upstream jitter.
    ///
    /// # Returns
    /// The number of frames pushed into the graph.
    pub fn run(mut self) -> u64 {
        while let Some(frame) = self.queue.pop() {
            let sample = match self.graph.convert(frame) {
                Ok(sample) => sample,
                Err(e) => {
                    error!(output = %self.diagnostics.name(), "Frame conversion failed: {e}");
                    continue;
                }
            };
            let timing = self.format.frame_timing(self.frame_count);
            self.frame_count += 1;
            if let Err(e) = self.graph.push(sample, timing) {
                error!(output = %self.diagnostics.name(), pts = ?timing.pts, "Push failed: {e}");
            }
            trace!(pts = ?timing.pts, "Frame encoded");

            self.diagnostics
                .set_value(diagnostics::FRAME_TIME, timing.pts.as_secs_f64());
            self.diagnostics.set_value(
                diagnostics::INPUT,
                self.queue.len() as f64 / self.queue.capacity() as f64,
            );
        }

        if let Err(e) = self.graph.finish() {
            error!(output = %self.diagnostics.name(), "Finalizing output failed: {e}");
        }
        debug!(output = %self.diagnostics.name(), frames = self.frame_count, "Encode pump finished");
        self.frame_count
    }
}
