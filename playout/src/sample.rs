// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Decoded samples and the bounded queues that carry them.
//!
//! Samples are owned values: whoever holds one last releases the native
//! buffer by dropping it. That covers every exit path (rejected by a full
//! queue, drained by a flush, dropped at teardown) without explicit unref
//! calls.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::trace;

use crate::diagnostics::{self, Diagnostics};

/// One decoded unit handed over by a decode graph.
pub trait MediaSample: Send + 'static {
    /// Presentation timestamp in nanoseconds, if the graph set one.
    fn pts_ns(&self) -> Option<u64>;
}

/// Bounded multi-producer queue with drop-newest overflow.
pub(crate) struct SampleQueue<S> {
    tx: Sender<S>,
    rx: Receiver<S>,
}

impl<S> SampleQueue<S> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> Sender<S> {
        self.tx.clone()
    }

    pub(crate) fn try_pop(&self) -> Option<S> {
        self.rx.try_recv().ok()
    }

    /// Drops every queued sample and returns how many were released.
    pub(crate) fn flush(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Graph-side handle used by decoder callbacks to hand samples over.
///
/// Pushing never blocks: when a queue is full the new sample is dropped
/// so the decoder thread is never stalled by a slow consumer.
pub struct SampleSink<S> {
    video: Sender<S>,
    audio: Sender<S>,
    diagnostics: Arc<Diagnostics>,
}

impl<S> Clone for SampleSink<S> {
    fn clone(&self) -> Self {
        Self {
            video: self.video.clone(),
            audio: self.audio.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl<S> SampleSink<S> {
    pub(crate) fn new(video: Sender<S>, audio: Sender<S>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            video,
            audio,
            diagnostics,
        }
    }

    /// Queues a decoded video sample.
    ///
    /// # Returns
    /// `true` if the sample was queued, `false` if it was dropped.
    pub fn push_video(&self, sample: S) -> bool {
        Self::push(&self.video, sample, &self.diagnostics, "video")
    }

    /// Queues a decoded audio sample. Audio is held and released only.
    pub fn push_audio(&self, sample: S) -> bool {
        Self::push(&self.audio, sample, &self.diagnostics, "audio")
    }

    fn push(queue: &Sender<S>, sample: S, diagnostics: &Diagnostics, kind: &str) -> bool {
        match queue.try_send(sample) {
            Ok(()) => {
                if let Some(capacity) = queue.capacity() {
                    diagnostics.set_value(diagnostics::INPUT, queue.len() as f64 / capacity as f64);
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!(kind, "Sample queue full, dropping newest sample");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
