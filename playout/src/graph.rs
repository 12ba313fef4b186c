// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Seams to the external decode and encode graphs.
//!
//! The engine never looks inside a graph. It drives the lifecycle (build,
//! pause, play, seek, tear down) through these traits and receives samples
//! through a [`SampleSink`]. The GStreamer backend lives in `gst-playout`;
//! tests plug in in-memory graphs.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    Result,
    format::{FrameTiming, VideoFormat},
    options::EncodeConfig,
    sample::{MediaSample, SampleSink},
};

/// Lifecycle states a graph is driven through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphState {
    /// Torn down; all resources released.
    Null,
    /// Prerolled but not running.
    Paused,
    /// Running.
    Playing,
}

/// Event popped from a graph's message bus.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    /// The graph delivered its last sample.
    EndOfStream,
    /// A non-fatal error reported by an element.
    Error {
        /// Name of the reporting element.
        source: String,
        /// Error text.
        message: String,
    },
    /// A warning reported by an element.
    Warning {
        /// Name of the reporting element.
        source: String,
        /// Warning text.
        message: String,
    },
    /// The top-level graph changed state.
    StateChanged {
        /// State before the transition.
        old: GraphState,
        /// State after the transition.
        current: GraphState,
    },
}

/// What a decode graph should be built for.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeRequest {
    /// Resolved URI of the media.
    pub uri: String,
    /// Production format samples should be scaled and converted to.
    pub format: VideoFormat,
    /// Already parsed options (e.g. `vf` → filter description).
    pub options: BTreeMap<String, String>,
}

/// Handle to a running decode graph.
pub trait DecodeGraph: Send + Sync + 'static {
    /// Transitions the graph.
    fn set_state(&self, state: GraphState) -> Result<()>;

    /// Issues a flushing key-frame seek.
    fn seek(&self, position: Duration) -> Result<()>;

    /// Media duration, if the graph knows it.
    fn duration(&self) -> Option<Duration>;

    /// Negotiated video dimensions.
    fn video_size(&self) -> Option<(u32, u32)>;

    /// Negotiated audio `(channels, rate)`.
    fn audio_format(&self) -> Option<(u32, u32)>;

    /// Waits at most `timeout` for the next bus event.
    fn next_event(&self, timeout: Duration) -> Option<GraphEvent>;
}

/// Factory for decode graphs.
pub trait GraphBuilder: Send + Sync + 'static {
    /// Decoded sample type.
    type Sample: MediaSample;
    /// Graph handle type.
    type Graph: DecodeGraph;

    /// Builds a graph that pushes decoded samples into `sink`.
    ///
    /// # Errors
    /// [`crate::Error::Construction`] or [`crate::Error::MissingElement`]
    /// when the graph cannot be assembled.
    fn build(&self, request: &DecodeRequest, sink: SampleSink<Self::Sample>) -> Result<Self::Graph>;
}

/// Converts decoded samples into frames the production pipeline can show.
pub trait FrameFactory<S>: Send + Sync + 'static {
    /// Production frame type. Clones must be cheap (shared buffer).
    type Frame: Clone + Send + 'static;

    /// Converts one video sample.
    fn make_frame(&self, sample: S) -> Result<Self::Frame>;
}

/// Handle to an encode graph, owned by the encode pump thread.
pub trait EncodeGraph: Send + 'static {
    /// Production frame type accepted by [`EncodeGraph::convert`].
    type Frame: Send + 'static;
    /// Native sample type pushed into the graph.
    type Sample;

    /// Starts the graph.
    fn start(&mut self) -> Result<()>;

    /// Converts a production frame to the native sample type.
    fn convert(&self, frame: Self::Frame) -> Result<Self::Sample>;

    /// Pushes one timestamped sample.
    fn push(&mut self, sample: Self::Sample, timing: FrameTiming) -> Result<()>;

    /// Signals end-of-stream and waits for the output to be finalized.
    fn finish(&mut self) -> Result<()>;
}

/// Factory for encode graphs.
pub trait EncodeGraphBuilder: Send + Sync + 'static {
    /// Graph handle type.
    type Graph: EncodeGraph;

    /// Builds an encode graph for `format`.
    fn build(
        &self,
        format: &VideoFormat,
        config: &EncodeConfig,
        realtime: bool,
    ) -> Result<Self::Graph>;
}
