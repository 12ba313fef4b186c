// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # Playout - buffering between media graphs and a production clock
//!
//! Decoders and encoders run at their own pace and signal progress through
//! events. A playout channel ticks at a fixed rate and must get exactly one
//! frame (or field) per tick without waiting. This crate reconciles the two.
//!
//! ## Architecture
//!
//! ```text
//!  decode graph ──► SampleSource ──► ClipScheduler ──► PlayoutBuffer ──► production clock
//!   (callbacks)     (bounded queues,   (trim, loop,      (bounded,         (last_frame /
//!                    monitor thread)    seek, convert)    field parity)     next_frame)
//!
//!  production clock ──► CaptureQueue ──► EncodePump ──► encode graph
//!      (send)           (1 or 64 slots)  (PTS from counter, EOS on exit)
//! ```
//!
//! ### Key Concepts
//!
//! - **Clip**: one playback session bounded by `start` and `duration` ([`clip::ClipWindow`])
//! - **Field**: half of an interlaced frame; field A and B arrive on alternate ticks
//! - **Underflow**: no usable frame this tick ([`buffer::Delivery::Empty`])
//! - **End-hold**: repeating the last frame after a non-looping clip ended
//!
//! The graphs themselves sit behind the traits in [`graph`]; `gst-playout`
//! provides the GStreamer implementation.
//!
//! ## Threads
//!
//! Each clip owns a monitor thread (bus events) and a scheduler thread; each
//! consumer owns an encode thread. Every handoff is bounded. Only the
//! scheduler's push into the playout buffer and the encode pump's pop wait
//! indefinitely, and dropping the owner wakes and joins both.
//!
//! ## Example
//!
//! ```ignore
//! use playout::{ClipProducer, PlayoutSettings, ProducerConfig, VideoField};
//!
//! let producer = ClipProducer::new(builder, factory, format, ProducerConfig::new("AMB.mp4"), PlayoutSettings::default())?;
//! loop {
//!     match producer.next_frame(VideoField::Progressive) {
//!         Delivery::Frame(frame) | Delivery::Still(frame) => show(frame),
//!         Delivery::Empty => show_black(),
//!     }
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod clip;
pub mod config;
pub mod consumer;
pub mod diagnostics;
mod error;
pub mod format;
pub mod graph;
pub mod options;
pub mod producer;
pub mod request;
pub mod sample;
pub mod scheduler;
pub mod source;

pub use buffer::{Delivery, PendingFrame, PlayoutBuffer, VideoField};
pub use capture::{CaptureQueue, EncodePump, OverflowPolicy};
pub use clip::{ClipCommand, ClipControl, ClipWindow, SeekTarget};
pub use config::{ClipRange, ConsumerConfig, PlayoutSettings, ProducerConfig};
pub use consumer::FrameConsumer;
pub use diagnostics::{Diagnostics, TagSeverity};
pub use error::{Error, Result};
pub use format::{FrameTiming, InterlaceMode, Rate, VideoFormat};
pub use graph::{
    DecodeGraph, DecodeRequest, EncodeGraph, EncodeGraphBuilder, FrameFactory, GraphBuilder,
    GraphEvent, GraphState,
};
pub use options::{Container, EncodeConfig, Output, VideoCodec, VideoFilters, parse_options};
pub use producer::{ClipPhase, ClipProducer, MonitorState};
pub use sample::{MediaSample, SampleSink};
pub use source::SampleSource;
