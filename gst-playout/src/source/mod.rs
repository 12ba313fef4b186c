// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Decode graph built on `playbin`.
//!
//! ```text
//! playbin(uri) ─┬─ video-sink: [filters] ! videoconvert ! videoscale ! videorate ! appsink(BGRA)
//!               └─ audio-sink: appsink(S32LE, 48 kHz, stereo)
//! ```
//!
//! The video branch is a bin so the optional `vf` filters and the conversion
//! to the production size and rate happen before the appsink's caps are
//! negotiated.

use std::time::{Duration, Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_audio as gst_audio;
use gstreamer_video as gst_video;
use playout::{
    DecodeGraph, DecodeRequest, Error, GraphBuilder, GraphEvent, GraphState, Result, SampleSink,
    VideoFilters, request::NetworkBuffering,
};
use tracing::{debug, info};

use crate::{CAT, filters};

/// BGRA frames and frame conversion
pub mod frame;

/// Appsinks and the decoded sample type
pub mod sample;

pub use frame::{BgraFrameFactory, VideoFrame};
pub use sample::DecodedSample;

/// Builds [`PlaybinGraph`]s.
#[derive(Clone, Copy, Debug)]
pub struct PlaybinBuilder {
    audio: bool,
}

impl Default for PlaybinBuilder {
    fn default() -> Self {
        Self { audio: true }
    }
}

impl PlaybinBuilder {
    /// Builder that decodes video only.
    pub fn video_only() -> Self {
        Self { audio: false }
    }
}

impl GraphBuilder for PlaybinBuilder {
    type Sample = DecodedSample;
    type Graph = PlaybinGraph;

    fn build(&self, request: &DecodeRequest, sink: SampleSink<DecodedSample>) -> Result<PlaybinGraph> {
        crate::require_init()?;

        let filters = request
            .options
            .get("vf")
            .map(|vf| VideoFilters::parse(vf))
            .unwrap_or_default();

        let video_sink = sample::video_appsink(&request.format, sink.clone());
        let video_bin = video_bin(&filters, &video_sink)?;

        let mut playbin = gst::ElementFactory::make("playbin")
            .name("playout-playbin")
            .property("uri", request.uri.as_str())
            .property("video-sink", &video_bin);
        if let Some(buffering) = NetworkBuffering::for_uri(&request.uri) {
            debug!(uri = %request.uri, ?buffering, "Applying network buffering");
            playbin = playbin
                .property("buffer-size", buffering.buffer_size)
                .property("buffer-duration", buffering.buffer_duration.as_nanos() as i64);
        }
        let audio_sink = if self.audio {
            let appsink = sample::audio_appsink(sink);
            playbin = playbin.property("audio-sink", appsink.clone());
            Some(appsink)
        } else {
            None
        };
        let playbin = playbin
            .build()
            .map_err(|_| Error::MissingElement("playbin".to_string()))?;

        let bus = playbin
            .bus()
            .ok_or_else(|| Error::Construction("playbin has no bus".to_string()))?;

        gst::info!(CAT, obj = &playbin, "Decode graph built for {}", request.uri);
        info!(uri = %request.uri, ?filters, "Decode graph built");
        Ok(PlaybinGraph {
            playbin,
            bus,
            video_sink,
            audio_sink,
        })
    }
}

fn construction(context: &str) -> impl FnOnce(glib::BoolError) -> Error + '_ {
    move |e| Error::Construction(format!("{context}: {e}"))
}

fn video_bin(vf: &VideoFilters, appsink: &gst_app::AppSink) -> Result<gst::Bin> {
    let bin = gst::Bin::builder().name("playout-video").build();

    let mut chain = filters::filter_elements(vf)?;
    chain.push(filters::make("videoconvert")?);
    chain.push(filters::make("videoscale")?);
    chain.push(filters::make("videorate")?);
    chain.push(appsink.clone().upcast::<gst::Element>());

    bin.add_many(&chain)
        .map_err(construction("cannot assemble video branch"))?;
    gst::Element::link_many(&chain).map_err(construction("cannot link video branch"))?;

    let target = chain
        .first()
        .and_then(|element| element.static_pad("sink"))
        .ok_or_else(|| Error::Construction("video branch has no sink pad".to_string()))?;
    let ghost = gst::GhostPad::with_target(&target)
        .map_err(construction("cannot expose video branch"))?;
    bin.add_pad(&ghost)
        .map_err(construction("cannot expose video branch"))?;
    Ok(bin)
}

/// A running `playbin` and its bus.
#[derive(Debug)]
pub struct PlaybinGraph {
    playbin: gst::Element,
    bus: gst::Bus,
    video_sink: gst_app::AppSink,
    audio_sink: Option<gst_app::AppSink>,
}

fn to_gst(state: GraphState) -> gst::State {
    match state {
        GraphState::Null => gst::State::Null,
        GraphState::Paused => gst::State::Paused,
        GraphState::Playing => gst::State::Playing,
    }
}

fn from_gst(state: gst::State) -> GraphState {
    match state {
        gst::State::Playing => GraphState::Playing,
        gst::State::Paused => GraphState::Paused,
        _ => GraphState::Null,
    }
}

fn clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(duration.as_nanos() as u64)
}

fn source_path(src: Option<&gst::Object>) -> String {
    src.map(|src| src.path_string().to_string())
        .unwrap_or_default()
}

impl PlaybinGraph {
    /// The `playbin` element.
    pub fn playbin(&self) -> &gst::Element {
        &self.playbin
    }

    fn event(&self, message: &gst::Message) -> Option<GraphEvent> {
        match message.view() {
            gst::MessageView::Eos(_) => Some(GraphEvent::EndOfStream),
            gst::MessageView::Error(err) => Some(GraphEvent::Error {
                source: source_path(err.src()),
                message: err.error().to_string(),
            }),
            gst::MessageView::Warning(warning) => Some(GraphEvent::Warning {
                source: source_path(warning.src()),
                message: warning.error().to_string(),
            }),
            gst::MessageView::StateChanged(change)
                if change.src() == Some(self.playbin.upcast_ref::<gst::Object>()) =>
            {
                Some(GraphEvent::StateChanged {
                    old: from_gst(change.old()),
                    current: from_gst(change.current()),
                })
            }
            _ => None,
        }
    }
}

impl DecodeGraph for PlaybinGraph {
    fn set_state(&self, state: GraphState) -> Result<()> {
        let change = self
            .playbin
            .set_state(to_gst(state))
            .map_err(|_| Error::StateChange(state))?;
        if change == gst::StateChangeSuccess::Async {
            debug!(?state, "State change is happening asynchronously");
        }
        Ok(())
    }

    fn seek(&self, position: Duration) -> Result<()> {
        gst::debug!(CAT, obj = &self.playbin, "Seeking to {:?}", position);
        self.playbin
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                clock_time(position),
            )
            .map_err(|e| Error::Seek(e.to_string()))
    }

    fn duration(&self) -> Option<Duration> {
        self.playbin
            .query_duration::<gst::ClockTime>()
            .map(|duration| Duration::from_nanos(duration.nseconds()))
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        let caps = self.video_sink.static_pad("sink")?.current_caps()?;
        let info = gst_video::VideoInfo::from_caps(&caps).ok()?;
        Some((info.width(), info.height()))
    }

    fn audio_format(&self) -> Option<(u32, u32)> {
        let caps = self.audio_sink.as_ref()?.static_pad("sink")?.current_caps()?;
        let info = gst_audio::AudioInfo::from_caps(&caps).ok()?;
        Some((info.channels(), info.rate()))
    }

    fn next_event(&self, timeout: Duration) -> Option<GraphEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.bus.timed_pop(clock_time(remaining))?;
            if let Some(event) = self.event(&message) {
                return Some(event);
            }
            if remaining.is_zero() {
                return None;
            }
        }
    }
}

impl Drop for PlaybinGraph {
    fn drop(&mut self) {
        let _ = self.playbin.set_state(gst::State::Null);
    }
}
