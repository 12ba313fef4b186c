// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encode graph fed by an appsrc.
//!
//! ```text
//! appsrc(BGRA, time) ! [filters] ! videoconvert ! encoder ! [parser] ! muxer/payloader ! sink
//! ```
//!
//! Buffers are timestamped by the encode pump from its frame counter, so
//! the appsrc never stamps them itself. `finish` sends end-of-stream
//! and waits for it to reach the sink, which lets muxers write their index
//! before the pipeline is torn down.

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use playout::{
    EncodeConfig, EncodeGraph, EncodeGraphBuilder, Error, FrameTiming, GraphState, Result,
    VideoFormat,
};
use tracing::{info, warn};

use crate::{CAT, filters, source::VideoFrame, source::sample::video_caps};

/// Encoder, parser and output element selection
pub mod elements;

/// How long `finish` waits for end-of-stream to reach the sink.
pub const EOS_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames the appsrc may hold in realtime mode.
const REALTIME_FRAMES: usize = 4;

/// Frames the appsrc may hold in rendering mode.
const RENDERING_FRAMES: usize = 16;

/// Builds [`EncodeBin`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeBinBuilder;

impl EncodeGraphBuilder for EncodeBinBuilder {
    type Graph = EncodeBin;

    fn build(&self, format: &VideoFormat, config: &EncodeConfig, realtime: bool) -> Result<EncodeBin> {
        crate::require_init()?;

        let frames = if realtime {
            REALTIME_FRAMES
        } else {
            RENDERING_FRAMES
        };
        let appsrc = gst_app::AppSrc::builder()
            .caps(&video_caps(format))
            .format(gst::Format::Time)
            .is_live(realtime)
            .max_bytes((format.bgra_frame_size() * frames) as u64)
            .build();

        let mut chain = vec![appsrc.clone().upcast::<gst::Element>()];
        chain.extend(filters::filter_elements(&config.filters)?);
        chain.push(filters::make("videoconvert")?);
        chain.push(elements::encoder(config).make()?);
        if let Some(parser) = elements::parser(config.video_codec) {
            chain.push(parser.make()?);
        }
        for spec in elements::output(&config.output) {
            chain.push(spec.make()?);
        }

        let pipeline = gst::Pipeline::builder().name("playout-encode").build();
        pipeline
            .add_many(&chain)
            .map_err(|e| Error::Construction(format!("cannot assemble encode graph: {e}")))?;
        gst::Element::link_many(&chain)
            .map_err(|e| Error::Construction(format!("cannot link encode graph: {e}")))?;
        let bus = pipeline
            .bus()
            .ok_or_else(|| Error::Construction("encode graph has no bus".to_string()))?;

        let description = chain
            .iter()
            .filter_map(|element| element.factory().map(|factory| factory.name().to_string()))
            .collect::<Vec<_>>()
            .join(" ! ");
        info!(graph = %description, realtime, "Encode graph built");

        Ok(EncodeBin {
            pipeline,
            appsrc,
            bus,
            finished: false,
        })
    }
}

/// A running encode pipeline.
#[derive(Debug)]
pub struct EncodeBin {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    bus: gst::Bus,
    finished: bool,
}

impl EncodeBin {
    /// The pipeline.
    pub fn pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }

    fn pending_error(&self) -> Option<Error> {
        let message = self.bus.pop_filtered(&[gst::MessageType::Error])?;
        match message.view() {
            gst::MessageView::Error(err) => Some(Error::Push(format!(
                "{}: {}",
                err.src()
                    .map(|src| src.path_string().to_string())
                    .unwrap_or_default(),
                err.error()
            ))),
            _ => None,
        }
    }
}

impl EncodeGraph for EncodeBin {
    type Frame = VideoFrame;
    type Sample = gst::Buffer;

    fn start(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| Error::StateChange(GraphState::Playing))?;
        gst::info!(CAT, obj = &self.pipeline, "Encode graph started");
        Ok(())
    }

    fn convert(&self, frame: VideoFrame) -> Result<gst::Buffer> {
        Ok(frame.into_buffer())
    }

    fn push(&mut self, mut sample: gst::Buffer, timing: FrameTiming) -> Result<()> {
        if let Some(error) = self.pending_error() {
            return Err(error);
        }
        {
            // Shares memory with the frame; only the metadata is copied.
            let buffer = sample.make_mut();
            buffer.set_pts(gst::ClockTime::from_nseconds(timing.pts.as_nanos() as u64));
            buffer.set_duration(gst::ClockTime::from_nseconds(
                timing.duration.as_nanos() as u64
            ));
        }
        gst::trace!(CAT, obj = &self.pipeline, "Pushing {:?}", sample);
        self.appsrc
            .push_buffer(sample)
            .map(|_| ())
            .map_err(|flow| Error::Push(format!("appsrc refused buffer: {flow:?}")))
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if let Err(flow) = self.appsrc.end_of_stream() {
            warn!(?flow, "appsrc refused end-of-stream");
        }
        let message = self.bus.timed_pop_filtered(
            gst::ClockTime::from_nseconds(EOS_TIMEOUT.as_nanos() as u64),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        );
        match message.as_ref().map(|message| message.view()) {
            Some(gst::MessageView::Eos(_)) => info!("Encode graph finalized"),
            Some(gst::MessageView::Error(err)) => {
                warn!(error = %err.error(), "Encode graph failed while finalizing")
            }
            _ => warn!(timeout = ?EOS_TIMEOUT, "No end-of-stream from encode graph"),
        }

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|_| Error::StateChange(GraphState::Null))?;
        Ok(())
    }
}

impl Drop for EncodeBin {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}
