// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Appsinks handing decoded samples to the engine.
//!
//! The sinks run with `sync=true`, so the pipeline clock paces decoding and
//! a full engine queue only ever drops the newest sample.

use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_audio as gst_audio;
use gstreamer_video as gst_video;
use playout::{MediaSample, SampleSink, VideoFormat};

/// Appsink queue depth for video samples.
const VIDEO_MAX_BUFFERS: u32 = 64;

/// Appsink queue depth for audio samples.
const AUDIO_MAX_BUFFERS: u32 = 128;

/// Audio sample rate delivered by the decode graph.
pub const AUDIO_RATE: i32 = 48_000;

/// Audio channel count delivered by the decode graph.
pub const AUDIO_CHANNELS: i32 = 2;

/// A decoded GStreamer sample (buffer plus caps).
///
/// Dropping it releases the underlying buffer.
#[derive(Clone, Debug)]
pub struct DecodedSample(gst::Sample);

impl DecodedSample {
    /// Wraps a sample pulled from an appsink.
    pub fn new(sample: gst::Sample) -> Self {
        Self(sample)
    }

    /// The wrapped sample.
    pub fn sample(&self) -> &gst::Sample {
        &self.0
    }

    /// Unwraps the sample.
    pub fn into_inner(self) -> gst::Sample {
        self.0
    }
}

impl MediaSample for DecodedSample {
    fn pts_ns(&self) -> Option<u64> {
        self.0
            .buffer()
            .and_then(|buffer| buffer.pts())
            .map(|pts| pts.nseconds())
    }
}

/// Caps of the frames the video appsink accepts: BGRA at the production
/// size and rate.
pub fn video_caps(format: &VideoFormat) -> gst::Caps {
    gst_video::VideoCapsBuilder::new()
        .format(gst_video::VideoFormat::Bgra)
        .width(format.width as i32)
        .height(format.height as i32)
        .framerate(gst::Fraction::new(
            format.frame_rate.numerator,
            format.frame_rate.denominator.max(1),
        ))
        .build()
}

/// Caps of the audio appsink: interleaved S32LE, 48 kHz, stereo.
pub fn audio_caps() -> gst::Caps {
    gst_audio::AudioCapsBuilder::new_interleaved()
        .format(gst_audio::AudioFormat::S32le)
        .rate(AUDIO_RATE)
        .channels(AUDIO_CHANNELS)
        .build()
}

/// Builds the video appsink; every pulled sample goes to `sink`.
pub(crate) fn video_appsink(format: &VideoFormat, sink: SampleSink<DecodedSample>) -> gst_app::AppSink {
    let appsink = gst_app::AppSink::builder()
        .caps(&video_caps(format))
        .max_buffers(VIDEO_MAX_BUFFERS)
        .drop(true)
        .sync(true)
        .build();
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                sink.push_video(DecodedSample::new(sample));
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
    appsink
}

/// Builds the audio appsink; every pulled sample goes to `sink`.
pub(crate) fn audio_appsink(sink: SampleSink<DecodedSample>) -> gst_app::AppSink {
    let appsink = gst_app::AppSink::builder()
        .caps(&audio_caps())
        .max_buffers(AUDIO_MAX_BUFFERS)
        .drop(false)
        .sync(true)
        .build();
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                sink.push_audio(DecodedSample::new(sample));
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
    appsink
}
