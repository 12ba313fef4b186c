// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! BGRA production frames.

use gstreamer as gst;
use gstreamer_video as gst_video;
use playout::{Error, FrameFactory, Result};
use tracing::trace;

use super::sample::DecodedSample;

/// A tightly packed BGRA frame backed by a `gst::Buffer`.
///
/// Cloning shares the buffer; nothing is copied.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    buffer: gst::Buffer,
    width: u32,
    height: u32,
}

impl VideoFrame {
    /// Wraps host-rendered BGRA pixels.
    ///
    /// # Errors
    /// [`Error::InvalidFormat`] if `data` is not exactly `width * height * 4`
    /// bytes.
    pub fn from_bgra(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "BGRA frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            buffer: gst::Buffer::from_mut_slice(data),
            width,
            height,
        })
    }

    /// Wraps a decoded BGRA sample. Rows are repacked only when the decoder
    /// padded them.
    ///
    /// # Errors
    /// [`Error::Conversion`] if the sample has no buffer or caps, or is not
    /// BGRA.
    pub fn from_sample(sample: &gst::Sample) -> Result<Self> {
        let caps = sample
            .caps()
            .ok_or_else(|| Error::Conversion("sample has no caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| Error::Conversion(format!("unreadable video caps: {e}")))?;
        if info.format() != gst_video::VideoFormat::Bgra {
            return Err(Error::Conversion(format!(
                "expected BGRA, got {:?}",
                info.format()
            )));
        }
        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| Error::Conversion("sample has no buffer".to_string()))?;

        let row = info.width() as usize * 4;
        let stride = info.stride().first().copied().unwrap_or_default() as usize;
        if stride == row {
            return Ok(Self {
                buffer,
                width: info.width(),
                height: info.height(),
            });
        }

        trace!(stride, row, "Repacking padded BGRA rows");
        let map = buffer
            .map_readable()
            .map_err(|e| Error::Conversion(format!("cannot map buffer: {e}")))?;
        let offset = info.offset().first().copied().unwrap_or_default();
        let mut packed = Vec::with_capacity(row * info.height() as usize);
        for line in 0..info.height() as usize {
            let start = offset + line * stride;
            let bytes = map
                .get(start..start + row)
                .ok_or_else(|| Error::Conversion("buffer shorter than its caps".to_string()))?;
            packed.extend_from_slice(bytes);
        }
        let mut repacked = gst::Buffer::from_mut_slice(packed);
        if let Some(repacked) = repacked.get_mut() {
            repacked.set_pts(buffer.pts());
            repacked.set_duration(buffer.duration());
        }
        Ok(Self {
            buffer: repacked,
            width: info.width(),
            height: info.height(),
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Timestamp the decoder gave the frame.
    pub fn pts(&self) -> Option<gst::ClockTime> {
        self.buffer.pts()
    }

    /// The backing buffer.
    pub fn buffer(&self) -> &gst::Buffer {
        &self.buffer
    }

    /// Unwraps the backing buffer.
    pub fn into_buffer(self) -> gst::Buffer {
        self.buffer
    }

    /// Runs `f` over the packed BGRA bytes.
    ///
    /// # Errors
    /// [`Error::Conversion`] if the buffer cannot be mapped.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let map = self
            .buffer
            .map_readable()
            .map_err(|e| Error::Conversion(format!("cannot map buffer: {e}")))?;
        Ok(f(map.as_slice()))
    }
}

/// Converts decoded samples into [`VideoFrame`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct BgraFrameFactory;

impl FrameFactory<DecodedSample> for BgraFrameFactory {
    type Frame = VideoFrame;

    fn make_frame(&self, sample: DecodedSample) -> Result<VideoFrame> {
        VideoFrame::from_sample(sample.sample())
    }
}
