// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Video filter chains.
//!
//! Each [`VideoFilters`] entry becomes a converter element followed by a
//! capsfilter pinning the converted property: `videoscale ! video/x-raw,
//! width=W,height=H`, `videoconvert ! video/x-raw,format=I420` and
//! `videorate ! video/x-raw,framerate=N/1`.

use gstreamer as gst;
use gstreamer_video as gst_video;
use playout::{Error, Result, VideoFilters};

/// Creates an element, mapping a missing plugin to [`Error::MissingElement`].
pub(crate) fn make(factory: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|_| Error::MissingElement(factory.to_string()))
}

fn capsfilter(caps: gst::Caps) -> Result<gst::Element> {
    gst::ElementFactory::make("capsfilter")
        .property("caps", &caps)
        .build()
        .map_err(|_| Error::MissingElement("capsfilter".to_string()))
}

/// Builds the unlinked elements for `filters`, in scale, format, rate order.
pub fn filter_elements(filters: &VideoFilters) -> Result<Vec<gst::Element>> {
    let mut elements = Vec::new();
    if let Some((width, height)) = filters.scale {
        elements.push(make("videoscale")?);
        elements.push(capsfilter(
            gst_video::VideoCapsBuilder::new()
                .width(width as i32)
                .height(height as i32)
                .build(),
        )?);
    }
    if filters.i420 {
        elements.push(make("videoconvert")?);
        elements.push(capsfilter(
            gst_video::VideoCapsBuilder::new()
                .format(gst_video::VideoFormat::I420)
                .build(),
        )?);
    }
    if let Some(fps) = filters.fps {
        elements.push(make("videorate")?);
        elements.push(capsfilter(
            gst_video::VideoCapsBuilder::new()
                .framerate(gst::Fraction::new(fps as i32, 1))
                .build(),
        )?);
    }
    Ok(elements)
}
