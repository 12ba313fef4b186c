//! GStreamer backend for the playout engine
//!
//! This crate plugs GStreamer graphs into the backend-independent traits of
//! the `playout` crate:
//!
//! - **Decode side**: [`PlaybinBuilder`] builds a `playbin` whose video and
//!   audio sinks are appsinks feeding a [`playout::SampleSink`];
//!   [`BgraFrameFactory`] turns decoded samples into [`VideoFrame`]s.
//! - **Encode side**: [`EncodeBinBuilder`] assembles
//!   `appsrc → filters → videoconvert → encoder → parser → muxer → sink`
//!   from a [`playout::EncodeConfig`].
//!
//! ## Initialization
//! [`init`] must be called before any graph is built. It initializes
//! GStreamer once per process, applies the debug threshold from
//! `GST_PLAYOUT_DEBUG_LEVEL` and forwards GStreamer's debug log into
//! `tracing`. Calls are reference counted; [`deinit`] releases GStreamer
//! when the last reference goes away.
//!
//! ## GStreamer Concepts (for non-GStreamer developers)
//! - **playbin**: an all-in-one element that picks demuxers and decoders for a URI
//! - **appsink / appsrc**: elements handing buffers to and from application code
//! - **Caps (Capabilities)**: media format descriptions (resolution, framerate, etc.)
//! - **Bus**: the pipeline's message queue (end-of-stream, errors, state changes)

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::LazyLock;

use gstreamer as gst;
use parking_lot::Mutex;
use playout::{
    ClipProducer, ConsumerConfig, Error, FrameConsumer, PlayoutSettings, ProducerConfig, Result,
    VideoFormat,
};
use tracing::{debug, error, info, trace, warn};

/// Video filter chains shared by the decode and encode graphs
pub mod filters;

/// Encode graph (appsrc → encoder → muxer → output)
pub mod sink;

/// Decode graph (playbin → appsinks) and frame conversion
pub mod source;

pub use sink::{EncodeBin, EncodeBinBuilder};
pub use source::{BgraFrameFactory, DecodedSample, PlaybinBuilder, PlaybinGraph, VideoFrame};

/// A clip producer decoding through GStreamer.
pub type GstProducer = ClipProducer<PlaybinBuilder, BgraFrameFactory>;

/// A frame consumer encoding through GStreamer.
pub type GstConsumer = FrameConsumer<EncodeBinBuilder>;

/// Environment variable holding the GStreamer debug threshold (0-9).
pub const DEBUG_LEVEL_ENV: &str = "GST_PLAYOUT_DEBUG_LEVEL";

/// Factories every graph depends on.
const REQUIRED_FACTORIES: &[&str] = &["playbin", "appsink", "appsrc", "videoconvert"];

/// GStreamer debug category for playout graph messages
pub(crate) static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "playout",
        gst::DebugColorFlags::empty(),
        Some("Playout graphs"),
    )
});

struct InitState {
    count: usize,
    bridged: bool,
    released: bool,
}

static INIT: Mutex<InitState> = parking_lot::const_mutex(InitState {
    count: 0,
    bridged: false,
    released: false,
});

/// Initializes GStreamer and takes a reference on it.
///
/// The first call initializes GStreamer, applies the debug threshold from
/// [`DEBUG_LEVEL_ENV`] (default 2, warnings), bridges the GStreamer debug log
/// into `tracing` and checks that the required elements are installed.
/// Later calls only take another reference.
///
/// # Errors
/// * [`Error::Construction`] if GStreamer fails to initialize, or was
///   already released by [`deinit`]
/// * [`Error::MissingElement`] if a required plugin is not installed
pub fn init() -> Result<()> {
    let mut state = INIT.lock();
    if state.released {
        return Err(Error::Construction(
            "GStreamer cannot be initialized again after deinit".to_string(),
        ));
    }
    if state.count > 0 {
        state.count += 1;
        return Ok(());
    }

    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::filter::LevelFilter;
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .compact()
            .with_thread_ids(true)
            .with_target(false)
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .finish()
            .try_init();
    }

    gst::init().map_err(|e| Error::Construction(format!("Failed to initialize GStreamer: {e}")))?;

    let level = std::env::var(DEBUG_LEVEL_ENV)
        .ok()
        .and_then(|value| parse_debug_level(&value))
        .unwrap_or(gst::DebugLevel::Warning);
    gst::log::set_default_threshold(level);
    CAT.set_threshold(level);
    if !state.bridged {
        bridge_debug_log();
        state.bridged = true;
    }

    info!(version = %gst::version_string(), ?level, "GStreamer initialized");

    for factory in REQUIRED_FACTORIES {
        if gst::ElementFactory::find(factory).is_none() {
            error!(factory, "Required GStreamer element is not installed");
            return Err(Error::MissingElement((*factory).to_string()));
        }
    }

    state.count = 1;
    Ok(())
}

/// Releases a reference taken by [`init`]; the last one deinitializes
/// GStreamer. GStreamer cannot be initialized again afterwards.
///
/// # Safety
/// When the last reference is released no GStreamer object (producer,
/// consumer, frame or sample) may still be alive or used afterwards.
pub unsafe fn deinit() {
    let mut state = INIT.lock();
    match state.count {
        0 => warn!("deinit called without a matching init"),
        1 => {
            state.count = 0;
            state.released = true;
            info!("Deinitializing GStreamer");
            // SAFETY: the caller guarantees no GStreamer object outlives this call.
            unsafe { gst::deinit() };
        }
        _ => state.count -= 1,
    }
}

/// Whether [`init`] currently holds a reference.
pub fn is_initialized() -> bool {
    INIT.lock().count > 0
}

pub(crate) fn require_init() -> Result<()> {
    if is_initialized() {
        Ok(())
    } else {
        Err(Error::Construction(
            "GStreamer is not initialized, call gstplayout::init() first".to_string(),
        ))
    }
}

/// Opens a clip for playout.
///
/// # Errors
/// Everything [`ClipProducer::new`] reports, plus [`Error::Construction`] if
/// [`init`] was not called.
pub fn open_clip(
    config: ProducerConfig,
    format: VideoFormat,
    settings: PlayoutSettings,
) -> Result<GstProducer> {
    require_init()?;
    ClipProducer::new(
        PlaybinBuilder::default(),
        BgraFrameFactory,
        format,
        config,
        settings,
    )
}

/// Creates an output consumer; the encode graph is built by
/// [`FrameConsumer::initialize`].
///
/// # Errors
/// [`Error::Construction`] if [`init`] was not called.
pub fn open_output(config: ConsumerConfig) -> Result<GstConsumer> {
    require_init()?;
    Ok(FrameConsumer::new(config, EncodeBinBuilder))
}

/// Parses a GStreamer debug level given as a number (`0`-`9`) or a name.
pub fn parse_debug_level(value: &str) -> Option<gst::DebugLevel> {
    let level = match value.trim().to_lowercase().as_str() {
        "0" | "none" => gst::DebugLevel::None,
        "1" | "error" => gst::DebugLevel::Error,
        "2" | "warning" => gst::DebugLevel::Warning,
        "3" | "fixme" => gst::DebugLevel::Fixme,
        "4" | "info" => gst::DebugLevel::Info,
        "5" | "debug" => gst::DebugLevel::Debug,
        "6" | "log" => gst::DebugLevel::Log,
        "7" | "trace" => gst::DebugLevel::Trace,
        "9" | "memdump" => gst::DebugLevel::Memdump,
        _ => return None,
    };
    Some(level)
}

/// Replaces GStreamer's stderr logger with one that emits `tracing` events.
fn bridge_debug_log() {
    gst::log::remove_default_log_function();
    gst::log::add_log_function(|category, level, file, function, line, _object, message| {
        let Some(message) = message.get() else {
            return;
        };
        let category = category.name();
        let file = file.as_str();
        let function = function.as_str();
        match level {
            gst::DebugLevel::Error => {
                error!(category, file, function, line, "{}", message.as_str())
            }
            gst::DebugLevel::Warning | gst::DebugLevel::Fixme => {
                warn!(category, file, function, line, "{}", message.as_str())
            }
            gst::DebugLevel::Info => info!(category, file, function, line, "{}", message.as_str()),
            gst::DebugLevel::Debug => {
                debug!(category, file, function, line, "{}", message.as_str())
            }
            _ => trace!(category, file, function, line, "{}", message.as_str()),
        }
    });
}
