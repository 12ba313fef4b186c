// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encoder option mapping.
//!
//! Consumers are configured with ffmpeg-style arguments
//! (`-vcodec x264 -b:v 5000 -vf scale=1280:720`). This module turns them into
//! a structured [`EncodeConfig`] that an [`crate::graph::EncodeGraphBuilder`]
//! assembles programmatically. Unknown values fall back to working defaults
//! with a warning instead of failing the consumer.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use tracing::warn;

use crate::{Error, Result};

/// Parsed `-key value` options.
pub type Options = BTreeMap<String, String>;

static OPTION_PATTERN: LazyLock<core::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"-([^:\s]+):?([^\s=]*)\s+([^-\s][^\s]*)"));

/// Default video bitrate in kbit/s.
pub const DEFAULT_VIDEO_BITRATE: u32 = 3000;

/// Default x264 speed preset.
pub const DEFAULT_SPEED_PRESET: &str = "veryfast";

const SPEED_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Parses `-name[:stream] value` pairs.
///
/// Stream-qualified spellings are folded onto their short aliases:
/// `codec:v` → `vcodec`, `b:v`/`bitrate:v` → `vbitrate`, `filter:v` → `vf`,
/// `f` → `format` (and the audio equivalents).
///
/// # Examples
///
/// ```
/// use playout::options::parse_options;
///
/// let options = parse_options("-codec:v vp9 -b:v 8000 -f webm").unwrap();
/// assert_eq!(options["vcodec"], "vp9");
/// assert_eq!(options["vbitrate"], "8000");
/// assert_eq!(options["format"], "webm");
/// ```
pub fn parse_options(args: &str) -> Result<Options> {
    let pattern = OPTION_PATTERN
        .as_ref()
        .map_err(|e| Error::Other(e.to_string()))?;

    let mut options = Options::new();
    for capture in pattern.captures_iter(args) {
        let name = &capture[1];
        let stream = &capture[2];
        let value = &capture[3];
        let key = if stream.is_empty() {
            name.to_string()
        } else {
            format!("{name}:{stream}")
        };
        options.insert(canonical_key(&key).to_string(), value.to_string());
    }
    Ok(options)
}

fn canonical_key(key: &str) -> &str {
    match key {
        "codec:v" | "c:v" => "vcodec",
        "codec:a" | "c:a" => "acodec",
        "b:v" | "bitrate:v" => "vbitrate",
        "b:a" | "bitrate:a" => "abitrate",
        "filter:v" => "vf",
        "f" => "format",
        other => other,
    }
}

/// Video encoders an encode graph can be built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoCodec {
    /// Software H.264 (x264).
    X264,
    /// Cisco OpenH264.
    OpenH264,
    /// NVIDIA hardware H.264.
    NvH264,
    /// VP8.
    Vp8,
    /// VP9.
    Vp9,
    /// Motion JPEG.
    Jpeg,
}

impl VideoCodec {
    /// Looks a codec up by any of its common names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "x264" | "libx264" | "h264" => Some(Self::X264),
            "openh264" | "libopenh264" => Some(Self::OpenH264),
            "nvenc" | "nvh264" | "h264_nvenc" => Some(Self::NvH264),
            "vp8" | "libvpx" => Some(Self::Vp8),
            "vp9" | "libvpx-vp9" => Some(Self::Vp9),
            "jpeg" | "mjpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Whether the codec produces an H.264 elementary stream.
    pub fn is_h264(&self) -> bool {
        matches!(self, Self::X264 | Self::OpenH264 | Self::NvH264)
    }

    /// Whether the codec can be muxed into WebM.
    pub fn is_vpx(&self) -> bool {
        matches!(self, Self::Vp8 | Self::Vp9)
    }
}

/// Container formats for file outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    /// ISO MP4.
    Mp4,
    /// QuickTime.
    Mov,
    /// Flash video.
    Flv,
    /// Matroska.
    Matroska,
    /// MPEG transport stream.
    MpegTs,
    /// WebM (VP8/VP9 only).
    WebM,
    /// AVI.
    Avi,
}

impl Container {
    /// Looks a container up by format name or file extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "mov" | "qt" => Some(Self::Mov),
            "flv" => Some(Self::Flv),
            "mkv" | "matroska" => Some(Self::Matroska),
            "ts" | "mpegts" => Some(Self::MpegTs),
            "webm" => Some(Self::WebM),
            "avi" => Some(Self::Avi),
            _ => None,
        }
    }
}

/// Where encoded output goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    /// FLV over RTMP.
    Rtmp {
        /// Server URL.
        location: String,
    },
    /// RTP payloaded H.264 over UDP (for an RTSP server to pick up).
    Rtsp {
        /// Destination host.
        host: String,
        /// Destination port.
        port: u16,
    },
    /// MPEG-TS over UDP.
    Udp {
        /// Destination host.
        host: String,
        /// Destination port.
        port: u16,
    },
    /// HTTP live streaming segments.
    Hls {
        /// URL prefix written into the playlist.
        playlist_root: String,
    },
    /// A local file.
    File {
        /// Output file.
        location: PathBuf,
        /// Container format.
        container: Container,
    },
}

/// Default destination port for UDP outputs.
pub const DEFAULT_UDP_PORT: u16 = 5000;

impl Output {
    fn from_path(path: &str, options: &Options, codec: VideoCodec) -> Self {
        let lower = path.to_lowercase();
        if lower.starts_with("rtmp://") || lower.starts_with("rtmps://") {
            return Self::Rtmp {
                location: path.to_string(),
            };
        }
        if let Some(rest) = strip_scheme(path, "rtsp://") {
            let (host, port) = host_port(rest);
            return Self::Rtsp { host, port };
        }
        if let Some(rest) = strip_scheme(path, "udp://") {
            let (host, port) = host_port(rest);
            return Self::Udp { host, port };
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Self::Hls {
                playlist_root: path.to_string(),
            };
        }

        let mut location = PathBuf::from(path);
        let requested = options
            .get("format")
            .map(String::as_str)
            .or_else(|| Path::new(path).extension().and_then(|e| e.to_str()));
        let mut container = match requested.and_then(Container::from_name) {
            Some(container) => container,
            None => {
                warn!(path, format = ?requested, "Unknown container, writing MP4");
                Container::Mp4
            }
        };
        if container == Container::WebM && !codec.is_vpx() {
            warn!(path, ?codec, "WebM needs VP8 or VP9, writing Matroska instead");
            container = Container::Matroska;
            location.set_extension("mkv");
        }
        Self::File {
            location,
            container,
        }
    }
}

fn strip_scheme<'a>(path: &'a str, scheme: &str) -> Option<&'a str> {
    path.get(..scheme.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
        .map(|_| &path[scheme.len()..])
}

fn host_port(rest: &str) -> (String, u16) {
    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse().unwrap_or(DEFAULT_UDP_PORT),
        ),
        None => (authority.to_string(), DEFAULT_UDP_PORT),
    }
}

/// Video filters applied before encoding (or after decoding).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoFilters {
    /// Scale to `(width, height)`.
    pub scale: Option<(u32, u32)>,
    /// Convert to planar 4:2:0.
    pub i420: bool,
    /// Resample to an integer frame rate.
    pub fps: Option<u32>,
}

impl VideoFilters {
    /// Parses `scale=W:H`, `scale=width=W:height=H`, `format=yuv420p` and
    /// `fps=N`, comma separated. Unsupported filters are skipped.
    pub fn parse(description: &str) -> Self {
        let mut filters = Self::default();
        for filter in description.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (name, args) = filter.split_once('=').unwrap_or((filter, ""));
            match name {
                "scale" => filters.scale = parse_scale(args),
                "format" if args == "yuv420p" => filters.i420 = true,
                "fps" => filters.fps = args.parse().ok().filter(|fps| *fps > 0),
                _ => warn!(filter, "Unsupported video filter ignored"),
            }
        }
        filters
    }

    /// Whether no filter is configured.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_scale(args: &str) -> Option<(u32, u32)> {
    let mut width = None;
    let mut height = None;
    for (index, part) in args.split(':').enumerate() {
        let (key, value) = part.split_once('=').unwrap_or(match index {
            0 => ("width", part),
            _ => ("height", part),
        });
        match key {
            "width" | "w" => width = value.parse().ok(),
            "height" | "h" => height = value.parse().ok(),
            _ => {}
        }
    }
    Some((width?, height?))
}

/// Structured encoder configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeConfig {
    /// Video encoder.
    pub video_codec: VideoCodec,
    /// Video bitrate in kbit/s.
    pub video_bitrate: u32,
    /// x264 speed preset.
    pub speed_preset: String,
    /// Output target.
    pub output: Output,
    /// Filters applied before the encoder.
    pub filters: VideoFilters,
}

impl EncodeConfig {
    /// Maps parsed options for the output `path` onto an encoder
    /// configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use playout::options::{Container, EncodeConfig, Output, VideoCodec, parse_options};
    ///
    /// let options = parse_options("-vcodec vp8 -vbitrate 2000").unwrap();
    /// let config = EncodeConfig::from_options("out.webm", &options);
    /// assert_eq!(config.video_codec, VideoCodec::Vp8);
    /// assert_eq!(config.video_bitrate, 2000);
    /// assert!(matches!(config.output, Output::File { container: Container::WebM, .. }));
    /// ```
    pub fn from_options(path: &str, options: &Options) -> Self {
        let video_codec = match options.get("vcodec") {
            None => VideoCodec::X264,
            Some(name) => VideoCodec::from_name(name).unwrap_or_else(|| {
                warn!(codec = %name, "Unknown video codec, using x264");
                VideoCodec::X264
            }),
        };
        let video_bitrate = options
            .get("vbitrate")
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_VIDEO_BITRATE);
        let speed_preset = options
            .get("preset:v")
            .or_else(|| options.get("preset"))
            .filter(|p| SPEED_PRESETS.contains(&p.as_str()))
            .map_or(DEFAULT_SPEED_PRESET, String::as_str)
            .to_string();
        let filters = options
            .get("vf")
            .map(|vf| VideoFilters::parse(vf))
            .unwrap_or_default();

        Self {
            video_codec,
            video_bitrate,
            speed_preset,
            output: Output::from_path(path, options, video_codec),
            filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_x264_in_mp4() {
        let config = EncodeConfig::from_options("out.mp4", &Options::new());
        assert_eq!(config.video_codec, VideoCodec::X264);
        assert_eq!(config.video_bitrate, DEFAULT_VIDEO_BITRATE);
        assert_eq!(config.speed_preset, "veryfast");
        assert_eq!(
            config.output,
            Output::File {
                location: PathBuf::from("out.mp4"),
                container: Container::Mp4
            }
        );
    }

    #[test]
    fn webm_with_h264_switches_to_matroska() {
        let options = parse_options("-vcodec x264").unwrap();
        let config = EncodeConfig::from_options("/tmp/out.webm", &options);
        assert_eq!(
            config.output,
            Output::File {
                location: PathBuf::from("/tmp/out.mkv"),
                container: Container::Matroska
            }
        );
    }

    #[test]
    fn format_option_overrides_extension() {
        let options = parse_options("-f flv").unwrap();
        let config = EncodeConfig::from_options("out.bin", &options);
        assert!(matches!(
            config.output,
            Output::File {
                container: Container::Flv,
                ..
            }
        ));
    }

    #[test]
    fn network_outputs() {
        let none = Options::new();
        assert_eq!(
            EncodeConfig::from_options("udp://239.1.1.1:1234", &none).output,
            Output::Udp {
                host: "239.1.1.1".into(),
                port: 1234
            }
        );
        assert_eq!(
            EncodeConfig::from_options("rtsp://localhost/live", &none).output,
            Output::Rtsp {
                host: "localhost".into(),
                port: DEFAULT_UDP_PORT
            }
        );
        assert!(matches!(
            EncodeConfig::from_options("rtmp://a/b", &none).output,
            Output::Rtmp { .. }
        ));
    }

    #[test]
    fn unknown_codec_and_preset_fall_back() {
        let options = parse_options("-vcodec prores -preset:v warp").unwrap();
        let config = EncodeConfig::from_options("out.mov", &options);
        assert_eq!(config.video_codec, VideoCodec::X264);
        assert_eq!(config.speed_preset, DEFAULT_SPEED_PRESET);
    }

    #[test]
    fn filters_parse_both_scale_spellings() {
        assert_eq!(
            VideoFilters::parse("scale=width=1280:height=720").scale,
            Some((1280, 720))
        );
        let filters = VideoFilters::parse("scale=640:360,format=yuv420p,fps=25,hflip");
        assert_eq!(filters.scale, Some((640, 360)));
        assert!(filters.i420);
        assert_eq!(filters.fps, Some(25));
    }
}
