// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Element selection for encode graphs.
//!
//! | Codec    | Element       | Bitrate property          | Parser      |
//! |----------|---------------|---------------------------|-------------|
//! | x264     | `x264enc`     | `bitrate` (kbit/s)        | `h264parse` |
//! | openh264 | `openh264enc` | `bitrate` (bit/s)         | `h264parse` |
//! | nvenc    | `nvh264enc`   | `bitrate` (kbit/s)        | `h264parse` |
//! | vp8/vp9  | `vp8enc`/`vp9enc` | `target-bitrate` (bit/s) | none     |
//! | jpeg     | `jpegenc`     | `quality=85`              | none        |

use gstreamer as gst;
use playout::{Container, EncodeConfig, Error, Output, Result, VideoCodec};

/// Factory name and properties of one element, kept apart from the element
/// itself so the selection can be checked without the plugins installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementSpec {
    /// Element factory name.
    pub factory: &'static str,
    /// Properties set from their string form.
    pub properties: Vec<(&'static str, String)>,
}

impl ElementSpec {
    fn new(factory: &'static str) -> Self {
        Self {
            factory,
            properties: Vec::new(),
        }
    }

    fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.properties.push((name, value.to_string()));
        self
    }

    /// Creates the element.
    ///
    /// # Errors
    /// [`Error::MissingElement`] if the plugin providing the factory is not
    /// installed.
    pub fn make(&self) -> Result<gst::Element> {
        let mut builder = gst::ElementFactory::make(self.factory);
        for (name, value) in &self.properties {
            builder = builder.property_from_str(name, value);
        }
        builder
            .build()
            .map_err(|_| Error::MissingElement(self.factory.to_string()))
    }
}

/// The video encoder for `config`.
pub fn encoder(config: &EncodeConfig) -> ElementSpec {
    let kbps = config.video_bitrate;
    let bps = u64::from(kbps) * 1000;
    match config.video_codec {
        VideoCodec::X264 => ElementSpec::new("x264enc")
            .with("bitrate", kbps)
            .with("speed-preset", &config.speed_preset)
            .with("tune", "zerolatency"),
        VideoCodec::OpenH264 => ElementSpec::new("openh264enc").with("bitrate", bps),
        VideoCodec::NvH264 => ElementSpec::new("nvh264enc").with("bitrate", kbps),
        VideoCodec::Vp8 => ElementSpec::new("vp8enc").with("target-bitrate", bps),
        VideoCodec::Vp9 => ElementSpec::new("vp9enc").with("target-bitrate", bps),
        VideoCodec::Jpeg => ElementSpec::new("jpegenc").with("quality", 85),
    }
}

/// The parser placed after the encoder, if the codec needs one.
pub fn parser(codec: VideoCodec) -> Option<ElementSpec> {
    codec.is_h264().then(|| ElementSpec::new("h264parse"))
}

/// Muxer for a file container.
pub fn muxer(container: Container) -> ElementSpec {
    match container {
        Container::Mp4 => ElementSpec::new("mp4mux"),
        Container::Mov => ElementSpec::new("qtmux"),
        Container::Flv => ElementSpec::new("flvmux"),
        Container::Matroska => ElementSpec::new("matroskamux"),
        Container::MpegTs => ElementSpec::new("mpegtsmux"),
        Container::WebM => ElementSpec::new("webmmux"),
        Container::Avi => ElementSpec::new("avimux"),
    }
}

/// Muxer or payloader followed by the sink for `output`.
pub fn output(output: &Output) -> Vec<ElementSpec> {
    match output {
        Output::Rtmp { location } => vec![
            ElementSpec::new("flvmux").with("streamable", true),
            ElementSpec::new("rtmpsink").with("location", location),
        ],
        Output::Rtsp { host, port } => vec![
            ElementSpec::new("rtph264pay"),
            ElementSpec::new("udpsink")
                .with("host", host)
                .with("port", port),
        ],
        Output::Udp { host, port } => vec![
            ElementSpec::new("mpegtsmux"),
            ElementSpec::new("udpsink")
                .with("host", host)
                .with("port", port),
        ],
        Output::Hls { playlist_root } => vec![
            ElementSpec::new("mpegtsmux"),
            ElementSpec::new("hlssink").with("playlist-root", playlist_root),
        ],
        Output::File {
            location,
            container,
        } => vec![
            muxer(*container),
            ElementSpec::new("filesink").with("location", location.display()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playout::parse_options;

    fn config(path: &str, args: &str) -> EncodeConfig {
        EncodeConfig::from_options(path, &parse_options(args).unwrap())
    }

    fn factories(specs: &[ElementSpec]) -> Vec<&'static str> {
        specs.iter().map(|spec| spec.factory).collect()
    }

    #[test]
    fn x264_defaults() {
        let spec = encoder(&config("out.mp4", ""));
        assert_eq!(spec.factory, "x264enc");
        assert_eq!(
            spec.properties,
            vec![
                ("bitrate", "3000".to_string()),
                ("speed-preset", "veryfast".to_string()),
                ("tune", "zerolatency".to_string()),
            ]
        );
        assert_eq!(parser(VideoCodec::X264), Some(ElementSpec::new("h264parse")));
    }

    #[test]
    fn vpx_bitrate_is_in_bits() {
        let spec = encoder(&config("out.webm", "-vcodec vp9 -b:v 2500"));
        assert_eq!(spec.factory, "vp9enc");
        assert_eq!(spec.properties, vec![("target-bitrate", "2500000".to_string())]);
        assert_eq!(parser(VideoCodec::Vp9), None);
    }

    #[test]
    fn outputs_pick_muxer_and_sink() {
        let rtmp = config("rtmp://live.example.com/app/key", "");
        assert_eq!(factories(&output(&rtmp.output)), ["flvmux", "rtmpsink"]);

        let udp = config("udp://239.0.0.1:1234", "");
        let specs = output(&udp.output);
        assert_eq!(factories(&specs), ["mpegtsmux", "udpsink"]);
        assert!(specs[1].properties.contains(&("port", "1234".to_string())));

        let rtsp = config("rtsp://127.0.0.1", "");
        let specs = output(&rtsp.output);
        assert_eq!(factories(&specs), ["rtph264pay", "udpsink"]);
        assert!(specs[1].properties.contains(&("port", "5000".to_string())));

        let mkv = config("/tmp/out.webm", "-vcodec x264");
        let specs = output(&mkv.output);
        assert_eq!(factories(&specs), ["matroskamux", "filesink"]);
        assert_eq!(specs[1].properties, vec![("location", "/tmp/out.mkv".to_string())]);

        let mov = config("clip.mov", "");
        assert_eq!(factories(&output(&mov.output)), ["qtmux", "filesink"]);
    }
}
