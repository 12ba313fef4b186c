// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Media identifier resolution.
//!
//! Turns what an operator typed (an absolute path, a name relative to the
//! media folder, or a URL) into the URI a decode graph opens, and decides
//! which network buffering hints apply to it.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, warn};

use crate::{Error, Result};

/// File extensions a clip producer accepts.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    ".mov", ".mp4", ".dv", ".flv", ".mpg", ".mkv", ".mxf", ".ts", ".mp3", ".wav", ".wma", ".nut",
    ".flac", ".opus", ".ogg", ".webm",
];

/// URL schemes a clip producer accepts.
pub const MEDIA_PROTOCOLS: &[&str] = &[
    "rtmp://", "rtmps://", "http://", "https://", "mms://", "rtp://", "udp://",
];

/// Returns whether `path` names something a clip producer can open.
pub fn is_valid_media(path: &str) -> bool {
    let lower = path.to_lowercase();
    MEDIA_PROTOCOLS.iter().any(|p| lower.starts_with(p))
        || MEDIA_EXTENSIONS.iter().any(|e| lower.ends_with(e))
}

/// Resolves `path` to a URI.
///
/// # Arguments
/// * `path` - Absolute path, media-folder relative name, or URL
/// * `media_folder` - Folder searched for relative names
///
/// # Errors
/// [`Error::EmptySource`] if `path` is empty.
pub fn resolve_media_uri(path: &str, media_folder: Option<&Path>) -> Result<String> {
    if path.is_empty() {
        return Err(Error::EmptySource);
    }
    if path.contains("://") {
        return Ok(path.to_string());
    }

    let direct = Path::new(path);
    if direct.is_file() {
        return Ok(file_uri(direct));
    }

    if let Some(found) = media_folder.and_then(|folder| find_in_folder(folder, path)) {
        debug!(path, resolved = %found.display(), "Found media in media folder");
        return Ok(file_uri(&found));
    }

    warn!(path, "Media not found locally, passing it to the graph unchanged");
    Ok(path.to_string())
}

fn find_in_folder(folder: &Path, name: &str) -> Option<PathBuf> {
    let exact = folder.join(name);
    if exact.is_file() {
        return Some(exact);
    }
    MEDIA_EXTENSIONS
        .iter()
        .map(|ext| folder.join(format!("{name}{ext}")))
        .find(|candidate| candidate.is_file())
}

fn file_uri(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = absolute.to_string_lossy().replace('\\', "/");
    let text = text.trim_start_matches("//?/");
    if text.starts_with('/') {
        format!("file://{text}")
    } else {
        format!("file:///{text}")
    }
}

/// Network buffering hints for streamed sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkBuffering {
    /// Bytes buffered ahead of playback.
    pub buffer_size: i32,
    /// Media time buffered ahead of playback.
    pub buffer_duration: Duration,
}

impl NetworkBuffering {
    /// Hints for `uri`, or `None` for local media.
    pub fn for_uri(uri: &str) -> Option<Self> {
        let lower = uri.to_lowercase();
        let buffer_size = if lower.starts_with("rtmp://") || lower.starts_with("rtmps://") {
            2 * 1024 * 1024
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            1024 * 1024
        } else {
            return None;
        };
        Some(Self {
            buffer_size,
            buffer_duration: Duration::from_secs(2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(resolve_media_uri("", None), Err(Error::EmptySource)));
    }

    #[test]
    fn urls_pass_through() {
        let uri = "rtmp://example.com/live/stream";
        assert_eq!(resolve_media_uri(uri, None).unwrap(), uri);
    }

    #[test]
    fn finds_name_without_extension_in_media_folder() {
        let folder = std::env::temp_dir().join(format!("playout_media_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("AMB.mp4"), b"").unwrap();

        let uri = resolve_media_uri("AMB", Some(&folder)).unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("/AMB.mp4"));

        std::fs::remove_dir_all(&folder).unwrap();
    }

    #[test]
    fn validates_extensions_and_protocols() {
        assert!(is_valid_media("clip.MOV"));
        assert!(is_valid_media("udp://239.0.0.1:5000"));
        assert!(!is_valid_media("notes.txt"));
    }

    #[test]
    fn buffering_hints_by_protocol() {
        assert_eq!(
            NetworkBuffering::for_uri("rtmps://host/app").map(|b| b.buffer_size),
            Some(2_097_152)
        );
        assert_eq!(
            NetworkBuffering::for_uri("https://host/a.m3u8").map(|b| b.buffer_size),
            Some(1_048_576)
        );
        assert_eq!(NetworkBuffering::for_uri("file:///a.mov"), None);
    }
}
