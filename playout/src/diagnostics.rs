// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Named diagnostic channels.
//!
//! A [`Diagnostics`] handle is shared by every thread of one producer or
//! consumer. Values hold the latest sample of a numeric channel, tags count
//! discrete events. Tags are mirrored to `tracing` so they show up in logs
//! even when no monitoring surface samples the handle.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Time of the most recently delivered or encoded frame, in seconds.
pub const FRAME_TIME: &str = "frame-time";
/// Playout buffer occupancy as a fraction of its capacity.
pub const BUFFER: &str = "buffer";
/// Tagged when the production clock asked for a frame that was not ready.
pub const UNDERFLOW: &str = "underflow";
/// Tagged when a capture queue rejected a frame.
pub const DROPPED_FRAME: &str = "dropped-frame";
/// Input queue occupancy as a fraction of its capacity.
pub const INPUT: &str = "input";
/// Tagged when a seek is issued to the decode graph.
pub const SEEK: &str = "seek";

/// Severity of a tag event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagSeverity {
    /// Expected event (a seek).
    Info,
    /// Degraded playback (underflow, dropped frame).
    Warning,
}

#[derive(Default)]
struct Channels {
    text: String,
    values: BTreeMap<&'static str, f64>,
    tags: BTreeMap<&'static str, u64>,
}

/// Shared diagnostic state of one producer or consumer.
pub struct Diagnostics {
    name: String,
    channels: Mutex<Channels>,
}

impl Diagnostics {
    /// Creates a handle labelled `name` in log output.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            channels: Mutex::new(Channels::default()),
        })
    }

    /// The label given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the status line.
    pub fn set_text(&self, text: impl Into<String>) {
        self.channels.lock().text = text.into();
    }

    /// The current status line.
    pub fn text(&self) -> String {
        self.channels.lock().text.clone()
    }

    /// Records the latest value of a numeric channel.
    pub fn set_value(&self, channel: &'static str, value: f64) {
        self.channels.lock().values.insert(channel, value);
    }

    /// Latest value of a numeric channel, if any was recorded.
    pub fn value(&self, channel: &'static str) -> Option<f64> {
        self.channels.lock().values.get(channel).copied()
    }

    /// Counts one occurrence of a tag event.
    pub fn set_tag(&self, severity: TagSeverity, channel: &'static str) {
        *self.channels.lock().tags.entry(channel).or_default() += 1;
        match severity {
            TagSeverity::Info => info!(source = %self.name, tag = channel),
            TagSeverity::Warning => warn!(source = %self.name, tag = channel),
        }
    }

    /// Number of times a tag was raised.
    pub fn tag_count(&self, channel: &'static str) -> u64 {
        self.channels.lock().tags.get(channel).copied().unwrap_or(0)
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
