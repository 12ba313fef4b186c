// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for playout operations.
//!
//! Errors only ever leave this crate from constructors and control calls.
//! Everything the production clock calls per tick is infallible and degrades
//! to a still frame or an empty delivery instead.

use crate::graph::GraphState;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when building or driving a playout graph.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source identifier (path or URI) is empty.
    #[error("Source identifier is empty")]
    EmptySource,

    /// The source is neither a known media file nor a supported protocol.
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    /// The decode or encode graph could not be built.
    #[error("Failed to build graph: {0}")]
    Construction(String),

    /// An element required by the graph is not installed.
    #[error("Required element unavailable: {0}")]
    MissingElement(String),

    /// The graph refused a state transition.
    #[error("Graph state change to {0:?} failed")]
    StateChange(GraphState),

    /// The graph rejected a seek request.
    #[error("Seek failed: {0}")]
    Seek(String),

    /// The graph handle has been torn down.
    #[error("Graph is not available")]
    NoGraph,

    /// A sample or frame could not be converted.
    #[error("Frame conversion failed: {0}")]
    Conversion(String),

    /// The encode graph did not accept a sample.
    #[error("Push into encode graph failed: {0}")]
    Push(String),

    /// A video format has degenerate dimensions or rate.
    #[error("Invalid video format: {0}")]
    InvalidFormat(String),

    /// A clip control command could not be parsed or applied.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// `initialize` was called twice on the same consumer.
    #[error("Consumer already initialized")]
    AlreadyInitialized,

    /// A worker thread could not be spawned.
    #[error("Failed to spawn thread: {0}")]
    Thread(#[from] std::io::Error),

    /// A configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A generic error for failures not covered above.
    #[error("Other error: {0}")]
    Other(String),
}
