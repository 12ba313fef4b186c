// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample Source lifecycle against an in-memory decode graph.
//!
//! # Test Coverage
//!
//! - Abort is idempotent and releases every sample
//! - Control calls without a graph are ignored
//! - Reset rebuilds the graph in place, also after a failed rebuild
//! - Loop-on-end-of-stream restarts the media at zero

mod common;

use std::{
    collections::BTreeMap,
    sync::{Arc, atomic::Ordering},
    thread,
    time::Duration,
};

use common::{MockBuilder, format_25p, init_logging, wait_until};
use playout::{
    DecodeRequest, Diagnostics, Error, PlayoutSettings, SampleSource, diagnostics::SEEK,
};

fn open(
    builder: &MockBuilder,
    settings: PlayoutSettings,
    loop_on_eos: bool,
) -> (SampleSource<MockBuilder>, Arc<Diagnostics>) {
    init_logging();
    let diagnostics = Diagnostics::new("source");
    let request = DecodeRequest {
        uri: "mock://source".into(),
        format: format_25p(),
        options: BTreeMap::new(),
    };
    let source = SampleSource::new(
        builder.clone(),
        request,
        &settings,
        loop_on_eos,
        diagnostics.clone(),
    )
    .unwrap();
    (source, diagnostics)
}

fn fast_monitor() -> PlayoutSettings {
    PlayoutSettings {
        monitor_poll_ms: 5,
        ..Default::default()
    }
}

fn drain(source: &SampleSource<MockBuilder>) -> Vec<u64> {
    std::iter::from_fn(|| source.try_pop_video())
        .map(|sample| sample.index)
        .collect()
}

#[test]
fn abort_twice_releases_every_sample() {
    let builder = MockBuilder::new(500);
    let (source, _) = open(&builder, fast_monitor(), false);
    source.start();
    assert!(wait_until(|| source.video_len() > 0));

    source.abort();
    assert!(wait_until(|| builder.graphs.load(Ordering::SeqCst) == 0));
    source.abort();

    assert_eq!(source.video_len(), 0);
    assert_eq!(builder.live.load(Ordering::SeqCst), 0);
}

#[test]
fn control_calls_after_abort_are_ignored() {
    let builder = MockBuilder::new(500);
    let (source, diagnostics) = open(&builder, fast_monitor(), false);
    source.abort();

    source.start();
    source.seek(1000, true);
    source.stop();
    thread::sleep(Duration::from_millis(20));

    assert_eq!(diagnostics.tag_count(SEEK), 0);
    assert_eq!(source.video_len(), 0);
    assert!(matches!(source.reset(), Err(Error::NoGraph)));
    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_restores_delivery_after_end_of_stream() {
    let builder = MockBuilder::new(5);
    let (source, _) = open(&builder, fast_monitor(), false);
    source.start();
    assert!(wait_until(|| source.is_eof()));
    assert_eq!(drain(&source), vec![0, 1, 2, 3, 4]);

    source.reset().unwrap();
    assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    assert!(wait_until(|| builder.graphs.load(Ordering::SeqCst) == 1));

    // The source was playing, so the rebuilt graph plays too.
    assert!(wait_until(|| source.video_len() == 5));
    assert_eq!(drain(&source), vec![0, 1, 2, 3, 4]);
    assert!(wait_until(|| source.is_eof()));
}

#[test]
fn failed_rebuild_leaves_no_graph_until_the_next_reset() {
    let builder = MockBuilder::new(500);
    let (source, diagnostics) = open(&builder, fast_monitor(), false);
    source.start();
    assert!(wait_until(|| source.video_len() > 0));

    builder.fail.store(true, Ordering::SeqCst);
    assert!(matches!(source.reset(), Err(Error::MissingElement(_))));
    assert!(wait_until(|| builder.graphs.load(Ordering::SeqCst) == 0));

    source.seek(400, true);
    assert_eq!(diagnostics.tag_count(SEEK), 0);

    builder.fail.store(false, Ordering::SeqCst);
    source.reset().unwrap();
    assert!(wait_until(|| source.video_len() > 0));
    assert_eq!(source.try_pop_video().map(|sample| sample.index), Some(0));
}

#[test]
fn end_of_stream_loops_to_zero_when_configured() {
    let builder = MockBuilder::new(3);
    // A two-slot queue paces the feeder by our pops, so the first samples of
    // every pass are still queued when we look.
    let settings = PlayoutSettings {
        video_queue_capacity: 2,
        ..fast_monitor()
    };
    let (source, diagnostics) = open(&builder, settings, true);
    source.start();

    let mut seen = Vec::new();
    assert!(wait_until(|| {
        seen.extend(drain(&source));
        seen.iter().filter(|index| **index == 0).count() >= 3
    }));

    assert!(seen.iter().all(|index| *index < 3), "{seen:?}");
    assert!(!source.is_eof());
    assert!(diagnostics.tag_count(SEEK) >= 2);
}
