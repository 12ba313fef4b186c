// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Clip producer behaviour against an in-memory decode graph.
//!
//! # Test Coverage
//!
//! - End of stream with and without looping
//! - Seeks never deliver pre-seek frames
//! - Interlaced field pairing
//! - Trim points, clip commands and monitoring output
//! - Sample release on teardown and construction failures

mod common;

use std::{sync::atomic::Ordering, time::Duration};

use common::{FRAME_MS, MockBuilder, MockFactory, MockFrame, format_25p, init_logging, wait_until};
use playout::{
    ClipCommand, ClipPhase, ClipProducer, Delivery, Error, InterlaceMode, PlayoutSettings,
    ProducerConfig, VideoField,
};
use tracing::info;

type Producer = ClipProducer<MockBuilder, MockFactory>;

fn settings() -> PlayoutSettings {
    PlayoutSettings {
        buffer_capacity: Some(8),
        ..Default::default()
    }
}

fn open(builder: &MockBuilder, config: ProducerConfig) -> Producer {
    init_logging();
    ClipProducer::new(builder.clone(), MockFactory, format_25p(), config, settings()).unwrap()
}

/// Calls `next_frame` until it advances, for at most 5 s.
fn next_advancing(producer: &Producer, field: VideoField) -> Option<MockFrame> {
    let mut advanced = None;
    wait_until(|| match producer.next_frame(field) {
        Delivery::Frame(frame) => {
            advanced = Some(frame);
            true
        }
        _ => false,
    });
    advanced
}

#[test]
fn five_samples_then_end_of_stream() {
    let builder = MockBuilder::new(5);
    let producer = open(&builder, ProducerConfig::new("mock://five"));

    assert!(wait_until(|| producer.is_end_of_clip()));
    assert!(producer.is_ready());

    for index in 0..5 {
        assert_eq!(
            producer.next_frame(VideoField::Progressive),
            Delivery::Frame(MockFrame { index })
        );
        assert_eq!(producer.time(), (index * FRAME_MS) as i64);
    }

    assert_eq!(
        producer.next_frame(VideoField::Progressive),
        Delivery::Still(MockFrame { index: 4 })
    );
    assert_eq!(producer.phase(), ClipPhase::EndHold);
    assert_eq!(producer.diagnostics().tag_count("underflow"), 0);
}

#[test]
fn end_hold_advances_time_by_one_frame() {
    let builder = MockBuilder::new(3);
    let producer = open(&builder, ProducerConfig::new("mock://short"));
    assert!(wait_until(|| producer.is_end_of_clip()));

    for _ in 0..3 {
        assert!(matches!(producer.next_frame(VideoField::Progressive), Delivery::Frame(_)));
    }
    let held = producer.time();
    for step in 1..=10 {
        assert_eq!(
            producer.next_frame(VideoField::Progressive),
            Delivery::Still(MockFrame { index: 2 })
        );
        assert_eq!(producer.time(), held + step * FRAME_MS as i64);
    }
}

#[test]
fn seek_never_delivers_stale_frames() {
    let builder = MockBuilder::new(200);
    let producer = open(&builder, ProducerConfig::new("mock://long"));

    assert!(next_advancing(&producer, VideoField::Progressive).is_some());
    assert!(next_advancing(&producer, VideoField::Progressive).is_some());

    producer.seek(4000);
    let first_after_seek = 4000 / FRAME_MS;
    let mut previous = None;
    for _ in 0..10 {
        let frame = next_advancing(&producer, VideoField::Progressive).unwrap();
        assert!(frame.index >= first_after_seek, "stale frame {}", frame.index);
        if let Some(previous) = previous {
            assert!(frame.index > previous);
        }
        previous = Some(frame.index);
    }
    assert!(producer.time() >= 4000);
    assert_eq!(producer.diagnostics().tag_count("seek"), 1);
}

#[test]
fn loop_wraps_within_one_frame_of_the_end() {
    let builder = MockBuilder::new(100);
    let mut config = ProducerConfig::new("mock://loop");
    config.looping = true;
    config.duration = Some(400);
    let producer = open(&builder, config);

    let frames_per_clip = 400 / FRAME_MS;
    let mut times = Vec::new();
    for _ in 0..3 * frames_per_clip {
        assert!(next_advancing(&producer, VideoField::Progressive).is_some());
        times.push(producer.time());
    }
    info!(?times, "Looped timestamps");

    assert!(times.iter().all(|t| *t >= 0 && *t < 400 + FRAME_MS as i64));
    let wraps = times.windows(2).filter(|pair| pair[1] < pair[0]).count();
    assert!(wraps >= 2, "expected at least two wraps in {times:?}");
}

#[test]
fn loop_on_end_of_stream() {
    let builder = MockBuilder::new(6);
    let mut config = ProducerConfig::new("mock://loop-eos");
    config.looping = true;
    let producer = open(&builder, config);

    let mut wraps = 0;
    let mut last = None;
    for _ in 0..18 {
        let frame = next_advancing(&producer, VideoField::Progressive).unwrap();
        assert!(frame.index < 6);
        if last.is_some_and(|last| frame.index < last) {
            wraps += 1;
        }
        last = Some(frame.index);
    }
    assert!(wraps >= 2);
    assert_eq!(producer.nb_frames(), u32::MAX);
}

#[test]
fn interlaced_fields_stay_paired() {
    init_logging();
    let builder = MockBuilder::new(100);
    let mut format = format_25p();
    format.interlace_mode = InterlaceMode::InterlacedTff;
    let producer = ClipProducer::new(
        builder.clone(),
        MockFactory,
        format,
        ProducerConfig::new("mock://fields"),
        settings(),
    )
    .unwrap();
    assert!(wait_until(|| producer.is_ready()));

    let a = producer.last_frame(VideoField::A);
    let b = producer.last_frame(VideoField::B);
    assert!(matches!(a, Delivery::Still(_)));
    assert_eq!(a, b);

    for _ in 0..20 {
        for field in [VideoField::A, VideoField::B] {
            if let Delivery::Frame(frame) = producer.next_frame(field) {
                let expected = if field == VideoField::A { 0 } else { 1 };
                assert_eq!(frame.index % 2, expected, "frame {} on {field:?}", frame.index);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[test]
fn start_trims_the_clip() {
    let builder = MockBuilder::new(100);
    let mut config = ProducerConfig::new("mock://trim");
    config.start = 800;
    config.duration = Some(200);
    let producer = open(&builder, config);

    assert!(wait_until(|| producer.is_end_of_clip()));
    let mut delivered = Vec::new();
    while let Delivery::Frame(frame) = producer.next_frame(VideoField::Progressive) {
        assert!(producer.time() >= 800);
        delivered.push(frame.index);
    }
    assert_eq!(delivered, vec![20, 21, 22, 23, 24]);
    // The still that ended the loop moved the time to the clip end.
    assert_eq!(producer.time(), 1000);
    assert_eq!(producer.frame_number(), 5);
    assert_eq!(producer.status(), "mock://trim|200/200");
    assert_eq!(producer.nb_frames(), 5);
}

#[test]
fn clip_commands() {
    let builder = MockBuilder::new(100);
    let producer = open(&builder, ProducerConfig::new("mock://cmd"));

    assert_eq!(producer.call(ClipCommand::parse(&["IN", "400"]).unwrap()).unwrap(), 400);
    assert_eq!(producer.call(ClipCommand::parse(&["OUT", "1000"]).unwrap()).unwrap(), 1000);
    assert_eq!(producer.duration(), Some(600));
    assert_eq!(producer.call(ClipCommand::parse(&["LENGTH", "800"]).unwrap()).unwrap(), 800);
    assert_eq!(producer.call(ClipCommand::parse(&["LOOP"]).unwrap()).unwrap(), 1);
    assert!(producer.looping());
    assert_eq!(
        producer
            .call(ClipCommand::parse(&["SEEK", "OUT", "-400"]).unwrap())
            .unwrap(),
        800
    );
    assert_eq!(
        producer
            .call(ClipCommand::parse(&["SEEK", "IN", "-1000"]).unwrap())
            .unwrap(),
        0
    );
}

#[test]
fn extreme_command_values_saturate() {
    let builder = MockBuilder::new(100);
    let producer = open(&builder, ProducerConfig::new("mock://extreme"));

    assert_eq!(producer.call(ClipCommand::parse(&["IN", "400"]).unwrap()).unwrap(), 400);
    assert_eq!(
        producer
            .call(ClipCommand::parse(&["OUT", "-9223372036854775808"]).unwrap())
            .unwrap(),
        i64::MIN
    );
    assert_eq!(producer.duration(), Some(0));
    assert_eq!(
        producer
            .call(ClipCommand::parse(&["SEEK", "OUT", "9223372036854775807"]).unwrap())
            .unwrap(),
        i64::MAX
    );
    assert_eq!(
        producer
            .call(ClipCommand::parse(&["SEEK", "9223372036854775807", "1"]).unwrap())
            .unwrap(),
        i64::MAX
    );
    assert_eq!(
        producer
            .call(ClipCommand::parse(&["SEEK", "REL", "-9223372036854775808"]).unwrap())
            .unwrap(),
        0
    );
    assert_eq!(producer.frame_number(), 0);
}

#[test]
fn reports_status_and_state() {
    let builder = MockBuilder::new(50);
    let mut config = ProducerConfig::new("mock://status");
    config.name = "AMB".into();
    let producer = open(&builder, config);

    assert!(wait_until(|| producer.file_duration().is_some()));
    assert_eq!(producer.file_duration(), Some(2000));
    assert!(next_advancing(&producer, VideoField::Progressive).is_some());

    let status = producer.status();
    assert!(status.starts_with("AMB|"));
    assert!(status.ends_with("/2000"));

    let state = producer.state();
    assert_eq!(state["file/name"], "AMB");
    assert_eq!(state["file/path"], "mock://status");
    assert_eq!(state["loop"], false);
    assert_eq!(state["file/time"][1], 2.0);
}

#[test]
fn teardown_releases_every_sample() {
    let builder = MockBuilder::new(500);
    let producer = open(&builder, ProducerConfig::new("mock://release"));
    assert!(wait_until(|| producer.is_ready()));
    drop(producer);
    assert_eq!(builder.live.load(Ordering::SeqCst), 0);
}

#[test]
fn dispose_does_not_block_the_caller() {
    let builder = MockBuilder::new(500);
    let producer = open(&builder, ProducerConfig::new("mock://dispose"));
    assert!(wait_until(|| producer.is_ready()));
    producer.dispose();
    assert!(wait_until(|| builder.live.load(Ordering::SeqCst) == 0));
}

#[test]
fn construction_failures_are_reported() {
    init_logging();
    let result = ClipProducer::new(
        MockBuilder::new(5),
        MockFactory,
        format_25p(),
        ProducerConfig::new(""),
        settings(),
    );
    assert!(matches!(result, Err(Error::EmptySource)));

    let result = ClipProducer::new(
        MockBuilder::failing(),
        MockFactory,
        format_25p(),
        ProducerConfig::new("mock://broken"),
        settings(),
    );
    assert!(matches!(result, Err(Error::MissingElement(_))));
}
