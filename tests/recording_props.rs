//! Property-Based Tests for the recording pump
//!
//! These tests verify invariants of the sample pump using proptest for input
//! generation and shrinking.
//!
//! Run with: cargo test --test recording_props

use proptest::prelude::*;
use uvccamera::config::RecordingConfig;
use uvccamera::errors::UvcError;
use uvccamera::recording::{EncodedSample, PumpOutcome, RecorderState, SamplePump, StreamKind, TrackFormat};
use uvccamera::testing::MemorySink;

#[derive(Debug, Clone)]
struct Sample {
    video: bool,
    len: usize,
    codec_config: bool,
}

fn sample_strategy() -> impl Strategy<Value = Sample> {
    (any::<bool>(), 0usize..64, prop::bool::weighted(0.1)).prop_map(|(video, len, codec_config)| Sample {
        video,
        len,
        codec_config,
    })
}

fn started_pump() -> SamplePump<MemorySink> {
    started_pump_with(MemorySink::default())
}

fn started_pump_with(sink: MemorySink) -> SamplePump<MemorySink> {
    let mut pump = SamplePump::new(sink, RecordingConfig::default());
    pump.prepare().unwrap();
    pump.start_recording().unwrap();
    pump.add_track(StreamKind::Video, &TrackFormat::new("video/avc")).unwrap();
    pump.add_track(StreamKind::Audio, &TrackFormat::new("audio/mp4a-latm")).unwrap();
    pump
}

proptest! {
    /// Every pumped sample is accounted for exactly once, and only non-empty
    /// data samples reach the sink.
    #[test]
    fn every_sample_is_accounted_for(samples in prop::collection::vec(sample_strategy(), 0..100)) {
        let mut pump = started_pump();
        let mut expected_bytes = 0u64;

        for (i, s) in samples.iter().enumerate() {
            let data = vec![0xAAu8; s.len];
            let mut sample = EncodedSample::new(&data, i as u64 * 1000);
            if s.codec_config {
                sample = sample.codec_config();
            }
            let kind = if s.video { StreamKind::Video } else { StreamKind::Audio };
            let outcome = pump.pump(kind, &sample).unwrap();
            if outcome == PumpOutcome::Written {
                expected_bytes += s.len as u64;
            }
        }

        let stats = pump.stats();
        let total = stats.video_samples + stats.audio_samples + stats.skipped_codec_config
            + stats.skipped_empty + stats.dropped;
        prop_assert_eq!(total, samples.len() as u64);
        prop_assert_eq!(stats.dropped, 0);
        prop_assert_eq!(stats.bytes_written, expected_bytes);
        prop_assert!(pump.sink().samples.iter().all(|w| !w.data.is_empty()));
    }

    /// Nothing reaches the sink before the video track exists.
    #[test]
    fn nothing_written_before_video_track(count in 1usize..20) {
        let mut pump = SamplePump::new(MemorySink::default(), RecordingConfig::default());
        pump.prepare().unwrap();
        pump.start_recording().unwrap();
        pump.add_track(StreamKind::Audio, &TrackFormat::new("audio/mp4a-latm")).unwrap();

        for i in 0..count {
            let outcome = pump.pump(StreamKind::Audio, &EncodedSample::new(&[1, 2], i as u64)).unwrap();
            prop_assert_eq!(outcome, PumpOutcome::Dropped);
        }
        prop_assert!(pump.sink().samples.is_empty());
        prop_assert_eq!(pump.state(), RecorderState::Starting);
    }
}

#[test]
fn sink_errors_propagate() {
    let failing_sink = MemorySink {
        fail_writes: Some("disk full".to_string()),
        ..MemorySink::default()
    };
    let mut failing = started_pump_with(failing_sink);
    assert_eq!(failing.state(), RecorderState::Started);

    let err = failing.pump(StreamKind::Video, &EncodedSample::new(&[1], 0)).unwrap_err();
    assert_eq!(err, UvcError::Sink("disk full".to_string()));
    assert_eq!(failing.stats().video_samples, 0);

    let mut pump = started_pump();
    assert_eq!(pump.pump(StreamKind::Video, &EncodedSample::new(&[1], 0)).unwrap(), PumpOutcome::Written);
}

#[test]
fn audio_reported_first_or_last_starts_the_same_recording() {
    for order in [[StreamKind::Video, StreamKind::Audio], [StreamKind::Audio, StreamKind::Video]] {
        let mut pump = SamplePump::new(MemorySink::default(), RecordingConfig::default());
        pump.prepare().unwrap();
        pump.start_recording().unwrap();
        for kind in order {
            let mime = if kind == StreamKind::Video { "video/avc" } else { "audio/mp4a-latm" };
            pump.add_track(kind, &TrackFormat::new(mime)).unwrap();
        }
        assert_eq!(pump.state(), RecorderState::Started, "{:?}", order);
        assert!(pump.sink().started);
    }
}

#[test]
fn pump_records_again_after_stop() {
    let mut pump = started_pump();
    pump.pump(StreamKind::Video, &EncodedSample::new(&[1; 4], 0)).unwrap();
    let first = pump.stop_recording().unwrap();
    assert_eq!(first.video_samples, 1);
    assert_eq!(pump.state(), RecorderState::Initialized);

    pump.prepare().unwrap();
    pump.start_recording().unwrap();
    pump.add_track(StreamKind::Video, &TrackFormat::new("video/avc")).unwrap();
    pump.add_track(StreamKind::Audio, &TrackFormat::new("audio/mp4a-latm")).unwrap();
    pump.pump(StreamKind::Audio, &EncodedSample::new(&[2; 6], 1_000)).unwrap();

    let second = pump.stop_recording().unwrap();
    assert_eq!((second.video_samples, second.audio_samples), (0, 1));
    assert_eq!(second.bytes_written, 6);
    assert_eq!(pump.sink().segments, 1);
}
