//! Encoded sample pump
//!
//! Feeds encoder output into an append-only [`SampleSink`]. The sink starts
//! once every track named by [`RecordingTracks`] is registered; anything
//! pumped before that point is dropped. A stopped pump is back in
//! `Initialized` and can record again.

use super::state::RecorderState;
use crate::config::{RecordingConfig, RecordingTracks};
use crate::errors::{Result, UvcError};
use crate::timing::PTSClock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Format of one elementary stream, as reported by its encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub mime: String,
    /// Out-of-band codec configuration (SPS/PPS, AudioSpecificConfig)
    pub codec_config: Vec<u8>,
}

impl TrackFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            codec_config: Vec::new(),
        }
    }

    pub fn with_codec_config(mut self, config: impl Into<Vec<u8>>) -> Self {
        self.codec_config = config.into();
        self
    }
}

/// One encoder output buffer. The payload is `data[offset..offset + size]`.
#[derive(Debug, Clone, Copy)]
pub struct EncodedSample<'a> {
    pub data: &'a [u8],
    pub offset: usize,
    pub size: usize,
    pub pts_us: u64,
    pub key_frame: bool,
    pub codec_config: bool,
}

impl<'a> EncodedSample<'a> {
    /// Whole buffer as payload.
    pub fn new(data: &'a [u8], pts_us: u64) -> Self {
        Self {
            data,
            offset: 0,
            size: data.len(),
            pts_us,
            key_frame: false,
            codec_config: false,
        }
    }

    pub fn key_frame(mut self) -> Self {
        self.key_frame = true;
        self
    }

    pub fn codec_config(mut self) -> Self {
        self.codec_config = true;
        self
    }

    pub fn window(mut self, offset: usize, size: usize) -> Self {
        self.offset = offset;
        self.size = size;
        self
    }

    fn payload(&self) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(self.size)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                UvcError::InvalidSample(format!(
                    "window {}+{} exceeds buffer of {} bytes",
                    self.offset,
                    self.size,
                    self.data.len()
                ))
            })?;
        Ok(&self.data[self.offset..end])
    }
}

/// Append-only media container writer. Naming, rotation and storage of the
/// output are the sink's business.
pub trait SampleSink: Send {
    /// Register a track before `start`; returns its track index.
    fn add_track(&mut self, kind: StreamKind, format: &TrackFormat) -> Result<usize>;
    fn start(&mut self) -> Result<()>;
    fn write_sample(&mut self, track: usize, data: &[u8], pts_us: u64, key_frame: bool) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// What happened to one pumped sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Written,
    /// The sink has not started, or the sample's track is not registered.
    Dropped,
    SkippedCodecConfig,
    SkippedEmpty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpStats {
    pub video_samples: u64,
    pub audio_samples: u64,
    pub bytes_written: u64,
    pub dropped: u64,
    pub skipped_codec_config: u64,
    pub skipped_empty: u64,
    /// Span between the first and last written presentation timestamps
    pub duration_us: u64,
}

/// Drives a [`SampleSink`] through the recorder lifecycle.
pub struct SamplePump<S: SampleSink> {
    sink: S,
    config: RecordingConfig,
    state: RecorderState,
    video_track: Option<usize>,
    audio_track: Option<usize>,
    sink_started: bool,
    clock: Option<PTSClock>,
    first_pts: Option<u64>,
    stats: PumpStats,
}

impl<S: SampleSink> SamplePump<S> {
    pub fn new(sink: S, config: RecordingConfig) -> Self {
        Self {
            sink,
            config,
            state: RecorderState::Initialized,
            video_track: None,
            audio_track: None,
            sink_started: false,
            clock: None,
            first_pts: None,
            stats: PumpStats::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Wall time since the sink started, in microseconds.
    pub fn elapsed_us(&self) -> Option<u64> {
        self.clock.as_ref().map(PTSClock::pts_micros)
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.state = self.state.transition(RecorderState::Prepared)?;
        Ok(())
    }

    pub fn start_recording(&mut self) -> Result<()> {
        self.state = self.state.transition(RecorderState::Starting)?;
        log::info!("Recording starting");
        Ok(())
    }

    /// Register an encoder's output track. Starts the sink once every
    /// expected track is present, whichever encoder reports first.
    pub fn add_track(&mut self, kind: StreamKind, format: &TrackFormat) -> Result<usize> {
        if self.state != RecorderState::Starting {
            return Err(UvcError::InvalidStateTransition {
                from: self.state.to_string(),
                to: format!("{:?} track registration", kind),
            });
        }
        if !self.config.tracks.expects(kind) {
            return Err(UvcError::Sink(format!(
                "{:?} track is not part of a {:?} recording",
                kind, self.config.tracks
            )));
        }
        let slot = match kind {
            StreamKind::Video => &mut self.video_track,
            StreamKind::Audio => &mut self.audio_track,
        };
        if slot.is_some() {
            return Err(UvcError::Sink(format!("{:?} track already registered", kind)));
        }
        let track = self.sink.add_track(kind, format)?;
        *slot = Some(track);
        log::debug!("Registered {:?} track {} ({})", kind, track, format.mime);

        if self.all_tracks_registered() {
            self.sink.start()?;
            self.sink_started = true;
            self.clock = Some(PTSClock::new());
            self.state = self.state.transition(RecorderState::Started)?;
            log::info!("Recording started");
        }
        Ok(track)
    }

    fn all_tracks_registered(&self) -> bool {
        match self.config.tracks {
            RecordingTracks::Video => self.video_track.is_some(),
            RecordingTracks::VideoAndAudio => self.video_track.is_some() && self.audio_track.is_some(),
            RecordingTracks::Audio => self.audio_track.is_some(),
        }
    }

    pub fn pump(&mut self, kind: StreamKind, sample: &EncodedSample<'_>) -> Result<PumpOutcome> {
        let track = match kind {
            StreamKind::Video => self.video_track,
            StreamKind::Audio => self.audio_track,
        };
        let Some(track) = track.filter(|_| self.sink_started && self.state.is_started()) else {
            self.stats.dropped += 1;
            return Ok(PumpOutcome::Dropped);
        };
        if sample.codec_config && self.config.skip_codec_config {
            self.stats.skipped_codec_config += 1;
            return Ok(PumpOutcome::SkippedCodecConfig);
        }
        if sample.size == 0 {
            self.stats.skipped_empty += 1;
            return Ok(PumpOutcome::SkippedEmpty);
        }

        let payload = sample.payload()?;
        self.sink.write_sample(track, payload, sample.pts_us, sample.key_frame)?;

        match kind {
            StreamKind::Video => self.stats.video_samples += 1,
            StreamKind::Audio => self.stats.audio_samples += 1,
        }
        self.stats.bytes_written += payload.len() as u64;
        let first = *self.first_pts.get_or_insert(sample.pts_us);
        self.stats.duration_us = self.stats.duration_us.max(sample.pts_us.saturating_sub(first));
        Ok(PumpOutcome::Written)
    }

    /// Finish the sink and return to `Initialized`, ready for another
    /// recording. Returns the stats of the recording just stopped.
    pub fn stop_recording(&mut self) -> Result<PumpStats> {
        self.state = self.state.transition(RecorderState::Stopping)?;
        let finished = if self.sink_started { self.sink.finish() } else { Ok(()) };
        let stats = self.stats;
        self.state = self.state.transition(RecorderState::Uninitialized)?;
        self.init()?;
        finished?;
        log::info!(
            "Recording stopped: {} video / {} audio samples, {} bytes",
            stats.video_samples,
            stats.audio_samples,
            stats.bytes_written
        );
        Ok(stats)
    }

    /// Abandon the recording from any state. The pump stays `Uninitialized`
    /// until [`SamplePump::init`].
    pub fn release(&mut self) {
        if self.sink_started {
            if let Err(e) = self.sink.finish() {
                log::warn!("Sink finish during release failed: {}", e);
            }
        }
        self.clear_recording();
        self.state = RecorderState::Uninitialized;
    }

    /// Bring a released pump back to `Initialized` with fresh stats.
    pub fn init(&mut self) -> Result<()> {
        self.state = self.state.transition(RecorderState::Initialized)?;
        self.clear_recording();
        Ok(())
    }

    fn clear_recording(&mut self) {
        self.sink_started = false;
        self.video_track = None;
        self.audio_track = None;
        self.clock = None;
        self.first_pts = None;
        self.stats = PumpStats::default();
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
