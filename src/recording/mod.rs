//! Recording support
//!
//! Encoding and container writing happen outside this crate. This module
//! carries the recorder state machine and the pump that feeds encoder output
//! into an append-only [`SampleSink`].
//!
//! # Example
//! ```rust,ignore
//! use uvccamera::recording::{EncodedSample, SamplePump, StreamKind, TrackFormat};
//!
//! let mut pump = SamplePump::new(sink, config.recording.clone());
//! pump.prepare()?;
//! pump.start_recording()?;
//! pump.add_track(StreamKind::Video, &TrackFormat::new("video/avc"))?;
//! pump.add_track(StreamKind::Audio, &TrackFormat::new("audio/mp4a-latm"))?;
//!
//! // For every encoder output buffer:
//! pump.pump(StreamKind::Video, &EncodedSample::new(&buf, pts_us))?;
//!
//! let stats = pump.stop_recording()?;
//! ```

mod pump;
mod state;

pub use pump::{EncodedSample, PumpOutcome, PumpStats, SamplePump, SampleSink, StreamKind, TrackFormat};
pub use state::RecorderState;
