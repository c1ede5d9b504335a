//! Sample sink that keeps everything in memory

use crate::errors::{Result, UvcError};
use crate::recording::{SampleSink, StreamKind, TrackFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSample {
    pub track: usize,
    pub data: Vec<u8>,
    pub pts_us: u64,
    pub key_frame: bool,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub tracks: Vec<(StreamKind, TrackFormat)>,
    pub samples: Vec<WrittenSample>,
    pub started: bool,
    pub finished: bool,
    /// Recordings finished before the current one; samples accumulate across them.
    pub segments: usize,
    /// When set, every write fails with this message.
    pub fail_writes: Option<String>,
}

impl SampleSink for MemorySink {
    fn add_track(&mut self, kind: StreamKind, format: &TrackFormat) -> Result<usize> {
        if self.started && !self.finished {
            return Err(UvcError::Sink("tracks must be added before start".to_string()));
        }
        if self.finished {
            self.tracks.clear();
            self.started = false;
            self.finished = false;
            self.segments += 1;
        }
        self.tracks.push((kind, format.clone()));
        Ok(self.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], pts_us: u64, key_frame: bool) -> Result<()> {
        if let Some(message) = &self.fail_writes {
            return Err(UvcError::Sink(message.clone()));
        }
        if !self.started {
            return Err(UvcError::Sink("write before start".to_string()));
        }
        self.samples.push(WrittenSample {
            track,
            data: data.to_vec(),
            pts_us,
            key_frame,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
