//! Monotonic clock for frame and sample timestamps

use std::time::Instant;

/// Monotonic clock for presentation timestamps
///
/// Frame hand-off and the recording pump derive their timestamps from one
/// of these. Copies share the same time zero.
#[derive(Debug, Clone, Copy)]
pub struct PTSClock {
    start: Instant,
}

impl PTSClock {
    /// Create a new PTS clock with the current instant as time zero
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Elapsed time since clock creation, in microseconds
    #[inline]
    pub fn pts_micros(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = PTSClock::new();
        let a = clock.pts_micros();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.pts_micros();
        assert!(b >= a + 2_000);
    }

    #[test]
    fn test_copies_share_time_zero() {
        let clock = PTSClock::new();
        std::thread::sleep(Duration::from_millis(5));
        let copy = clock;
        assert!(copy.pts_micros() >= 5_000);
    }
}
