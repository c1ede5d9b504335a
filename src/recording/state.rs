//! Recorder state machine

use crate::errors::{Result, UvcError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recorder lifecycle. `Uninitialized` is also where a released recorder
/// ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecorderState {
    Uninitialized,
    Initialized,
    Prepared,
    Starting,
    Started,
    Stopping,
}

impl RecorderState {
    pub fn can_transition_to(self, next: RecorderState) -> bool {
        use RecorderState::*;
        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Initialized, Prepared)
                | (Prepared, Starting)
                | (Starting, Started)
                | (Starting, Stopping)
                | (Started, Stopping)
                | (_, Uninitialized)
        )
    }

    /// Checked transition; the error names both ends.
    pub fn transition(self, next: RecorderState) -> Result<RecorderState> {
        if self.can_transition_to(next) {
            log::debug!("Recorder {} -> {}", self, next);
            Ok(next)
        } else {
            Err(UvcError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn is_started(self) -> bool {
        self == RecorderState::Started
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, RecorderState::Uninitialized | RecorderState::Initialized)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Uninitialized => "uninitialized",
            RecorderState::Initialized => "initialized",
            RecorderState::Prepared => "prepared",
            RecorderState::Starting => "starting",
            RecorderState::Started => "started",
            RecorderState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = RecorderState::Uninitialized
            .transition(RecorderState::Initialized)
            .and_then(|s| s.transition(RecorderState::Prepared))
            .and_then(|s| s.transition(RecorderState::Starting))
            .and_then(|s| s.transition(RecorderState::Started))
            .and_then(|s| s.transition(RecorderState::Stopping))
            .and_then(|s| s.transition(RecorderState::Uninitialized))
            .unwrap();
        assert_eq!(state, RecorderState::Uninitialized);
    }

    #[test]
    fn test_cannot_skip_prepare() {
        let err = RecorderState::Initialized
            .transition(RecorderState::Starting)
            .unwrap_err();
        assert_eq!(
            err,
            UvcError::InvalidStateTransition {
                from: "initialized".to_string(),
                to: "starting".to_string()
            }
        );
    }

    #[test]
    fn test_release_from_anywhere() {
        for state in [
            RecorderState::Initialized,
            RecorderState::Prepared,
            RecorderState::Starting,
            RecorderState::Started,
            RecorderState::Stopping,
        ] {
            assert!(state.can_transition_to(RecorderState::Uninitialized), "{state}");
        }
        assert!(!RecorderState::Started.can_transition_to(RecorderState::Starting));
    }
}
