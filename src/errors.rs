use crate::controls::{ControlKind, ControlMode};

/// Errors surfaced by the camera session, control registry and recording pump.
///
/// Native status codes are carried verbatim; zero never appears in an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UvcError {
    #[error("native driver failed to allocate a camera handle")]
    HandleCreationFailed,
    #[error("device connect failed with status {0}")]
    ConnectFailed(i32),
    #[error("session is already connected")]
    AlreadyConnected,
    #[error("device rejected stream configuration with status {0}")]
    ConfigurationRejected(i32),
    #[error("invalid preview size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("device is closed")]
    DeviceClosed,
    #[error("device rejected streaming request with status {0}")]
    StreamRejected(i32),
    #[error("failed to update control {kind}: status {code}")]
    ControlUpdateFailed { kind: ControlKind, code: i32 },
    #[error("control {0} is not supported by this device")]
    ControlUnsupported(ControlKind),
    #[error("control {kind} is a {actual:?} control, not {expected:?}")]
    ControlModeMismatch {
        kind: ControlKind,
        expected: ControlMode,
        actual: ControlMode,
    },
    #[error("capability descriptor parsed incompletely ({skipped} entries or sizes skipped)")]
    CapabilityParseIncomplete { skipped: usize },
    #[error("invalid sample: {0}")]
    InvalidSample(String),
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("sample sink error: {0}")]
    Sink(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("lock poisoned by previous panic")]
    PoisonedLock,
}

impl UvcError {
    /// Returns true for failures after which the session keeps its prior state
    /// and the call may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UvcError::ConnectFailed(_)
                | UvcError::ConfigurationRejected(_)
                | UvcError::StreamRejected(_)
                | UvcError::ControlUpdateFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UvcError>;
