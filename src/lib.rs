//! uvccamera: USB Video Class camera sessions with normalized controls
//!
//! This crate sits on top of a native UVC driver and provides:
//! - A lifecycle state machine (connect, configure, preview, capture, close)
//!   that is safe to drive from several threads
//! - Capability descriptor parsing into ordered format/size descriptors
//! - One table-driven 0-100% control surface over every device range
//! - Status, button and frame event delivery from the driver thread
//! - A recording pump that feeds encoder output into an append-only sink
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use uvccamera::{CameraSession, ConnectParams, ControlKind, UvcCameraConfig};
//!
//! let params = ConnectParams::from_device_name(vid, pid, fd, "/dev/bus/usb/001/004")
//!     .ok_or("bad device path")?;
//! let session = CameraSession::open(backend, UvcCameraConfig::load_or_default(), &params)?;
//! session.start_preview()?;
//! session.set(ControlKind::Brightness, 60)?;
//! session.close()?;
//! ```
pub mod catalog;
pub mod config;
pub mod controls;
pub mod errors;
pub mod events;
pub mod native;
pub mod recording;
pub mod session;
pub mod timing;
pub mod types;

// Testing utilities - mock driver and sink for offline testing
pub mod testing;

// Re-exports for convenience
pub use catalog::{CapabilityCatalog, FormatDescriptor, FormatType};
pub use config::{PreviewSizeMatch, RecordingTracks, UvcCameraConfig};
pub use controls::{all_controls, ControlInfo, ControlKind, ControlMode, ControlRange, SupportFlags};
pub use errors::{Result, UvcError};
pub use events::{frame_channel, ButtonEvent, FrameBuffer, FrameReceiver, StatusEvent};
pub use native::{NativeCamera, UvcBackend};
pub use session::{CameraSession, SessionState};
pub use types::{ConnectParams, FrameFormat, PixelFormat, StreamConfig, Surface};

/// Initialize logging for the camera stack
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "uvccamera=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        controls: ControlKind::ALL.len(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Number of controls in the control table
    pub controls: usize,
}
