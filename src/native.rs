//! Native driver boundary
//!
//! # Spell: NativeCameraHandle
//! ^ Intent: own exactly one allocated driver-side camera and release it on every exit path
//!
//! @DeviceHandle
//!   : (UvcBackend) -> DeviceHandle
//!   ! destroy_called_exactly_once
//!   ! release_before_destroy_when_connected
//!   - manual_open_close_pairing
//!
//! Everything below this module (USB enumeration, isochronous transfers,
//! MJPEG decoding) lives in the driver. The driver reports success with a zero
//! status; every `Err` here carries the non-zero status it returned.

use crate::controls::{ControlKind, ControlRange};
use crate::errors::{Result, UvcError};
use crate::events::{ButtonCallback, FrameCallback, StatusCallback};
use crate::types::{ConnectParams, PixelFormat, StreamConfig, Surface};

/// Result of a driver call; `Err` holds the non-zero status code.
pub type NativeResult<T> = std::result::Result<T, i32>;

/// Allocator for driver-side camera objects.
pub trait UvcBackend: Send + Sync {
    /// Allocate a camera object, or `None` when the driver returned a null handle.
    fn create(&self) -> Option<Box<dyn NativeCamera>>;
}

/// Calls available on one allocated driver-side camera.
pub trait NativeCamera: Send {
    fn connect(&mut self, params: &ConnectParams) -> NativeResult<()>;
    fn release(&mut self) -> NativeResult<()>;
    fn destroy(&mut self);

    /// Capability descriptor as JSON text.
    fn supported_size(&mut self) -> String;
    fn set_preview_size(&mut self, config: &StreamConfig) -> NativeResult<()>;
    fn start_preview(&mut self) -> NativeResult<()>;
    fn stop_preview(&mut self) -> NativeResult<()>;
    fn set_preview_display(&mut self, surface: Option<&Surface>) -> NativeResult<()>;
    fn set_capture_display(&mut self, surface: Option<&Surface>) -> NativeResult<()>;

    fn ctrl_supports(&mut self) -> u64;
    fn proc_supports(&mut self) -> u64;
    fn control_limits(&mut self, kind: ControlKind) -> NativeResult<ControlRange>;
    fn control_value(&mut self, kind: ControlKind) -> NativeResult<i32>;
    fn set_control_value(&mut self, kind: ControlKind, value: i32) -> NativeResult<()>;

    fn set_status_callback(&mut self, callback: Option<StatusCallback>) -> NativeResult<()>;
    fn set_button_callback(&mut self, callback: Option<ButtonCallback>) -> NativeResult<()>;
    fn set_frame_callback(&mut self, callback: Option<FrameCallback>, pixel_format: PixelFormat) -> NativeResult<()>;
}

/// Owned driver camera. Dropping it releases the USB connection (when one
/// was made) and destroys the driver object.
pub struct DeviceHandle {
    camera: Box<dyn NativeCamera>,
    connected: bool,
}

impl DeviceHandle {
    pub fn allocate(backend: &dyn UvcBackend) -> Result<Self> {
        let camera = backend.create().ok_or(UvcError::HandleCreationFailed)?;
        log::debug!("Allocated native camera handle");
        Ok(Self {
            camera,
            connected: false,
        })
    }

    pub fn connect(&mut self, params: &ConnectParams) -> Result<()> {
        self.camera.connect(params).map_err(UvcError::ConnectFailed)?;
        self.connected = true;
        log::info!(
            "Connected {:04x}:{:04x} at bus {} dev {}",
            params.vendor_id,
            params.product_id,
            params.bus_num,
            params.dev_num
        );
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn camera(&mut self) -> &mut dyn NativeCamera {
        self.camera.as_mut()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.connected {
            if let Err(code) = self.camera.release() {
                log::warn!("Native release failed with status {}", code);
            }
        }
        self.camera.destroy();
        log::debug!("Destroyed native camera handle");
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
