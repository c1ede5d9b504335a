//! Camera session lifecycle
//!
//! # Spell: CameraSessionLifecycle
//! ^ Intent: serialize every lifecycle transition and control call against one device handle
//!
//! @CameraSession
//!   : (UvcBackend, UvcCameraConfig) -> CameraSession
//!   ! one_lock_per_session
//!   ! failed_transition_keeps_prior_state
//!   ! close_is_idempotent
//!   ! no_frame_callback_after_stop_preview
//!   - native_call_outside_lock
//!   - global_control_cache
//!
//! States: `Created -> Connected -> Previewing <-> Capturing -> Closed`, with
//! `Closed -> Connected` on reconnect. Capturing is streaming with a capture
//! surface attached.

use crate::catalog::{CapabilityCatalog, FormatDescriptor, FormatType};
use crate::config::{PreviewSizeMatch, UvcCameraConfig};
use crate::controls::{ControlKind, ControlRegistry, SupportFlags};
use crate::errors::{Result, UvcError};
use crate::events::{frame_channel, ButtonCallback, EventBridge, FrameCallback, FrameReceiver, StatusCallback};
use crate::native::{DeviceHandle, NativeCamera, UvcBackend};
use crate::types::{ConnectParams, FrameFormat, PixelFormat, StreamConfig, Surface};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connected,
    Previewing,
    Capturing,
    Closed,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Previewing | SessionState::Capturing
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Default)]
struct SessionInner {
    handle: Option<DeviceHandle>,
    /// `None` until a stream configuration has been accepted by the device.
    stream: Option<StreamConfig>,
    catalog: Option<CapabilityCatalog>,
    registry: ControlRegistry,
    streaming: bool,
    preview_surface: Option<Surface>,
    capture_surface: Option<Surface>,
    frame_format: PixelFormat,
    closed: bool,
    allocation_failed: bool,
}

impl SessionInner {
    fn state(&self) -> SessionState {
        match (&self.handle, self.streaming, self.capture_surface.is_some()) {
            (None, _, _) if self.closed => SessionState::Closed,
            (None, _, _) => SessionState::Created,
            (Some(_), true, true) => SessionState::Capturing,
            (Some(_), true, false) => SessionState::Previewing,
            (Some(_), false, _) => SessionState::Connected,
        }
    }

    fn camera(&mut self) -> Result<&mut dyn NativeCamera> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle.camera()),
            None => Err(UvcError::DeviceClosed),
        }
    }

    fn catalog(&self) -> Result<&CapabilityCatalog> {
        self.catalog.as_ref().ok_or(UvcError::DeviceClosed)
    }

    /// Format of the stream the device accepted, so right after connect
    /// the configured default stream decides the catalog filter.
    fn active_frame_format(&self) -> FrameFormat {
        self.stream.unwrap_or_default().frame_format
    }
}

/// One UVC camera: its device handle, stream configuration, capability
/// catalog and control caches, all guarded by a single lock.
///
/// `CameraSession` is `Send + Sync`; share it between threads with `Arc`.
pub struct CameraSession {
    inner: Mutex<SessionInner>,
    events: Arc<EventBridge>,
    backend: Arc<dyn UvcBackend>,
    config: UvcCameraConfig,
}

impl CameraSession {
    pub fn new(backend: Arc<dyn UvcBackend>, config: UvcCameraConfig) -> Self {
        let events = Arc::new(EventBridge::new(config.events.drain_timeout()));
        Self {
            inner: Mutex::new(SessionInner::default()),
            events,
            backend,
            config,
        }
    }

    /// `new` followed by `connect`.
    pub fn open(backend: Arc<dyn UvcBackend>, config: UvcCameraConfig, params: &ConnectParams) -> Result<Self> {
        let session = Self::new(backend, config);
        session.connect(params)?;
        Ok(session)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionInner>> {
        self.inner.lock().map_err(|_| UvcError::PoisonedLock)
    }

    fn lock_recover(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &UvcCameraConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lock_recover().state()
    }

    /// Active stream configuration, `None` before the device accepted one or
    /// after close.
    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.lock_recover().stream
    }

    pub fn capture_surface(&self) -> Option<Surface> {
        self.lock_recover().capture_surface
    }

    pub fn connect(&self, params: &ConnectParams) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.allocation_failed {
            return Err(UvcError::HandleCreationFailed);
        }
        if inner.handle.is_some() {
            return Err(UvcError::AlreadyConnected);
        }

        let mut handle = match DeviceHandle::allocate(self.backend.as_ref()) {
            Ok(handle) => handle,
            Err(e) => {
                inner.allocation_failed = true;
                log::error!("Camera handle allocation failed; session is unusable");
                return Err(e);
            }
        };
        if let Err(e) = handle.connect(params) {
            log::warn!("Connect to {:04x}:{:04x} failed: {}", params.vendor_id, params.product_id, e);
            return Err(e);
        }

        let camera = handle.camera();
        let catalog = CapabilityCatalog::parse(camera.supported_size());

        if let Err(code) = camera.set_status_callback(Some(self.events.status_forwarder())) {
            log::warn!("Status callback registration failed with status {}", code);
        }
        if let Err(code) = camera.set_button_callback(Some(self.events.button_forwarder())) {
            log::warn!("Button callback registration failed with status {}", code);
        }
        if self.events.has_frame_listener() {
            if let Err(code) = camera.set_frame_callback(Some(self.events.frame_forwarder()), inner.frame_format) {
                log::warn!("Frame callback registration failed with status {}", code);
            }
        }

        let default_stream = self.config.preview.stream_config();
        let stream = match camera.set_preview_size(&default_stream) {
            Ok(()) => Some(default_stream),
            Err(code) => {
                log::warn!(
                    "Default stream {}x{} {} rejected with status {}",
                    default_stream.width,
                    default_stream.height,
                    default_stream.frame_format,
                    code
                );
                None
            }
        };

        let inner = &mut *inner;
        inner.registry.invalidate();
        if self.config.controls.warm_on_connect {
            inner.registry.update_camera_params(camera);
        }

        inner.handle = Some(handle);
        inner.catalog = Some(catalog);
        inner.stream = stream;
        inner.streaming = false;
        inner.closed = false;
        log::info!("Camera session connected");
        Ok(())
    }

    pub fn set_preview_size(&self, config: StreamConfig) -> Result<()> {
        if !config.has_valid_size() {
            return Err(UvcError::InvalidSize {
                width: config.width,
                height: config.height,
            });
        }
        let mut inner = self.lock()?;
        inner
            .camera()?
            .set_preview_size(&config)
            .map_err(UvcError::ConfigurationRejected)?;
        inner.stream = Some(config);
        log::info!(
            "Stream set to {}x{} {} @ {}-{} fps",
            config.width,
            config.height,
            config.frame_format,
            config.min_fps,
            config.max_fps
        );
        Ok(())
    }

    /// Change only the resolution, keeping fps range, format and bandwidth.
    pub fn set_preview_resolution(&self, width: u32, height: u32) -> Result<()> {
        let current = self.stream_config().unwrap_or_else(|| self.config.preview.stream_config());
        self.set_preview_size(StreamConfig { width, height, ..current })
    }

    pub fn set_preview_display(&self, surface: Option<Surface>) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .camera()?
            .set_preview_display(surface.as_ref())
            .map_err(UvcError::StreamRejected)?;
        inner.preview_surface = surface;
        Ok(())
    }

    pub fn start_preview(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.streaming {
            return Ok(());
        }
        inner.camera()?.start_preview().map_err(UvcError::StreamRejected)?;
        inner.streaming = true;
        log::info!("Preview started");
        Ok(())
    }

    /// Deregisters the frame callback, waits for running callbacks to drain,
    /// then stops streaming. The drain happens with the session unlocked so a
    /// frame callback may call back into the session.
    pub fn stop_preview(&self) -> Result<()> {
        {
            let mut inner = self.lock()?;
            inner.camera()?;
            self.detach_frame_callback(&mut inner);
        }
        self.events.drain_frames();

        let mut inner = self.lock()?;
        inner.camera()?.stop_preview().map_err(UvcError::StreamRejected)?;
        inner.streaming = false;
        log::info!("Preview stopped");
        Ok(())
    }

    fn detach_frame_callback(&self, inner: &mut SessionInner) {
        let frame_format = inner.frame_format;
        if let Some(handle) = inner.handle.as_mut() {
            if let Err(code) = handle.camera().set_frame_callback(None, frame_format) {
                log::warn!("Frame callback removal failed with status {}", code);
            }
        }
        self.events.clear_frame_listener();
    }

    /// Attach a capture target; replaces any target already attached.
    pub fn start_capture(&self, surface: Surface) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .camera()?
            .set_capture_display(Some(&surface))
            .map_err(UvcError::StreamRejected)?;
        inner.capture_surface = Some(surface);
        log::info!("Capture surface attached");
        Ok(())
    }

    pub fn stop_capture(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .camera()?
            .set_capture_display(None)
            .map_err(UvcError::StreamRejected)?;
        inner.capture_surface = None;
        log::info!("Capture surface detached");
        Ok(())
    }

    /// Stop streaming, release and destroy the device, and forget every
    /// cached device fact. Safe to call repeatedly.
    pub fn close(&self) -> Result<()> {
        self.detach_frame_callback(&mut self.lock_recover());
        self.events.drain_frames();

        let mut inner = self.lock_recover();
        if let Some(mut handle) = inner.handle.take() {
            if let Err(code) = handle.camera().stop_preview() {
                log::warn!("Stopping preview during close failed with status {}", code);
            }
            drop(handle);
            log::info!("Camera session closed");
        }

        let inner = &mut *inner;
        inner.registry.invalidate();
        inner.catalog = None;
        inner.stream = None;
        inner.streaming = false;
        inner.preview_surface = None;
        inner.capture_surface = None;
        inner.closed = true;
        Ok(())
    }

    /// Sizes offered for the active frame format.
    pub fn supported_sizes(&self) -> Result<Vec<FormatDescriptor>> {
        let inner = self.lock()?;
        let format_type = FormatType::for_frame_format(inner.active_frame_format());
        Ok(inner.catalog()?.sizes_for(Some(format_type)))
    }

    /// Sizes for one format type, or every size for `None`.
    pub fn supported_sizes_for(&self, format_type: Option<FormatType>) -> Result<Vec<FormatDescriptor>> {
        let inner = self.lock()?;
        Ok(inner.catalog()?.sizes_for(format_type))
    }

    /// Raw capability text; read again from the device while it is empty.
    pub fn supported_size_text(&self) -> Result<String> {
        let mut inner = self.lock()?;
        let cached = inner.catalog()?.raw().to_string();
        if !cached.is_empty() {
            return Ok(cached);
        }
        let text = inner.camera()?.supported_size();
        if !text.is_empty() {
            inner.catalog = Some(CapabilityCatalog::parse(text.clone()));
        }
        Ok(text)
    }

    /// Supported size matching the active stream under the configured policy.
    pub fn current_preview_size(&self) -> Result<Option<FormatDescriptor>> {
        self.preview_size_matching(self.config.preview.size_match)
    }

    pub fn preview_size_matching(&self, policy: PreviewSizeMatch) -> Result<Option<FormatDescriptor>> {
        let inner = self.lock()?;
        let stream = inner.stream.unwrap_or_default();
        let format_type = FormatType::for_frame_format(stream.frame_format);
        Ok(inner
            .catalog()?
            .sizes_for(Some(format_type))
            .into_iter()
            .find(|d| policy.matches(d.size(), stream.width, stream.height)))
    }

    fn with_controls<T>(&self, f: impl FnOnce(&mut ControlRegistry, &mut dyn NativeCamera) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let handle = inner.handle.as_mut().ok_or(UvcError::DeviceClosed)?;
        f(&mut inner.registry, handle.camera())
    }

    /// Percent control value in `0..=100`.
    pub fn get(&self, kind: ControlKind) -> Result<i32> {
        self.with_controls(|registry, camera| registry.get(camera, kind))
    }

    pub fn set(&self, kind: ControlKind, percent: i32) -> Result<()> {
        self.with_controls(|registry, camera| registry.set(camera, kind, percent))
    }

    /// Write the device's default for `kind`.
    pub fn reset(&self, kind: ControlKind) -> Result<()> {
        self.with_controls(|registry, camera| registry.reset(camera, kind))
    }

    pub fn get_bool(&self, kind: ControlKind) -> Result<bool> {
        self.with_controls(|registry, camera| registry.get_bool(camera, kind))
    }

    pub fn set_bool(&self, kind: ControlKind, on: bool) -> Result<()> {
        self.with_controls(|registry, camera| registry.set_bool(camera, kind, on))
    }

    pub fn get_raw(&self, kind: ControlKind) -> Result<i32> {
        self.with_controls(|registry, camera| registry.get_raw(camera, kind))
    }

    pub fn set_raw(&self, kind: ControlKind, value: i32) -> Result<()> {
        self.with_controls(|registry, camera| registry.set_raw(camera, kind, value))
    }

    pub fn check_support_flag(&self, flag: i64) -> Result<bool> {
        self.with_controls(|registry, camera| Ok(registry.check_support_flag(camera, flag)))
    }

    pub fn update_camera_params(&self) -> Result<()> {
        self.with_controls(|registry, camera| {
            registry.update_camera_params(camera);
            Ok(())
        })
    }

    pub fn support_flags(&self) -> Result<SupportFlags> {
        self.with_controls(|registry, _| Ok(registry.support_flags()))
    }

    pub fn set_status_callback(&self, callback: Option<StatusCallback>) {
        self.events.set_status_listener(callback);
    }

    pub fn set_button_callback(&self, callback: Option<ButtonCallback>) {
        self.events.set_button_listener(callback);
    }

    /// Install or remove the frame listener. While connected the driver is
    /// told about the change immediately; otherwise on the next connect.
    pub fn set_frame_callback(&self, callback: Option<FrameCallback>, pixel_format: PixelFormat) -> Result<()> {
        let mut inner = self.lock()?;
        inner.frame_format = pixel_format;
        match callback {
            Some(callback) => {
                self.events.set_frame_listener(Some(callback));
                if let Some(handle) = inner.handle.as_mut() {
                    handle
                        .camera()
                        .set_frame_callback(Some(self.events.frame_forwarder()), pixel_format)
                        .map_err(UvcError::StreamRejected)?;
                }
            }
            None => {
                if let Some(handle) = inner.handle.as_mut() {
                    if let Err(code) = handle.camera().set_frame_callback(None, pixel_format) {
                        log::warn!("Frame callback removal failed with status {}", code);
                    }
                }
                drop(inner);
                self.events.set_frame_listener(None);
            }
        }
        Ok(())
    }

    /// Install a [`frame_channel`] listener sized by `events.frame_queue_capacity`.
    pub fn frame_receiver(&self, pixel_format: PixelFormat) -> Result<FrameReceiver> {
        let (callback, receiver) = frame_channel(self.config.events.frame_queue_capacity);
        self.set_frame_callback(Some(callback), pixel_format)?;
        Ok(receiver)
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{flags, ControlRange};
    use crate::testing::MockBackend;

    fn params() -> ConnectParams {
        ConnectParams::from_device_name(0x046d, 0x0825, 9, "/dev/bus/usb/001/004").unwrap()
    }

    fn session() -> (Arc<MockBackend>, CameraSession) {
        let backend = Arc::new(MockBackend::new());
        let session = CameraSession::new(backend.clone(), UvcCameraConfig::default());
        (backend, session)
    }

    #[test]
    fn test_new_session_is_created() {
        let (_, session) = session();
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(session.stream_config(), None);
        assert_eq!(session.get(ControlKind::Brightness).unwrap_err(), UvcError::DeviceClosed);
    }

    #[test]
    fn test_connect_applies_default_stream() {
        let (backend, session) = session();
        session.connect(&params()).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.stream_config(), Some(StreamConfig::default()));
        assert_eq!(backend.camera().state().preview_config(), Some(StreamConfig::default()));
        assert!(backend.camera().state().has_status_callback());
        assert!(backend.camera().state().has_button_callback());
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let (backend, session) = session();
        session.connect(&params()).unwrap();
        assert_eq!(session.connect(&params()).unwrap_err(), UvcError::AlreadyConnected);
        assert_eq!(backend.create_calls(), 1);
    }

    #[test]
    fn test_rejected_default_stream_is_not_fatal() {
        let (backend, session) = session();
        backend.camera().state().fail_preview_size(Some(-51));
        session.connect(&params()).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.stream_config(), None);
    }

    #[test]
    fn test_allocation_failure_is_terminal() {
        let (backend, session) = session();
        backend.fail_allocation(true);
        assert_eq!(session.connect(&params()).unwrap_err(), UvcError::HandleCreationFailed);

        backend.fail_allocation(false);
        assert_eq!(session.connect(&params()).unwrap_err(), UvcError::HandleCreationFailed);
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(session.state(), SessionState::Created);
    }

    #[test]
    fn test_capturing_requires_streaming() {
        let (_, session) = session();
        session.connect(&params()).unwrap();
        session.start_capture(Surface::from_raw(7)).unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        session.start_preview().unwrap();
        assert_eq!(session.state(), SessionState::Capturing);

        session.stop_capture().unwrap();
        assert_eq!(session.state(), SessionState::Previewing);
        assert_eq!(session.capture_surface(), None);
    }

    #[test]
    fn test_rejected_stop_keeps_previewing_but_detaches_frames() {
        let (backend, session) = session();
        session.connect(&params()).unwrap();
        let (callback, _receiver) = frame_channel(1);
        session.set_frame_callback(Some(callback), PixelFormat::Yuv).unwrap();
        session.start_preview().unwrap();

        backend.camera().state().fail_stop(Some(-9));
        assert_eq!(session.stop_preview().unwrap_err(), UvcError::StreamRejected(-9));
        assert_eq!(session.state(), SessionState::Previewing);
        assert!(!backend.camera().state().has_frame_callback());

        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(backend.camera().state().destroy_calls(), 1);
    }

    #[test]
    fn test_supported_sizes_follow_frame_format() {
        let (_, session) = session();
        session.connect(&params()).unwrap();
        let yuyv: Vec<_> = session.supported_sizes().unwrap().iter().map(|d| d.size()).collect();
        assert_eq!(yuyv, vec![(640, 480), (160, 120)]);

        session
            .set_preview_size(StreamConfig::new(1280, 720).with_format(FrameFormat::Mjpeg))
            .unwrap();
        let mjpeg: Vec<_> = session.supported_sizes().unwrap().iter().map(|d| d.size()).collect();
        assert_eq!(mjpeg, vec![(640, 480), (1280, 720), (320, 240)]);
        assert_eq!(session.supported_sizes_for(None).unwrap().len(), 5);
    }

    #[test]
    fn test_preview_size_policies() {
        let (_, session) = session();
        session.connect(&params()).unwrap();
        session
            .set_preview_size(StreamConfig::new(1280, 240).with_format(FrameFormat::Mjpeg))
            .unwrap();

        let loose = session.current_preview_size().unwrap().unwrap();
        assert_eq!(loose.size(), (1280, 720));
        assert_eq!(session.preview_size_matching(PreviewSizeMatch::Exact).unwrap(), None);
    }

    #[test]
    fn test_supported_size_text_rereads_empty_cache() {
        let (backend, session) = session();
        backend.camera().state().set_capability("");
        session.connect(&params()).unwrap();
        assert_eq!(session.supported_sizes_for(None).unwrap().len(), 0);

        backend.camera().state().set_capability(crate::testing::SAMPLE_CAPABILITIES);
        let text = session.supported_size_text().unwrap();
        assert_eq!(text, crate::testing::SAMPLE_CAPABILITIES);
        assert_eq!(session.supported_sizes_for(None).unwrap().len(), 5);

        let reads = backend.camera().state().supported_size_calls();
        session.supported_size_text().unwrap();
        assert_eq!(backend.camera().state().supported_size_calls(), reads);
    }

    #[test]
    fn test_controls_go_through_session() {
        let (backend, session) = session();
        backend
            .camera()
            .state()
            .set_range(ControlKind::Contrast, ControlRange::new(0, 200, 100));
        session.connect(&params()).unwrap();

        session.set(ControlKind::Contrast, 75).unwrap();
        assert_eq!(backend.camera().state().value(ControlKind::Contrast), 150);
        assert_eq!(session.get(ControlKind::Contrast).unwrap(), 75);

        session.reset(ControlKind::Contrast).unwrap();
        assert_eq!(session.get(ControlKind::Contrast).unwrap(), 50);
        assert!(session.check_support_flag(flags::PU_CONTRAST).unwrap());
    }

    #[test]
    fn test_close_resets_caches() {
        let (backend, session) = session();
        session.connect(&params()).unwrap();
        session.close().unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.stream_config(), None);
        assert_eq!(session.supported_sizes().unwrap_err(), UvcError::DeviceClosed);
        assert_eq!(session.support_flags().unwrap_err(), UvcError::DeviceClosed);
        assert_eq!(backend.camera().state().destroy_calls(), 1);
    }

    #[test]
    fn test_reconnect_after_close() {
        let (backend, session) = session();
        session.connect(&params()).unwrap();
        session.close().unwrap();
        session.connect(&params()).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(backend.create_calls(), 2);
    }
}
