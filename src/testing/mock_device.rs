//! In-memory UVC driver
//!
//! `MockCamera` records every call it receives and lets tests script failures,
//! ranges and support masks. Clones share one state, so a test can keep a
//! handle on the camera it gave to a backend.

use crate::controls::{ControlKind, ControlRange, SupportFlags};
use crate::events::{ButtonCallback, ButtonEvent, FrameCallback, StatusCallback, StatusEvent};
use crate::native::{NativeCamera, NativeResult, UvcBackend};
use crate::types::{ConnectParams, PixelFormat, StreamConfig, Surface};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Capability descriptor reported by a freshly created mock camera.
pub const SAMPLE_CAPABILITIES: &str = r#"{"formats":[{"type":6,"size":["640x480","1280x720","320x240"]},{"type":4,"size":["640x480","160x120"]}]}"#;

/// Scriptable device state shared by every clone of a [`MockCamera`].
pub struct MockState {
    connected: bool,
    connect_failure: Option<i32>,
    release_failure: Option<i32>,
    connect_calls: usize,
    release_calls: usize,
    destroy_calls: usize,
    supported_size_calls: usize,

    capabilities: String,
    preview_size_failure: Option<i32>,
    preview_config: Option<StreamConfig>,
    streaming: bool,
    start_failure: Option<i32>,
    stop_failure: Option<i32>,
    preview_display: Option<Surface>,
    capture_display: Option<Surface>,

    supports: SupportFlags,
    ranges: HashMap<ControlKind, ControlRange>,
    values: HashMap<ControlKind, i32>,
    get_failures: HashMap<ControlKind, i32>,
    set_failures: HashMap<ControlKind, i32>,
    set_calls: HashMap<ControlKind, usize>,
    limit_calls: HashMap<ControlKind, usize>,

    status_callback: Option<StatusCallback>,
    button_callback: Option<ButtonCallback>,
    frame_callback: Option<FrameCallback>,
    frame_format: PixelFormat,

    calls: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            connected: false,
            connect_failure: None,
            release_failure: None,
            connect_calls: 0,
            release_calls: 0,
            destroy_calls: 0,
            supported_size_calls: 0,
            capabilities: SAMPLE_CAPABILITIES.to_string(),
            preview_size_failure: None,
            preview_config: None,
            streaming: false,
            start_failure: None,
            stop_failure: None,
            preview_display: None,
            capture_display: None,
            supports: SupportFlags::new(0x7fff_ffff, 0x7fff_ffff),
            ranges: HashMap::new(),
            values: HashMap::new(),
            get_failures: HashMap::new(),
            set_failures: HashMap::new(),
            set_calls: HashMap::new(),
            limit_calls: HashMap::new(),
            status_callback: None,
            button_callback: None,
            frame_callback: None,
            frame_format: PixelFormat::Raw,
            calls: Vec::new(),
        }
    }
}

impl MockState {
    pub fn set_range(&mut self, kind: ControlKind, range: ControlRange) {
        self.ranges.insert(kind, range);
    }

    pub fn set_value(&mut self, kind: ControlKind, value: i32) {
        self.values.insert(kind, value);
    }

    pub fn value(&self, kind: ControlKind) -> i32 {
        self.values.get(&kind).copied().unwrap_or_default()
    }

    pub fn set_supports(&mut self, supports: SupportFlags) {
        self.supports = supports;
    }

    pub fn fail_connect(&mut self, code: Option<i32>) {
        self.connect_failure = code;
    }

    pub fn fail_release(&mut self, code: Option<i32>) {
        self.release_failure = code;
    }

    pub fn fail_preview_size(&mut self, code: Option<i32>) {
        self.preview_size_failure = code;
    }

    pub fn fail_start(&mut self, code: Option<i32>) {
        self.start_failure = code;
    }

    pub fn fail_stop(&mut self, code: Option<i32>) {
        self.stop_failure = code;
    }

    pub fn fail_get(&mut self, kind: ControlKind, code: i32) {
        self.get_failures.insert(kind, code);
    }

    pub fn fail_set(&mut self, kind: ControlKind, code: i32) {
        self.set_failures.insert(kind, code);
    }

    pub fn set_capability(&mut self, text: impl Into<String>) {
        self.capabilities = text.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls
    }

    pub fn supported_size_calls(&self) -> usize {
        self.supported_size_calls
    }

    pub fn set_calls(&self, kind: ControlKind) -> usize {
        self.set_calls.get(&kind).copied().unwrap_or_default()
    }

    pub fn limit_calls(&self, kind: ControlKind) -> usize {
        self.limit_calls.get(&kind).copied().unwrap_or_default()
    }

    pub fn preview_config(&self) -> Option<StreamConfig> {
        self.preview_config
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn preview_display(&self) -> Option<Surface> {
        self.preview_display
    }

    pub fn capture_display(&self) -> Option<Surface> {
        self.capture_display
    }

    pub fn has_status_callback(&self) -> bool {
        self.status_callback.is_some()
    }

    pub fn has_button_callback(&self) -> bool {
        self.button_callback.is_some()
    }

    pub fn has_frame_callback(&self) -> bool {
        self.frame_callback.is_some()
    }

    pub fn frame_format(&self) -> PixelFormat {
        self.frame_format
    }

    /// Driver calls in the order they were received.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    fn record(&mut self, call: &str) {
        self.calls.push(call.to_string());
    }
}

/// Driver camera backed by [`MockState`].
#[derive(Clone, Default)]
pub struct MockCamera {
    state: Arc<Mutex<MockState>>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a frame through the registered frame callback, as the driver's
    /// streaming thread would. Returns false when no callback is installed.
    pub fn emit_frame(&self, data: &[u8]) -> bool {
        let (callback, format) = {
            let state = self.state();
            (state.frame_callback.clone(), state.frame_format)
        };
        match callback {
            Some(callback) => {
                callback(data, format);
                true
            }
            None => false,
        }
    }

    pub fn emit_status(&self, event: &StatusEvent) -> bool {
        let callback = self.state().status_callback.clone();
        callback.map(|callback| callback(event)).is_some()
    }

    pub fn emit_button(&self, event: &ButtonEvent) -> bool {
        let callback = self.state().button_callback.clone();
        callback.map(|callback| callback(event)).is_some()
    }
}

impl NativeCamera for MockCamera {
    fn connect(&mut self, _params: &ConnectParams) -> NativeResult<()> {
        let mut state = self.state();
        state.record("connect");
        state.connect_calls += 1;
        if let Some(code) = state.connect_failure {
            return Err(code);
        }
        state.connected = true;
        Ok(())
    }

    fn release(&mut self) -> NativeResult<()> {
        let mut state = self.state();
        state.record("release");
        state.release_calls += 1;
        state.connected = false;
        state.streaming = false;
        state.release_failure.map_or(Ok(()), Err)
    }

    fn destroy(&mut self) {
        let mut state = self.state();
        state.record("destroy");
        state.destroy_calls += 1;
    }

    fn supported_size(&mut self) -> String {
        let mut state = self.state();
        state.record("supported_size");
        state.supported_size_calls += 1;
        state.capabilities.clone()
    }

    fn set_preview_size(&mut self, config: &StreamConfig) -> NativeResult<()> {
        let mut state = self.state();
        state.record("set_preview_size");
        if let Some(code) = state.preview_size_failure {
            return Err(code);
        }
        state.preview_config = Some(*config);
        Ok(())
    }

    fn start_preview(&mut self) -> NativeResult<()> {
        let mut state = self.state();
        state.record("start_preview");
        if let Some(code) = state.start_failure {
            return Err(code);
        }
        state.streaming = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> NativeResult<()> {
        let mut state = self.state();
        state.record("stop_preview");
        state.streaming = false;
        state.stop_failure.map_or(Ok(()), Err)
    }

    fn set_preview_display(&mut self, surface: Option<&Surface>) -> NativeResult<()> {
        let mut state = self.state();
        state.record("set_preview_display");
        state.preview_display = surface.copied();
        Ok(())
    }

    fn set_capture_display(&mut self, surface: Option<&Surface>) -> NativeResult<()> {
        let mut state = self.state();
        state.record("set_capture_display");
        state.capture_display = surface.copied();
        Ok(())
    }

    fn ctrl_supports(&mut self) -> u64 {
        self.state().supports.camera_terminal
    }

    fn proc_supports(&mut self) -> u64 {
        self.state().supports.processing_unit
    }

    fn control_limits(&mut self, kind: ControlKind) -> NativeResult<ControlRange> {
        let mut state = self.state();
        *state.limit_calls.entry(kind).or_default() += 1;
        Ok(state.ranges.get(&kind).copied().unwrap_or_default())
    }

    fn control_value(&mut self, kind: ControlKind) -> NativeResult<i32> {
        let state = self.state();
        if let Some(code) = state.get_failures.get(&kind) {
            return Err(*code);
        }
        Ok(state.value(kind))
    }

    fn set_control_value(&mut self, kind: ControlKind, value: i32) -> NativeResult<()> {
        let mut state = self.state();
        if let Some(code) = state.set_failures.get(&kind) {
            return Err(*code);
        }
        *state.set_calls.entry(kind).or_default() += 1;
        state.values.insert(kind, value);
        Ok(())
    }

    fn set_status_callback(&mut self, callback: Option<StatusCallback>) -> NativeResult<()> {
        self.state().status_callback = callback;
        Ok(())
    }

    fn set_button_callback(&mut self, callback: Option<ButtonCallback>) -> NativeResult<()> {
        self.state().button_callback = callback;
        Ok(())
    }

    fn set_frame_callback(&mut self, callback: Option<FrameCallback>, pixel_format: PixelFormat) -> NativeResult<()> {
        let mut state = self.state();
        state.record(if callback.is_some() {
            "set_frame_callback"
        } else {
            "clear_frame_callback"
        });
        state.frame_callback = callback;
        state.frame_format = pixel_format;
        Ok(())
    }
}

/// Backend that hands out clones of one [`MockCamera`].
#[derive(Default)]
pub struct MockBackend {
    camera: MockCamera,
    fail_allocation: AtomicBool,
    create_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(camera: MockCamera) -> Self {
        Self {
            camera,
            ..Self::default()
        }
    }

    pub fn camera(&self) -> &MockCamera {
        &self.camera
    }

    pub fn fail_allocation(&self, fail: bool) {
        self.fail_allocation.store(fail, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

impl UvcBackend for MockBackend {
    fn create(&self) -> Option<Box<dyn NativeCamera>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_allocation.load(Ordering::SeqCst) {
            return None;
        }
        Some(Box::new(self.camera.clone()))
    }
}
