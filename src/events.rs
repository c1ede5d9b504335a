//! Status, button and frame event delivery
//!
//! # Spell: StatusEventBridge
//! ^ Intent: route producer-thread device events to at most one listener per kind
//!
//! @EventBridge
//!   : () -> EventBridge
//!   ! replace_on_register
//!   ! none_deregisters
//!   ! no_frame_dispatch_starts_after_clear
//!   - holds_lock_during_callback
//!   - blocking_frame_producer
//!
//! Callbacks run on the driver's event thread. Frame buffers are borrowed for
//! the duration of the call only; consumers that need them later copy them,
//! which is what [`frame_channel`] does.

use crate::timing::PTSClock;
use crate::types::PixelFormat;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

pub type StatusCallback = Arc<dyn Fn(&StatusEvent) + Send + Sync>;
pub type ButtonCallback = Arc<dyn Fn(&ButtonEvent) + Send + Sync>;
pub type FrameCallback = Arc<dyn Fn(&[u8], PixelFormat) + Send + Sync>;

/// `uvc_status_class`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Control,
    CameraControl,
    ProcessingControl,
    Unknown(u8),
}

impl StatusClass {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => StatusClass::Control,
            0x11 => StatusClass::CameraControl,
            0x12 => StatusClass::ProcessingControl,
            other => StatusClass::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StatusClass::Control => 0x10,
            StatusClass::CameraControl => 0x11,
            StatusClass::ProcessingControl => 0x12,
            StatusClass::Unknown(code) => code,
        }
    }
}

/// `uvc_status_attribute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    ValueChange,
    InfoChange,
    FailureChange,
    Unknown,
}

impl StatusAttribute {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => StatusAttribute::ValueChange,
            0x01 => StatusAttribute::InfoChange,
            0x02 => StatusAttribute::FailureChange,
            _ => StatusAttribute::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StatusAttribute::ValueChange => 0x00,
            StatusAttribute::InfoChange => 0x01,
            StatusAttribute::FailureChange => 0x02,
            StatusAttribute::Unknown => 0xff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub class: StatusClass,
    pub event: u8,
    pub selector: u8,
    pub attribute: StatusAttribute,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: i32,
    pub state: i32,
}

#[derive(Default)]
struct Slots {
    status: Option<StatusCallback>,
    button: Option<ButtonCallback>,
    frame: Option<FrameCallback>,
    frames_in_flight: usize,
    dispatch_threads: Vec<ThreadId>,
}

/// Marks one frame dispatch finished, even when the listener unwinds.
struct InFlight<'a> {
    bridge: &'a EventBridge,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut slots = self.bridge.slots();
        slots.frames_in_flight = slots.frames_in_flight.saturating_sub(1);
        let me = thread::current().id();
        if let Some(pos) = slots.dispatch_threads.iter().position(|id| *id == me) {
            slots.dispatch_threads.swap_remove(pos);
        }
        if slots.frames_in_flight == 0 {
            self.bridge.drained.notify_all();
        }
    }
}

/// Listener slots shared between the session and the driver's event thread.
pub struct EventBridge {
    slots: Mutex<Slots>,
    drained: Condvar,
    drain_timeout: Duration,
}

impl EventBridge {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            drained: Condvar::new(),
            drain_timeout,
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status_listener(&self, listener: Option<StatusCallback>) {
        self.slots().status = listener;
    }

    pub fn set_button_listener(&self, listener: Option<ButtonCallback>) {
        self.slots().button = listener;
    }

    /// Install a frame listener. Passing `None` also waits for in-flight
    /// frame dispatches, see [`EventBridge::drain_frames`].
    pub fn set_frame_listener(&self, listener: Option<FrameCallback>) {
        let clearing = listener.is_none();
        self.slots().frame = listener;
        if clearing {
            self.drain_frames();
        }
    }

    /// Empty the frame slot without waiting. Dispatches that already cloned
    /// the listener keep running until [`EventBridge::drain_frames`] sees them
    /// finish.
    pub fn clear_frame_listener(&self) {
        self.slots().frame = None;
    }

    /// Wait until no frame dispatch is running, bounded by the drain timeout.
    /// Returns immediately when called from inside a dispatch. Must not be
    /// called while holding a lock that a frame listener may take.
    pub fn drain_frames(&self) {
        let mut slots = self.slots();
        if slots.dispatch_threads.contains(&thread::current().id()) {
            return;
        }

        let deadline = Instant::now() + self.drain_timeout;
        while slots.frames_in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "Frame listener cleared with {} callback(s) still running",
                    slots.frames_in_flight
                );
                break;
            }
            let (guard, _) = self
                .drained
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slots = guard;
        }
    }

    pub fn has_frame_listener(&self) -> bool {
        self.slots().frame.is_some()
    }

    pub fn dispatch_status(&self, event: &StatusEvent) {
        let listener = self.slots().status.clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    pub fn dispatch_button(&self, event: &ButtonEvent) {
        let listener = self.slots().button.clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    pub fn dispatch_frame(&self, data: &[u8], pixel_format: PixelFormat) {
        let listener = {
            let mut slots = self.slots();
            let Some(listener) = slots.frame.clone() else {
                return;
            };
            slots.frames_in_flight += 1;
            slots.dispatch_threads.push(thread::current().id());
            listener
        };

        let _in_flight = InFlight { bridge: self };
        listener(data, pixel_format);
    }

    /// Driver-facing status callback that forwards into this bridge.
    pub fn status_forwarder(self: &Arc<Self>) -> StatusCallback {
        let bridge = Arc::clone(self);
        Arc::new(move |event: &StatusEvent| bridge.dispatch_status(event))
    }

    pub fn button_forwarder(self: &Arc<Self>) -> ButtonCallback {
        let bridge = Arc::clone(self);
        Arc::new(move |event: &ButtonEvent| bridge.dispatch_button(event))
    }

    pub fn frame_forwarder(self: &Arc<Self>) -> FrameCallback {
        let bridge = Arc::clone(self);
        Arc::new(move |data: &[u8], pixel_format: PixelFormat| bridge.dispatch_frame(data, pixel_format))
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

/// Owned copy of one delivered frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub pixel_format: PixelFormat,
    pub data: Bytes,
}

/// Receiving side of [`frame_channel`].
pub struct FrameReceiver {
    receiver: crossbeam_channel::Receiver<FrameBuffer>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameBuffer> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<FrameBuffer> {
        self.receiver.try_recv().ok()
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Frame listener that copies each buffer onto a bounded queue, dropping
/// frames instead of blocking the producer when the consumer falls behind.
pub fn frame_channel(capacity: usize) -> (FrameCallback, FrameReceiver) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let sequence = AtomicU64::new(0);
    let clock = PTSClock::new();

    let dropped_tx = dropped.clone();
    let callback: FrameCallback = Arc::new(move |data: &[u8], pixel_format: PixelFormat| {
        let frame = FrameBuffer {
            sequence: sequence.fetch_add(1, Ordering::Relaxed),
            timestamp_us: clock.pts_micros(),
            pixel_format,
            data: Bytes::copy_from_slice(data),
        };
        if sender.try_send(frame).is_err() {
            dropped_tx.fetch_add(1, Ordering::Relaxed);
        }
    });

    (callback, FrameReceiver { receiver, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusClass::from_code(0x11), StatusClass::CameraControl);
        assert_eq!(StatusClass::from_code(0x12).code(), 0x12);
        assert_eq!(StatusClass::from_code(0x42), StatusClass::Unknown(0x42));
        assert_eq!(StatusAttribute::from_code(2), StatusAttribute::FailureChange);
        assert_eq!(StatusAttribute::from_code(9).code(), 0xff);
    }

    #[test]
    fn test_register_replaces_listener() {
        let bridge = EventBridge::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        bridge.set_button_listener(Some(Arc::new(move |_: &ButtonEvent| {
            f.fetch_add(1, Ordering::SeqCst);
        })));
        let s = second.clone();
        bridge.set_button_listener(Some(Arc::new(move |_: &ButtonEvent| {
            s.fetch_add(1, Ordering::SeqCst);
        })));

        bridge.dispatch_button(&ButtonEvent { button: 1, state: 1 });
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        bridge.set_button_listener(None);
        bridge.dispatch_button(&ButtonEvent { button: 1, state: 0 });
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_forwarder_reaches_listener() {
        let bridge = Arc::new(EventBridge::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge.set_status_listener(Some(Arc::new(move |event: &StatusEvent| {
            sink.lock().unwrap().push(event.class);
        })));

        let forward = bridge.status_forwarder();
        forward(&StatusEvent {
            class: StatusClass::ProcessingControl,
            event: 0,
            selector: 2,
            attribute: StatusAttribute::ValueChange,
            data: vec![0x80],
        });
        assert_eq!(*seen.lock().unwrap(), vec![StatusClass::ProcessingControl]);
    }

    #[test]
    fn test_clear_from_inside_frame_callback_does_not_wait() {
        let bridge = Arc::new(EventBridge::new(Duration::from_secs(30)));
        let inner = bridge.clone();
        bridge.set_frame_listener(Some(Arc::new(move |_data: &[u8], _fmt| {
            inner.set_frame_listener(None);
        })));

        let started = Instant::now();
        bridge.dispatch_frame(&[1, 2, 3], PixelFormat::Raw);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!bridge.has_frame_listener());
    }

    #[test]
    fn test_clear_waits_for_in_flight_frame() {
        let bridge = Arc::new(EventBridge::new(Duration::from_secs(10)));
        let finished = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);

        let done = finished.clone();
        bridge.set_frame_listener(Some(Arc::new(move |_data: &[u8], _fmt| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(100));
            done.fetch_add(1, Ordering::SeqCst);
        })));

        let producer = {
            let bridge = bridge.clone();
            thread::spawn(move || bridge.dispatch_frame(&[0u8; 16], PixelFormat::Yuv))
        };

        entered_rx.recv().unwrap();
        bridge.set_frame_listener(None);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        producer.join().unwrap();
    }

    #[test]
    fn test_panicking_listener_does_not_stall_drain() {
        let bridge = EventBridge::new(Duration::from_secs(30));
        bridge.set_frame_listener(Some(Arc::new(|_data: &[u8], _fmt| panic!("listener bug"))));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            bridge.dispatch_frame(&[0u8; 8], PixelFormat::Yuv)
        }));
        assert!(result.is_err());

        let started = Instant::now();
        bridge.set_frame_listener(None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_frame_channel_drops_when_full() {
        let (callback, receiver) = frame_channel(2);
        for i in 0..5u8 {
            callback(&[i; 4], PixelFormat::Nv21);
        }
        assert_eq!(receiver.len(), 2);
        assert_eq!(receiver.dropped(), 3);

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.pixel_format, PixelFormat::Nv21);
        assert_eq!(&first.data[..], &[0, 0, 0, 0]);
    }
}
