//! Testing utilities for uvccamera
//!
//! Provides an in-memory driver that behaves like a settled UVC device, and a
//! sample sink that records what the recording pump writes, so the session,
//! control, event and recording layers can be exercised without hardware.

pub mod memory_sink;
pub mod mock_device;

pub use memory_sink::{MemorySink, WrittenSample};
pub use mock_device::{MockBackend, MockCamera, MockState, SAMPLE_CAPABILITIES};
