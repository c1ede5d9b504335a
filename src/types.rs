//! Plain data types shared across the session, native boundary and catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PREVIEW_WIDTH: u32 = 640;
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 480;
pub const DEFAULT_PREVIEW_MIN_FPS: u32 = 1;
pub const DEFAULT_PREVIEW_MAX_FPS: u32 = 31;
pub const DEFAULT_BANDWIDTH: f32 = 1.0;

/// Wire format requested from the device for the video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// Uncompressed YUYV (4:2:2)
    #[default]
    Yuyv,
    /// Motion JPEG
    Mjpeg,
}

impl FrameFormat {
    /// Native code passed through the driver boundary.
    pub fn code(self) -> i32 {
        match self {
            FrameFormat::Yuyv => 0,
            FrameFormat::Mjpeg => 1,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yuyv" | "yuv" | "uncompressed" => Ok(FrameFormat::Yuyv),
            "mjpeg" | "mjpg" => Ok(FrameFormat::Mjpeg),
            other => Err(format!("unknown frame format: {other}")),
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFormat::Yuyv => write!(f, "yuyv"),
            FrameFormat::Mjpeg => write!(f, "mjpeg"),
        }
    }
}

/// Pixel layout of buffers handed to a frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Raw,
    Yuv,
    Rgb565,
    Rgbx,
    /// NV12
    Yuv420Sp,
    /// YVU420 semi-planar
    Nv21,
}

impl PixelFormat {
    pub fn code(self) -> i32 {
        match self {
            PixelFormat::Raw => 0,
            PixelFormat::Yuv => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgbx => 3,
            PixelFormat::Yuv420Sp => 4,
            PixelFormat::Nv21 => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PixelFormat::Raw),
            1 => Some(PixelFormat::Yuv),
            2 => Some(PixelFormat::Rgb565),
            3 => Some(PixelFormat::Rgbx),
            4 => Some(PixelFormat::Yuv420Sp),
            5 => Some(PixelFormat::Nv21),
            _ => None,
        }
    }
}

/// Streaming parameters applied through "set preview size".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub min_fps: u32,
    pub max_fps: u32,
    pub frame_format: FrameFormat,
    /// Multiplier for the isochronous bandwidth the driver reserves.
    pub bandwidth_factor: f32,
}

impl StreamConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_fps(mut self, min_fps: u32, max_fps: u32) -> Self {
        self.min_fps = min_fps;
        self.max_fps = max_fps;
        self
    }

    pub fn with_format(mut self, frame_format: FrameFormat) -> Self {
        self.frame_format = frame_format;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth_factor: f32) -> Self {
        self.bandwidth_factor = bandwidth_factor;
        self
    }

    pub fn has_valid_size(&self) -> bool {
        self.width != 0 && self.height != 0
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_PREVIEW_WIDTH,
            height: DEFAULT_PREVIEW_HEIGHT,
            min_fps: DEFAULT_PREVIEW_MIN_FPS,
            max_fps: DEFAULT_PREVIEW_MAX_FPS,
            frame_format: FrameFormat::Yuyv,
            bandwidth_factor: DEFAULT_BANDWIDTH,
        }
    }
}

/// Opaque display or record target owned by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface(u64);

impl Surface {
    pub fn from_raw(raw: u64) -> Self {
        Surface(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Addressing needed to open one USB camera through usbfs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub vendor_id: u16,
    pub product_id: u16,
    pub fd: i32,
    pub bus_num: u32,
    pub dev_num: u32,
    pub usbfs_path: String,
}

impl ConnectParams {
    /// Derive bus/device numbers and the usbfs root from a device node path
    /// such as `/dev/bus/usb/001/004`.
    pub fn from_device_name(vendor_id: u16, product_id: u16, fd: i32, device_name: &str) -> Option<Self> {
        let parts: Vec<&str> = device_name.split('/').collect();
        if parts.len() < 4 {
            return None;
        }
        let n = parts.len();
        let bus_num = parts[n - 2].parse().ok()?;
        let dev_num = parts[n - 1].parse().ok()?;
        let usbfs_path = format!("/{}", parts[1..n - 2].join("/"));

        Some(Self {
            vendor_id,
            product_id,
            fd,
            bus_num,
            dev_num,
            usbfs_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stream_config() {
        let config = StreamConfig::default();
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!((config.min_fps, config.max_fps), (1, 31));
        assert_eq!(config.frame_format, FrameFormat::Yuyv);
        assert_eq!(config.bandwidth_factor, 1.0);
    }

    #[test]
    fn test_zero_size_is_invalid() {
        assert!(!StreamConfig::new(0, 480).has_valid_size());
        assert!(!StreamConfig::new(640, 0).has_valid_size());
        assert!(StreamConfig::new(1, 1).has_valid_size());
    }

    #[test]
    fn test_connect_params_from_device_name() {
        let params = ConnectParams::from_device_name(0x046d, 0x0825, 42, "/dev/bus/usb/001/004").unwrap();
        assert_eq!(params.bus_num, 1);
        assert_eq!(params.dev_num, 4);
        assert_eq!(params.usbfs_path, "/dev/bus/usb");
        assert_eq!(params.fd, 42);
    }

    #[test]
    fn test_connect_params_rejects_garbage() {
        assert!(ConnectParams::from_device_name(1, 2, 3, "usb").is_none());
        assert!(ConnectParams::from_device_name(1, 2, 3, "/dev/bus/usb/abc/004").is_none());
    }

    #[test]
    fn test_frame_format_parse() {
        assert_eq!("MJPEG".parse::<FrameFormat>().unwrap(), FrameFormat::Mjpeg);
        assert_eq!("yuyv".parse::<FrameFormat>().unwrap(), FrameFormat::Yuyv);
        assert!("h264".parse::<FrameFormat>().is_err());
    }

    #[test]
    fn test_pixel_format_codes_round_trip() {
        for code in 0..6 {
            assert_eq!(PixelFormat::from_code(code).unwrap().code(), code);
        }
        assert!(PixelFormat::from_code(6).is_none());
    }
}
