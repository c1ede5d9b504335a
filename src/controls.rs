//! Table-driven control normalization
//!
//! Every UVC control the session exposes is described by one [`ControlKind`]
//! row: its value mode, its support bit and the terminal/unit it lives on.
//! [`ControlRegistry`] runs the same algorithm for each row, translating the
//! device's absolute range to a `0..=100` percentage.

use crate::errors::{Result, UvcError};
use crate::native::NativeCamera;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// UVC bmControls bit layout for the camera terminal (`CTRL_*`) and the
/// processing unit (`PU_*`). Processing-unit flags carry the sign bit so the
/// two masks can share one flag namespace.
pub mod flags {
    pub const CTRL_SCANNING: i64 = 0x0000_0001; // D0:  Scanning Mode
    pub const CTRL_AE: i64 = 0x0000_0002; // D1:  Auto-Exposure Mode
    pub const CTRL_AE_PRIORITY: i64 = 0x0000_0004; // D2:  Auto-Exposure Priority
    pub const CTRL_AE_ABS: i64 = 0x0000_0008; // D3:  Exposure Time (Absolute)
    pub const CTRL_AR_REL: i64 = 0x0000_0010; // D4:  Exposure Time (Relative)
    pub const CTRL_FOCUS_ABS: i64 = 0x0000_0020; // D5:  Focus (Absolute)
    pub const CTRL_FOCUS_REL: i64 = 0x0000_0040; // D6:  Focus (Relative)
    pub const CTRL_IRIS_ABS: i64 = 0x0000_0080; // D7:  Iris (Absolute)
    pub const CTRL_IRIS_REL: i64 = 0x0000_0100; // D8:  Iris (Relative)
    pub const CTRL_ZOOM_ABS: i64 = 0x0000_0200; // D9:  Zoom (Absolute)
    pub const CTRL_ZOOM_REL: i64 = 0x0000_0400; // D10: Zoom (Relative)
    pub const CTRL_PANTILT_ABS: i64 = 0x0000_0800; // D11: PanTilt (Absolute)
    pub const CTRL_PANTILT_REL: i64 = 0x0000_1000; // D12: PanTilt (Relative)
    pub const CTRL_ROLL_ABS: i64 = 0x0000_2000; // D13: Roll (Absolute)
    pub const CTRL_ROLL_REL: i64 = 0x0000_4000; // D14: Roll (Relative)
    pub const CTRL_FOCUS_AUTO: i64 = 0x0002_0000; // D17: Focus, Auto
    pub const CTRL_PRIVACY: i64 = 0x0004_0000; // D18: Privacy
    pub const CTRL_FOCUS_SIMPLE: i64 = 0x0008_0000; // D19: Focus, Simple
    pub const CTRL_WINDOW: i64 = 0x0010_0000; // D20: Window

    pub const PU_BRIGHTNESS: i64 = -0x7fff_ffff; // D0: Brightness
    pub const PU_CONTRAST: i64 = -0x7fff_fffe; // D1: Contrast
    pub const PU_HUE: i64 = -0x7fff_fffc; // D2: Hue
    pub const PU_SATURATION: i64 = -0x7fff_fff8; // D3: Saturation
    pub const PU_SHARPNESS: i64 = -0x7fff_fff0; // D4: Sharpness
    pub const PU_GAMMA: i64 = -0x7fff_ffe0; // D5: Gamma
    pub const PU_WB_TEMP: i64 = -0x7fff_ffc0; // D6: White Balance Temperature
    pub const PU_WB_COMPO: i64 = -0x7fff_ff80; // D7: White Balance Component
    pub const PU_BACKLIGHT: i64 = -0x7fff_ff00; // D8: Backlight Compensation
    pub const PU_GAIN: i64 = -0x7fff_fe00; // D9: Gain
    pub const PU_POWER_LF: i64 = -0x7fff_fc00; // D10: Power Line Frequency
    pub const PU_HUE_AUTO: i64 = -0x7fff_f800; // D11: Hue, Auto
    pub const PU_WB_TEMP_AUTO: i64 = -0x7fff_f000; // D12: White Balance Temperature, Auto
    pub const PU_WB_COMPO_AUTO: i64 = -0x7fff_e000; // D13: White Balance Component, Auto
    pub const PU_DIGITAL_MULT: i64 = -0x7fff_c000; // D14: Digital Multiplier
    pub const PU_DIGITAL_LIMIT: i64 = -0x7fff_8000; // D15: Digital Multiplier Limit
    pub const PU_AVIDEO_STD: i64 = -0x7fff_0000; // D16: Analog Video Standard
    pub const PU_AVIDEO_LOCK: i64 = -0x7ffe_0000; // D17: Analog Video Lock Status
    pub const PU_CONTRAST_AUTO: i64 = -0x7ffc_0000; // D18: Contrast, Auto

    /// Sign-extended marker shared by every processing-unit flag.
    pub const PU_MARKER: i64 = -0x8000_0000;
    /// Bits that carry the actual processing-unit control mask.
    pub const PU_MASK: i64 = 0x7fff_ffff;

    pub const CAMERA_TERMINAL: &[(&str, i64)] = &[
        ("CTRL_SCANNING", CTRL_SCANNING),
        ("CTRL_AE", CTRL_AE),
        ("CTRL_AE_PRIORITY", CTRL_AE_PRIORITY),
        ("CTRL_AE_ABS", CTRL_AE_ABS),
        ("CTRL_AR_REL", CTRL_AR_REL),
        ("CTRL_FOCUS_ABS", CTRL_FOCUS_ABS),
        ("CTRL_FOCUS_REL", CTRL_FOCUS_REL),
        ("CTRL_IRIS_ABS", CTRL_IRIS_ABS),
        ("CTRL_IRIS_REL", CTRL_IRIS_REL),
        ("CTRL_ZOOM_ABS", CTRL_ZOOM_ABS),
        ("CTRL_ZOOM_REL", CTRL_ZOOM_REL),
        ("CTRL_PANTILT_ABS", CTRL_PANTILT_ABS),
        ("CTRL_PANTILT_REL", CTRL_PANTILT_REL),
        ("CTRL_ROLL_ABS", CTRL_ROLL_ABS),
        ("CTRL_ROLL_REL", CTRL_ROLL_REL),
        ("CTRL_FOCUS_AUTO", CTRL_FOCUS_AUTO),
        ("CTRL_PRIVACY", CTRL_PRIVACY),
        ("CTRL_FOCUS_SIMPLE", CTRL_FOCUS_SIMPLE),
        ("CTRL_WINDOW", CTRL_WINDOW),
    ];

    pub const PROCESSING_UNIT: &[(&str, i64)] = &[
        ("PU_BRIGHTNESS", PU_BRIGHTNESS),
        ("PU_CONTRAST", PU_CONTRAST),
        ("PU_HUE", PU_HUE),
        ("PU_SATURATION", PU_SATURATION),
        ("PU_SHARPNESS", PU_SHARPNESS),
        ("PU_GAMMA", PU_GAMMA),
        ("PU_WB_TEMP", PU_WB_TEMP),
        ("PU_WB_COMPO", PU_WB_COMPO),
        ("PU_BACKLIGHT", PU_BACKLIGHT),
        ("PU_GAIN", PU_GAIN),
        ("PU_POWER_LF", PU_POWER_LF),
        ("PU_HUE_AUTO", PU_HUE_AUTO),
        ("PU_WB_TEMP_AUTO", PU_WB_TEMP_AUTO),
        ("PU_WB_COMPO_AUTO", PU_WB_COMPO_AUTO),
        ("PU_DIGITAL_MULT", PU_DIGITAL_MULT),
        ("PU_DIGITAL_LIMIT", PU_DIGITAL_LIMIT),
        ("PU_AVIDEO_STD", PU_AVIDEO_STD),
        ("PU_AVIDEO_LOCK", PU_AVIDEO_LOCK),
        ("PU_CONTRAST_AUTO", PU_CONTRAST_AUTO),
    ];

    pub fn is_processing_unit(flag: i64) -> bool {
        flag & PU_MARKER == PU_MARKER
    }
}

/// How a control's value is presented to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    /// Normalized onto `0..=100` from the device range.
    Percent,
    /// On/off; the device value is interpreted as `value > 0`.
    Boolean,
    /// Enumerated device value passed through untouched.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlUnit {
    CameraTerminal,
    ProcessingUnit,
}

macro_rules! control_table {
    ($($kind:ident => ($name:literal, $mode:ident, $flag:ident)),* $(,)?) => {
        /// Every control reachable through the session.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ControlKind {
            $($kind),*
        }

        impl ControlKind {
            pub const ALL: &'static [ControlKind] = &[$(ControlKind::$kind),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(ControlKind::$kind => $name),*
                }
            }

            pub fn mode(self) -> ControlMode {
                match self {
                    $(ControlKind::$kind => ControlMode::$mode),*
                }
            }

            /// Support bit that must be set for the device to honor this control.
            pub fn support_flag(self) -> i64 {
                match self {
                    $(ControlKind::$kind => flags::$flag),*
                }
            }
        }
    };
}

control_table! {
    ScanningMode => ("scanning_mode", Raw, CTRL_SCANNING),
    ExposureMode => ("exposure_mode", Raw, CTRL_AE),
    ExposurePriority => ("exposure_priority", Raw, CTRL_AE_PRIORITY),
    Exposure => ("exposure", Percent, CTRL_AE_ABS),
    AutoFocus => ("auto_focus", Boolean, CTRL_FOCUS_AUTO),
    Focus => ("focus", Percent, CTRL_FOCUS_ABS),
    Iris => ("iris", Percent, CTRL_IRIS_ABS),
    Zoom => ("zoom", Percent, CTRL_ZOOM_ABS),
    Pan => ("pan", Percent, CTRL_PANTILT_ABS),
    Tilt => ("tilt", Percent, CTRL_PANTILT_ABS),
    Roll => ("roll", Percent, CTRL_ROLL_ABS),
    Privacy => ("privacy", Boolean, CTRL_PRIVACY),
    Brightness => ("brightness", Percent, PU_BRIGHTNESS),
    Contrast => ("contrast", Percent, PU_CONTRAST),
    AutoContrast => ("auto_contrast", Boolean, PU_CONTRAST_AUTO),
    Hue => ("hue", Percent, PU_HUE),
    AutoHue => ("auto_hue", Boolean, PU_HUE_AUTO),
    Saturation => ("saturation", Percent, PU_SATURATION),
    Sharpness => ("sharpness", Percent, PU_SHARPNESS),
    Gamma => ("gamma", Percent, PU_GAMMA),
    Gain => ("gain", Percent, PU_GAIN),
    WhiteBalance => ("white_balance", Percent, PU_WB_TEMP),
    AutoWhiteBalance => ("auto_white_balance", Boolean, PU_WB_TEMP_AUTO),
    BacklightCompensation => ("backlight_compensation", Percent, PU_BACKLIGHT),
    DigitalMultiplier => ("digital_multiplier", Percent, PU_DIGITAL_MULT),
    PowerLineFrequency => ("power_line_frequency", Raw, PU_POWER_LF),
}

impl ControlKind {
    pub fn unit(self) -> ControlUnit {
        if flags::is_processing_unit(self.support_flag()) {
            ControlUnit::ProcessingUnit
        } else {
            ControlUnit::CameraTerminal
        }
    }
}

impl FromStr for ControlKind {
    type Err = ();

    /// Accepts the snake_case name or the variant name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ControlKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s || format!("{kind:?}") == s)
            .ok_or(())
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device-native bounds of one control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlRange {
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

impl ControlRange {
    pub fn new(min: i32, max: i32, default: i32) -> Self {
        Self { min, max, default }
    }

    /// Width of the range; zero for devices that report `min == max`.
    pub fn span(&self) -> i64 {
        (i64::from(self.max) - i64::from(self.min)).abs()
    }

    /// `min == max` is what devices report before they settle, or for
    /// controls with no adjustable range.
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    /// Absolute device value -> percentage, truncated toward zero.
    pub fn to_percent(&self, absolute: i32) -> i32 {
        let span = self.span();
        if span <= 0 {
            return 0;
        }
        let pct = (i64::from(absolute) - i64::from(self.min)) * 100 / span;
        pct.clamp(0, 100) as i32
    }

    /// Percentage -> absolute device value, or `None` when the range is empty.
    /// The result never leaves the reported bounds, even for reversed ranges.
    pub fn to_absolute(&self, percent: i32) -> Option<i32> {
        let span = self.span();
        if span <= 0 {
            return None;
        }
        let pct = i64::from(percent.clamp(0, 100));
        let low = i64::from(self.min.min(self.max));
        let high = i64::from(self.min.max(self.max));
        let absolute = (pct * span / 100 + i64::from(self.min)).clamp(low, high);
        i32::try_from(absolute).ok()
    }
}

/// Camera-terminal and processing-unit support masks. A zero mask means the
/// device has not (yet) reported anything for that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupportFlags {
    pub camera_terminal: u64,
    pub processing_unit: u64,
}

impl SupportFlags {
    pub fn new(camera_terminal: u64, processing_unit: u64) -> Self {
        Self {
            camera_terminal,
            processing_unit,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.camera_terminal != 0 && self.processing_unit != 0
    }

    /// Test a `flags::*` constant against the mask of the unit it belongs to.
    pub fn contains(&self, flag: i64) -> bool {
        if flags::is_processing_unit(flag) {
            let bits = flag & flags::PU_MASK;
            (self.processing_unit as i64) & bits == bits
        } else {
            (self.camera_terminal as i64) & flag == flag
        }
    }

    fn unit_known(&self, unit: ControlUnit) -> bool {
        match unit {
            ControlUnit::CameraTerminal => self.camera_terminal != 0,
            ControlUnit::ProcessingUnit => self.processing_unit != 0,
        }
    }

    /// False only when the unit reported a mask and the control's bit is clear.
    pub fn allows(&self, kind: ControlKind) -> bool {
        !self.unit_known(kind.unit()) || self.contains(kind.support_flag())
    }
}

/// Schema row for listing controls.
#[derive(Debug, Clone, Serialize)]
pub struct ControlInfo {
    pub kind: ControlKind,
    pub name: &'static str,
    pub mode: ControlMode,
    pub unit: ControlUnit,
    pub flag: i64,
}

pub fn all_controls() -> Vec<ControlInfo> {
    ControlKind::ALL
        .iter()
        .map(|&kind| ControlInfo {
            kind,
            name: kind.name(),
            mode: kind.mode(),
            unit: kind.unit(),
            flag: kind.support_flag(),
        })
        .collect()
}

/// Per-session cache of support flags and control ranges, plus the
/// normalization algorithm that runs on top of it.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    supports: SupportFlags,
    ranges: HashMap<ControlKind, ControlRange>,
    last_values: HashMap<ControlKind, i32>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything fetched from the device.
    pub fn invalidate(&mut self) {
        self.supports = SupportFlags::default();
        self.ranges.clear();
        self.last_values.clear();
    }

    /// The static control table, in declaration order.
    pub fn descriptors() -> Vec<ControlInfo> {
        all_controls()
    }

    pub fn support_flags(&self) -> SupportFlags {
        self.supports
    }

    pub fn cached_range(&self, kind: ControlKind) -> Option<ControlRange> {
        self.ranges.get(&kind).copied()
    }

    /// Fetch whichever support mask is still unknown; once both are known,
    /// warm every range that has not been cached yet.
    pub fn update_camera_params(&mut self, device: &mut dyn NativeCamera) {
        self.ensure_supports(device);
        if self.supports.is_complete() {
            for &kind in ControlKind::ALL {
                if self.supports.allows(kind) {
                    self.ensure_range(device, kind);
                }
            }
        }
    }

    /// Results can be wrong right after connect; devices settle after a few
    /// hundred milliseconds.
    pub fn check_support_flag(&mut self, device: &mut dyn NativeCamera, flag: i64) -> bool {
        self.update_camera_params(device);
        self.supports.contains(flag)
    }

    pub fn get(&mut self, device: &mut dyn NativeCamera, kind: ControlKind) -> Result<i32> {
        expect_mode(kind, ControlMode::Percent)?;
        let range = self.ensure_range(device, kind);
        if range.span() <= 0 {
            return Ok(0);
        }
        let absolute = self.read_absolute(device, kind, range);
        Ok(range.to_percent(absolute))
    }

    pub fn set(&mut self, device: &mut dyn NativeCamera, kind: ControlKind, percent: i32) -> Result<()> {
        expect_mode(kind, ControlMode::Percent)?;
        self.ensure_writable(device, kind)?;
        let range = self.ensure_range(device, kind);
        match range.to_absolute(percent) {
            Some(absolute) => self.write_absolute(device, kind, absolute),
            None => {
                log::debug!("{kind}: zero-width range, ignoring set to {percent}%");
                Ok(())
            }
        }
    }

    /// Write the hardware default, bypassing percentage translation.
    pub fn reset(&mut self, device: &mut dyn NativeCamera, kind: ControlKind) -> Result<()> {
        self.ensure_writable(device, kind)?;
        let range = self.ensure_range(device, kind);
        self.write_absolute(device, kind, range.default)
    }

    pub fn get_bool(&mut self, device: &mut dyn NativeCamera, kind: ControlKind) -> Result<bool> {
        expect_mode(kind, ControlMode::Boolean)?;
        self.ensure_supports(device);
        let fallback = self.ensure_range(device, kind);
        Ok(self.read_absolute(device, kind, fallback) > 0)
    }

    pub fn set_bool(&mut self, device: &mut dyn NativeCamera, kind: ControlKind, on: bool) -> Result<()> {
        expect_mode(kind, ControlMode::Boolean)?;
        self.ensure_writable(device, kind)?;
        self.write_absolute(device, kind, i32::from(on))
    }

    pub fn get_raw(&mut self, device: &mut dyn NativeCamera, kind: ControlKind) -> Result<i32> {
        expect_mode(kind, ControlMode::Raw)?;
        self.ensure_supports(device);
        let fallback = self.ensure_range(device, kind);
        Ok(self.read_absolute(device, kind, fallback))
    }

    pub fn set_raw(&mut self, device: &mut dyn NativeCamera, kind: ControlKind, value: i32) -> Result<()> {
        expect_mode(kind, ControlMode::Raw)?;
        self.ensure_writable(device, kind)?;
        self.write_absolute(device, kind, value)
    }

    fn ensure_supports(&mut self, device: &mut dyn NativeCamera) {
        if self.supports.camera_terminal == 0 {
            self.supports.camera_terminal = device.ctrl_supports();
        }
        if self.supports.processing_unit == 0 {
            self.supports.processing_unit = device.proc_supports();
        }
    }

    fn ensure_writable(&mut self, device: &mut dyn NativeCamera, kind: ControlKind) -> Result<()> {
        self.ensure_supports(device);
        if self.supports.allows(kind) {
            Ok(())
        } else {
            Err(UvcError::ControlUnsupported(kind))
        }
    }

    /// Cached range for `kind`, re-fetched while unfetched or degenerate.
    fn ensure_range(&mut self, device: &mut dyn NativeCamera, kind: ControlKind) -> ControlRange {
        self.ensure_supports(device);
        if let Some(range) = self.ranges.get(&kind) {
            if !range.is_degenerate() {
                return *range;
            }
        }

        match device.control_limits(kind) {
            Ok(range) => {
                log::debug!("{kind}: range {}..={} default {}", range.min, range.max, range.default);
                self.ranges.insert(kind, range);
                range
            }
            Err(code) => {
                log::debug!("{kind}: limit query failed with status {code}");
                self.ranges.get(&kind).copied().unwrap_or_default()
            }
        }
    }

    fn read_absolute(&mut self, device: &mut dyn NativeCamera, kind: ControlKind, range: ControlRange) -> i32 {
        if !self.supports.allows(kind) {
            return self.last_values.get(&kind).copied().unwrap_or(range.default);
        }
        match device.control_value(kind) {
            Ok(value) => {
                self.last_values.insert(kind, value);
                value
            }
            Err(code) => {
                log::debug!("{kind}: read failed with status {code}, using cached value");
                self.last_values.get(&kind).copied().unwrap_or(range.default)
            }
        }
    }

    fn write_absolute(&mut self, device: &mut dyn NativeCamera, kind: ControlKind, value: i32) -> Result<()> {
        device
            .set_control_value(kind, value)
            .map_err(|code| UvcError::ControlUpdateFailed { kind, code })?;
        self.last_values.insert(kind, value);
        Ok(())
    }
}

fn expect_mode(kind: ControlKind, expected: ControlMode) -> Result<()> {
    let actual = kind.mode();
    if actual == expected {
        Ok(())
    } else {
        Err(UvcError::ControlModeMismatch {
            kind,
            expected,
            actual,
        })
    }
}
