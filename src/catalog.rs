//! Capability descriptor parsing
//!
//! The driver reports supported resolutions as a JSON document:
//!
//! ```json
//! {"formats": [{"type": 6, "size": ["640x480", "320x240"]},
//!              {"type": 4, "size": ["640x480"]}]}
//! ```
//!
//! Parsing is tolerant: a broken entry (or the tail of a broken size list)
//! is skipped and the rest of the document still surfaces.

use crate::errors::UvcError;
use crate::types::FrameFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// UVC `VS_FORMAT_UNCOMPRESSED` descriptor subtype.
pub const FORMAT_TYPE_UNCOMPRESSED: i64 = 4;
/// UVC `VS_FORMAT_MJPEG` descriptor subtype.
pub const FORMAT_TYPE_MJPEG: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatType {
    Uncompressed,
    Mjpeg,
}

impl FormatType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            FORMAT_TYPE_UNCOMPRESSED => Some(FormatType::Uncompressed),
            FORMAT_TYPE_MJPEG => Some(FormatType::Mjpeg),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            FormatType::Uncompressed => FORMAT_TYPE_UNCOMPRESSED,
            FormatType::Mjpeg => FORMAT_TYPE_MJPEG,
        }
    }

    /// Descriptor type that carries sizes for a stream frame format.
    pub fn for_frame_format(format: FrameFormat) -> Self {
        if format.is_compressed() {
            FormatType::Mjpeg
        } else {
            FormatType::Uncompressed
        }
    }
}

/// One supported (format, size) pair as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_type: FormatType,
    /// Frame descriptor subtype; the capability text carries none, so 0.
    pub frame_type: i32,
    /// Position of this size inside its format entry.
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

impl FormatDescriptor {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Parsed capability descriptor, kept together with its raw text.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    raw: String,
    entries: Vec<FormatDescriptor>,
    skipped: usize,
}

impl CapabilityCatalog {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        if !raw.trim().is_empty() {
            match serde_json::from_str::<Value>(&raw) {
                Ok(doc) => match doc.get("formats").and_then(Value::as_array) {
                    Some(formats) => {
                        for format in formats {
                            if !parse_format_entry(format, &mut entries) {
                                skipped += 1;
                            }
                        }
                    }
                    None => {
                        log::warn!("Capability descriptor has no formats list");
                        skipped += 1;
                    }
                },
                Err(e) => {
                    log::warn!("Capability descriptor is not valid JSON: {}", e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            log::warn!("{}", UvcError::CapabilityParseIncomplete { skipped });
        }
        log::debug!("Parsed {} supported sizes", entries.len());

        Self { raw, entries, skipped }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when part of the descriptor had to be skipped.
    pub fn is_incomplete(&self) -> bool {
        self.skipped > 0
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn all(&self) -> &[FormatDescriptor] {
        &self.entries
    }

    /// Sizes for one format type, or every size for `None`, in device order.
    pub fn sizes_for(&self, format_type: Option<FormatType>) -> Vec<FormatDescriptor> {
        self.entries
            .iter()
            .filter(|d| format_type.map_or(true, |t| d.format_type == t))
            .copied()
            .collect()
    }
}

/// Returns false when the entry was skipped or truncated.
fn parse_format_entry(format: &Value, out: &mut Vec<FormatDescriptor>) -> bool {
    let (Some(type_code), Some(sizes)) = (format.get("type"), format.get("size")) else {
        log::debug!("Skipping format entry without type/size: {}", format);
        return false;
    };
    let Some(type_code) = type_code.as_i64() else {
        log::debug!("Skipping format entry with non-integer type: {}", type_code);
        return false;
    };
    let Some(format_type) = FormatType::from_code(type_code) else {
        log::debug!("Skipping unsupported format type {}", type_code);
        return false;
    };
    let Some(sizes) = sizes.as_array() else {
        log::debug!("Skipping format {} with non-list sizes", type_code);
        return false;
    };

    for (index, size) in sizes.iter().enumerate() {
        match size.as_str().and_then(parse_size) {
            Some((width, height)) => out.push(FormatDescriptor {
                format_type,
                frame_type: 0,
                index: index as u32,
                width,
                height,
            }),
            None => {
                log::debug!("Stopping format {} at unparsable size {}", type_code, size);
                return false;
            }
        }
    }
    true
}

fn parse_size(token: &str) -> Option<(u32, u32)> {
    let mut parts = token.split('x');
    let width = parts.next()?.trim().parse().ok()?;
    let height = parts.next()?.trim().parse().ok()?;
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed() {
        let catalog = CapabilityCatalog::parse(
            r#"{"formats":[{"type":6,"size":["640x480","320x240"]},{"type":4,"size":["1280x720"]}]}"#,
        );
        assert!(!catalog.is_incomplete());
        assert_eq!(catalog.all().len(), 3);

        let mjpeg = catalog.sizes_for(Some(FormatType::Mjpeg));
        assert_eq!(mjpeg.iter().map(|d| d.size()).collect::<Vec<_>>(), vec![(640, 480), (320, 240)]);
        assert_eq!(mjpeg[1].index, 1);

        let yuv = catalog.sizes_for(Some(FormatType::Uncompressed));
        assert_eq!(yuv[0].size(), (1280, 720));
        assert_eq!(yuv[0].index, 0);
    }

    #[test]
    fn test_bad_size_truncates_only_its_entry() {
        let catalog = CapabilityCatalog::parse(
            r#"{"formats":[
                {"type":6,"size":["640x480","320x240"]},
                {"type":4,"size":["800x600","widexhigh","160x120"]}
            ]}"#,
        );
        assert!(catalog.is_incomplete());
        let sizes: Vec<_> = catalog.sizes_for(None).iter().map(|d| (d.format_type, d.size())).collect();
        assert_eq!(
            sizes,
            vec![
                (FormatType::Mjpeg, (640, 480)),
                (FormatType::Mjpeg, (320, 240)),
                (FormatType::Uncompressed, (800, 600)),
            ]
        );
    }

    #[test]
    fn test_entries_missing_fields_are_skipped() {
        let catalog = CapabilityCatalog::parse(
            r#"{"formats":[{"size":["1x1"]},{"type":6},{"type":"6","size":["2x2"]},{"type":6,"size":"3x3"},{"type":6,"size":["4x4"]}]}"#,
        );
        assert_eq!(catalog.skipped(), 4);
        assert_eq!(catalog.all().len(), 1);
        assert_eq!(catalog.all()[0].size(), (4, 4));
    }

    #[test]
    fn test_unknown_format_type_skipped() {
        let catalog = CapabilityCatalog::parse(r#"{"formats":[{"type":16,"size":["1920x1080"]}]}"#);
        assert!(catalog.is_empty());
        assert!(catalog.is_incomplete());
    }

    #[test]
    fn test_invalid_json_yields_empty_catalog() {
        let catalog = CapabilityCatalog::parse("{formats: [");
        assert!(catalog.is_empty());
        assert!(catalog.is_incomplete());
        assert_eq!(catalog.raw(), "{formats: [");
    }

    #[test]
    fn test_empty_text_is_not_incomplete() {
        let catalog = CapabilityCatalog::parse("");
        assert!(catalog.is_empty());
        assert!(!catalog.is_incomplete());
    }

    #[test]
    fn test_negative_dimension_stops_entry() {
        let catalog = CapabilityCatalog::parse(r#"{"formats":[{"type":4,"size":["640x480","-1x240","320x240"]}]}"#);
        assert_eq!(catalog.all().len(), 1);
    }

    #[test]
    fn test_format_type_for_frame_format() {
        assert_eq!(FormatType::for_frame_format(FrameFormat::Mjpeg), FormatType::Mjpeg);
        assert_eq!(FormatType::for_frame_format(FrameFormat::Yuyv), FormatType::Uncompressed);
        assert_eq!(FormatType::Mjpeg.code(), 6);
    }
}
