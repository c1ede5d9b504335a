//! Capability descriptor parsing as seen through the public API

use uvccamera::catalog::{CapabilityCatalog, FormatType};
use uvccamera::testing::SAMPLE_CAPABILITIES;

#[test]
fn non_numeric_size_keeps_earlier_sizes_and_entries() {
    let catalog = CapabilityCatalog::parse(
        r#"{"formats":[{"type":6,"size":["640x480","320x240"]},{"type":4,"size":["800x600","AxB","160x120"]}]}"#,
    );

    let mjpeg = catalog.sizes_for(Some(FormatType::Mjpeg));
    assert_eq!(mjpeg.len(), 2);

    let yuyv = catalog.sizes_for(Some(FormatType::Uncompressed));
    assert_eq!(yuyv.len(), 1);
    assert_eq!(yuyv[0].size(), (800, 600));
    assert!(catalog.is_incomplete());
}

#[test]
fn descriptors_preserve_device_order_and_index() {
    let catalog = CapabilityCatalog::parse(SAMPLE_CAPABILITIES);
    let all = catalog.sizes_for(None);
    assert_eq!(all.len(), 5);

    let indices: Vec<_> = all.iter().map(|d| (d.format_type, d.index)).collect();
    assert_eq!(
        indices,
        vec![
            (FormatType::Mjpeg, 0),
            (FormatType::Mjpeg, 1),
            (FormatType::Mjpeg, 2),
            (FormatType::Uncompressed, 0),
            (FormatType::Uncompressed, 1),
        ]
    );
    assert!(all.iter().all(|d| d.frame_type == 0));
}

#[test]
fn descriptors_serialize_for_cli_output() {
    let catalog = CapabilityCatalog::parse(r#"{"formats":[{"type":6,"size":["1920x1080"]}]}"#);
    let json = serde_json::to_string(catalog.all()).unwrap();
    assert!(json.contains("\"format_type\":\"Mjpeg\""));
    assert!(json.contains("\"width\":1920"));
}

#[test]
fn missing_formats_list_is_empty_and_incomplete() {
    let catalog = CapabilityCatalog::parse(r#"{"sizes":[]}"#);
    assert!(catalog.is_empty());
    assert!(catalog.is_incomplete());
    assert_eq!(catalog.raw(), r#"{"sizes":[]}"#);
}
