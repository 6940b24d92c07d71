//! EXIF extraction for image evidence.
//!
//! Extracted at ingest time into the `exif.json` sidecar so the
//! correlation layer can read capture timestamps without re-decoding the
//! image.

use std::collections::BTreeMap;
use std::io::Cursor;

/// Field name holding the capture timestamp used for timeline events.
pub const DATETIME_ORIGINAL: &str = "DateTimeOriginal";

/// Reads all EXIF fields into a displayable map. Returns `None` when the
/// bytes carry no parseable EXIF segment.
pub fn extract_exif_map(bytes: &[u8]) -> Option<BTreeMap<String, String>> {
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new();
    let data = reader.read_from_container(&mut cursor).ok()?;

    let mut map = BTreeMap::new();
    for field in data.fields() {
        let key = field.tag.to_string();
        let value = field.display_value().with_unit(&data).to_string();
        // First value wins when a tag appears in both IFDs.
        map.entry(key).or_insert(value);
    }
    if map.is_empty() { None } else { Some(map) }
}

/// Parses the `DateTimeOriginal` value out of an EXIF map.
///
/// EXIF dates are `YYYY:MM:DD HH:MM:SS` in local camera time; they are
/// treated as UTC for timeline purposes.
pub fn parse_datetime_original(
    exif: &BTreeMap<String, String>,
) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = exif.get(DATETIME_ORIGINAL)?;
    let trimmed = raw.trim().trim_matches('"');
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
