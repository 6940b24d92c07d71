//! Canonical JSON file I/O.
//!
//! Every JSON artefact the toolkit writes goes through these helpers so
//! the temp-then-rename write discipline and the UTF-8 trailing-newline
//! convention hold uniformly across the tree.

use crate::{CoreResult, Validate};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Serializes a value as pretty-printed JSON with a trailing newline and
/// writes it atomically (temp file in the same directory, then rename).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artefact".to_string());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&tmp, body.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads and deserializes a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let body = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

/// Reads a JSON file and validates the record before returning it.
pub fn read_validated<T: DeserializeOwned + Validate>(path: &Path) -> CoreResult<T> {
    let value: T = read_json(path)?;
    value.validate()?;
    Ok(value)
}

/// Validates a record and writes it. The write is refused if validation
/// fails, so no invalid artefact ever reaches disk.
pub fn write_validated<T: Serialize + Validate>(path: &Path, value: &T) -> CoreResult<()> {
    value.validate()?;
    write_json(path, value)
}
