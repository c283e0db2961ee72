//! File path normalization for code-block and file-state metadata.
//!
//! Cursor records the file a code block or file state belongs to either as a
//! structured VS Code URI (`{"fsPath": "/home/u/a.rs", ...}`) or as a raw
//! `file://` URI string, sometimes only as the map key. All forms end up as one
//! plain filesystem path.
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

/// Resolve the path of a metadata entry stored under `file_key`.
///
/// Preference: `uri.fsPath` as-is, then `uri.external` / `uri.path` / a string `uri`
/// normalized, then the map key normalized.
pub fn entry_path(entry: &Map<String, Value>, file_key: &str) -> String {
    match entry.get("uri") {
        Some(Value::Object(uri)) => {
            if let Some(fs_path) = uri.get("fsPath").and_then(Value::as_str) {
                return fs_path.to_string();
            }
            ["external", "path"]
                .iter()
                .find_map(|field| uri.get(*field).and_then(Value::as_str))
                .map(normalize_uri)
                .unwrap_or_else(|| normalize_uri(file_key))
        }
        Some(Value::String(raw)) => normalize_uri(raw),
        _ => normalize_uri(file_key),
    }
}

/// Turn a raw (possibly percent-encoded) `file://` URI into a filesystem path.
///
/// Every `%XX` escape is decoded, so spaces and non-ASCII names match their `fsPath`
/// form. A `%` that does not start a valid escape is kept as-is.
/// `file:///c%3A/src/a.py` becomes `c:/src/a.py`, `file:///home/u/a.rs` becomes
/// `/home/u/a.rs`.
pub fn normalize_uri(raw: &str) -> String {
    let without_scheme = raw.strip_prefix("file://").unwrap_or(raw);
    let decoded = decode_path_escapes(without_scheme);
    match strip_drive_slash(&decoded) {
        Some(stripped) => stripped.to_string(),
        None => decoded,
    }
}

fn decode_path_escapes(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

// "/c:/x" -> "c:/x"
fn strip_drive_slash(path: &str) -> Option<&str> {
    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':'
    {
        Some(&path[1..])
    } else {
        None
    }
}
