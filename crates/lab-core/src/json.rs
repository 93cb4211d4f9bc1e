//! ASCII-safe JSON encoding
//!
//! Ledger lines and run artifacts escape every non-ASCII character as
//! `\uXXXX` so the files stay 7-bit clean.

use serde::Serialize;
use std::fmt::Write;

/// Serialize to a single ASCII-only line
pub fn to_ascii_line<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value).map(|s| escape_non_ascii(&s))
}

/// Serialize to indented ASCII-only JSON
pub fn to_ascii_pretty<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value).map(|s| escape_non_ascii(&s))
}

/// Replace non-ASCII characters of serialized JSON with `\u` escapes
///
/// Only valid on serializer output: non-ASCII characters there can only
/// appear inside string literals.
#[must_use]
pub fn escape_non_ascii(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }
    let mut out = String::with_capacity(json.len() + 16);
    let mut units = [0u16; 2];
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}
