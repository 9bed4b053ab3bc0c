//! Metric key construction.
//!
//! Relation names are escaped into a single key segment. The escaping is
//! reversible, so distinct names always produce distinct segments.

use std::fmt::Write as _;

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '.';

/// Escape character inside a segment.
const ESCAPE: char = '_';

/// Encodes a relation name as a single key segment.
///
/// ASCII letters, digits and `-` pass through. `_` is doubled, and every
/// other byte of the UTF-8 encoding becomes `_x` followed by two lowercase
/// hex digits. The result never contains [`KEY_SEPARATOR`].
pub fn encode_segment(name: &str) -> String {
    let mut segment = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => segment.push(byte as char),
            b'_' => {
                segment.push(ESCAPE);
                segment.push(ESCAPE);
            }
            _ => {
                // Writing into a String cannot fail.
                let _ = write!(segment, "{ESCAPE}x{byte:02x}");
            }
        }
    }
    segment
}

/// Reverses [`encode_segment`]. Returns `None` for malformed input.
pub fn decode_segment(segment: &str) -> Option<String> {
    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESCAPE as u8 {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1)? {
            b'_' => {
                decoded.push(b'_');
                i += 2;
            }
            b'x' => {
                let hex = segment.get(i + 2..i + 4)?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 4;
            }
            _ => return None,
        }
    }
    String::from_utf8(decoded).ok()
}

/// Joins `<group prefix>.<segment>.<field>`.
pub fn metric_key(group_prefix: &str, segment: &str, field: &str) -> String {
    let mut key = String::with_capacity(group_prefix.len() + segment.len() + field.len() + 2);
    key.push_str(group_prefix);
    key.push(KEY_SEPARATOR);
    key.push_str(segment);
    key.push(KEY_SEPARATOR);
    key.push_str(field);
    key
}
