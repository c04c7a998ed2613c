//! Text validation and sanitizing applied before anything is embedded in JSON.
//!
//! A character is allowed unless it is a control character other than
//! CR, LF or TAB. Byte buffers additionally lose any sequence that is not
//! valid UTF-8.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::{BridgeError, Result};

fn is_allowed(c: char) -> bool {
    !c.is_control() || matches!(c, '\r' | '\n' | '\t')
}

pub fn is_valid_text(s: &str) -> bool {
    s.chars().all(is_allowed)
}

pub fn is_valid_bytes(b: &[u8]) -> bool {
    std::str::from_utf8(b).is_ok_and(is_valid_text)
}

/// Remove disallowed control characters, keeping everything else in order.
pub fn sanitize(s: &str) -> Cow<'_, str> {
    if is_valid_text(s) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| is_allowed(*c)).collect())
}

/// Drop invalid UTF-8 sequences, then apply [`sanitize`].
pub fn sanitize_bytes(b: &[u8]) -> Cow<'_, [u8]> {
    if is_valid_bytes(b) {
        return Cow::Borrowed(b);
    }

    let mut out = String::with_capacity(b.len());
    for chunk in b.utf8_chunks() {
        out.extend(chunk.valid().chars().filter(|c| is_allowed(*c)));
    }
    Cow::Owned(out.into_bytes())
}

/// Strict check for structured content: every string in the value must
/// already be valid text. Structured content is never rewritten in place.
pub fn ensure_valid_value(value: &Value) -> Result<()> {
    check_value(value, &mut String::from("$"))
}

fn check_value(value: &Value, path: &mut String) -> Result<()> {
    match value {
        Value::String(s) if !is_valid_text(s) => Err(BridgeError::encoding(format!(
            "invalid characters in structured content at {path}"
        ))),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                check_value(item, path)?;
                path.truncate(len);
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                if !is_valid_text(key) {
                    return Err(BridgeError::encoding(format!(
                        "invalid characters in structured content key at {path}"
                    )));
                }
                let len = path.len();
                path.push('.');
                path.push_str(key);
                check_value(item, path)?;
                path.truncate(len);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
