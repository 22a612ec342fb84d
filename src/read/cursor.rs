//! List cursors
//!
//! A cursor is the last yielded key with the selector's common prefix
//! stripped, base64url-encoded without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::{KvError, Result};

use super::SelectorBounds;

pub(crate) fn encode_cursor(bounds: &SelectorBounds, last_key: &[u8]) -> Result<String> {
    let suffix = last_key
        .strip_prefix(bounds.common_prefix.as_slice())
        .ok_or_else(|| KvError::IllegalState("last key lies outside the selector".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(suffix))
}

/// Narrow `bounds` so scanning resumes just past the cursor's key
pub(crate) fn apply_cursor(bounds: &mut SelectorBounds, cursor: &str, reverse: bool) -> Result<()> {
    let suffix = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| KvError::validation(format!("invalid cursor: {}", e)))?;

    let mut boundary = bounds.common_prefix.clone();
    boundary.extend_from_slice(&suffix);

    if boundary < bounds.start || boundary >= bounds.end {
        return Err(KvError::validation("cursor is out of bounds for this selector"));
    }

    if reverse {
        bounds.end = boundary;
    } else {
        boundary.push(0x00);
        bounds.start = boundary;
    }
    Ok(())
}
