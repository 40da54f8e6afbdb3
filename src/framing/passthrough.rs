//! Framings that forward everything that arrived.

use super::{FrameType, FramingError, FramingState};

/// Returns `true` if `byte` is a UTF-8 continuation byte (`10xxxxxx`).
#[inline]
const fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Checks that `data` is made of well-formed 1/2/3/4-byte UTF-8 sequences.
///
/// Only lead and continuation byte patterns are checked; overlong encodings
/// and surrogates are not rejected. A sequence cut off by the end of the
/// buffer makes the whole buffer binary.
#[must_use]
pub fn looks_like_utf8(data: &[u8]) -> bool {
    let mut pos = 0;
    while let Some(&lead) = data.get(pos) {
        let width = match lead {
            _ if lead & 0x80 == 0 => 1,
            _ if lead & 0xE0 == 0xC0 => 2,
            _ if lead & 0xF0 == 0xE0 => 3,
            _ if lead & 0xF8 == 0xF0 => 4,
            _ => return false,
        };

        match data.get(pos + 1..pos + width) {
            Some(tail) if tail.iter().copied().all(is_continuation) => pos += width,
            _ => return false,
        }
    }
    true
}

/// `binary`: the whole buffer as one binary frame.
pub fn binary(
    data: &[u8],
    _last_read: usize,
    _frame_type: &mut FrameType,
    _state: &mut FramingState,
    _config: &str,
) -> Result<usize, FramingError> {
    Ok(data.len())
}

/// `auto`: the whole buffer, as text if it looks like UTF-8.
pub fn auto(
    data: &[u8],
    _last_read: usize,
    frame_type: &mut FrameType,
    _state: &mut FramingState,
    _config: &str,
) -> Result<usize, FramingError> {
    *frame_type = if looks_like_utf8(data) {
        FrameType::Text
    } else {
        FrameType::Binary
    };
    Ok(data.len())
}
