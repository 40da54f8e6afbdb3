//! Delimiter-based framings.
//!
//! The delimiter stays part of the forwarded chunk, so `"ok\n"` under
//! `newline` reaches the client as `"ok\n"`.

use super::passthrough::looks_like_utf8;
use super::{FrameType, FramingError, FramingState};

/// Parses a separator specification into its byte sequence.
///
/// Supported escapes: `\0`, `\t`, `\n`, `\f`, `\r`, `\\` and `\xHH`.
///
/// # Errors
///
/// Returns [`FramingError`] for an unknown or truncated escape and for a
/// config that yields no bytes.
pub fn parse_escapes(config: &str) -> Result<Vec<u8>, FramingError> {
    let mut needle = Vec::with_capacity(config.len());
    let mut bytes = config.bytes();

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            needle.push(byte);
            continue;
        }

        let escaped = match bytes.next() {
            Some(b'0') => 0x00,
            Some(b't') => b'\t',
            Some(b'n') => b'\n',
            Some(b'f') => 0x0C,
            Some(b'r') => b'\r',
            Some(b'\\') => b'\\',
            Some(b'x') => {
                let hi = bytes.next().and_then(hex_value);
                let lo = bytes.next().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => (hi << 4) | lo,
                    _ => return Err(FramingError::new("Invalid hex escape in separator")),
                }
            }
            Some(other) => {
                return Err(FramingError::new(format!(
                    "Unknown escape sequence \\{} in separator",
                    char::from(other)
                )));
            }
            None => return Err(FramingError::new("Trailing backslash in separator")),
        };
        needle.push(escaped);
    }

    if needle.is_empty() {
        return Err(FramingError::new("Empty separator"));
    }
    Ok(needle)
}

#[inline]
fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|value| value as u8)
}

/// Parses the needle once and keeps it in `state`.
fn cached_needle(
    state: &mut FramingState,
    build: impl FnOnce() -> Result<Vec<u8>, FramingError>,
) -> Result<&[u8], FramingError> {
    if !matches!(state, FramingState::Needle(_)) {
        *state = FramingState::Needle(build()?);
    }
    match state {
        FramingState::Needle(needle) => Ok(needle.as_slice()),
        _ => Err(FramingError::new("Separator state unavailable")),
    }
}

/// Finds the end of the first needle occurrence touching the new bytes.
///
/// Earlier bytes were already searched, except for the last `needle.len() - 1`
/// of them which may hold the start of a needle split across reads.
fn boundary(data: &[u8], last_read: usize, needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let start = data
        .len()
        .saturating_sub(last_read)
        .saturating_sub(needle.len() - 1);

    data[start..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map_or(0, |pos| start + pos + needle.len())
}

/// `separator`: everything up to and including the configured byte sequence.
pub fn separator(
    data: &[u8],
    last_read: usize,
    _frame_type: &mut FrameType,
    state: &mut FramingState,
    config: &str,
) -> Result<usize, FramingError> {
    let needle = cached_needle(state, || parse_escapes(config))?;
    Ok(boundary(data, last_read, needle))
}

/// Maps a `newline` configuration to its line terminator.
fn line_terminator(config: &str) -> &'static [u8] {
    match config.trim() {
        "lf" => b"\n",
        "cr" => b"\r",
        "lfcr" => b"\n\r",
        _ => b"\r\n",
    }
}

/// `newline`: one line including its terminator, text if it looks like UTF-8.
///
/// Config selects the terminator: `crlf` (default), `lfcr`, `lf` or `cr`.
pub fn newline(
    data: &[u8],
    last_read: usize,
    frame_type: &mut FrameType,
    state: &mut FramingState,
    config: &str,
) -> Result<usize, FramingError> {
    let needle = cached_needle(state, || Ok(line_terminator(config).to_vec()))?;
    let end = boundary(data, last_read, needle);

    if end > 0 {
        *frame_type = if looks_like_utf8(&data[..end]) {
            FrameType::Text
        } else {
            FrameType::Binary
        };
    }
    Ok(end)
}
