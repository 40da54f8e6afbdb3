//! JSON value boundary scanning.
//!
//! The scanner only finds where the first top-level value ends; it does not
//! build anything. Input that can still grow into valid JSON is reported as
//! incomplete, input that never will is forwarded unchanged as binary so
//! non-JSON peers keep working.

use super::passthrough::looks_like_utf8;
use super::{FrameType, FramingError, FramingState};

/// Nesting limit for objects and arrays.
const MAX_DEPTH: usize = 128;

/// Result of scanning one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// The value ends before this offset.
    Complete(usize),
    /// The buffer ends inside a value that may still turn out valid.
    Incomplete,
    /// Not JSON.
    Invalid,
}

/// Shorthand for continuing with the end offset of a complete sub-scan.
macro_rules! complete {
    ($scan:expr) => {
        match $scan {
            Scan::Complete(end) => end,
            other => return other,
        }
    };
}

#[inline]
fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos).is_some_and(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
        pos += 1;
    }
    pos
}

fn value(data: &[u8], pos: usize, depth: usize) -> Scan {
    let pos = skip_whitespace(data, pos);
    match data.get(pos) {
        None => Scan::Incomplete,
        Some(b'{') => container(data, pos, depth, b'}', true),
        Some(b'[') => container(data, pos, depth, b']', false),
        Some(b'"') => string(data, pos),
        Some(b'-' | b'0'..=b'9') => number(data, pos),
        Some(b't') => literal(data, pos, b"true"),
        Some(b'f') => literal(data, pos, b"false"),
        Some(b'n') => literal(data, pos, b"null"),
        Some(_) => Scan::Invalid,
    }
}

/// Scans an object (`keyed`) or array starting at the opening bracket.
fn container(data: &[u8], open: usize, depth: usize, close: u8, keyed: bool) -> Scan {
    if depth >= MAX_DEPTH {
        return Scan::Invalid;
    }

    let mut pos = skip_whitespace(data, open + 1);
    match data.get(pos) {
        None => return Scan::Incomplete,
        Some(&b) if b == close => return Scan::Complete(pos + 1),
        Some(_) => {}
    }

    loop {
        if keyed {
            pos = complete!(string(data, pos));
            pos = skip_whitespace(data, pos);
            match data.get(pos) {
                None => return Scan::Incomplete,
                Some(b':') => pos += 1,
                Some(_) => return Scan::Invalid,
            }
        }

        pos = complete!(value(data, pos, depth + 1));
        pos = skip_whitespace(data, pos);
        match data.get(pos) {
            None => return Scan::Incomplete,
            Some(&b) if b == close => return Scan::Complete(pos + 1),
            Some(b',') => pos = skip_whitespace(data, pos + 1),
            Some(_) => return Scan::Invalid,
        }
    }
}

fn string(data: &[u8], open: usize) -> Scan {
    match data.get(open) {
        None => return Scan::Incomplete,
        Some(b'"') => {}
        Some(_) => return Scan::Invalid,
    }

    let mut pos = open + 1;
    loop {
        match data.get(pos) {
            None => return Scan::Incomplete,
            Some(b'"') => return Scan::Complete(pos + 1),
            Some(b'\\') => match data.get(pos + 1) {
                None => return Scan::Incomplete,
                Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't') => pos += 2,
                Some(b'u') => {
                    for digit in pos + 2..pos + 6 {
                        match data.get(digit) {
                            None => return Scan::Incomplete,
                            Some(b) if b.is_ascii_hexdigit() => {}
                            Some(_) => return Scan::Invalid,
                        }
                    }
                    pos += 6;
                }
                Some(_) => return Scan::Invalid,
            },
            Some(&b) if b < 0x20 => return Scan::Invalid,
            Some(_) => pos += 1,
        }
    }
}

/// Checks `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`.
fn is_number(token: &[u8]) -> bool {
    fn digits(token: &[u8], pos: &mut usize) -> usize {
        let start = *pos;
        while token.get(*pos).is_some_and(u8::is_ascii_digit) {
            *pos += 1;
        }
        *pos - start
    }

    let mut pos = usize::from(token.first() == Some(&b'-'));
    match token.get(pos) {
        Some(b'0') => pos += 1,
        Some(b'1'..=b'9') => {
            digits(token, &mut pos);
        }
        _ => return false,
    }
    if token.get(pos) == Some(&b'.') {
        pos += 1;
        if digits(token, &mut pos) == 0 {
            return false;
        }
    }
    if matches!(token.get(pos), Some(b'e' | b'E')) {
        pos += 1;
        if matches!(token.get(pos), Some(b'+' | b'-')) {
            pos += 1;
        }
        if digits(token, &mut pos) == 0 {
            return false;
        }
    }
    pos == token.len()
}

/// Numbers have no closing delimiter; one running into the end of the buffer
/// is taken as complete unless it ends in a character that needs a follow-up.
fn number(data: &[u8], start: usize) -> Scan {
    let end = data[start..]
        .iter()
        .position(|b| !matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E'))
        .map_or(data.len(), |len| start + len);
    let token = &data[start..end];

    match data.get(end) {
        None if matches!(token.last(), Some(b'.' | b'e' | b'E' | b'+' | b'-')) => {
            Scan::Incomplete
        }
        None | Some(b' ' | b'\t' | b'\n' | b'\r' | b',' | b']' | b'}') if is_number(token) => {
            Scan::Complete(end)
        }
        _ => Scan::Invalid,
    }
}

fn literal(data: &[u8], start: usize, word: &[u8]) -> Scan {
    let available = &data[start..];
    if available.len() >= word.len() {
        if available.starts_with(word) {
            Scan::Complete(start + word.len())
        } else {
            Scan::Invalid
        }
    } else if word.starts_with(available) {
        Scan::Incomplete
    } else {
        Scan::Invalid
    }
}

/// `json`: one complete top-level JSON value as a text frame.
///
/// Leading whitespace belongs to the value. An incomplete value waits for
/// more data; anything that is not JSON is forwarded whole as binary. A
/// value whose strings are not UTF-8 is still cut at its end but sent as
/// binary, since a text frame must carry UTF-8.
pub fn json(
    data: &[u8],
    _last_read: usize,
    frame_type: &mut FrameType,
    _state: &mut FramingState,
    _config: &str,
) -> Result<usize, FramingError> {
    Ok(match value(data, 0, 0) {
        Scan::Complete(end) => {
            *frame_type = if looks_like_utf8(&data[..end]) {
                FrameType::Text
            } else {
                FrameType::Binary
            };
            end
        }
        Scan::Incomplete => 0,
        Scan::Invalid => {
            *frame_type = FrameType::Binary;
            data.len()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(data: &[u8]) -> (usize, FrameType) {
        let mut frame_type = FrameType::default();
        let n = json(data, data.len(), &mut frame_type, &mut FramingState::Empty, "").unwrap();
        (n, frame_type)
    }

    #[test]
    fn test_object_followed_by_garbage() {
        let data = br#"{"a":1,"b":[1,2]} extra"#;
        assert_eq!(run(data), (17, FrameType::Text));
    }

    #[test]
    fn test_truncated_object() {
        assert_eq!(run(br#"{"a":1"#).0, 0);
        assert_eq!(run(br#"{"a":"#).0, 0);
        assert_eq!(run(br#"{"a"#).0, 0);
        assert_eq!(run(b"[1, 2,").0, 0);
        assert_eq!(run(b"   ").0, 0);
    }

    #[test]
    fn test_not_json_is_forwarded_whole() {
        assert_eq!(run(b"not json"), (8, FrameType::Binary));
        assert_eq!(run(b"[1,]"), (4, FrameType::Binary));
        assert_eq!(run(b"{1:2}"), (5, FrameType::Binary));
        assert_eq!(run(b"\"tab\tinside\""), (12, FrameType::Binary));
    }

    #[test]
    fn test_literals() {
        assert_eq!(run(b"true").0, 4);
        assert_eq!(run(b"nul").0, 0);
        assert_eq!(run(b"nope").1, FrameType::Binary);
        assert_eq!(run(b"[false,null]").0, 12);
    }

    #[test]
    fn test_strings_with_escapes() {
        let data = br#""say \"hi\" \\" next"#;
        assert_eq!(run(data).0, 15);
        assert_eq!(run("\"é\"".as_bytes()).0, 4);
        assert_eq!(run(br#""\u00"#).0, 0);
        assert_eq!(run(br#""ends with \"#).0, 0);
    }

    #[test]
    fn test_non_utf8_string_sent_as_binary() {
        assert_eq!(run(b"\"\xFF\xFE\""), (4, FrameType::Binary));
        assert_eq!(run(b"{\"k\":\"\xC3\"} next"), (9, FrameType::Binary));
        assert_eq!(run("{\"k\":\"\u{e9}\"} next".as_bytes()), (10, FrameType::Text));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(run(b"42").0, 2);
        assert_eq!(run(b"-1.5e+3 ").0, 7);
        assert_eq!(run(b"[1.").0, 0);
        assert_eq!(run(b"1e").0, 0);
        assert_eq!(run(b"-").0, 0);
        assert_eq!(run(b"01 ").1, FrameType::Binary);
        assert_eq!(run(b"1x").1, FrameType::Binary);
    }

    #[test]
    fn test_pipelined_values() {
        let data = b"{\"id\":1}\n{\"id\":2}\n";
        let (first, _) = run(data);
        assert_eq!(first, 8);
        let (second, _) = run(&data[first..]);
        assert_eq!(&data[first..first + second], b"\n{\"id\":2}");
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 1) + &"]".repeat(MAX_DEPTH + 1);
        assert_eq!(run(deep.as_bytes()).1, FrameType::Binary);

        let shallow = "[".repeat(MAX_DEPTH) + &"]".repeat(MAX_DEPTH);
        assert_eq!(run(shallow.as_bytes()), (shallow.len(), FrameType::Text));
    }

    #[test]
    fn test_agrees_with_serde_json() {
        let documents = [
            r#"{"jsonrpc":"2.0","method":"sum","params":[1,2,4],"id":"1"}"#,
            r#"[{"nested":{"deep":[true,false,null]}},"☺",-0.5E-2]"#,
            r#"  {"unicode":"日本語","empty":{},"list":[]}"#,
            r#""just a string""#,
            "123456",
        ];

        for document in documents {
            let data = format!("{document} trailing");
            let (n, frame_type) = run(data.as_bytes());
            assert_eq!(frame_type, FrameType::Text, "{document}");
            assert_eq!(n, document.len(), "{document}");
            assert!(serde_json::from_slice::<serde_json::Value>(&data.as_bytes()[..n]).is_ok());
        }
    }
}
