//! Length-based framings.

use super::{FrameType, FramingError, FramingState};

// ============================================================================
// Integer Parsing
// ============================================================================

/// Parses an unsigned integer the way C's `strtoul(s, NULL, 0)` reads it:
/// `0x`/`0X` prefix for hex, leading `0` for octal, decimal otherwise.
///
/// Unlike `strtoul` the whole (trimmed) input must be consumed.
#[must_use]
pub fn parse_c_integer(input: &str) -> Option<u64> {
    let input = input.trim();
    let (digits, radix) = if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        (hex, 16)
    } else if input.len() > 1 && input.starts_with('0') {
        (&input[1..], 8)
    } else {
        (input, 10)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

/// Signed variant of [`parse_c_integer`], accepting a leading `-` or `+`.
fn parse_c_signed(input: &str) -> Option<i64> {
    let input = input.trim();
    if let Some(magnitude) = input.strip_prefix('-') {
        parse_c_integer(magnitude).and_then(|value| i64::try_from(value).ok().map(|v| -v))
    } else {
        let magnitude = input.strip_prefix('+').unwrap_or(input);
        parse_c_integer(magnitude).and_then(|value| i64::try_from(value).ok())
    }
}

// ============================================================================
// fixedlength
// ============================================================================

/// `fixedlength`: records of a configured byte count.
///
/// A count of 0 forwards the whole buffer.
pub fn fixedlength(
    data: &[u8],
    _last_read: usize,
    _frame_type: &mut FrameType,
    state: &mut FramingState,
    config: &str,
) -> Result<usize, FramingError> {
    let record = match *state {
        FramingState::FixedLength(record) => record,
        _ => {
            let record = parse_c_integer(config)
                .and_then(|value| usize::try_from(value).ok())
                .ok_or_else(|| FramingError::new(format!("Invalid record length '{config}'")))?;
            *state = FramingState::FixedLength(record);
            record
        }
    };

    Ok(match record {
        0 => data.len(),
        record if data.len() >= record => record,
        _ => 0,
    })
}

// ============================================================================
// dynamic32
// ============================================================================

/// Layout of a 32-bit length-prefixed record.
///
/// ```text
/// |<- offset ->|<- 4 ->|<- static ->|<- length field value ->|
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dynamic32Config {
    /// Position of the length field.
    pub offset: usize,
    /// Bytes added to the length field value (may be negative).
    pub fixed: i64,
    /// Length field byte order.
    pub big_endian: bool,
}

impl Dynamic32Config {
    /// Parses `offset=N,static=M,endian=big|little`.
    ///
    /// All keys are optional; the default is offset 0, static 0, little endian.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] for unknown keys or unparsable values.
    pub fn parse(config: &str) -> Result<Self, FramingError> {
        let mut parsed = Self::default();

        for item in config.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| FramingError::new(format!("Malformed option '{item}'")))?;
            let value = value.trim();

            match key.trim() {
                "offset" => {
                    parsed.offset = parse_c_integer(value)
                        .and_then(|offset| usize::try_from(offset).ok())
                        .ok_or_else(|| FramingError::new(format!("Invalid offset '{value}'")))?;
                }
                "static" => {
                    parsed.fixed = parse_c_signed(value)
                        .ok_or_else(|| FramingError::new(format!("Invalid static '{value}'")))?;
                }
                "endian" => {
                    parsed.big_endian = match value {
                        "big" => true,
                        "little" => false,
                        _ => {
                            return Err(FramingError::new(format!("Invalid endian '{value}'")));
                        }
                    };
                }
                other => return Err(FramingError::new(format!("Unknown option '{other}'"))),
            }
        }

        Ok(parsed)
    }

    /// Total record length once the length field is readable.
    fn record_len(&self, data: &[u8]) -> Option<Result<usize, FramingError>> {
        let field: [u8; 4] = data
            .get(self.offset..self.offset.checked_add(4)?)?
            .try_into()
            .ok()?;
        let field = if self.big_endian {
            u32::from_be_bytes(field)
        } else {
            u32::from_le_bytes(field)
        };

        let total = i64::try_from(self.offset)
            .unwrap_or(i64::MAX)
            .saturating_add(4)
            .saturating_add(self.fixed)
            .saturating_add(i64::from(field));

        Some(match usize::try_from(total) {
            Ok(total) if total > 0 => Ok(total),
            _ => Err(FramingError::new(format!("Invalid record length {total}"))),
        })
    }
}

/// `dynamic32`: records carrying a 4-byte length field.
///
/// Record length = offset + 4 + static + field value.
pub fn dynamic32(
    data: &[u8],
    _last_read: usize,
    _frame_type: &mut FrameType,
    state: &mut FramingState,
    config: &str,
) -> Result<usize, FramingError> {
    let layout = match *state {
        FramingState::Dynamic32(layout) => layout,
        _ => {
            let layout = Dynamic32Config::parse(config)?;
            *state = FramingState::Dynamic32(layout);
            layout
        }
    };

    match layout.record_len(data) {
        Some(Ok(total)) if data.len() >= total => Ok(total),
        Some(Err(e)) => Err(e),
        _ => Ok(0),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        func: super::super::FramingFn,
        data: &[u8],
        state: &mut FramingState,
        config: &str,
    ) -> Result<usize, FramingError> {
        func(data, data.len(), &mut FrameType::default(), state, config)
    }

    #[test]
    fn test_parse_c_integer() {
        assert_eq!(parse_c_integer("16"), Some(16));
        assert_eq!(parse_c_integer("0x10"), Some(16));
        assert_eq!(parse_c_integer("0X1f"), Some(31));
        assert_eq!(parse_c_integer("020"), Some(16));
        assert_eq!(parse_c_integer("0"), Some(0));
        assert_eq!(parse_c_integer(" 8 "), Some(8));
        assert_eq!(parse_c_integer(""), None);
        assert_eq!(parse_c_integer("0x"), None);
        assert_eq!(parse_c_integer("09"), None);
        assert_eq!(parse_c_integer("-1"), None);
        assert_eq!(parse_c_integer("12abc"), None);
    }

    #[test]
    fn test_fixedlength_records() {
        let mut state = FramingState::Empty;
        assert_eq!(run(fixedlength, b"abc", &mut state, "4").unwrap(), 0);
        assert_eq!(run(fixedlength, b"abcdefg", &mut state, "4").unwrap(), 4);
        assert!(matches!(state, FramingState::FixedLength(4)));
    }

    #[test]
    fn test_fixedlength_zero_is_whole_buffer() {
        let mut state = FramingState::Empty;
        assert_eq!(run(fixedlength, b"abcdefg", &mut state, "0").unwrap(), 7);
    }

    #[test]
    fn test_fixedlength_hex_config() {
        let mut state = FramingState::Empty;
        let data = [0u8; 20];
        assert_eq!(run(fixedlength, &data, &mut state, "0x10").unwrap(), 16);
    }

    #[test]
    fn test_fixedlength_invalid_config() {
        let mut state = FramingState::Empty;
        assert!(run(fixedlength, b"abc", &mut state, "four").is_err());
        assert!(state.is_empty());
    }

    #[test]
    fn test_dynamic32_config() {
        assert_eq!(
            Dynamic32Config::parse("offset=2,static=-1,endian=big").unwrap(),
            Dynamic32Config {
                offset: 2,
                fixed: -1,
                big_endian: true
            }
        );
        assert_eq!(Dynamic32Config::parse("").unwrap(), Dynamic32Config::default());
        assert!(Dynamic32Config::parse("offset=x").is_err());
        assert!(Dynamic32Config::parse("width=4").is_err());
        assert!(Dynamic32Config::parse("endian=middle").is_err());
    }

    #[test]
    fn test_dynamic32_little_endian() {
        let mut state = FramingState::Empty;
        let mut data = vec![3, 0, 0, 0, b'a', b'b'];
        assert_eq!(run(dynamic32, &data, &mut state, "").unwrap(), 0);

        data.extend_from_slice(b"cXYZ");
        assert_eq!(run(dynamic32, &data, &mut state, "").unwrap(), 7);
    }

    #[test]
    fn test_dynamic32_offset_static_big_endian() {
        let mut state = FramingState::Empty;
        // 1-byte type tag, big endian length 2, 1-byte checksum trailer
        let data = [0x7E, 0, 0, 0, 2, b'h', b'i', 0xAA, 0xFF];
        let n = run(dynamic32, &data, &mut state, "offset=1,static=1,endian=big").unwrap();
        assert_eq!(n, 8);
    }

    #[test]
    fn test_dynamic32_header_incomplete() {
        let mut state = FramingState::Empty;
        assert_eq!(run(dynamic32, &[0x7E, 0, 0], &mut state, "offset=1").unwrap(), 0);
    }

    #[test]
    fn test_dynamic32_non_positive_total() {
        let mut state = FramingState::Empty;
        let data = [0u8; 8];
        assert!(run(dynamic32, &data, &mut state, "static=-4").is_err());
    }
}
