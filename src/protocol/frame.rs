//! WebSocket frame codec (RFC 6455 Section 5.2-5.3).
//!
//! Frames are decoded in place from the connection's growing read buffer.
//! A partially received frame yields `None` and is retried after the next
//! read; a complete one reports how many bytes it occupied so the caller can
//! compact the buffer and decode pipelined frames.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |     Masking-key (0 or 4 bytes, present if MASK set)           |
//! +---------------------------------------------------------------+
//! |                         Payload Data                          |
//! +---------------------------------------------------------------+
//! ```
//!
//! Reserved bits are parsed but not enforced.

// ============================================================================
// Imports
// ============================================================================

use std::ops::Range;

// ============================================================================
// Constants
// ============================================================================

/// FIN flag in the first header byte.
const FLAG_FIN: u8 = 0x80;

/// MASK flag in the second header byte.
const FLAG_MASK: u8 = 0x80;

/// Largest possible frame header (2 + 8 length bytes + 4 mask bytes).
pub const MAX_HEADER_LEN: usize = 14;

// ============================================================================
// Opcode
// ============================================================================

/// WebSocket frame opcodes (RFC 6455 Section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text payload.
    Text = 0x1,
    /// Binary payload.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Parses a 4-bit opcode, returning `None` for reserved values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

// ============================================================================
// FrameHeader
// ============================================================================

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// The three reserved bits (RSV1-3), not enforced.
    pub reserved: u8,
    /// Raw 4-bit opcode, see [`Opcode::from_u8`].
    pub opcode: u8,
    /// Masking key, present on client frames.
    pub mask: Option<[u8; 4]>,
    /// Header length including extended length and masking key.
    pub header_len: usize,
    /// Declared payload length.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Parses a frame header from the front of `buf`.
    ///
    /// Returns `None` until all header bytes have arrived.
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let (&first, rest) = buf.split_first()?;
        let &second = rest.first()?;

        let (payload_len, mut offset) = match second & 0x7F {
            126 => {
                let bytes: [u8; 2] = buf.get(2..4)?.try_into().ok()?;
                (u64::from(u16::from_be_bytes(bytes)), 4)
            }
            127 => {
                let bytes: [u8; 8] = buf.get(2..10)?.try_into().ok()?;
                (u64::from_be_bytes(bytes), 10)
            }
            len => (u64::from(len), 2),
        };

        let mask = if second & FLAG_MASK != 0 {
            let key: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
            offset += 4;
            Some(key)
        } else {
            None
        };

        Some(Self {
            fin: first & FLAG_FIN != 0,
            reserved: (first >> 4) & 0x07,
            opcode: first & 0x0F,
            mask,
            header_len: offset,
            payload_len,
        })
    }

    /// Total frame length (header plus payload).
    #[inline]
    #[must_use]
    pub fn frame_len(&self) -> u64 {
        (self.header_len as u64).saturating_add(self.payload_len)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// A complete frame found at the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// The frame header.
    pub header: FrameHeader,
    /// Location of the (already unmasked) payload within the buffer.
    pub payload: Range<usize>,
    /// Bytes occupied by the whole frame.
    pub consumed: usize,
}

/// Decodes one frame from the front of `buf`, unmasking its payload in place.
///
/// Returns `None` while the frame is incomplete. Masking policy (clients must
/// mask) is left to the caller, which sees the key in [`FrameHeader::mask`].
pub fn decode_frame(buf: &mut [u8]) -> Option<DecodedFrame> {
    let header = FrameHeader::parse(buf)?;
    let total = usize::try_from(header.frame_len()).ok()?;
    if buf.len() < total {
        return None;
    }

    let payload = header.header_len..total;
    if let Some(key) = header.mask {
        apply_mask(&mut buf[payload.clone()], key);
    }

    Some(DecodedFrame {
        header,
        payload,
        consumed: total,
    })
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a single unmasked, final frame.
///
/// Server frames are never masked (RFC 6455 Section 5.1). The shortest
/// length encoding is chosen.
#[must_use]
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(MAX_HEADER_LEN + len);
    frame.push(FLAG_FIN | opcode as u8);

    if len <= 125 {
        frame.push(len as u8);
    } else if let Ok(len) = u16::try_from(len) {
        frame.push(126);
        frame.extend_from_slice(&len.to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

// ============================================================================
// Masking
// ============================================================================

/// Applies (or removes) the 4-byte XOR mask (RFC 6455 Section 5.3).
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    /// Builds a masked client frame the way a browser would.
    fn client_frame(opcode: Opcode, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut frame = encode_frame(opcode, payload);
        let header_len = frame.len() - payload.len();
        frame[1] |= FLAG_MASK;
        let mut masked = frame.split_off(header_len);
        apply_mask(&mut masked, key);
        frame.extend_from_slice(&key);
        frame.extend_from_slice(&masked);
        frame
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x1), Some(Opcode::Text));
        assert_eq!(Opcode::from_u8(0xA), Some(Opcode::Pong));
        assert_eq!(Opcode::from_u8(0x3), None);
        assert_eq!(Opcode::from_u8(0xF), None);
    }

    #[test]
    fn test_length_encodings_round_trip() {
        for len in [0usize, 1, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut frame = encode_frame(Opcode::Binary, &payload);

            let expected_header = match len {
                0..=125 => 2,
                126..=65535 => 4,
                _ => 10,
            };
            assert_eq!(frame.len(), expected_header + len, "length {len}");

            let decoded = decode_frame(&mut frame).expect("complete frame");
            assert_eq!(Opcode::from_u8(decoded.header.opcode), Some(Opcode::Binary));
            assert!(decoded.header.fin);
            assert_eq!(decoded.consumed, frame.len());
            assert_eq!(&frame[decoded.payload], payload.as_slice());
        }
    }

    #[test]
    fn test_decode_masked_client_frame() {
        let mut frame = client_frame(Opcode::Text, b"hi", [0x37, 0xfa, 0x21, 0x3d]);
        let decoded = decode_frame(&mut frame).expect("complete frame");

        assert_eq!(decoded.header.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(decoded.header.header_len, 6);
        assert_eq!(&frame[decoded.payload], b"hi");
    }

    #[test]
    fn test_rfc_masked_hello_sample() {
        // RFC 6455 Section 5.7: single-frame masked text message "Hello"
        let mut frame = vec![
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let decoded = decode_frame(&mut frame).expect("complete frame");
        assert_eq!(&frame[decoded.payload], b"Hello");
    }

    #[test]
    fn test_decode_incomplete() {
        let frame = client_frame(Opcode::Binary, &[7u8; 300], [1, 2, 3, 4]);

        for cut in [0, 1, 3, 7, frame.len() - 1] {
            let mut partial = frame[..cut].to_vec();
            assert!(decode_frame(&mut partial).is_none(), "cut at {cut}");
        }
    }

    #[test]
    fn test_decode_pipelined_frames() {
        let mut buf = client_frame(Opcode::Text, b"one", [9, 9, 9, 9]);
        let first_len = buf.len();
        buf.extend(client_frame(Opcode::Text, b"two", [5, 6, 7, 8]));

        let first = decode_frame(&mut buf).expect("first frame");
        assert_eq!(first.consumed, first_len);
        assert_eq!(&buf[first.payload], b"one");

        let rest = &mut buf[first_len..];
        let second = decode_frame(rest).expect("second frame");
        assert_eq!(&rest[second.payload], b"two");
    }

    #[test]
    fn test_header_reports_reserved_and_fin() {
        let header = FrameHeader::parse(&[0x71, 0x00]).expect("header");
        assert!(!header.fin);
        assert_eq!(header.reserved, 0x07);
        assert_eq!(header.opcode, 0x1);
        assert_eq!(header.mask, None);
    }

    #[test]
    fn test_header_huge_declared_length() {
        let mut buf = vec![0x82, 0xFF];
        buf.extend_from_slice(&u64::MAX.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);

        let header = FrameHeader::parse(&buf).expect("header");
        assert_eq!(header.payload_len, u64::MAX);
        assert_eq!(header.frame_len(), u64::MAX);
        assert!(decode_frame(&mut buf).is_none());
    }

    #[test]
    fn test_encode_is_never_masked() {
        let frame = encode_frame(Opcode::Pong, b"ping-data");
        assert_eq!(frame[0], 0x8A);
        assert_eq!(frame[1] & FLAG_MASK, 0);
        assert_eq!(&frame[2..], b"ping-data");
    }

    proptest! {
        #[test]
        fn test_masking_is_an_involution(
            key in any::<[u8; 4]>(),
            payload in proptest::collection::vec(any::<u8>(), 0..257),
        ) {
            let mut data = payload.clone();
            apply_mask(&mut data, key);
            apply_mask(&mut data, key);
            prop_assert_eq!(data, payload);
        }
    }
}
