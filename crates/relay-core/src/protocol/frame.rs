//! Binary codec for WebSocket frames (RFC 6455 §5.2).
//!
//! Wire format:
//! ```text
//! byte 0:        FIN(1) RSV(3) OPCODE(4)
//! byte 1:        MASK(1) LEN7(7)
//! [LEN7 == 126]  2 bytes: LEN16
//! [LEN7 == 127]  8 bytes: LEN64
//! [MASK == 1]    4 bytes: mask key
//! payload:       LEN bytes, XOR-masked with the mask key if MASK == 1
//! ```
//! All multi-byte lengths are big-endian.
//!
//! Both directions are pure: nothing here touches a socket.  Fragmented
//! messages are decoded one frame at a time; the caller joins them with a
//! [`crate::protocol::fragment::MessageAssembler`].

use thiserror::Error;

/// Largest payload that fits in the 7-bit length field.
pub const MAX_SHORT_PAYLOAD: usize = 125;

/// Largest payload that fits in the 16-bit extended length field.
pub const MAX_MEDIUM_PAYLOAD: usize = 65_535;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN7_MASK: u8 = 0x7F;
const LEN16_MARKER: u8 = 126;
const LEN64_MARKER: u8 = 127;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ends before the frame header (length field and mask key) does.
    #[error("insufficient data: need at least {needed} header bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The header declares more payload bytes than the buffer holds.
    #[error("truncated frame: header declares {declared} payload bytes, {available} available")]
    Truncated { declared: u64, available: usize },

    /// The 64-bit length has its most significant bit set, or does not fit in memory.
    #[error("invalid 64-bit payload length: {0}")]
    LengthOverflow(u64),

    /// The header declares a payload larger than the receiver accepts.
    #[error("frame payload of {declared} bytes exceeds the {max} byte limit")]
    TooLarge { declared: u64, max: usize },
}

/// The 4-bit frame opcode.
///
/// Reserved values are carried through unchanged in [`Opcode::Reserved`] so
/// the caller decides what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any of 0x3-0x7 or 0xB-0xF.
    Reserved(u8),
}

impl Opcode {
    /// Interprets the low four bits of `byte` as an opcode.
    pub fn from_nibble(byte: u8) -> Self {
        match byte & OPCODE_MASK {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }

    /// Returns the 4-bit wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(v) => v & OPCODE_MASK,
        }
    }

    /// Close, ping and pong are control frames (opcode high bit set).
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x08 != 0
    }
}

/// One decoded frame.  The payload is already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN bit: `true` on the last (or only) fragment of a message.
    pub fin: bool,
    pub opcode: Opcode,
    /// Whether the sender set the MASK bit.
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Returns the payload as text, replacing invalid UTF-8 sequences.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A parsed frame header; the payload may not have arrived yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask_key: Option<[u8; 4]>,
    /// Bytes occupied by the header, mask key included.
    pub header_len: usize,
    /// Payload length as declared by the length field.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Header plus declared payload.
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// XORs `payload` in place with `mask_key`.  Applying it twice restores the input.
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the frame and the number of bytes it occupied, so a caller holding
/// several frames in one buffer can advance past it.
///
/// # Errors
///
/// Returns [`FrameError`] when the buffer is shorter than the header, mask key
/// and payload implied by its own length field.  Nothing past the end of
/// `bytes` is ever read.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::frame::{decode_frame, encode_frame_with_mask, Opcode};
///
/// let bytes = encode_frame_with_mask(b"hi", Opcode::Text, Some([1, 2, 3, 4]));
/// let (frame, used) = decode_frame(&bytes).unwrap();
/// assert_eq!(frame.payload, b"hi");
/// assert_eq!(used, bytes.len());
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameError> {
    let header = decode_header(bytes)?;
    let offset = header.header_len;

    let available = bytes.len() - offset;
    let payload_len = usize::try_from(header.payload_len)
        .map_err(|_| FrameError::LengthOverflow(header.payload_len))?;
    if payload_len > available {
        return Err(FrameError::Truncated {
            declared: header.payload_len,
            available,
        });
    }

    let mut payload = bytes[offset..offset + payload_len].to_vec();
    if let Some(key) = header.mask_key {
        apply_mask(&mut payload, key);
    }

    Ok((
        Frame {
            fin: header.fin,
            opcode: header.opcode,
            masked: header.mask_key.is_some(),
            payload,
        },
        offset + payload_len,
    ))
}

/// Parses only the header: flags, opcode, declared length and mask key.
///
/// Succeeds as soon as the header bytes are present, whether or not the
/// payload has arrived yet.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] while the header is incomplete and
/// [`FrameError::LengthOverflow`] for a 64-bit length with its top bit set.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, FrameError> {
    require_header(bytes, 2)?;

    let fin = bytes[0] & FIN_BIT != 0;
    let opcode = Opcode::from_nibble(bytes[0]);
    let masked = bytes[1] & MASK_BIT != 0;
    let len7 = bytes[1] & LEN7_MASK;

    let (payload_len, mut offset) = match len7 {
        LEN16_MARKER => {
            require_header(bytes, 4)?;
            (u64::from(u16::from_be_bytes([bytes[2], bytes[3]])), 4)
        }
        LEN64_MARKER => {
            require_header(bytes, 10)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[2..10]);
            let len = u64::from_be_bytes(raw);
            if len >> 63 != 0 {
                return Err(FrameError::LengthOverflow(len));
            }
            (len, 10)
        }
        short => (u64::from(short), 2),
    };

    let mask_key = if masked {
        require_header(bytes, offset + 4)?;
        let key = [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ];
        offset += 4;
        Some(key)
    } else {
        None
    };

    Ok(FrameHeader {
        fin,
        opcode,
        mask_key,
        header_len: offset,
        payload_len,
    })
}

/// Encodes a single final (FIN=1) frame.
///
/// Server-to-client frames are sent with `masked = false`.  With
/// `masked = true` a random mask key is generated, written after the length
/// field and applied to the payload.
pub fn encode_frame(payload: &[u8], opcode: Opcode, masked: bool) -> Vec<u8> {
    let mask_key = masked.then(rand::random::<[u8; 4]>);
    encode_frame_with_mask(payload, opcode, mask_key)
}

/// Like [`encode_frame`], with the caller choosing the mask key.
pub fn encode_frame_with_mask(payload: &[u8], opcode: Opcode, mask_key: Option<[u8; 4]>) -> Vec<u8> {
    let len = payload.len();
    let mask_bit = if mask_key.is_some() { MASK_BIT } else { 0 };

    let mut buf = Vec::with_capacity(header_len(len, mask_key.is_some()) + len);
    buf.push(FIN_BIT | opcode.as_u8());

    if len <= MAX_SHORT_PAYLOAD {
        buf.push(mask_bit | len as u8);
    } else if len <= MAX_MEDIUM_PAYLOAD {
        buf.push(mask_bit | LEN16_MARKER);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(mask_bit | LEN64_MARKER);
        buf.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask_key {
        Some(key) => {
            buf.extend_from_slice(&key);
            let start = buf.len();
            buf.extend_from_slice(payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.extend_from_slice(payload),
    }
    buf
}

/// Shorthand for an unmasked text frame.
pub fn encode_text(text: &str) -> Vec<u8> {
    encode_frame(text.as_bytes(), Opcode::Text, false)
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn header_len(payload_len: usize, masked: bool) -> usize {
    let len_field = if payload_len <= MAX_SHORT_PAYLOAD {
        0
    } else if payload_len <= MAX_MEDIUM_PAYLOAD {
        2
    } else {
        8
    };
    2 + len_field + if masked { 4 } else { 0 }
}

fn require_header(bytes: &[u8], needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        Err(FrameError::InsufficientData {
            needed,
            available: bytes.len(),
        })
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

    #[test]
    fn test_decode_rfc_masked_hello() {
        // RFC 6455 §5.7: a single-frame masked text message containing "Hello".
        let bytes = [0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58];

        let (frame, used) = decode_frame(&bytes).unwrap();

        assert!(frame.fin);
        assert!(frame.masked);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"Hello");
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_decode_rfc_unmasked_hello() {
        let bytes = [0x81, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F];
        let (frame, _) = decode_frame(&bytes).unwrap();
        assert!(!frame.masked);
        assert_eq!(frame.payload, b"Hello");
    }

    #[test]
    fn test_encode_text_unmasked_matches_rfc_bytes() {
        assert_eq!(encode_text("Hello"), vec![0x81, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F]);
    }

    #[test]
    fn test_encode_masked_matches_rfc_bytes() {
        let bytes = encode_frame_with_mask(b"Hello", Opcode::Text, Some(KEY));
        assert_eq!(
            bytes,
            vec![0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58]
        );
    }

    #[test]
    fn test_first_byte_per_opcode() {
        assert_eq!(encode_frame(b"", Opcode::Text, false)[0], 0x81);
        assert_eq!(encode_frame(b"", Opcode::Close, false)[0], 0x88);
        assert_eq!(encode_frame(b"", Opcode::Ping, false)[0], 0x89);
        assert_eq!(encode_frame(b"", Opcode::Pong, false)[0], 0x8A);
    }

    #[test]
    fn test_length_tier_boundaries_select_correct_header() {
        // (payload length, expected LEN7 indicator, expected header size unmasked)
        let cases = [
            (0usize, 0u8, 2usize),
            (125, 125, 2),
            (126, 126, 4),
            (65_535, 126, 4),
            (65_536, 127, 10),
        ];
        for (len, indicator, header) in cases {
            let payload = vec![b'x'; len];
            let bytes = encode_frame(&payload, Opcode::Binary, false);
            assert_eq!(bytes[1] & LEN7_MASK, indicator, "indicator for len {len}");
            assert_eq!(bytes.len(), header + len, "total size for len {len}");

            let masked = encode_frame_with_mask(&payload, Opcode::Binary, Some(KEY));
            let (frame, used) = decode_frame(&masked).unwrap();
            assert_eq!(frame.payload.len(), len);
            assert_eq!(used, header + 4 + len);
        }
    }

    #[test]
    fn test_masked_round_trip_recovers_payload() {
        let payload = "héllo, wörld".as_bytes();
        for opcode in [Opcode::Text, Opcode::Close, Opcode::Ping, Opcode::Pong] {
            let bytes = encode_frame(payload, opcode, true);
            assert_eq!(bytes[1] & MASK_BIT, MASK_BIT);
            let (frame, _) = decode_frame(&bytes).unwrap();
            assert_eq!(frame.opcode, opcode);
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn test_decode_truncated_payload_fails() {
        // Declares 10 payload bytes, carries 3.
        let bytes = [0x81, 0x8A, 0, 0, 0, 0, b'a', b'b', b'c'];
        assert_eq!(
            decode_frame(&bytes),
            Err(FrameError::Truncated {
                declared: 10,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_truncated_extended_length_fails() {
        // 16-bit length indicator with only one length byte present.
        let bytes = [0x81, 0xFE, 0x01];
        assert_eq!(
            decode_frame(&bytes),
            Err(FrameError::InsufficientData {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_huge_declared_length_fails_without_allocating() {
        let mut bytes = vec![0x82, 0xFF];
        bytes.extend_from_slice(&(1u64 << 40).to_be_bytes());
        bytes.extend_from_slice(&KEY);
        bytes.extend_from_slice(b"abc");
        assert!(matches!(decode_frame(&bytes), Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn test_decode_64bit_length_with_msb_set_fails() {
        let mut bytes = vec![0x82, 0x7F];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(decode_frame(&bytes), Err(FrameError::LengthOverflow(u64::MAX)));
    }

    #[test]
    fn test_decode_missing_mask_key_fails() {
        let bytes = [0x81, 0x85, 0x37, 0xFA];
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::InsufficientData { needed: 6, .. })
        ));
    }

    #[test]
    fn test_decode_empty_and_single_byte_buffers_fail() {
        assert!(decode_frame(&[]).is_err());
        assert!(decode_frame(&[0x81]).is_err());
    }

    #[test]
    fn test_reserved_opcode_passed_through() {
        let bytes = [0x83, 0x00];
        let (frame, _) = decode_frame(&bytes).unwrap();
        assert_eq!(frame.opcode, Opcode::Reserved(0x3));
        assert_eq!(frame.opcode.as_u8(), 0x3);
    }

    #[test]
    fn test_fin_bit_is_reported() {
        let bytes = [0x01, 0x80, 0, 0, 0, 0];
        let (frame, _) = decode_frame(&bytes).unwrap();
        assert!(!frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
    }

    #[test]
    fn test_decode_reports_consumed_bytes_for_back_to_back_frames() {
        let mut bytes = encode_frame_with_mask(b"one", Opcode::Text, Some(KEY));
        bytes.extend(encode_frame_with_mask(b"two", Opcode::Text, Some(KEY)));

        let (first, used) = decode_frame(&bytes).unwrap();
        let (second, rest) = decode_frame(&bytes[used..]).unwrap();

        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
        assert_eq!(used + rest, bytes.len());
    }

    #[test]
    fn test_apply_mask_is_self_inverse() {
        let mut data = b"mask me".to_vec();
        apply_mask(&mut data, KEY);
        assert_ne!(data, b"mask me");
        apply_mask(&mut data, KEY);
        assert_eq!(data, b"mask me");
    }

    #[test]
    fn test_control_opcode_classification() {
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(Opcode::Pong.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Continuation.is_control());
    }

    #[test]
    fn test_decode_header_succeeds_before_payload_arrives() {
        let bytes = encode_frame_with_mask(&[b'x'; 300], Opcode::Text, Some(KEY));

        let header = decode_header(&bytes[..8]).unwrap();

        assert_eq!(header.payload_len, 300);
        assert_eq!(header.header_len, 8);
        assert_eq!(header.mask_key, Some(KEY));
        assert_eq!(header.frame_len(), bytes.len() as u64);
    }

    #[test]
    fn test_decode_header_needs_the_mask_key() {
        let bytes = encode_frame_with_mask(b"hi", Opcode::Text, Some(KEY));
        assert!(matches!(
            decode_header(&bytes[..4]),
            Err(FrameError::InsufficientData { needed: 6, available: 4 })
        ));
    }
}
