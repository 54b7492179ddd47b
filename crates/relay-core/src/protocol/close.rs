//! Close-frame payloads (RFC 6455 §5.5.1): an optional big-endian status
//! code followed by an optional UTF-8 reason.

/// Status codes this server sends or recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    TooBig,
    Other(u16),
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::TooBig => 1009,
            CloseCode::Other(code) => code,
        }
    }

    /// Whether an endpoint may put this code on the wire (RFC 6455 §7.4).
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting; 1004 and the
    /// unassigned ranges are not valid either.
    pub fn is_sendable(self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1009 => CloseCode::TooBig,
            other => CloseCode::Other(other),
        }
    }
}

/// Builds a close payload.  Control payloads are limited to 125 bytes, so
/// the reason is cut at a character boundary to fit.
pub fn close_payload(code: CloseCode, reason: &str) -> Vec<u8> {
    let mut cut = reason.len().min(123);
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut buf = Vec::with_capacity(2 + cut);
    buf.extend_from_slice(&code.as_u16().to_be_bytes());
    buf.extend_from_slice(&reason.as_bytes()[..cut]);
    buf
}

/// Extracts the status code from a received close payload, if present.
pub fn parse_close_code(payload: &[u8]) -> Option<CloseCode> {
    match payload {
        [hi, lo, ..] => Some(CloseCode::from(u16::from_be_bytes([*hi, *lo]))),
        _ => None,
    }
}
