//! WebSocket opening handshake (RFC 6455 §4.2).
//!
//! Only the `Sec-WebSocket-Key` header is required.  Header names are matched
//! case-insensitively and both `\r\n` and bare `\n` line endings are accepted.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Fixed GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest request head accepted before the blank line that ends it.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Reasons an upgrade request is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("request is not valid UTF-8")]
    NotUtf8,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("empty Sec-WebSocket-Key header")]
    EmptyKey,

    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },
}

/// A request that passed negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Trimmed key exactly as the client sent it.
    pub client_key: String,
    /// `base64(sha1(client_key + WS_GUID))`.
    pub accept_key: String,
}

impl Accepted {
    /// The `101 Switching Protocols` response to write back to the client.
    pub fn response(&self) -> String {
        upgrade_response(&self.accept_key)
    }
}

/// Computes the `Sec-WebSocket-Accept` value for `client_key`.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::handshake::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Finds the value of header `name` in a raw HTTP request head.
///
/// The request line is skipped and scanning stops at the first blank line.
pub fn find_header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request
        .lines()
        .skip(1)
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Length of the request head in `bytes`, blank line included.
///
/// Returns `None` until the blank line (`\r\n\r\n` or `\n\n`) has arrived.
/// Anything after it already belongs to the frame stream.
pub fn request_head_len(bytes: &[u8]) -> Option<usize> {
    bytes.iter().enumerate().find_map(|(i, &byte)| {
        if byte != b'\n' {
            return None;
        }
        match bytes.get(i + 1) {
            Some(b'\n') => Some(i + 2),
            Some(b'\r') if bytes.get(i + 2) == Some(&b'\n') => Some(i + 3),
            _ => None,
        }
    })
}

/// Validates an upgrade request and derives the accept token.
///
/// # Errors
///
/// Returns [`HandshakeError`] when the request has no usable key.
pub fn negotiate(request: &[u8]) -> Result<Accepted, HandshakeError> {
    let text = std::str::from_utf8(request).map_err(|_| HandshakeError::NotUtf8)?;
    let client_key = find_header(text, KEY_HEADER).ok_or(HandshakeError::MissingKey)?;
    if client_key.is_empty() {
        return Err(HandshakeError::EmptyKey);
    }

    Ok(Accepted {
        client_key: client_key.to_string(),
        accept_key: compute_accept_key(client_key),
    })
}

/// Builds the `101 Switching Protocols` response.
pub fn upgrade_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         \r\n"
    )
}

/// Builds a `400 Bad Request` response naming `reason`.
pub fn bad_request_response(reason: &str) -> String {
    let body = format!("Bad Request: {reason}");
    format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_REQUEST: &str = "GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    #[test]
    fn test_accept_key_matches_rfc_vector() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_negotiate_sample_request() {
        let accepted = negotiate(SAMPLE_REQUEST.as_bytes()).unwrap();
        assert_eq!(accepted.client_key, "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accepted.accept_key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_response_has_required_headers_and_blank_line() {
        let response = negotiate(SAMPLE_REQUEST.as_bytes()).unwrap().response();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Upgrade: websocket\r\n"));
        assert!(response.contains("Connection: Upgrade\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let request = "GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n";
        assert_eq!(negotiate(request.as_bytes()), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let request = "GET / HTTP/1.1\r\nSec-WebSocket-Key:   \r\n\r\n";
        assert_eq!(negotiate(request.as_bytes()), Err(HandshakeError::EmptyKey));
    }

    #[test]
    fn test_non_utf8_request_is_rejected() {
        assert_eq!(negotiate(&[0xFF, 0xFE, 0x00]), Err(HandshakeError::NotUtf8));
    }

    #[test]
    fn test_header_name_is_case_insensitive() {
        let request = "GET / HTTP/1.1\r\nsec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let accepted = negotiate(request.as_bytes()).unwrap();
        assert_eq!(accepted.accept_key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_bare_newline_line_endings_are_accepted() {
        let request = "GET / HTTP/1.1\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\n\n";
        assert!(negotiate(request.as_bytes()).is_ok());
    }

    #[test]
    fn test_key_is_trimmed_before_hashing() {
        let request = "GET / HTTP/1.1\r\nSec-WebSocket-Key:    dGhlIHNhbXBsZSBub25jZQ==   \r\n\r\n";
        let accepted = negotiate(request.as_bytes()).unwrap();
        assert_eq!(accepted.accept_key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_headers_after_blank_line_are_ignored() {
        let request = "GET / HTTP/1.1\r\nHost: x\r\n\r\nSec-WebSocket-Key: abc\r\n";
        assert_eq!(negotiate(request.as_bytes()), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn test_bad_request_has_matching_content_length() {
        let response = bad_request_response("missing Sec-WebSocket-Key header");
        let body = "Bad Request: missing Sec-WebSocket-Key header";
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(response.ends_with(body));
    }

    #[test]
    fn test_request_head_len_stops_at_blank_line() {
        let mut bytes = SAMPLE_REQUEST.as_bytes().to_vec();
        bytes.extend_from_slice(&[0x81, 0x82, 0xFF, 0x00]);
        assert_eq!(request_head_len(&bytes), Some(SAMPLE_REQUEST.len()));
    }

    #[test]
    fn test_request_head_len_accepts_bare_newlines() {
        let request = b"GET / HTTP/1.1\nSec-WebSocket-Key: abc\n\nrest";
        assert_eq!(request_head_len(request), Some(request.len() - 4));
    }

    #[test]
    fn test_request_head_len_waits_for_blank_line() {
        let partial = &SAMPLE_REQUEST.as_bytes()[..SAMPLE_REQUEST.len() - 2];
        assert_eq!(request_head_len(partial), None);
    }

    #[test]
    fn test_negotiate_head_of_pipelined_request() {
        let mut bytes = SAMPLE_REQUEST.as_bytes().to_vec();
        bytes.extend_from_slice(&[0x81, 0x82, 0xFF, 0x00, 0xC0, 0x80]);

        let head = request_head_len(&bytes).unwrap();

        assert_eq!(negotiate(&bytes), Err(HandshakeError::NotUtf8));
        assert!(negotiate(&bytes[..head]).is_ok());
    }
}
