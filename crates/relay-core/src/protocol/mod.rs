//! Protocol module containing the frame codec, opening handshake, stream
//! buffering and message reassembly.

pub mod close;
pub mod fragment;
pub mod frame;
pub mod handshake;
pub mod stream;

pub use close::{close_payload, parse_close_code, CloseCode};
pub use fragment::{AssemblyError, Message, MessageAssembler};
pub use frame::{
    apply_mask, decode_frame, decode_header, encode_frame, encode_frame_with_mask, Frame, FrameError,
    FrameHeader, Opcode,
};
pub use handshake::{
    compute_accept_key, negotiate, request_head_len, Accepted, HandshakeError, MAX_REQUEST_HEAD,
};
pub use stream::FrameReader;
