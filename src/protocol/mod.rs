//! WebSocket protocol core (RFC 6455): codec, handshake and reassembly.
//!
//! Everything here is pure: no I/O, no timers, no shared state.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod select;

pub use assembler::{Assembled, MessageAssembler};
pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD, encode_frame};
pub use handshake::{
    BAD_REQUEST, ClientRequest, HandshakeRequest, HttpHead, Negotiated, WS_GUID, build_response,
    check_response, compute_accept_key, find_head_end, generate_key,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use select::{AllowedProtocols, ProtocolSelector};
