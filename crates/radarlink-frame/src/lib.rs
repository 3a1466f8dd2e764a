//! Protocol combinators and frame codecs for radar sensor links.
//!
//! Requests are built from [`Arg`] lists and replies are matched by ordered
//! [`Recv`] steps running against a [`Source`]. Two wire formats sit on top
//! of the combinators:
//! - binary frames: a 4-byte header, a 2-byte little-endian length, the body
//!   (opcode then arguments), and a 4-byte footer
//! - ASCII lines: space-separated words terminated by CR LF, answered by a
//!   `Done` or `Error` line
//!
//! Received frame bodies are bounded by their declared length, so a
//! combinator chain never consumes bytes belonging to the next frame.

pub mod codec;
pub mod error;
pub mod line;
pub mod recv;
pub mod send;
pub mod source;
pub mod wire;

pub use codec::{
    decode_frame, encode_frame, recv_frame, recv_frame_with, send_frame, Frame, Markers, Sync,
    ACK_BIT, COMMAND_FOOTER, COMMAND_HEADER, COMMAND_MARKERS, DEFAULT_MAX_PAYLOAD,
    FRAME_OVERHEAD, REPORT_FOOTER, REPORT_HEADER, REPORT_MARKERS,
};
pub use error::{FrameError, Result};
pub use line::{
    await_terminator, decode_line, encode_line, send_line, Terminator, LABEL_DONE, LABEL_ERROR,
    LINE_END, MAX_LINE,
};
pub use recv::{find_any, Recv, Slot};
pub use send::{Arg, Encode};
pub use source::{Payload, Source};
pub use wire::{to_bytes, Wire};
