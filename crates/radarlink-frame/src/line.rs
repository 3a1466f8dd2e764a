//! Line-oriented ASCII protocol.
//!
//! Commands are words joined by single spaces and terminated by CR LF.
//! Every command is answered by zero or more reply lines followed by a
//! `Done` or `Error` line.

use bytes::{BufMut, BytesMut};
use radarlink_transport::Channel;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::recv;
use crate::send::Arg;
use crate::source::Source;

pub const LINE_END: &[u8] = b"\r\n";
pub const LABEL_DONE: &[u8] = b"Done\r\n";
pub const LABEL_ERROR: &[u8] = b"Error\r\n";

/// Longest line [`decode_line`] buffers before giving up on it.
pub const MAX_LINE: usize = 256;

/// Final line of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Done,
    Error,
}

/// Encode a command line.
pub fn encode_line(words: &[Arg<'_>], dst: &mut BytesMut) {
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            dst.put_u8(b' ');
        }
        word.encode(dst);
    }
    dst.put_slice(LINE_END);
}

/// Encode and transmit a command line.
pub fn send_line(channel: &mut Channel, words: &[Arg<'_>]) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_line(words, &mut buf);
    trace!(line = %String::from_utf8_lossy(&buf).trim_end(), "send line");
    channel
        .send(buf.freeze())
        .map_err(|e| FrameError::from(e).at("send_line"))
}

/// Skip ahead to the next `Done` or `Error` line.
pub fn await_terminator(src: &mut dyn Source) -> Result<Terminator> {
    match recv::find_any(src, &[LABEL_DONE, LABEL_ERROR], "terminator")? {
        0 => Ok(Terminator::Done),
        _ => Ok(Terminator::Error),
    }
}

/// Take one complete line off the front of `src`, without its CR LF.
///
/// Returns `None` until a full line is buffered. A line that grows past
/// [`MAX_LINE`] without an end is dropped.
pub fn decode_line(src: &mut BytesMut) -> Option<String> {
    loop {
        let Some(end) = src.windows(LINE_END.len()).position(|w| w == LINE_END) else {
            if src.len() > MAX_LINE {
                src.clear();
            }
            return None;
        };
        let line = src.split_to(end + LINE_END.len());
        let text = String::from_utf8_lossy(&line[..end]).into_owned();
        if !text.is_empty() {
            return Some(text);
        }
    }
}
