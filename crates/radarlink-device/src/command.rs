//! Command descriptors for the binary and ASCII protocols.

use std::cell::Cell;
use std::rc::Rc;

use bytes::BytesMut;
use radarlink_frame::{
    codec, line, recv, Arg, FrameError, Recv, ACK_BIT, LABEL_DONE, LABEL_ERROR,
};
use radarlink_transport::Channel;

use crate::engine::Exchange;
use crate::opcode;

type FrameResult<T> = std::result::Result<T, FrameError>;

/// A binary command: opcode, arguments and the steps matching the reply.
///
/// Every reply starts with the acknowledged opcode and a `u16` status. A
/// non-zero status is reported as rejected before any caller step runs.
pub struct BinaryCommand<'a> {
    opcode: u16,
    args: Vec<Arg<'a>>,
    recv: Vec<Recv<'a>>,
}

impl<'a> BinaryCommand<'a> {
    pub fn new(opcode: u16) -> Self {
        let status = Rc::new(Cell::new(0u16));
        let seen = status.clone();
        let recv = vec![
            Recv::expect((opcode | ACK_BIT).to_le_bytes().to_vec(), "ack"),
            Recv::shared(status, "status"),
            Recv::callback("status", move || match seen.get() {
                0 => Ok(()),
                status => Err(FrameError::Rejected {
                    location: "status",
                    status,
                }),
            }),
        ];
        Self {
            opcode,
            args: Vec::new(),
            recv,
        }
    }

    pub fn arg(mut self, arg: Arg<'a>) -> Self {
        self.args.push(arg);
        self
    }

    pub fn recv(mut self, step: Recv<'a>) -> Self {
        self.recv.push(step);
        self
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Encoded request frame.
    pub fn to_bytes(&self) -> FrameResult<BytesMut> {
        let mut buf = BytesMut::new();
        codec::encode_frame(self.opcode, &self.args, &mut buf)?;
        Ok(buf)
    }
}

impl Exchange for BinaryCommand<'_> {
    fn describe(&self) -> String {
        opcode::name(self.opcode).to_string()
    }

    fn transmit(&self, channel: &mut Channel) -> FrameResult<()> {
        codec::send_frame(channel, self.opcode, &self.args)
    }

    fn receive(&mut self, channel: &mut Channel) -> FrameResult<()> {
        codec::recv_frame(channel, &mut self.recv)
    }
}

impl std::fmt::Debug for BinaryCommand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryCommand")
            .field("opcode", &format_args!("{:#06x}", self.opcode))
            .field("args", &self.args)
            .field("recv", &self.recv)
            .finish()
    }
}

/// An ASCII command line.
///
/// Without a label the reply is just the terminator. With a label, the reply
/// is scanned for the label, `Done` and `Error` at once: the caller's steps
/// run after the label, and the terminator is awaited afterwards.
pub struct LineCommand<'a> {
    words: Vec<Arg<'a>>,
    label: Option<&'static [u8]>,
    recv: Vec<Recv<'a>>,
}

impl<'a> LineCommand<'a> {
    pub fn new(command: &'static str) -> Self {
        Self {
            words: vec![Arg::text(command)],
            label: None,
            recv: Vec::new(),
        }
    }

    pub fn arg(mut self, word: Arg<'a>) -> Self {
        self.words.push(word);
        self
    }

    /// Expect `label` in the reply, followed by `steps`.
    pub fn reply(mut self, label: &'static [u8], steps: impl IntoIterator<Item = Recv<'a>>) -> Self {
        self.label = Some(label);
        self.recv.extend(steps);
        self
    }

    /// Encoded request line.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        line::encode_line(&self.words, &mut buf);
        buf
    }
}

fn rejected() -> FrameError {
    FrameError::Rejected {
        location: "terminator",
        status: 1,
    }
}

impl Exchange for LineCommand<'_> {
    fn describe(&self) -> String {
        let line = self.to_bytes();
        String::from_utf8_lossy(&line).trim_end().to_string()
    }

    fn transmit(&self, channel: &mut Channel) -> FrameResult<()> {
        line::send_line(channel, &self.words)
    }

    fn receive(&mut self, channel: &mut Channel) -> FrameResult<()> {
        let Some(label) = self.label else {
            return match line::await_terminator(channel)? {
                line::Terminator::Done => Ok(()),
                line::Terminator::Error => Err(rejected()),
            };
        };

        match recv::find_any(channel, &[label, LABEL_DONE, LABEL_ERROR], "label")? {
            0 => {}
            1 => return Err(FrameError::malformed("label", "reply finished without a value")),
            _ => return Err(rejected()),
        }
        recv::run_all(channel, &mut self.recv)?;
        match line::await_terminator(channel)? {
            line::Terminator::Done => Ok(()),
            line::Terminator::Error => Err(rejected()),
        }
    }
}

impl std::fmt::Debug for LineCommand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineCommand")
            .field("words", &self.words)
            .field("label", &self.label.map(String::from_utf8_lossy))
            .field("recv", &self.recv)
            .finish()
    }
}
