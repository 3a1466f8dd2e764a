use std::time::Duration;

use radarlink_transport::{Channel, TransportError};

use crate::error::{FrameError, Result};

/// Byte source that receive combinators run against.
///
/// Implemented by [`Channel`] for live reads and by [`Payload`] for the
/// body of a frame that has already been received.
pub trait Source {
    /// Fill `buf` completely.
    fn fill(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Look at the next byte without consuming it.
    fn peek(&mut self) -> Result<u8>;

    /// Consume the next byte.
    fn take(&mut self) -> Result<u8>;

    /// Deadline budget for scanning combinators.
    fn wait(&self) -> Duration;

    /// Bytes left, for bounded sources.
    fn remaining(&self) -> Option<usize> {
        None
    }
}

impl Source for Channel {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = self.read(buf, None)?;
        if n < buf.len() {
            return Err(TransportError::Timeout {
                location: "Channel::read",
                waited: self.default_wait(),
            }
            .into());
        }
        Ok(())
    }

    fn peek(&mut self) -> Result<u8> {
        Ok(self.peek_byte(None)?)
    }

    fn take(&mut self) -> Result<u8> {
        Ok(self.read_byte(None)?)
    }

    fn wait(&self) -> Duration {
        self.default_wait()
    }
}

/// Bounded cursor over a received payload.
///
/// Reading past the end is a malformed-frame error, so combinators running
/// against a payload can never consume beyond its declared length.
#[derive(Debug)]
pub struct Payload<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Payload<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn exhausted(&self, wanted: usize) -> FrameError {
        FrameError::malformed(
            "payload",
            format!(
                "needs {wanted} more bytes, {} left",
                self.data.len() - self.pos
            ),
        )
    }
}

impl Source for Payload<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(self.exhausted(buf.len()));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn peek(&mut self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.exhausted(1))
    }

    fn take(&mut self) -> Result<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn wait(&self) -> Duration {
        Duration::ZERO
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.data.len() - self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_refuses_to_read_past_end() {
        let mut payload = Payload::new(&[1, 2, 3]);
        let mut buf = [0u8; 2];
        payload.fill(&mut buf).expect("should fill buffer");
        assert_eq!(buf, [1, 2]);

        let err = payload.fill(&mut buf).expect_err("should run out of bytes");
        assert!(matches!(err, FrameError::Malformed { .. }));
        assert_eq!(payload.position(), 2);
        assert_eq!(payload.take().expect("should take byte"), 3);
        assert!(payload.is_exhausted());
        assert!(payload.peek().is_err());
    }
}
