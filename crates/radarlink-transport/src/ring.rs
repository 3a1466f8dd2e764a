//! Capture ring buffer used while a channel streams unsolicited telemetry.
//!
//! The ring never grows. When new bytes would lap the unread region the
//! oldest unread bytes are discarded and an overflow flag is latched until
//! the consumer takes it. Telemetry is sampled, so losing stale samples is
//! preferable to stalling the link.

/// Fixed-capacity circular byte buffer with a destructive overflow policy.
#[derive(Debug)]
pub struct CaptureRing {
    data: Box<[u8]>,
    read: usize,
    len: usize,
    overflow: bool,
}

impl CaptureRing {
    /// Create an empty ring holding at most `capacity` bytes.
    ///
    /// A zero capacity is rounded up to one byte.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            read: 0,
            len: 0,
            overflow: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Space left before the next push starts discarding.
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append bytes, discarding the oldest unread bytes if needed.
    ///
    /// Returns how many previously unread (or incoming) bytes were dropped.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let cap = self.capacity();
        if bytes.is_empty() {
            return 0;
        }

        if bytes.len() >= cap {
            let dropped = self.len + bytes.len() - cap;
            self.data.copy_from_slice(&bytes[bytes.len() - cap..]);
            self.read = 0;
            self.len = cap;
            self.overflow |= dropped > 0;
            return dropped;
        }

        let mut dropped = 0;
        if bytes.len() > self.free() {
            dropped = bytes.len() - self.free();
            self.read = (self.read + dropped) % cap;
            self.len -= dropped;
            self.overflow = true;
        }

        let write = (self.read + self.len) % cap;
        let first = bytes.len().min(cap - write);
        self.data[write..write + first].copy_from_slice(&bytes[..first]);
        self.data[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.len += bytes.len();
        dropped
    }

    /// Move up to `out.len()` unread bytes into `out`.
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let cap = self.capacity();
        let n = out.len().min(self.len);
        let first = n.min(cap - self.read);
        out[..first].copy_from_slice(&self.data[self.read..self.read + first]);
        out[first..n].copy_from_slice(&self.data[..n - first]);
        self.read = (self.read + n) % cap;
        self.len -= n;
        n
    }

    /// Whether an overflow happened since the flag was last taken.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Record that bytes were lost before they reached the ring.
    pub fn latch_overflow(&mut self) {
        self.overflow = true;
    }

    /// Report and clear the overflow flag.
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflow)
    }

    /// Drop all unread bytes. The overflow flag is left untouched.
    pub fn clear(&mut self) {
        self.read = 0;
        self.len = 0;
    }
}
