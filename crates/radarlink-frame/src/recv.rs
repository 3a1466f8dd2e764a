//! Receive-side combinators.
//!
//! A receive operation is an ordered slice of [`Recv`] steps run left to
//! right against a [`Source`]. The first failing step aborts the whole
//! operation; bytes already consumed stay consumed.

use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use radarlink_transport::TransportError;

use crate::error::{FrameError, Result};
use crate::source::Source;
use crate::wire::Wire;

/// Typed destination for a fixed-size value.
pub trait Slot {
    /// Wire size of the value.
    fn size(&self) -> usize;

    /// Store the value decoded from exactly `size()` bytes.
    fn store(&mut self, raw: &[u8]) -> Result<()>;
}

struct Place<'a, T>(&'a mut T);

impl<T: Wire> Slot for Place<'_, T> {
    fn size(&self) -> usize {
        T::SIZE
    }

    fn store(&mut self, raw: &[u8]) -> Result<()> {
        *self.0 = T::decode(raw);
        Ok(())
    }
}

struct SharedPlace<T>(Rc<Cell<T>>);

impl<T: Wire + Copy> Slot for SharedPlace<T> {
    fn size(&self) -> usize {
        T::SIZE
    }

    fn store(&mut self, raw: &[u8]) -> Result<()> {
        self.0.set(T::decode(raw));
        Ok(())
    }
}

struct CheckedPlace<'a, T, F> {
    dst: &'a mut T,
    valid: F,
}

impl<T, F> Slot for CheckedPlace<'_, T, F>
where
    T: Wire + fmt::Debug,
    F: Fn(&T) -> bool,
{
    fn size(&self) -> usize {
        T::SIZE
    }

    fn store(&mut self, raw: &[u8]) -> Result<()> {
        let value = T::decode(raw);
        if !(self.valid)(&value) {
            return Err(FrameError::invalid_value("value", format!("{value:?}")));
        }
        *self.dst = value;
        Ok(())
    }
}

/// One receive step.
pub enum Recv<'a> {
    /// Consume bytes that must equal `expected`.
    Expect {
        expected: Cow<'a, [u8]>,
        location: &'static str,
    },
    /// Discard bytes up to and including `pattern`.
    Find {
        pattern: Cow<'a, [u8]>,
        location: &'static str,
    },
    /// Copy bytes into `dst` until `delimiter`. `dst` is cleared first, so
    /// running the step again starts over.
    Until {
        dst: &'a mut Vec<u8>,
        delimiter: u8,
        capacity: usize,
        consume: bool,
        location: &'static str,
    },
    /// Decode a fixed-size value.
    Value {
        slot: Box<dyn Slot + 'a>,
        location: &'static str,
    },
    /// Discard a fixed number of bytes.
    Skip(usize),
    /// Replace `dst` with everything left in a bounded source.
    Rest(&'a mut Vec<u8>),
    /// Run protocol bookkeeping between steps.
    Callback {
        f: Box<dyn FnMut() -> Result<()> + 'a>,
        location: &'static str,
    },
}

impl<'a> Recv<'a> {
    pub fn expect(expected: impl Into<Cow<'a, [u8]>>, location: &'static str) -> Self {
        Recv::Expect {
            expected: expected.into(),
            location,
        }
    }

    pub fn find(pattern: impl Into<Cow<'a, [u8]>>, location: &'static str) -> Self {
        Recv::Find {
            pattern: pattern.into(),
            location,
        }
    }

    /// Read until `delimiter`, consuming it. Fails once `capacity` bytes
    /// have been copied without seeing the delimiter.
    pub fn until(
        dst: &'a mut Vec<u8>,
        delimiter: u8,
        capacity: usize,
        location: &'static str,
    ) -> Self {
        Recv::Until {
            dst,
            delimiter,
            capacity,
            consume: true,
            location,
        }
    }

    /// Like [`until`](Self::until) but leaves the delimiter in the stream.
    pub fn until_keep(
        dst: &'a mut Vec<u8>,
        delimiter: u8,
        capacity: usize,
        location: &'static str,
    ) -> Self {
        Recv::Until {
            dst,
            delimiter,
            capacity,
            consume: false,
            location,
        }
    }

    pub fn value<T: Wire + 'a>(dst: &'a mut T, location: &'static str) -> Self {
        Recv::Value {
            slot: Box::new(Place(dst)),
            location,
        }
    }

    /// Decode into a shared cell, so a later callback can inspect it.
    pub fn shared<T: Wire + Copy + 'a>(cell: Rc<Cell<T>>, location: &'static str) -> Self {
        Recv::Value {
            slot: Box::new(SharedPlace(cell)),
            location,
        }
    }

    /// Decode a value and reject it unless `valid` holds.
    pub fn checked<T, F>(dst: &'a mut T, valid: F, location: &'static str) -> Self
    where
        T: Wire + fmt::Debug + 'a,
        F: Fn(&T) -> bool + 'a,
    {
        Recv::Value {
            slot: Box::new(CheckedPlace { dst, valid }),
            location,
        }
    }

    pub fn skip(n: usize) -> Self {
        Recv::Skip(n)
    }

    pub fn rest(dst: &'a mut Vec<u8>) -> Self {
        Recv::Rest(dst)
    }

    pub fn callback(location: &'static str, f: impl FnMut() -> Result<()> + 'a) -> Self {
        Recv::Callback {
            f: Box::new(f),
            location,
        }
    }

    /// Minimum number of bytes this step consumes.
    pub fn size(&self) -> usize {
        match self {
            Recv::Expect { expected, .. } => expected.len(),
            Recv::Value { slot, .. } => slot.size(),
            Recv::Skip(n) => *n,
            Recv::Find { .. } | Recv::Until { .. } | Recv::Rest(_) | Recv::Callback { .. } => 0,
        }
    }

    pub fn run(&mut self, src: &mut dyn Source) -> Result<()> {
        match self {
            Recv::Expect { expected, location } => expect(src, expected, *location),
            Recv::Find { pattern, location } => find(src, pattern, *location),
            Recv::Until {
                dst,
                delimiter,
                capacity,
                consume,
                location,
            } => {
                dst.clear();
                read_until(src, dst, *delimiter, *capacity, *consume, *location)
            }
            Recv::Value { slot, location } => {
                let location = *location;
                let mut raw = vec![0u8; slot.size()];
                src.fill(&mut raw).map_err(|e| e.at(location))?;
                slot.store(&raw).map_err(|e| e.at(location))
            }
            Recv::Skip(n) => skip(src, *n),
            Recv::Rest(dst) => {
                let Some(left) = src.remaining() else {
                    return Err(FrameError::malformed(
                        "rest",
                        "unbounded source has no remainder",
                    ));
                };
                dst.clear();
                dst.resize(left, 0);
                src.fill(&mut dst[..])
            }
            Recv::Callback { f, .. } => f(),
        }
    }
}

impl fmt::Debug for Recv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recv::Expect { expected, location } => f
                .debug_struct("Expect")
                .field("expected", expected)
                .field("location", location)
                .finish(),
            Recv::Find { pattern, location } => f
                .debug_struct("Find")
                .field("pattern", pattern)
                .field("location", location)
                .finish(),
            Recv::Until {
                delimiter,
                capacity,
                location,
                ..
            } => f
                .debug_struct("Until")
                .field("delimiter", delimiter)
                .field("capacity", capacity)
                .field("location", location)
                .finish(),
            Recv::Value { slot, location } => f
                .debug_struct("Value")
                .field("size", &slot.size())
                .field("location", location)
                .finish(),
            Recv::Skip(n) => f.debug_tuple("Skip").field(n).finish(),
            Recv::Rest(_) => f.write_str("Rest"),
            Recv::Callback { location, .. } => {
                f.debug_struct("Callback").field("location", location).finish()
            }
        }
    }
}

/// Sum of the minimum wire footprint of `steps`.
pub fn total_size(steps: &[Recv<'_>]) -> usize {
    steps.iter().map(Recv::size).sum()
}

/// Run `steps` in order, stopping at the first failure.
pub fn run_all(src: &mut dyn Source, steps: &mut [Recv<'_>]) -> Result<()> {
    for step in steps.iter_mut() {
        step.run(src)?;
    }
    Ok(())
}

/// Consume `expected.len()` bytes, failing at the first byte that differs.
pub fn expect(src: &mut dyn Source, expected: &[u8], location: &'static str) -> Result<()> {
    for (i, &want) in expected.iter().enumerate() {
        let got = src.take().map_err(|e| e.at(location))?;
        if got != want {
            let mut found = expected[..i].to_vec();
            found.push(got);
            return Err(FrameError::Mismatch {
                location,
                expected: expected.to_vec(),
                found,
            });
        }
    }
    Ok(())
}

/// Discard bytes until `pattern` has been consumed.
pub fn find(src: &mut dyn Source, pattern: &[u8], location: &'static str) -> Result<()> {
    find_any(src, &[pattern], location).map(|_| ())
}

/// Discard bytes until one of `patterns` has been consumed and return its
/// index. When several end on the same byte the lowest index wins.
///
/// Blocking sources scan until their wait elapses; a zero wait scans only
/// what is already buffered.
pub fn find_any(src: &mut dyn Source, patterns: &[&[u8]], location: &'static str) -> Result<usize> {
    let longest = patterns.iter().map(|p| p.len()).max().unwrap_or(0);
    if longest == 0 {
        return Ok(0);
    }

    let waited = src.wait();
    let started = Instant::now();
    let mut window: Vec<u8> = Vec::with_capacity(longest);

    loop {
        if !waited.is_zero() && started.elapsed() >= waited {
            return Err(FrameError::NotFound { location, waited });
        }
        let byte = match src.take() {
            Ok(byte) => byte,
            Err(FrameError::Transport {
                source: TransportError::Timeout { .. },
                ..
            }) => return Err(FrameError::NotFound { location, waited }),
            Err(FrameError::Malformed { .. }) if src.remaining().is_some() => {
                return Err(FrameError::NotFound { location, waited })
            }
            Err(err) => return Err(err.at(location)),
        };

        if window.len() == longest {
            window.remove(0);
        }
        window.push(byte);

        if let Some(hit) = patterns
            .iter()
            .position(|p| !p.is_empty() && window.ends_with(p))
        {
            return Ok(hit);
        }
    }
}

/// Copy bytes into `dst` until `delimiter`.
pub fn read_until(
    src: &mut dyn Source,
    dst: &mut Vec<u8>,
    delimiter: u8,
    capacity: usize,
    consume: bool,
    location: &'static str,
) -> Result<()> {
    loop {
        let byte = src.peek().map_err(|e| e.at(location))?;
        if byte == delimiter {
            if consume {
                src.take().map_err(|e| e.at(location))?;
            }
            return Ok(());
        }
        if dst.len() >= capacity {
            return Err(FrameError::Overrun { location, capacity });
        }
        src.take().map_err(|e| e.at(location))?;
        dst.push(byte);
    }
}

/// Discard exactly `n` bytes.
pub fn skip(src: &mut dyn Source, n: usize) -> Result<()> {
    let mut scratch = [0u8; 32];
    let mut left = n;
    while left > 0 {
        let chunk = left.min(scratch.len());
        src.fill(&mut scratch[..chunk]).map_err(|e| e.at("skip"))?;
        left -= chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Payload;

    #[test]
    fn steps_run_left_to_right() {
        let data = [0xAA, 0x34, 0x12, 0x07, 0x00, 0x09];
        let mut src = Payload::new(&data);
        let mut word = 0u16;
        let mut byte = 0u8;
        {
            let mut steps = [
                Recv::expect(&b"\xAA"[..], "marker"),
                Recv::value(&mut word, "word"),
                Recv::skip(2),
                Recv::value(&mut byte, "byte"),
            ];
            assert_eq!(total_size(&steps), 6);
            run_all(&mut src, &mut steps).expect("should run receive steps");
        }
        assert_eq!(word, 0x1234);
        assert_eq!(byte, 9);
    }

    #[test]
    fn first_failure_stops_the_chain() {
        let data = [0x01, 0x02, 0x03];
        let mut src = Payload::new(&data);
        let mut called = false;
        let err = {
            let mut steps = [
                Recv::expect(&b"\x01\x05"[..], "header"),
                Recv::callback("after", || {
                    called = true;
                    Ok(())
                }),
            ];
            run_all(&mut src, &mut steps).expect_err("steps should fail")
        };
        assert!(!called);
        match err {
            FrameError::Mismatch {
                location, found, ..
            } => {
                assert_eq!(location, "header");
                assert_eq!(found, vec![0x01, 0x02]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(src.position(), 2);
    }

    #[test]
    fn find_skips_noise_before_marker() {
        let data = b"noise HardwareVersion:V1.2\r";
        let mut src = Payload::new(data);
        let mut version = Vec::new();
        {
            let mut steps = [
                Recv::find(&b"HardwareVersion:"[..], "label"),
                Recv::until(&mut version, b'\r', 32, "version"),
            ];
            run_all(&mut src, &mut steps).expect("should run receive steps");
        }
        assert_eq!(version, b"V1.2");
        assert!(src.is_exhausted());
    }

    #[test]
    fn find_any_reports_which_pattern_matched() {
        let mut src = Payload::new(b"xxError\r\n");
        let hit = find_any(&mut src, &[&b"Done\r\n"[..], &b"Error\r\n"[..]], "terminator").expect("should find a terminator");
        assert_eq!(hit, 1);
    }

    #[test]
    fn find_reports_missing_pattern() {
        let mut src = Payload::new(b"nothing here");
        let err = find(&mut src, b"Done", "terminator").expect_err("should not find pattern");
        assert!(matches!(
            err,
            FrameError::NotFound {
                location: "terminator",
                ..
            }
        ));
    }

    #[test]
    fn until_fails_when_capacity_runs_out() {
        let mut src = Payload::new(b"abcdef,");
        let mut dst = Vec::new();
        let err = read_until(&mut src, &mut dst, b',', 4, true, "token").expect_err("should fail");
        assert!(matches!(err, FrameError::Overrun { capacity: 4, .. }));
        assert_eq!(dst, b"abcd");
    }

    #[test]
    fn until_keep_leaves_delimiter() {
        let mut src = Payload::new(b"12 34");
        let mut dst = Vec::new();
        read_until(&mut src, &mut dst, b' ', 8, false, "token").expect("should read token");
        assert_eq!(src.peek().expect("should have a byte left"), b' ');
    }

    #[test]
    fn checked_value_rejects_out_of_range() {
        let mut src = Payload::new(&[14]);
        let mut gate = 0u8;
        let err = Recv::checked(&mut gate, |g: &u8| *g <= 13, "gate")
            .run(&mut src)
            .expect_err("step should fail");
        assert!(matches!(
            err,
            FrameError::InvalidValue {
                location: "gate",
                ..
            }
        ));
        assert_eq!(gate, 0);
    }

    #[test]
    fn shared_cell_is_visible_to_callback() {
        let status = Rc::new(Cell::new(0u16));
        let seen = status.clone();
        let mut src = Payload::new(&[0x01, 0x00]);
        let mut steps = [
            Recv::shared(status.clone(), "status"),
            Recv::callback("status", move || match seen.get() {
                0 => Ok(()),
                status => Err(FrameError::Rejected {
                    location: "status",
                    status,
                }),
            }),
        ];
        let err = run_all(&mut src, &mut steps).expect_err("steps should fail");
        assert!(matches!(err, FrameError::Rejected { status: 1, .. }));
        assert_eq!(status.get(), 1);
    }

    #[test]
    fn rest_takes_remaining_payload() {
        let mut src = Payload::new(&[1, 2, 3, 4]);
        let mut first = 0u8;
        let mut tail = Vec::new();
        {
            let mut steps = [Recv::value(&mut first, "first"), Recv::rest(&mut tail)];
            run_all(&mut src, &mut steps).expect("should run receive steps");
        }
        assert_eq!(first, 1);
        assert_eq!(tail, vec![2, 3, 4]);
    }
}
