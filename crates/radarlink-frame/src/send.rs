//! Send-side combinators.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::wire::Wire;

/// Object-safe view of a [`Wire`] value.
pub trait Encode {
    fn size(&self) -> usize;
    fn encode(&self, dst: &mut BytesMut);
}

impl<T: Wire> Encode for T {
    fn size(&self) -> usize {
        T::SIZE
    }

    fn encode(&self, dst: &mut BytesMut) {
        Wire::encode(self, dst);
    }
}

/// One argument of an outgoing command.
pub enum Arg<'a> {
    /// A fixed-size little-endian value.
    Value(Box<dyn Encode + 'a>),
    /// Raw bytes.
    Bytes(Cow<'a, [u8]>),
    /// Text token.
    Text(Cow<'a, str>),
    /// Dynamic formatting into the outgoing buffer.
    With(Box<dyn Fn(&mut BytesMut) + 'a>),
}

impl<'a> Arg<'a> {
    pub fn value<T: Wire + 'a>(value: T) -> Self {
        Arg::Value(Box::new(value))
    }

    pub fn bytes(bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Arg::Bytes(bytes.into())
    }

    pub fn text(text: impl Into<Cow<'a, str>>) -> Self {
        Arg::Text(text.into())
    }

    pub fn display(value: impl fmt::Display) -> Self {
        Arg::Text(Cow::Owned(value.to_string()))
    }

    /// Decimal token with at most three fractional digits.
    pub fn decimal(value: f32) -> Self {
        Arg::Text(Cow::Owned(format_decimal(value)))
    }

    pub fn with(f: impl Fn(&mut BytesMut) + 'a) -> Self {
        Arg::With(Box::new(f))
    }

    /// Number of bytes this argument puts on the wire.
    pub fn size(&self) -> usize {
        match self {
            Arg::Value(v) => v.size(),
            Arg::Bytes(b) => b.len(),
            Arg::Text(t) => t.len(),
            Arg::With(f) => {
                let mut scratch = BytesMut::new();
                f(&mut scratch);
                scratch.len()
            }
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Arg::Value(v) => v.encode(dst),
            Arg::Bytes(b) => dst.put_slice(b),
            Arg::Text(t) => dst.put_slice(t.as_bytes()),
            Arg::With(f) => f(dst),
        }
    }
}

impl fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(&v.size()).finish(),
            Arg::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Arg::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Arg::With(_) => f.write_str("With"),
        }
    }
}

/// Sum of the wire sizes of `args`.
pub fn total_size(args: &[Arg<'_>]) -> usize {
    args.iter().map(Arg::size).sum()
}

/// Format `value` with up to three fractional digits, keeping at least one.
pub fn format_decimal(value: f32) -> String {
    let fixed = format!("{value:.3}");
    let trimmed = fixed.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}
