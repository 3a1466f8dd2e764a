//! Fixed-size little-endian wire values.

use bytes::{BufMut, BytesMut};

/// A value with a fixed little-endian wire representation.
///
/// `decode` is always handed exactly `SIZE` bytes.
pub trait Wire: Sized {
    const SIZE: usize;

    fn encode(&self, dst: &mut BytesMut);

    fn decode(src: &[u8]) -> Self;
}

impl Wire for u8 {
    const SIZE: usize = 1;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(*self);
    }

    fn decode(src: &[u8]) -> Self {
        src[0]
    }
}

impl Wire for u16 {
    const SIZE: usize = 2;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(*self);
    }

    fn decode(src: &[u8]) -> Self {
        u16::from_le_bytes([src[0], src[1]])
    }
}

impl Wire for i16 {
    const SIZE: usize = 2;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_i16_le(*self);
    }

    fn decode(src: &[u8]) -> Self {
        i16::from_le_bytes([src[0], src[1]])
    }
}

impl Wire for u32 {
    const SIZE: usize = 4;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(*self);
    }

    fn decode(src: &[u8]) -> Self {
        u32::from_le_bytes([src[0], src[1], src[2], src[3]])
    }
}

impl<const N: usize> Wire for [u8; N] {
    const SIZE: usize = N;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(self);
    }

    fn decode(src: &[u8]) -> Self {
        let mut out = [0u8; N];
        out.copy_from_slice(&src[..N]);
        out
    }
}

/// Encode a single value into a fresh buffer.
pub fn to_bytes<T: Wire>(value: &T) -> BytesMut {
    let mut dst = BytesMut::with_capacity(T::SIZE);
    value.encode(&mut dst);
    dst
}
