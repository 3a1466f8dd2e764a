use bytes::{Buf, BufMut, Bytes, BytesMut};
use radarlink_transport::Channel;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::recv::{self, Recv};
use crate::send::{self, Arg};
use crate::source::{Payload, Source};

/// Header of command and acknowledgement frames.
pub const COMMAND_HEADER: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];
/// Footer of command and acknowledgement frames.
pub const COMMAND_FOOTER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];
/// Header of unsolicited report frames.
pub const REPORT_HEADER: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];
/// Footer of unsolicited report frames.
pub const REPORT_FOOTER: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];

/// Bit set in the opcode of a reply.
pub const ACK_BIT: u16 = 0x0100;

/// Header (4) + length (2) + footer (4).
pub const FRAME_OVERHEAD: usize = 10;

/// Default maximum body length accepted from the wire.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// Header/footer pair delimiting one family of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub header: [u8; 4],
    pub footer: [u8; 4],
}

pub const COMMAND_MARKERS: Markers = Markers {
    header: COMMAND_HEADER,
    footer: COMMAND_FOOTER,
};

pub const REPORT_MARKERS: Markers = Markers {
    header: REPORT_HEADER,
    footer: REPORT_FOOTER,
};

/// How to find the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sync {
    /// The header must be the next bytes on the wire.
    Strict,
    /// Skip noise until the header shows up.
    Scan,
}

/// A decoded command or acknowledgement frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u16,
    /// Bytes following the opcode.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Whether this frame answers a command.
    pub fn is_ack(&self) -> bool {
        self.opcode & ACK_BIT != 0
    }

    /// Opcode with the acknowledgement bit cleared.
    pub fn command(&self) -> u16 {
        self.opcode & !ACK_BIT
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + 2 + self.payload.len()
    }

    /// Cursor over the payload for receive combinators.
    pub fn args(&self) -> Payload<'_> {
        Payload::new(&self.payload)
    }
}

/// Encode a command frame.
///
/// Wire format:
/// ```text
/// ┌─────────────┬───────────┬──────────┬──────────────┬─────────────┐
/// │ FD FC FB FA │ Length    │ Opcode   │ Arguments    │ 04 03 02 01 │
/// │             │ (2B LE)   │ (2B LE)  │ (Length - 2) │             │
/// └─────────────┴───────────┴──────────┴──────────────┴─────────────┘
/// ```
pub fn encode_frame(opcode: u16, args: &[Arg<'_>], dst: &mut BytesMut) -> Result<()> {
    let body = 2 + send::total_size(args);
    if body > usize::from(u16::MAX) {
        return Err(FrameError::malformed(
            "length",
            format!("body of {body} bytes does not fit a u16 length"),
        ));
    }

    dst.reserve(FRAME_OVERHEAD + body);
    dst.put_slice(&COMMAND_HEADER);
    dst.put_u16_le(body as u16);
    dst.put_u16_le(opcode);
    for arg in args {
        arg.encode(dst);
    }
    dst.put_slice(&COMMAND_FOOTER);
    Ok(())
}

/// Encode and transmit a command frame.
pub fn send_frame(channel: &mut Channel, opcode: u16, args: &[Arg<'_>]) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_frame(opcode, args, &mut buf)?;
    trace!(opcode, len = buf.len(), "send frame");
    channel
        .send(buf.freeze())
        .map_err(|e| FrameError::from(e).at("send_frame"))
}

/// Receive a command frame whose body is matched by `steps`.
pub fn recv_frame(src: &mut dyn Source, steps: &mut [Recv<'_>]) -> Result<()> {
    recv_frame_with(src, &COMMAND_MARKERS, Sync::Strict, DEFAULT_MAX_PAYLOAD, steps)
}

/// Receive one frame delimited by `markers`.
///
/// The declared length is checked against the combinators' minimum size
/// before any body byte is consumed. The body is then read in full and the
/// combinators run against it, so they can never consume past the declared
/// length. Body bytes they leave untouched are skipped.
pub fn recv_frame_with(
    src: &mut dyn Source,
    markers: &Markers,
    sync: Sync,
    max_payload: usize,
    steps: &mut [Recv<'_>],
) -> Result<()> {
    match sync {
        Sync::Strict => recv::expect(src, &markers.header, "header")?,
        Sync::Scan => recv::find(src, &markers.header, "header")?,
    }

    let mut len = [0u8; 2];
    src.fill(&mut len).map_err(|e| e.at("length"))?;
    let len = usize::from(u16::from_le_bytes(len));

    let needed = recv::total_size(steps);
    if needed > len {
        return Err(FrameError::malformed(
            "length",
            format!("frame declares {len} bytes but {needed} are required"),
        ));
    }
    if len > max_payload {
        return Err(FrameError::malformed(
            "length",
            format!("frame declares {len} bytes, limit is {max_payload}"),
        ));
    }

    let mut body = vec![0u8; len];
    src.fill(&mut body).map_err(|e| e.at("payload"))?;

    let mut payload = Payload::new(&body);
    recv::run_all(&mut payload, steps)?;
    if let Some(left) = payload.remaining().filter(|left| *left > 0) {
        trace!(left, "skipping unconsumed frame bytes");
    }

    recv::expect(src, &markers.footer, "footer")
}

/// Decode a command frame from a buffer.
///
/// Leading bytes that cannot start a frame are discarded. Returns `Ok(None)`
/// if the buffer doesn't contain a complete frame yet. On success, consumes
/// the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    match src
        .windows(COMMAND_HEADER.len())
        .position(|w| w == COMMAND_HEADER)
    {
        Some(start) => src.advance(start),
        None => {
            let keep = src.len().min(COMMAND_HEADER.len() - 1);
            src.advance(src.len() - keep);
            return Ok(None);
        }
    }

    if src.len() < 6 {
        return Ok(None);
    }

    let body = usize::from(u16::from_le_bytes([src[4], src[5]]));
    if body < 2 || body > max_payload {
        src.advance(1);
        return Err(FrameError::malformed(
            "length",
            format!("frame declares {body} bytes"),
        ));
    }

    let total = FRAME_OVERHEAD + body;
    if src.len() < total {
        return Ok(None);
    }

    if src[6 + body..total] != COMMAND_FOOTER {
        let found = src[6 + body..total].to_vec();
        src.advance(1);
        return Err(FrameError::Mismatch {
            location: "footer",
            expected: COMMAND_FOOTER.to_vec(),
            found,
        });
    }

    src.advance(6);
    let opcode = src.get_u16_le();
    let payload = src.split_to(body - 2).freeze();
    src.advance(COMMAND_FOOTER.len());

    Ok(Some(Frame { opcode, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;

    fn encoded(opcode: u16, args: &[Arg<'_>]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(opcode, args, &mut buf).expect("should encode frame");
        buf
    }

    #[test]
    fn read_base_params_request_layout() {
        let buf = encoded(0x0073, &[]);
        assert_eq!(
            buf.as_ref(),
            &[0xFD, 0xFC, 0xFB, 0xFA, 0x02, 0x00, 0x73, 0x00, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn roundtrip_reproduces_opcode_and_arguments() {
        let cases: Vec<(u16, u8, u16, u32, [u8; 3])> = vec![
            (0x0000, 0, 0, 0, [0; 3]),
            (0x0067, 1, 0x0102, 0x0A0B0C0D, [7, 8, 9]),
            (0xFFFF, 0xFF, 0xFFFF, u32::MAX, [0xFF; 3]),
            (0x00A5, 0x80, 0x8000, 0x8000_0000, [1, 0, 1]),
        ];

        for (opcode, a, b, c, d) in cases {
            let mut buf = encoded(
                opcode,
                &[Arg::value(a), Arg::value(b), Arg::value(c), Arg::value(d)],
            );
            let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
                .expect("should decode frame")
                .expect("should hold a complete frame");
            assert!(buf.is_empty());
            assert_eq!(frame.opcode, opcode);
            assert_eq!(frame.wire_size(), FRAME_OVERHEAD + 2 + 10);

            let (mut ra, mut rb, mut rc, mut rd) = (0u8, 0u16, 0u32, [0u8; 3]);
            {
                let mut steps = [
                    Recv::value(&mut ra, "a"),
                    Recv::value(&mut rb, "b"),
                    Recv::value(&mut rc, "c"),
                    Recv::value(&mut rd, "d"),
                ];
                recv::run_all(&mut frame.args(), &mut steps).expect("should run receive steps");
            }
            assert_eq!((ra, rb, rc, rd), (a, b, c, d));
        }
    }

    #[test]
    fn recv_frame_matches_body_and_footer() {
        let buf = encoded(0x0173, &[Arg::value(0u16), Arg::value([1u8, 8, 5, 0, 1])]);
        let mut src = Payload::new(&buf);

        let mut ack = 0u16;
        let mut params = [0u8; 5];
        {
            let mut steps = [
                Recv::value(&mut ack, "ack"),
                Recv::skip(2),
                Recv::value(&mut params, "params"),
            ];
            recv_frame(&mut src, &mut steps).expect("should receive frame");
        }
        assert_eq!(ack, 0x0173);
        assert_eq!(params, [1, 8, 5, 0, 1]);
        assert!(src.is_exhausted());
    }

    #[test]
    fn short_length_is_malformed_and_body_untouched() {
        for declared in 0u16..6 {
            let mut wire = BytesMut::new();
            wire.put_slice(&COMMAND_HEADER);
            wire.put_u16_le(declared);
            wire.put_slice(&[0xEE; 16]);
            wire.put_slice(&COMMAND_FOOTER);

            let mut src = Payload::new(&wire);
            let (mut a, mut b, mut c) = (0u16, 0u16, 0u16);
            let err = {
                let mut steps = [
                    Recv::value(&mut a, "a"),
                    Recv::value(&mut b, "b"),
                    Recv::value(&mut c, "c"),
                ];
                recv_frame(&mut src, &mut steps).expect_err("should fail to receive")
            };
            assert!(matches!(
                err,
                FrameError::Malformed {
                    location: "length",
                    ..
                }
            ));
            assert_eq!(src.position(), COMMAND_HEADER.len() + 2);
            assert_eq!((a, b, c), (0, 0, 0));
        }
    }

    #[test]
    fn combinators_cannot_overrun_declared_length() {
        let mut wire = BytesMut::new();
        wire.put_slice(&COMMAND_HEADER);
        wire.put_u16_le(3);
        wire.put_slice(b"ab,cd");
        wire.put_slice(&COMMAND_FOOTER);

        let mut src = Payload::new(&wire);
        let mut token = Vec::new();
        let err = {
            let mut steps = [Recv::find(&b"cd"[..], "label"), Recv::until(&mut token, b',', 8, "token")];
            recv_frame(&mut src, &mut steps).expect_err("should fail to receive")
        };
        assert!(matches!(err, FrameError::NotFound { .. }));
        assert_eq!(src.position(), COMMAND_HEADER.len() + 2 + 3);
    }

    #[test]
    fn unconsumed_body_bytes_are_skipped() {
        let buf = encoded(0x0173, &[Arg::value(0u16), Arg::value(0xDEADBEEFu32)]);
        let mut src = Payload::new(&buf);
        let mut opcode = 0u16;
        recv_frame(&mut src, &mut [Recv::value(&mut opcode, "ack")]).expect("should receive frame");
        assert_eq!(opcode, 0x0173);
        assert!(src.is_exhausted());
    }

    #[test]
    fn scan_sync_skips_noise_before_report_header() {
        let mut wire = BytesMut::from(&[0x00, 0x13, 0xF4][..]);
        wire.put_slice(&REPORT_HEADER);
        wire.put_u16_le(1);
        wire.put_u8(0x02);
        wire.put_slice(&REPORT_FOOTER);

        let mut src = Payload::new(&wire);
        let mut kind = 0u8;
        recv_frame_with(
            &mut src,
            &REPORT_MARKERS,
            Sync::Scan,
            DEFAULT_MAX_PAYLOAD,
            &mut [Recv::value(&mut kind, "kind")],
        )
        .expect("should receive frame");
        assert_eq!(kind, 2);
    }

    #[test]
    fn footer_mismatch_is_reported() {
        let mut wire = encoded(0x00FE, &[]);
        let last = wire.len() - 1;
        wire[last] = 0x00;
        let mut src = Payload::new(&wire);
        let err = recv_frame(&mut src, &mut []).expect_err("should fail to receive");
        assert!(matches!(
            err,
            FrameError::Mismatch {
                location: "footer",
                ..
            }
        ));
    }

    #[test]
    fn decode_resyncs_past_garbage() {
        let mut buf = BytesMut::from(&[0x11, 0x22, 0x33][..]);
        buf.extend_from_slice(&encoded(0x01FF, &[Arg::value(1u16)]));

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .expect("should decode frame")
            .expect("should hold a complete frame");
        assert!(frame.is_ack());
        assert_eq!(frame.command(), 0x00FF);
        assert_eq!(u16::decode(&frame.payload), 1);
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let full = encoded(0x00A3, &[]);
        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).expect("should decode frame").is_none());
        buf.extend_from_slice(&full[full.len() - 1..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).expect("should decode frame").is_some());
    }

    #[test]
    fn decode_rejects_oversized_length() {
        let mut buf = BytesMut::new();
        buf.put_slice(&COMMAND_HEADER);
        buf.put_u16_le(4096);
        let err = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).expect_err("should reject frame");
        assert!(matches!(err, FrameError::Malformed { .. }));
    }

    #[test]
    fn decode_drops_noise_without_header() {
        let mut buf = BytesMut::from(&[1u8, 2, 3, 4, 5, 0xFD, 0xFC][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).expect("should decode frame").is_none());
        assert_eq!(buf.as_ref(), &[5, 0xFD, 0xFC]);
    }
}
