//! Telemetry frames.

use radarlink_frame::{
    codec, recv, FrameError, Recv, Source, Sync, DEFAULT_MAX_PAYLOAD, LINE_END, REPORT_MARKERS,
};
use serde::Serialize;

type FrameResult<T> = std::result::Result<T, FrameError>;

/// Number of distance gates.
pub const GATES: usize = 14;

pub const KIND_ENGINEERING: u8 = 0x01;
pub const KIND_BASIC: u8 = 0x02;

const REPORT_HEAD: &[u8] = &[0xAA];
const REPORT_TAIL: u8 = 0x55;
const ENGINEERING_LEN: usize = 2 + 2 * GATES;

/// Presence state reported by a binary sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    #[default]
    None,
    Moving,
    Still,
    MovingAndStill,
}

impl TargetState {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(TargetState::None),
            1 => Some(TargetState::Moving),
            2 => Some(TargetState::Still),
            3 => Some(TargetState::MovingAndStill),
            _ => None,
        }
    }

    pub fn is_present(self) -> bool {
        self != TargetState::None
    }
}

/// Per-gate energies, only sent in engineering mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineeringData {
    pub max_move_gate: u8,
    pub max_still_gate: u8,
    pub move_energy: [u8; GATES],
    pub still_energy: [u8; GATES],
}

/// One decoded target report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub state: TargetState,
    /// Centimetres.
    pub move_distance: u16,
    pub move_energy: u8,
    /// Centimetres.
    pub still_distance: u16,
    pub still_energy: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engineering: Option<EngineeringData>,
}

/// Read the next target report, skipping anything before its header.
pub fn read_report(src: &mut dyn Source) -> FrameResult<TargetReport> {
    let mut kind = 0u8;
    let mut state = 0u8;
    let mut report = TargetReport::default();
    let mut tail = Vec::new();
    {
        let mut steps = [
            Recv::value(&mut kind, "kind"),
            Recv::expect(REPORT_HEAD, "report_head"),
            Recv::checked(&mut state, |s: &u8| *s <= 3, "state"),
            Recv::value(&mut report.move_distance, "move_distance"),
            Recv::value(&mut report.move_energy, "move_energy"),
            Recv::value(&mut report.still_distance, "still_distance"),
            Recv::value(&mut report.still_energy, "still_energy"),
            Recv::rest(&mut tail),
        ];
        codec::recv_frame_with(src, &REPORT_MARKERS, Sync::Scan, DEFAULT_MAX_PAYLOAD, &mut steps)?;
    }
    report.state = TargetState::from_raw(state).unwrap_or_default();

    let expected = match kind {
        KIND_BASIC => 2,
        KIND_ENGINEERING => ENGINEERING_LEN + 2,
        other => return Err(FrameError::invalid_value("kind", format!("{other:#04x}"))),
    };
    if tail.len() != expected {
        return Err(FrameError::malformed(
            "report",
            format!("kind {kind:#04x} needs {expected} trailing bytes, got {}", tail.len()),
        ));
    }
    if tail[expected - 2] != REPORT_TAIL {
        return Err(FrameError::Mismatch {
            location: "report_tail",
            expected: vec![REPORT_TAIL],
            found: vec![tail[expected - 2]],
        });
    }

    if kind == KIND_ENGINEERING {
        let mut eng = EngineeringData {
            max_move_gate: tail[0],
            max_still_gate: tail[1],
            ..EngineeringData::default()
        };
        eng.move_energy.copy_from_slice(&tail[2..2 + GATES]);
        eng.still_energy.copy_from_slice(&tail[2 + GATES..ENGINEERING_LEN]);
        report.engineering = Some(eng);
    }
    Ok(report)
}

/// Presence line sent by an ASCII sensor: `$DFHPD,<0|1>, , , *`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Presence {
    pub present: bool,
}

pub const PRESENCE_PREFIX: &[u8] = b"$DFHPD,";

/// Read the next presence line, skipping anything before it.
pub fn read_presence(src: &mut dyn Source) -> FrameResult<Presence> {
    let mut flag = 0u8;
    {
        let mut steps = [
            Recv::find(PRESENCE_PREFIX, "presence_prefix"),
            Recv::checked(&mut flag, |f: &u8| matches!(*f, b'0' | b'1'), "presence"),
            Recv::find(LINE_END, "presence_end"),
        ];
        recv::run_all(src, &mut steps)?;
    }
    Ok(Presence {
        present: flag == b'1',
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use radarlink_frame::Payload;

    const BASIC: [u8; 21] = [
        0xf4, 0xf3, 0xf2, 0xf1, 0x0b, 0x00, 0x02, 0xaa, 0x02, 0x00, 0x00, 0x00, 0xa0, 0x00, 0x64,
        0x55, 0x00, 0xf8, 0xf7, 0xf6, 0xf5,
    ];

    #[test]
    fn decodes_basic_report() {
        let report = read_report(&mut Payload::new(&BASIC)).expect("should read report");
        assert_eq!(
            report,
            TargetReport {
                state: TargetState::Still,
                move_distance: 0,
                move_energy: 0,
                still_distance: 160,
                still_energy: 100,
                engineering: None,
            }
        );
    }

    #[test]
    fn skips_noise_before_header() {
        let mut wire = vec![0x00, 0xf4, 0x13];
        wire.extend_from_slice(&BASIC);
        let report = read_report(&mut Payload::new(&wire)).expect("should read report");
        assert!(report.state.is_present());
    }

    #[test]
    fn decodes_engineering_report() {
        let mut body = vec![KIND_ENGINEERING, 0xaa, 0x01, 0x50, 0x00, 0x3c, 0x00, 0x00, 0x00, 0x0d, 0x0c];
        body.extend((0..GATES as u8).map(|g| g * 2));
        body.extend((0..GATES as u8).map(|g| 100 - g));
        body.extend([0x55, 0x00]);

        let mut wire = vec![0xf4, 0xf3, 0xf2, 0xf1];
        wire.extend((body.len() as u16).to_le_bytes());
        wire.extend(&body);
        wire.extend([0xf8, 0xf7, 0xf6, 0xf5]);

        let report = read_report(&mut Payload::new(&wire)).expect("should read report");
        assert_eq!(report.state, TargetState::Moving);
        assert_eq!(report.move_distance, 80);
        assert_eq!(report.move_energy, 60);
        let eng = report.engineering.expect("should carry engineering data");
        assert_eq!(eng.max_move_gate, 13);
        assert_eq!(eng.max_still_gate, 12);
        assert_eq!(eng.move_energy[13], 26);
        assert_eq!(eng.still_energy[0], 100);
    }

    #[test]
    fn engineering_kind_with_basic_length_is_malformed() {
        let mut wire = BASIC;
        wire[6] = KIND_ENGINEERING;
        let err = read_report(&mut Payload::new(&wire)).expect_err("should reject report");
        assert!(matches!(err, FrameError::Malformed { location: "report", .. }));
    }

    #[test]
    fn reads_presence_lines() {
        let mut src = Payload::new(b"$DFHPD,0, , , *\r\n$DFHPD,1, , , *\r\n");
        assert!(!read_presence(&mut src).expect("should read presence").present);
        assert!(read_presence(&mut src).expect("should read presence").present);
        assert!(src.is_exhausted());
    }

    #[test]
    fn rejects_unknown_presence_flag() {
        let mut src = Payload::new(b"$DFHPD,7, , , *\r\n");
        let err = read_presence(&mut src).expect_err("should reject line");
        assert!(matches!(err, FrameError::InvalidValue { location: "presence", .. }));
    }
}
