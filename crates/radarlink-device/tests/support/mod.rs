//! Scripted fake sensors on the far end of a `UnixStream` pair.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use radarlink_device::{opcode, EngineConfig, HandshakeConfig, SensorConfig};
use radarlink_frame::{
    decode_frame, decode_line, encode_frame, Arg, Frame, ACK_BIT, DEFAULT_MAX_PAYLOAD,
    REPORT_FOOTER, REPORT_HEADER,
};
use radarlink_transport::{Channel, ChannelConfig};

/// Short waits so failing exchanges don't stall the suite.
pub fn fast_config() -> SensorConfig {
    let wait = Duration::from_millis(250);
    SensorConfig {
        channel: ChannelConfig {
            default_wait: wait,
            ..ChannelConfig::default()
        },
        engine: EngineConfig {
            turnaround: wait,
            max_retry: 1,
            retry_backoff: Duration::from_millis(5),
        },
        handshake: HandshakeConfig {
            protocol_version: 1,
            wake_delay: Duration::from_millis(20),
        },
        restart_settle: Duration::from_millis(10),
        restart_timeout: Duration::from_secs(1),
        factory_reset_wait: Duration::from_millis(400),
        default_wait: wait,
        ..SensorConfig::default()
    }
}

/// Bytes to write after a pause.
type Output = Vec<(Duration, Vec<u8>)>;

struct Device {
    writer: UnixStream,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Device {
    fn spawn(
        config: &SensorConfig,
        mut on_input: impl FnMut(&mut BytesMut) -> Output + Send + 'static,
    ) -> (Channel, Device) {
        let (host, mut remote) = UnixStream::pair().expect("should create socket pair");
        let channel =
            Channel::with_config(host, config.channel.clone()).expect("should open channel");
        remote
            .set_read_timeout(Some(Duration::from_millis(5)))
            .expect("should set read timeout");
        let writer = remote.try_clone().expect("should clone stream");
        let mut out = remote.try_clone().expect("should clone stream");
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();

        let handle = thread::spawn(move || {
            let mut pending = BytesMut::new();
            let mut chunk = [0u8; 256];
            while !stopped.load(Ordering::SeqCst) {
                match remote.read(&mut chunk) {
                    Ok(0) => return,
                    Ok(n) => pending.extend_from_slice(&chunk[..n]),
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        continue
                    }
                    Err(_) => return,
                }
                for (pause, bytes) in on_input(&mut pending) {
                    thread::sleep(pause);
                    if out.write_all(&bytes).is_err() {
                        return;
                    }
                }
            }
        });

        let device = Device {
            writer,
            stop,
            handle: Some(handle),
        };
        (channel, device)
    }

    fn emit(&self, bytes: &[u8]) {
        (&self.writer).write_all(bytes).expect("should write to host");
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A basic telemetry frame.
pub fn basic_report(state: u8, move_cm: u16, still_cm: u16, energy: u8) -> Vec<u8> {
    let mut body = vec![0x02, 0xAA, state];
    body.extend(move_cm.to_le_bytes());
    body.push(energy);
    body.extend(still_cm.to_le_bytes());
    body.push(energy);
    body.extend([0x55, 0x00]);

    let mut frame = REPORT_HEADER.to_vec();
    frame.extend((body.len() as u16).to_le_bytes());
    frame.extend(body);
    frame.extend(REPORT_FOOTER);
    frame
}

/// Configuration held by the fake binary sensor.
#[derive(Debug, Clone)]
pub struct BinaryState {
    pub requests: Vec<Frame>,
    pub command_mode: bool,
    pub engineering: bool,
    pub protocol_version: u16,
    pub base: [u8; 5],
    pub resolution: u16,
    pub move_thresholds: [u8; 14],
    pub still_thresholds: [u8; 14],
    pub bluetooth: bool,
    pub baud_index: u16,
    /// Status returned for an opcode instead of handling it.
    pub status_for: HashMap<u16, u16>,
    /// Requests of an opcode to ignore, counted down.
    pub silent_for: HashMap<u16, u32>,
    /// Read-back of a threshold table reports this value at gate 0.
    pub sticky_gate0: Option<u8>,
    /// Background analysis polls left before it reports idle.
    pub analysis_polls: u16,
}

impl Default for BinaryState {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            command_mode: false,
            engineering: false,
            protocol_version: 1,
            base: [1, 12, 5, 0, 0],
            resolution: 0,
            move_thresholds: [50; 14],
            still_thresholds: [40; 14],
            bluetooth: true,
            baud_index: 7,
            status_for: HashMap::new(),
            silent_for: HashMap::new(),
            sticky_gate0: None,
            analysis_polls: 0,
        }
    }
}

fn ack(opcode: u16, status: u16, args: Vec<Arg<'static>>) -> Vec<u8> {
    let mut all = vec![Arg::value(status)];
    all.extend(args);
    let mut buf = BytesMut::new();
    encode_frame(opcode | ACK_BIT, &all, &mut buf).expect("should encode reply");
    buf.to_vec()
}

fn now(bytes: Vec<u8>) -> Output {
    vec![(Duration::ZERO, bytes)]
}

impl BinaryState {
    fn table(&self, values: [u8; 14]) -> [u8; 14] {
        let mut values = values;
        if let Some(v) = self.sticky_gate0 {
            values[0] = v;
        }
        values
    }

    fn handle(&mut self, frame: Frame) -> Output {
        let op = frame.opcode;
        let payload = frame.payload.clone();
        self.requests.push(frame);

        if let Some(left) = self.silent_for.get_mut(&op) {
            if *left > 0 {
                *left -= 1;
                return Vec::new();
            }
        }
        if let Some(&status) = self.status_for.get(&op) {
            return now(ack(op, status, Vec::new()));
        }
        if op != opcode::OPEN_COMMAND_MODE && !self.command_mode {
            return now(ack(op, 1, Vec::new()));
        }

        let ok = |args| now(ack(op, 0, args));
        match op {
            opcode::OPEN_COMMAND_MODE => {
                self.command_mode = true;
                ok(vec![Arg::value(self.protocol_version), Arg::value(64u16)])
            }
            opcode::CLOSE_COMMAND_MODE => {
                self.command_mode = false;
                ok(Vec::new())
            }
            opcode::READ_VERSION => ok(vec![
                Arg::value(0x2412u16),
                Arg::value([0x02u8, 0x01]),
                Arg::value(0x0000_0010u32),
            ]),
            opcode::READ_BASE_PARAMS => ok(vec![Arg::value(self.base)]),
            opcode::WRITE_BASE_PARAMS => {
                self.base.copy_from_slice(&payload[..5]);
                ok(Vec::new())
            }
            opcode::READ_DISTANCE_RESOLUTION => {
                ok(vec![Arg::value(self.resolution), Arg::value([0u8; 4])])
            }
            opcode::SET_DISTANCE_RESOLUTION => {
                self.resolution = u16::from_le_bytes([payload[0], payload[1]]);
                ok(Vec::new())
            }
            opcode::READ_MOVE_THRESHOLDS => ok(vec![Arg::value(self.table(self.move_thresholds))]),
            opcode::READ_STILL_THRESHOLDS => {
                ok(vec![Arg::value(self.table(self.still_thresholds))])
            }
            opcode::SET_MOVE_THRESHOLDS => {
                self.move_thresholds.copy_from_slice(&payload[..14]);
                ok(Vec::new())
            }
            opcode::SET_STILL_THRESHOLDS => {
                self.still_thresholds.copy_from_slice(&payload[..14]);
                ok(Vec::new())
            }
            opcode::ENTER_ENGINEERING => {
                self.engineering = true;
                ok(Vec::new())
            }
            opcode::LEAVE_ENGINEERING => {
                self.engineering = false;
                ok(Vec::new())
            }
            opcode::READ_MAC => ok(vec![Arg::value([0x8c, 0x4b, 0x14, 0x01, 0x02, 0x03])]),
            opcode::BLUETOOTH => {
                self.bluetooth = payload[0] != 0;
                ok(Vec::new())
            }
            opcode::SET_BAUD_RATE => {
                self.baud_index = u16::from_le_bytes([payload[0], payload[1]]);
                ok(Vec::new())
            }
            opcode::FACTORY_RESET => {
                let requests = std::mem::take(&mut self.requests);
                *self = BinaryState {
                    requests,
                    command_mode: true,
                    ..BinaryState::default()
                };
                ok(Vec::new())
            }
            opcode::START_BACKGROUND_ANALYSIS => {
                self.analysis_polls = 1;
                ok(Vec::new())
            }
            opcode::QUERY_BACKGROUND_ANALYSIS => {
                let active = u16::from(self.analysis_polls > 0);
                self.analysis_polls = self.analysis_polls.saturating_sub(1);
                ok(vec![Arg::value(active)])
            }
            opcode::RESTART => {
                self.command_mode = false;
                self.engineering = false;
                vec![(Duration::from_millis(30), basic_report(0, 0, 0, 0))]
            }
            _ => now(ack(op, 1, Vec::new())),
        }
    }
}

/// Binary-framed fake sensor.
pub struct FakeBinary {
    pub state: Arc<Mutex<BinaryState>>,
    device: Device,
}

impl FakeBinary {
    pub fn spawn(config: &SensorConfig) -> (Channel, FakeBinary) {
        Self::spawn_with(config, BinaryState::default())
    }

    pub fn spawn_with(config: &SensorConfig, state: BinaryState) -> (Channel, FakeBinary) {
        let state = Arc::new(Mutex::new(state));
        let shared = state.clone();
        let (channel, device) = Device::spawn(config, move |pending| {
            let mut out = Output::new();
            while let Ok(Some(frame)) = decode_frame(pending, DEFAULT_MAX_PAYLOAD) {
                out.extend(shared.lock().expect("should lock state").handle(frame));
            }
            out
        });
        (channel, FakeBinary { state, device })
    }

    /// Opcodes received so far.
    pub fn opcodes(&self) -> Vec<u16> {
        self.with_state(|s| s.requests.iter().map(|f| f.opcode).collect())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut BinaryState) -> R) -> R {
        f(&mut self.state.lock().expect("should lock state"))
    }

    /// Push unsolicited bytes to the host.
    pub fn emit(&self, bytes: &[u8]) {
        self.device.emit(bytes);
    }
}

/// Configuration held by the fake line-protocol sensor.
#[derive(Debug, Clone)]
pub struct AsciiState {
    pub lines: Vec<String>,
    pub running: bool,
    pub range: (f32, f32),
    pub trigger: f32,
    pub latency: (f32, f32),
    pub sensitivity: (u8, u8),
    pub inhibit: f32,
    pub saves: u32,
    /// Commands answered with `Error`, counted down.
    pub reject: HashMap<String, u32>,
}

impl Default for AsciiState {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            running: true,
            range: (0.6, 6.0),
            trigger: 6.0,
            latency: (0.0, 0.5),
            sensitivity: (7, 7),
            inhibit: 1.0,
            saves: 0,
            reject: HashMap::new(),
        }
    }
}

fn parsed<T: std::str::FromStr + Default>(words: &[&str], i: usize) -> T {
    words
        .get(i)
        .and_then(|w| w.parse().ok())
        .unwrap_or_default()
}

impl AsciiState {
    fn handle(&mut self, line: String) -> Output {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = words.first().copied().unwrap_or_default().to_string();
        self.lines.push(line.clone());

        let echo = format!("${line}\r\n");
        let reply = |body: String| now(format!("{echo}{body}").into_bytes());
        let done = |value: Option<String>| match value {
            Some(text) => reply(format!("{text}\r\nDone\r\n")),
            None => reply("Done\r\n".to_string()),
        };

        if let Some(left) = self.reject.get_mut(&command) {
            if *left > 0 {
                *left -= 1;
                return reply("Error\r\n".to_string());
            }
        }
        let needs_stop = command.starts_with("set") || command == "saveConfig" || command == "resetCfg";
        if needs_stop && self.running {
            return reply("Error\r\n".to_string());
        }

        match command.as_str() {
            "sensorStop" => {
                self.running = false;
                done(None)
            }
            "sensorStart" => {
                self.running = true;
                done(None)
            }
            "getHWV" => done(Some("HardwareVersion:V1.0".to_string())),
            "getSWV" => done(Some("SoftwareVersion:V4.0.1".to_string())),
            "getRange" => done(Some(format!("Response {:.3} {:.3}", self.range.0, self.range.1))),
            "getTrigRange" => done(Some(format!("Response {:.3}", self.trigger))),
            "getLatency" => done(Some(format!(
                "Response {:.3} {:.3}",
                self.latency.0, self.latency.1
            ))),
            "getSensitivity" => done(Some(format!(
                "Response {} {}",
                self.sensitivity.0, self.sensitivity.1
            ))),
            "getInhibit" => done(Some(format!("Response {:.3}", self.inhibit))),
            "setRange" => {
                self.range = (parsed(&words, 1), parsed(&words, 2));
                done(None)
            }
            "setTrigRange" => {
                self.trigger = parsed(&words, 1);
                done(None)
            }
            "setLatency" => {
                self.latency = (parsed(&words, 1), parsed(&words, 2));
                done(None)
            }
            "setSensitivity" => {
                self.sensitivity = (parsed(&words, 1), parsed(&words, 2));
                done(None)
            }
            "setInhibit" => {
                self.inhibit = parsed(&words, 1);
                done(None)
            }
            "saveConfig" => {
                self.saves += 1;
                done(None)
            }
            "resetCfg" => {
                let lines = std::mem::take(&mut self.lines);
                *self = AsciiState {
                    lines,
                    running: false,
                    ..AsciiState::default()
                };
                done(None)
            }
            "resetSystem" => {
                self.running = true;
                vec![(Duration::from_millis(30), b"$DFHPD,0, , , *\r\n".to_vec())]
            }
            _ => reply("Error\r\n".to_string()),
        }
    }
}

/// Line-protocol fake sensor.
pub struct FakeAscii {
    pub state: Arc<Mutex<AsciiState>>,
    device: Device,
}

impl FakeAscii {
    pub fn spawn(config: &SensorConfig) -> (Channel, FakeAscii) {
        Self::spawn_with(config, AsciiState::default())
    }

    pub fn spawn_with(config: &SensorConfig, state: AsciiState) -> (Channel, FakeAscii) {
        let state = Arc::new(Mutex::new(state));
        let shared = state.clone();
        let (channel, device) = Device::spawn(config, move |pending| {
            let mut out = Output::new();
            while let Some(line) = decode_line(pending) {
                out.extend(shared.lock().expect("should lock state").handle(line));
            }
            out
        });
        (channel, FakeAscii { state, device })
    }

    /// Command words received so far.
    pub fn commands(&self) -> Vec<String> {
        self.with_state(|s| {
            s.lines
                .iter()
                .filter_map(|l| l.split_whitespace().next().map(str::to_string))
                .collect()
        })
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut AsciiState) -> R) -> R {
        f(&mut self.state.lock().expect("should lock state"))
    }

    pub fn emit(&self, bytes: &[u8]) {
        self.device.emit(bytes);
    }
}
