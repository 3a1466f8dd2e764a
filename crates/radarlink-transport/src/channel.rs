use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{
    self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::port::{is_idle, Port};
use crate::ring::CaptureRing;

/// Default wait applied to blocking operations.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(350);

/// Configuration for a [`Channel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Wait used by blocking operations when the caller passes `None`.
    pub default_wait: Duration,
    /// Upper bound for a single port read inside the receive pump.
    pub poll_interval: Duration,
    /// Number of received chunks that may queue up before the pump blocks.
    /// In capture mode a full queue never blocks the pump.
    pub rx_queue_depth: usize,
    /// Size of a single port read.
    pub read_chunk: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_wait: DEFAULT_WAIT,
            poll_interval: Duration::from_millis(10),
            rx_queue_depth: 64,
            read_chunk: 64,
        }
    }
}

/// Byte counters for a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
}

enum RxEvent {
    Data(Bytes),
    /// Bytes held back while the queue was full, with the count of older
    /// bytes discarded to keep them within the capture capacity.
    Backlog { bytes: Bytes, dropped: usize },
    Barrier(u64),
    Closed,
    Failed(io::Error),
}

enum RxControl {
    Barrier(u64),
}

/// A duplex byte channel over a [`Port`].
///
/// Reception and transmission are driven by two worker threads that talk to
/// the channel through bounded queues. The channel itself is a single-owner
/// resource: every blocking call suspends only the caller and gives up when
/// its wait elapses.
///
/// Two receive modes are supported:
/// - synchronous (default): received chunks stay queued until a read needs
///   them, so an idle consumer back-pressures the link;
/// - capture: every queued chunk is moved into a fixed-size [`CaptureRing`]
///   on each call, discarding the oldest bytes when the ring is full. The
///   pump keeps reading while the queue is full and holds at most one ring's
///   worth of the newest bytes until the queue has room again.
pub struct Channel {
    name: String,
    tx_jobs: SyncSender<Bytes>,
    tx_done: Receiver<io::Result<()>>,
    tx_pending: bool,
    rx: Receiver<RxEvent>,
    rx_control: Sender<RxControl>,
    rx_closed: bool,
    staging: BytesMut,
    capture: Option<CaptureRing>,
    capture_limit: Arc<AtomicUsize>,
    peeked: Option<u8>,
    default_wait: Duration,
    next_barrier: u64,
    stats: ChannelStats,
    shutdown: Arc<AtomicBool>,
}

impl Channel {
    /// Start a channel over `port` with the default configuration.
    pub fn open(port: impl Port) -> Result<Self> {
        Self::with_config(port, ChannelConfig::default())
    }

    /// Start a channel over `port`.
    ///
    /// The port is cloned once: the clone feeds the receive pump and the
    /// original handle is moved to the transmit worker.
    pub fn with_config(port: impl Port, config: ChannelConfig) -> Result<Self> {
        let name = port.describe();
        let mut reader = port
            .try_clone_port()
            .map_err(|e| TransportError::io("Channel::open", e))?;
        reader
            .set_poll_timeout(config.poll_interval)
            .map_err(|e| TransportError::io("Channel::open", e))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let capture_limit = Arc::new(AtomicUsize::new(0));
        let (rx_tx, rx) = mpsc::sync_channel(config.rx_queue_depth.max(1));
        let (rx_control, control_rx) = mpsc::channel();
        let (tx_jobs, job_rx) = mpsc::sync_channel::<Bytes>(1);
        let (done_tx, tx_done) = mpsc::sync_channel(1);

        let pump = RxPump {
            chunk: config.read_chunk.max(1),
            events: rx_tx,
            control: control_rx,
            shutdown: shutdown.clone(),
            capture_limit: capture_limit.clone(),
        };
        thread::Builder::new()
            .name(format!("radarlink-rx:{name}"))
            .spawn(move || pump.run(reader))
            .map_err(|e| TransportError::io("Channel::open", e))?;

        thread::Builder::new()
            .name(format!("radarlink-tx:{name}"))
            .spawn(move || tx_worker(port, job_rx, done_tx))
            .map_err(|e| TransportError::io("Channel::open", e))?;

        debug!(port = %name, "channel opened");

        Ok(Self {
            name,
            tx_jobs,
            tx_done,
            tx_pending: false,
            rx,
            rx_control,
            rx_closed: false,
            staging: BytesMut::new(),
            capture: None,
            capture_limit,
            peeked: None,
            default_wait: config.default_wait,
            next_barrier: 0,
            stats: ChannelStats::default(),
            shutdown,
        })
    }

    /// Name of the underlying port.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_wait(&self) -> Duration {
        self.default_wait
    }

    pub fn set_default_wait(&mut self, wait: Duration) {
        self.default_wait = wait;
    }

    /// Run `f` with a temporary default wait, restoring the previous one
    /// afterwards.
    pub fn with_wait<T>(&mut self, wait: Duration, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.default_wait, wait);
        let out = f(self);
        self.default_wait = previous;
        out
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Queue `bytes` for transmission.
    ///
    /// Waits up to the default wait for the previous transmission to finish
    /// and reports its failure, if any, before accepting the new one.
    pub fn send(&mut self, bytes: impl Into<Bytes>) -> Result<()> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Ok(());
        }
        if self.tx_pending {
            self.complete_tx("Channel::send")?;
        }

        trace!(port = %self.name, bytes = ?bytes.as_ref(), "tx");
        let len = bytes.len() as u64;
        self.tx_jobs.try_send(bytes).map_err(|_| TransportError::Closed {
            location: "Channel::send",
        })?;
        self.tx_pending = true;
        self.stats.bytes_sent += len;
        Ok(())
    }

    /// Block until everything handed to [`send`](Self::send) has been written.
    pub fn wait_all_sent(&mut self) -> Result<()> {
        if self.tx_pending {
            self.complete_tx("Channel::wait_all_sent")?;
        }
        Ok(())
    }

    fn complete_tx(&mut self, location: &'static str) -> Result<()> {
        let waited = self.default_wait;
        let outcome = match self.tx_done.recv_timeout(waited) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                return Err(TransportError::Timeout { location, waited })
            }
            Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed { location }),
        };
        self.tx_pending = false;
        outcome.map_err(|e| TransportError::io(location, e))
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// `wait` of `None` uses the default wait. A zero wait is a non-blocking
    /// poll that returns whatever is already available. Otherwise the call
    /// blocks until `buf` is full and fails with a timeout if the wait
    /// elapses first; bytes consumed before the timeout are not returned to
    /// the stream.
    pub fn read(&mut self, buf: &mut [u8], wait: Option<Duration>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let wait = wait.unwrap_or(self.default_wait);

        let mut filled = 0;
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            filled = 1;
        }

        if self.capture.is_some() {
            self.absorb_queued("Channel::read")?;
        }
        filled += self.take_buffered(&mut buf[filled..]);

        while filled < buf.len() && self.capture.is_none() {
            match self.rx.try_recv() {
                Ok(event) => self.handle_event(event, "Channel::read")?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.rx_closed = true;
                    break;
                }
            }
            filled += self.take_buffered(&mut buf[filled..]);
        }

        if filled == buf.len() || wait.is_zero() {
            return Ok(filled);
        }

        let deadline = Instant::now() + wait;
        while filled < buf.len() {
            if self.rx_closed {
                return Err(TransportError::Closed {
                    location: "Channel::read",
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout {
                    location: "Channel::read",
                    waited: wait,
                });
            }
            match self.rx.recv_timeout(remaining) {
                Ok(event) => self.handle_event(event, "Channel::read")?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportError::Timeout {
                        location: "Channel::read",
                        waited: wait,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => self.rx_closed = true,
            }
            if self.capture.is_some() {
                self.absorb_queued("Channel::read")?;
            }
            filled += self.take_buffered(&mut buf[filled..]);
        }
        Ok(filled)
    }

    /// Read exactly one byte.
    pub fn read_byte(&mut self, wait: Option<Duration>) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte, wait)? {
            1 => Ok(byte[0]),
            _ => Err(TransportError::Timeout {
                location: "Channel::read_byte",
                waited: Duration::ZERO,
            }),
        }
    }

    /// Look at the next byte without consuming it.
    ///
    /// At most one byte is ever held back; peeking twice returns the same byte.
    pub fn peek_byte(&mut self, wait: Option<Duration>) -> Result<u8> {
        if let Some(byte) = self.peeked {
            return Ok(byte);
        }
        let byte = self.read_byte(wait)?;
        self.peeked = Some(byte);
        Ok(byte)
    }

    /// Number of bytes that can be read without blocking.
    pub fn available(&mut self) -> Result<usize> {
        if self.capture.is_some() {
            self.absorb_queued("Channel::available")?;
        }
        let held = self.capture.as_ref().map_or(self.staging.len(), CaptureRing::len);
        Ok(held + usize::from(self.peeked.is_some()))
    }

    /// Discard every buffered, unread byte.
    ///
    /// Returns the number of bytes thrown away. Fails only if the link has
    /// closed, since nothing can arrive afterwards.
    pub fn flush(&mut self) -> Result<usize> {
        let mut discarded = usize::from(self.peeked.take().is_some()) + self.staging.len();
        self.staging.clear();
        if let Some(ring) = self.capture.as_mut() {
            discarded += ring.len();
            ring.clear();
        }

        loop {
            match self.rx.try_recv() {
                Ok(RxEvent::Data(bytes)) => {
                    self.stats.bytes_received += bytes.len() as u64;
                    discarded += bytes.len();
                }
                Ok(RxEvent::Backlog { bytes, dropped }) => {
                    self.stats.bytes_received += (bytes.len() + dropped) as u64;
                    self.stats.bytes_dropped += dropped as u64;
                    discarded += bytes.len();
                }
                Ok(RxEvent::Barrier(_)) => {}
                Ok(RxEvent::Closed) => self.rx_closed = true,
                Ok(RxEvent::Failed(err)) => {
                    warn!(port = %self.name, error = %err, "receive pump stopped during flush");
                    self.rx_closed = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.rx_closed = true;
                    break;
                }
            }
        }

        if discarded > 0 {
            trace!(port = %self.name, discarded, "flushed");
        }
        if self.rx_closed {
            return Err(TransportError::Closed {
                location: "Channel::flush",
            });
        }
        Ok(discarded)
    }

    /// Switch to continuous capture into a ring of `capacity` bytes.
    ///
    /// Bytes already staged for synchronous reads move into the ring. When
    /// capture is already on with another capacity, the unread bytes and the
    /// overflow flag carry over to the new ring; if they no longer fit, the
    /// oldest are dropped and the overflow flag is latched.
    pub fn enable_capture(&mut self, capacity: usize) {
        if let Some(ring) = &self.capture {
            if ring.capacity() == capacity.max(1) {
                return;
            }
        }
        let mut ring = CaptureRing::with_capacity(capacity);
        let mut dropped = 0;
        if let Some(mut previous) = self.capture.take() {
            let mut unread = vec![0u8; previous.len()];
            previous.pop(&mut unread);
            dropped += ring.push(&unread);
            if previous.overflowed() {
                ring.latch_overflow();
            }
        }
        dropped += ring.push(&self.staging);
        self.staging.clear();
        if dropped > 0 {
            warn!(port = %self.name, dropped, "capture ring resized below unread bytes");
        }
        self.stats.bytes_dropped += dropped as u64;
        self.capture_limit.store(ring.capacity(), Ordering::SeqCst);
        self.capture = Some(ring);
        debug!(port = %self.name, capacity, "capture enabled");
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture.is_some()
    }

    /// Leave capture mode.
    ///
    /// Waits until the receive pump confirms that everything it read before
    /// this call has been delivered, then drops whatever is still unread.
    pub fn disable_capture(&mut self) -> Result<()> {
        if self.capture.is_none() {
            return Ok(());
        }
        self.capture_limit.store(0, Ordering::SeqCst);

        if !self.rx_closed {
            self.next_barrier += 1;
            let id = self.next_barrier;
            if self.rx_control.send(RxControl::Barrier(id)).is_ok() {
                self.await_barrier(id)?;
            }
        }

        if let Some(ring) = self.capture.take() {
            if !ring.is_empty() {
                debug!(port = %self.name, unread = ring.len(), "discarding unread capture bytes");
            }
        }
        debug!(port = %self.name, "capture disabled");
        Ok(())
    }

    fn await_barrier(&mut self, id: u64) -> Result<()> {
        let waited = self.default_wait.max(Duration::from_millis(50));
        let deadline = Instant::now() + waited;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(RxEvent::Barrier(seen)) if seen == id => return Ok(()),
                Ok(event) => self.handle_event(event, "Channel::disable_capture")?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportError::Timeout {
                        location: "Channel::disable_capture",
                        waited,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.rx_closed = true;
                    return Ok(());
                }
            }
            if self.rx_closed {
                return Ok(());
            }
        }
    }

    /// Report and clear the capture overflow flag.
    pub fn take_overflow(&mut self) -> bool {
        self.capture
            .as_mut()
            .is_some_and(CaptureRing::take_overflow)
    }

    fn absorb_queued(&mut self, location: &'static str) -> Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.handle_event(event, location)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    self.rx_closed = true;
                    return Ok(());
                }
            }
        }
    }

    fn handle_event(&mut self, event: RxEvent, location: &'static str) -> Result<()> {
        match event {
            RxEvent::Data(bytes) => {
                trace!(port = %self.name, bytes = ?bytes.as_ref(), "rx");
                self.deliver(&bytes, 0);
                Ok(())
            }
            RxEvent::Backlog { bytes, dropped } => {
                trace!(port = %self.name, bytes = ?bytes.as_ref(), dropped, "rx backlog");
                self.deliver(&bytes, dropped);
                Ok(())
            }
            RxEvent::Barrier(_) => Ok(()),
            RxEvent::Closed => {
                debug!(port = %self.name, "link reached end of stream");
                self.rx_closed = true;
                Ok(())
            }
            RxEvent::Failed(source) => {
                self.rx_closed = true;
                Err(TransportError::Io { location, source })
            }
        }
    }

    /// Store received bytes; `lost` bytes preceding them never made it here.
    fn deliver(&mut self, bytes: &[u8], lost: usize) {
        self.stats.bytes_received += (bytes.len() + lost) as u64;
        self.stats.bytes_dropped += lost as u64;
        match self.capture.as_mut() {
            Some(ring) => {
                let was_overflowed = ring.overflowed();
                if lost > 0 {
                    ring.latch_overflow();
                }
                let dropped = ring.push(bytes);
                self.stats.bytes_dropped += dropped as u64;
                if dropped + lost > 0 && !was_overflowed {
                    warn!(port = %self.name, dropped = dropped + lost, "capture ring overflow");
                }
            }
            None => self.staging.extend_from_slice(bytes),
        }
    }

    fn take_buffered(&mut self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        match self.capture.as_mut() {
            Some(ring) => ring.pop(out),
            None => {
                let n = out.len().min(self.staging.len());
                out[..n].copy_from_slice(&self.staging[..n]);
                self.staging.advance(n);
                n
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        debug!(port = %self.name, "channel closed");
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("port", &self.name)
            .field("default_wait", &self.default_wait)
            .field("capture", &self.capture.as_ref().map(CaptureRing::capacity))
            .field("rx_closed", &self.rx_closed)
            .finish()
    }
}

struct RxPump {
    chunk: usize,
    events: SyncSender<RxEvent>,
    control: Receiver<RxControl>,
    shutdown: Arc<AtomicBool>,
    /// Capture ring capacity, or zero in synchronous mode.
    capture_limit: Arc<AtomicUsize>,
}

/// Newest bytes read while the queue was full.
#[derive(Default)]
struct Backlog {
    bytes: BytesMut,
    dropped: usize,
}

impl Backlog {
    fn is_empty(&self) -> bool {
        self.bytes.is_empty() && self.dropped == 0
    }

    /// Append `data`, keeping only the newest `limit` bytes.
    fn push(&mut self, data: &[u8], limit: usize) {
        self.bytes.extend_from_slice(data);
        let excess = self.bytes.len().saturating_sub(limit.max(1));
        if excess > 0 {
            self.bytes.advance(excess);
            self.dropped += excess;
        }
    }

    fn take(&mut self) -> RxEvent {
        RxEvent::Backlog {
            bytes: self.bytes.split().freeze(),
            dropped: std::mem::take(&mut self.dropped),
        }
    }

    /// Hand the backlog over if the queue has room. Returns `false` once the
    /// channel is gone.
    fn offer(&mut self, events: &SyncSender<RxEvent>) -> bool {
        if self.is_empty() {
            return true;
        }
        match events.try_send(self.take()) {
            Ok(()) => true,
            Err(TrySendError::Full(RxEvent::Backlog { bytes, dropped })) => {
                self.bytes.extend_from_slice(&bytes);
                self.dropped += dropped;
                true
            }
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Hand the backlog over, waiting for room. Returns `false` once the
    /// channel is gone.
    fn deliver(&mut self, events: &SyncSender<RxEvent>) -> bool {
        self.is_empty() || events.send(self.take()).is_ok()
    }
}

impl RxPump {
    fn run(self, mut reader: Box<dyn Port>) {
        let mut buf = vec![0u8; self.chunk];
        let mut backlog = Backlog::default();
        while !self.shutdown.load(Ordering::SeqCst) {
            while let Ok(RxControl::Barrier(id)) = self.control.try_recv() {
                // Held-back bytes were read before the barrier was requested.
                if !backlog.deliver(&self.events) {
                    return;
                }
                if self.events.send(RxEvent::Barrier(id)).is_err() {
                    return;
                }
            }

            let limit = self.capture_limit.load(Ordering::SeqCst);
            let alive = if limit == 0 {
                backlog.deliver(&self.events)
            } else {
                backlog.offer(&self.events)
            };
            if !alive {
                return;
            }

            match reader.read(&mut buf) {
                Ok(0) => {
                    if backlog.deliver(&self.events) {
                        let _ = self.events.send(RxEvent::Closed);
                    }
                    return;
                }
                Ok(n) if limit == 0 => {
                    if self
                        .events
                        .send(RxEvent::Data(Bytes::copy_from_slice(&buf[..n])))
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(n) if !backlog.is_empty() => backlog.push(&buf[..n], limit),
                Ok(n) => match self
                    .events
                    .try_send(RxEvent::Data(Bytes::copy_from_slice(&buf[..n])))
                {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => backlog.push(&buf[..n], limit),
                    Err(TrySendError::Disconnected(_)) => return,
                },
                Err(err) if is_idle(&err) => {}
                Err(err) => {
                    if backlog.deliver(&self.events) {
                        let _ = self.events.send(RxEvent::Failed(err));
                    }
                    return;
                }
            }
        }
    }
}

fn tx_worker(mut writer: impl Write, jobs: Receiver<Bytes>, done: SyncSender<io::Result<()>>) {
    for job in jobs {
        let outcome = writer.write_all(&job).and_then(|()| writer.flush());
        if done.send(outcome).is_err() {
            return;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;

    fn pair() -> (Channel, UnixStream) {
        let (local, remote) = UnixStream::pair().expect("should create socket pair");
        let config = ChannelConfig {
            default_wait: Duration::from_millis(200),
            ..ChannelConfig::default()
        };
        let ch = Channel::with_config(local, config).expect("should open channel");
        (ch, remote)
    }

    #[test]
    fn send_reaches_the_far_end() {
        let (mut ch, mut remote) = pair();
        ch.send(&b"hello"[..]).expect("should queue send");
        ch.wait_all_sent().expect("should finish send");

        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).expect("should read from remote");
        assert_eq!(&buf, b"hello");
        assert_eq!(ch.stats().bytes_sent, 5);
    }

    #[test]
    fn read_blocks_until_all_bytes_arrive() {
        let (mut ch, mut remote) = pair();
        let writer = thread::spawn(move || {
            remote.write_all(b"ab").expect("should write first half");
            thread::sleep(Duration::from_millis(30));
            remote.write_all(b"cd").expect("should write second half");
            remote
        });

        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf, None).expect("should fill buffer"), 4);
        assert_eq!(&buf, b"abcd");
        let _remote = writer.join().expect("writer should not panic");
    }

    #[test]
    fn read_times_out_when_nothing_arrives() {
        let (mut ch, _remote) = pair();
        let mut buf = [0u8; 1];
        let err = ch
            .read(&mut buf, Some(Duration::from_millis(20)))
            .expect_err("should time out");
        assert!(matches!(
            err,
            TransportError::Timeout {
                location: "Channel::read",
                ..
            }
        ));
    }

    #[test]
    fn zero_wait_read_returns_partial_data() {
        let (mut ch, mut remote) = pair();
        remote.write_all(b"xy").expect("should write");
        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 8];
        let n = ch
            .read(&mut buf, Some(Duration::ZERO))
            .expect("should return what is there");
        assert_eq!(&buf[..n], b"xy");
    }

    #[test]
    fn peek_holds_exactly_one_byte() {
        let (mut ch, mut remote) = pair();
        remote.write_all(b"ok").expect("should write");

        assert_eq!(ch.peek_byte(None).expect("should peek"), b'o');
        assert_eq!(ch.peek_byte(None).expect("should peek again"), b'o');
        assert_eq!(ch.read_byte(None).expect("should read peeked byte"), b'o');
        assert_eq!(ch.read_byte(None).expect("should read next byte"), b'k');
    }

    #[test]
    fn flush_discards_pending_bytes() {
        let (mut ch, mut remote) = pair();
        remote.write_all(b"stale").expect("should write");
        thread::sleep(Duration::from_millis(50));

        assert_eq!(ch.flush().expect("should flush"), 5);
        let mut buf = [0u8; 1];
        assert_eq!(ch.read(&mut buf, Some(Duration::ZERO)).expect("should read"), 0);
    }

    #[test]
    fn closed_link_is_reported_after_buffered_bytes() {
        let (mut ch, mut remote) = pair();
        remote.write_all(b"z").expect("should write");
        drop(remote);

        assert_eq!(ch.read_byte(None).expect("should read buffered byte"), b'z');
        let err = ch.read_byte(None).expect_err("link should be closed");
        assert!(matches!(err, TransportError::Closed { .. }));
    }

    #[test]
    fn capture_overflow_keeps_newest_bytes() {
        let (mut ch, mut remote) = pair();
        ch.enable_capture(4);
        remote.write_all(b"123456").expect("should write");
        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf, Some(Duration::ZERO)).expect("should read"), 4);
        assert_eq!(&buf, b"3456");
        assert!(ch.take_overflow());
        assert!(!ch.take_overflow());
        assert_eq!(ch.stats().bytes_dropped, 2);
    }

    #[test]
    fn idle_capture_keeps_newest_bytes_past_queue_depth() {
        let (mut ch, mut remote) = pair();
        ch.enable_capture(16);
        let stream: Vec<u8> = (0..20_000u32).map(|i| i as u8).collect();
        remote.write_all(&stream).expect("should write stream");
        thread::sleep(Duration::from_millis(300));

        // Draining the queue lets the pump hand over what it held back.
        ch.available().expect("should absorb queued chunks");
        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 16];
        assert_eq!(ch.read(&mut buf, Some(Duration::ZERO)).expect("should read"), 16);
        assert_eq!(&buf[..], &stream[stream.len() - 16..]);
        assert!(ch.take_overflow());
        assert_eq!(ch.stats().bytes_received, 20_000);
        assert_eq!(ch.stats().bytes_dropped, 20_000 - 16);
    }

    #[test]
    fn resizing_capture_carries_unread_bytes() {
        let (mut ch, mut remote) = pair();
        ch.enable_capture(8);
        remote.write_all(b"abcdef").expect("should write");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ch.available().expect("should absorb"), 6);

        ch.enable_capture(16);
        assert_eq!(ch.available().expect("should count carried bytes"), 6);
        assert!(!ch.take_overflow());

        ch.enable_capture(4);
        assert!(ch.take_overflow());
        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf, Some(Duration::ZERO)).expect("should read"), 4);
        assert_eq!(&buf, b"cdef");
        assert_eq!(ch.stats().bytes_dropped, 2);
    }

    #[test]
    fn capture_read_waits_for_fill() {
        let (mut ch, mut remote) = pair();
        ch.enable_capture(64);
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.write_all(b"late").expect("should write");
            remote
        });

        let mut buf = [0u8; 4];
        ch.read(&mut buf, None).expect("should wait for bytes");
        assert_eq!(&buf, b"late");
        let _remote = writer.join().expect("writer should not panic");
    }

    #[test]
    fn disable_capture_drops_unread_bytes() {
        let (mut ch, mut remote) = pair();
        ch.enable_capture(16);
        remote.write_all(b"telemetry").expect("should write");
        thread::sleep(Duration::from_millis(50));

        ch.disable_capture().expect("should leave capture mode");
        assert!(!ch.capture_enabled());
        let mut buf = [0u8; 1];
        assert_eq!(ch.read(&mut buf, Some(Duration::ZERO)).expect("should read"), 0);
    }

    #[test]
    fn with_wait_restores_previous_default() {
        let (mut ch, _remote) = pair();
        let inner = ch.with_wait(Duration::ZERO, |ch| ch.default_wait());
        assert_eq!(inner, Duration::ZERO);
        assert_eq!(ch.default_wait(), Duration::from_millis(200));
    }
}
